//! Pipeline configuration and the dataset registry.
//!
//! [`PipelineConfig`] is deserialised by the binary (TOML file layered with
//! `ATLAS__*` environment variables). The [`DatasetRegistry`] built from it
//! is the only place dataset descriptors come from; it is constructed once
//! per run and shared by reference.

use std::{
  collections::HashSet,
  path::{Path, PathBuf},
  sync::LazyLock,
};

use atlas_core::{dataset::DatasetDescriptor, normalize::Normalizer};
use regex::Regex;
use serde::Deserialize;
use strum::{Display, EnumString};

use crate::{Error, Result};

static YEAR_PATTERN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(19|20)\d{2}").expect("year pattern should compile"));

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `atlas.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
  pub store_path:         PathBuf,
  /// Base directory for relative dataset paths.
  #[serde(default = "default_raw_dir")]
  pub raw_dir:            PathBuf,
  /// Load every dataset even when its fingerprint is unchanged.
  #[serde(default)]
  pub force:              bool,
  #[serde(default)]
  pub aliases_path:       Option<PathBuf>,
  #[serde(default)]
  pub region_tokens_path: Option<PathBuf>,
  #[serde(default)]
  pub datasets:           Vec<DatasetConfig>,
}

fn default_raw_dir() -> PathBuf { PathBuf::from("data/raw") }

impl PipelineConfig {
  /// The normalizer for this run: the bundled tables unless overridden.
  pub fn normalizer(&self) -> Result<Normalizer> {
    let aliases = match &self.aliases_path {
      Some(path) => read_text(path)?,
      None => atlas_core::normalize::BUNDLED_ALIASES.to_owned(),
    };
    let regions = match &self.region_tokens_path {
      Some(path) => read_text(path)?,
      None => atlas_core::normalize::BUNDLED_REGION_TOKENS.to_owned(),
    };
    Ok(Normalizer::from_json(&aliases, &regions)?)
  }

  pub fn registry(&self) -> Result<DatasetRegistry> {
    DatasetRegistry::new(&self.raw_dir, self.datasets.clone())
  }
}

fn read_text(path: &Path) -> Result<String> {
  if !path.exists() {
    return Err(Error::SourceMissing(path.to_path_buf()));
  }
  Ok(std::fs::read_to_string(path)?)
}

// ─── Datasets ────────────────────────────────────────────────────────────────

/// Which extractor understands a dataset's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DatasetKind {
  IsoCountryCodes,
  WorldBank,
  Fsi,
  Cpi,
  Mrds,
}

/// One `[[datasets]]` entry: the stored descriptor plus where and how to
/// read the raw data.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
  pub id:             String,
  pub name:           String,
  #[serde(default)]
  pub url:            Option<String>,
  pub format:         String,
  #[serde(default)]
  pub cadence:        Option<String>,
  #[serde(default = "default_active")]
  pub active:         bool,
  pub kind:           DatasetKind,
  /// A file, or for MRDS the directory holding the bundle tables.
  pub path:           PathBuf,
  #[serde(default)]
  pub indicator_code: Option<String>,
  /// Observation year for sources without a year column.
  #[serde(default)]
  pub year:           Option<i32>,
}

fn default_active() -> bool { true }

impl DatasetConfig {
  pub fn descriptor(&self) -> DatasetDescriptor {
    DatasetDescriptor {
      dataset_id:   self.id.clone(),
      display_name: self.name.clone(),
      origin:       self.url.clone(),
      format:       self.format.clone(),
      cadence:      self.cadence.clone(),
      active:       self.active,
    }
  }

  /// The configured indicator code, or the conventional one for well-known
  /// dataset ids.
  pub fn indicator_code(&self) -> Option<String> {
    self
      .indicator_code
      .clone()
      .or_else(|| default_indicator_code(&self.id).map(str::to_owned))
  }

  /// The configured year, else the first year found in the path, url, name
  /// or id.
  pub fn year_hint(&self) -> Option<i32> {
    if self.year.is_some() {
      return self.year;
    }
    let path = self.path.to_string_lossy();
    let candidates = [
      Some(path.as_ref()),
      self.url.as_deref(),
      Some(self.name.as_str()),
      Some(self.id.as_str()),
    ];
    candidates.into_iter().flatten().find_map(infer_year)
  }
}

pub fn default_indicator_code(dataset_id: &str) -> Option<&'static str> {
  match dataset_id {
    "worldbank_gdp" => Some("NY.GDP.MKTP.CD"),
    "worldbank_population" => Some("SP.POP.TOTL"),
    "fsi" => Some("RANK"),
    "cpi" => Some("CPI"),
    _ => None,
  }
}

/// The first plausible four-digit year in `text`.
pub fn infer_year(text: &str) -> Option<i32> {
  YEAR_PATTERN
    .find(text)
    .and_then(|m| m.as_str().parse().ok())
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// The validated set of configured datasets.
#[derive(Debug, Clone)]
pub struct DatasetRegistry {
  raw_dir:  PathBuf,
  datasets: Vec<DatasetConfig>,
}

impl DatasetRegistry {
  /// Validate `datasets`: ids must be present and unique, and at most one
  /// dataset may supply the ISO reference.
  pub fn new(raw_dir: impl Into<PathBuf>, datasets: Vec<DatasetConfig>) -> Result<Self> {
    let mut seen = HashSet::new();
    let mut iso_sources = 0;
    for ds in &datasets {
      if ds.id.trim().is_empty() {
        return Err(Error::InvalidDescriptor("dataset with empty id".into()));
      }
      if !seen.insert(ds.id.as_str()) {
        return Err(Error::InvalidDescriptor(format!("duplicate dataset id {:?}", ds.id)));
      }
      if ds.kind == DatasetKind::IsoCountryCodes {
        iso_sources += 1;
      }
    }
    if iso_sources > 1 {
      return Err(Error::InvalidDescriptor(
        "more than one iso_country_codes dataset".into(),
      ));
    }
    Ok(Self { raw_dir: raw_dir.into(), datasets })
  }

  pub fn get(&self, dataset_id: &str) -> Option<&DatasetConfig> {
    self.datasets.iter().find(|d| d.id == dataset_id)
  }

  pub fn descriptors(&self) -> Vec<DatasetDescriptor> {
    self.datasets.iter().map(DatasetConfig::descriptor).collect()
  }

  /// Active datasets, restricted to `only` when it is non-empty. Naming an
  /// unconfigured id is an error.
  pub fn select(&self, only: &[String]) -> Result<Vec<&DatasetConfig>> {
    for id in only {
      if self.get(id).is_none() {
        return Err(Error::UnknownDataset(id.clone()));
      }
    }
    Ok(
      self
        .datasets
        .iter()
        .filter(|d| d.active)
        .filter(|d| only.is_empty() || only.contains(&d.id))
        .collect(),
    )
  }

  /// The raw path of a dataset, anchored at `raw_dir` when relative.
  pub fn resolve_path(&self, dataset: &DatasetConfig) -> PathBuf {
    if dataset.path.is_absolute() {
      dataset.path.clone()
    } else {
      self.raw_dir.join(&dataset.path)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dataset(id: &str, kind: DatasetKind) -> DatasetConfig {
    DatasetConfig {
      id: id.into(),
      name: format!("{id} source"),
      url: None,
      format: "csv".into(),
      cadence: None,
      active: true,
      kind,
      path: format!("{id}.csv").into(),
      indicator_code: None,
      year: None,
    }
  }

  #[test]
  fn year_hint_prefers_explicit_then_path() {
    let mut ds = dataset("fsi", DatasetKind::Fsi);
    assert_eq!(ds.year_hint(), None);

    ds.path = "fsi/FSI-2023-DOWNLOAD.csv".into();
    ds.url = Some("https://fragilestatesindex.org/2022".into());
    assert_eq!(ds.year_hint(), Some(2023));

    ds.year = Some(2019);
    assert_eq!(ds.year_hint(), Some(2019));

    assert_eq!(infer_year("CPI score 2024"), Some(2024));
    assert_eq!(infer_year("v1800"), None);
  }

  #[test]
  fn indicator_codes_default_by_id() {
    assert_eq!(
      dataset("worldbank_gdp", DatasetKind::WorldBank).indicator_code().as_deref(),
      Some("NY.GDP.MKTP.CD")
    );
    assert_eq!(dataset("fsi", DatasetKind::Fsi).indicator_code().as_deref(), Some("RANK"));
    assert!(dataset("custom", DatasetKind::Cpi).indicator_code().is_none());

    let mut custom = dataset("custom", DatasetKind::Cpi);
    custom.indicator_code = Some("CPI_ALT".into());
    assert_eq!(custom.indicator_code().as_deref(), Some("CPI_ALT"));
  }

  #[test]
  fn registry_rejects_duplicates_and_unknown_selections() {
    let dup = DatasetRegistry::new(
      "raw",
      vec![dataset("fsi", DatasetKind::Fsi), dataset("fsi", DatasetKind::Fsi)],
    );
    assert!(matches!(dup, Err(Error::InvalidDescriptor(_))));

    let mut inactive = dataset("cpi", DatasetKind::Cpi);
    inactive.active = false;
    let registry = DatasetRegistry::new(
      "raw",
      vec![dataset("fsi", DatasetKind::Fsi), inactive],
    )
    .unwrap();

    assert_eq!(registry.select(&[]).unwrap().len(), 1);
    assert!(registry.select(&["cpi".into()]).unwrap().is_empty());
    assert!(matches!(
      registry.select(&["mrds".into()]),
      Err(Error::UnknownDataset(_))
    ));
    assert_eq!(
      registry.resolve_path(registry.get("fsi").unwrap()),
      PathBuf::from("raw/fsi.csv")
    );
  }

  #[test]
  fn dataset_entries_deserialize_from_toml_shape() {
    let json = serde_json::json!({
      "id": "worldbank_gdp",
      "name": "World Bank GDP",
      "url": "https://api.worldbank.org/v2/country/all/indicator/NY.GDP.MKTP.CD",
      "format": "json",
      "kind": "world_bank",
      "path": "worldbank/gdp.json"
    });
    let ds: DatasetConfig = serde_json::from_value(json).unwrap();
    assert_eq!(ds.kind, DatasetKind::WorldBank);
    assert!(ds.active);
    assert_eq!(ds.descriptor().dataset_id, "worldbank_gdp");
  }
}
