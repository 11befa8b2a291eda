//! Per-dataset record extraction.
//!
//! Each dataset kind has its own column conventions. Extraction turns raw
//! records into [`LoadBatch`]es, resolving every country label on the way.
//! Rows that name an aggregate or an unknown country are *excluded*; rows
//! that cannot be parsed are *invalid*. Neither stops the dataset.

use std::collections::{BTreeMap, HashSet};

use atlas_core::{
  country::IsoReferenceEntry,
  deposit::{
    AgeValue, CommodityValue, DepositEntity, DetailKind, DetailRecord, DetailValue,
    LocationDetail, MaterialValue, OwnershipValue, PhysiographyValue, RockValue,
  },
  indicator::IndicatorFact,
  load::{DetailBatch, LoadBatch},
  normalize::Normalizer,
  store::IngestStore,
  whitelist::reference_entry,
};
use strum::IntoEnumIterator as _;

use crate::{
  Error, Result,
  config::{DatasetConfig, DatasetKind, infer_year},
  resolver::{CountryResolver, Resolved},
  source::{RawRecord, RawSource, SourceFile},
};

/// Placeholder for blank location and rock-name cells.
pub const NOT_AVAILABLE: &str = "N/A";

const UNSUPPORTED_FORMATS: &[&str] = &["xlsx", "xls", "xlsm"];

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// Batches ready for the loader, in load order, plus row counts that never
/// reached a batch.
#[derive(Debug, Default)]
pub struct Extraction {
  pub batches:  Vec<LoadBatch>,
  pub excluded: u64,
  pub invalid:  u64,
}

impl Extraction {
  fn exclude(&mut self, dataset: &str, reason: impl std::fmt::Display) {
    self.excluded += 1;
    tracing::debug!(dataset, %reason, "row excluded");
  }

  fn reject(&mut self, dataset: &str, reason: impl std::fmt::Display) {
    self.invalid += 1;
    tracing::debug!(dataset, %reason, "row invalid");
  }

  /// Rows across all batches.
  pub fn rows(&self) -> usize { self.batches.iter().map(LoadBatch::len).sum() }
}

// ─── Entry points ────────────────────────────────────────────────────────────

/// Extract the ISO reference entries. Needs no resolver: these entries are
/// what the whitelist is built from.
pub fn extract_iso(
  dataset: &DatasetConfig,
  source: &RawSource,
  normalizer: &Normalizer,
) -> Result<Extraction> {
  check_format(dataset)?;
  let file = primary(dataset, source)?;
  let headers = file.headers()?;

  let name_cols = ["cldr display name", "name", "official name en"];
  let iso3_cols = ["iso3166-1-alpha-3", "iso3166-1-alpha-3 code", "alpha-3"];
  let iso2_cols = ["iso3166-1-alpha-2", "iso3166-1-alpha-2 code", "alpha-2"];
  let numeric_cols = ["iso3166-1-numeric", "iso3166-1-numeric code", "numeric"];
  if !has_any(&headers, &name_cols) || !has_any(&headers, &iso3_cols) {
    return Err(Error::shape(&dataset.id, "name and alpha-3 columns are required"));
  }

  let mut out = Extraction::default();
  let mut entries: Vec<IsoReferenceEntry> = Vec::new();
  for record in file.records()? {
    let record = record?;
    let (Some(name), Some(iso3)) = (field(&record, &name_cols), field(&record, &iso3_cols))
    else {
      out.reject(&dataset.id, "missing name or alpha-3 code");
      continue;
    };
    match reference_entry(
      normalizer,
      name,
      field(&record, &iso2_cols),
      iso3,
      field(&record, &numeric_cols),
    ) {
      Ok(entry) => entries.push(entry),
      Err(e) => out.reject(&dataset.id, e),
    }
  }

  out.batches.push(LoadBatch::IsoReference(entries));
  Ok(out)
}

/// Extract any dataset kind.
pub async fn extract<S: IngestStore>(
  dataset: &DatasetConfig,
  source: &RawSource,
  resolver: &CountryResolver<S>,
) -> Result<Extraction> {
  check_format(dataset)?;
  match dataset.kind {
    DatasetKind::IsoCountryCodes => extract_iso(dataset, source, resolver.normalizer()),
    DatasetKind::WorldBank => world_bank(dataset, source, resolver).await,
    DatasetKind::Fsi => fsi(dataset, source, resolver).await,
    DatasetKind::Cpi => cpi(dataset, source, resolver).await,
    DatasetKind::Mrds => mrds(dataset, source, resolver).await,
  }
}

fn check_format(dataset: &DatasetConfig) -> Result<()> {
  let format = dataset.format.trim().to_ascii_lowercase();
  if UNSUPPORTED_FORMATS.contains(&format.as_str()) {
    return Err(Error::UnsupportedFormat {
      dataset: dataset.id.clone(),
      format:  dataset.format.clone(),
    });
  }
  Ok(())
}

fn primary<'s>(dataset: &DatasetConfig, source: &'s RawSource) -> Result<&'s SourceFile> {
  source
    .primary()
    .ok_or_else(|| Error::shape(&dataset.id, "source has no files"))
}

fn indicator_code(dataset: &DatasetConfig) -> Result<String> {
  dataset
    .indicator_code()
    .ok_or_else(|| Error::shape(&dataset.id, "no indicator_code configured"))
}

// ─── Indicator datasets ──────────────────────────────────────────────────────

async fn world_bank<S: IngestStore>(
  dataset: &DatasetConfig,
  source: &RawSource,
  resolver: &CountryResolver<S>,
) -> Result<Extraction> {
  let file = primary(dataset, source)?;
  let configured = dataset.indicator_code();

  let mut out = Extraction::default();
  let mut facts = Vec::new();
  for record in file.world_bank_records()? {
    let Some(country) = field(&record, &["country"]) else {
      out.reject(&dataset.id, "missing country");
      continue;
    };
    let Some(iso3) = field(&record, &["countryiso3code"]).filter(|c| c.len() == 3) else {
      out.exclude(&dataset.id, format!("{country:?} has no ISO3 code"));
      continue;
    };
    // Years without an observation come through as null.
    let Some(raw_value) = field(&record, &["value"]) else {
      continue;
    };
    let Some(year) = field(&record, &["date"]).and_then(parse_year) else {
      out.reject(&dataset.id, format!("{country:?}: unparseable date"));
      continue;
    };
    let Ok(value) = raw_value.parse::<f64>() else {
      out.reject(&dataset.id, format!("{country:?}: unparseable value {raw_value:?}"));
      continue;
    };
    let Some(code) = configured
      .clone()
      .or_else(|| field(&record, &["indicator"]).map(str::to_owned))
    else {
      out.reject(&dataset.id, "no indicator code");
      continue;
    };

    match resolver.resolve_with_hint(country, Some(iso3)).await? {
      Resolved::Country(c) => facts.push(IndicatorFact {
        country_id: c.country_id,
        dataset_id: dataset.id.clone(),
        indicator_code: code,
        year,
        value,
      }),
      Resolved::Rejected(r) => out.exclude(&dataset.id, r),
    }
  }

  out.batches.push(LoadBatch::Indicators(facts));
  Ok(out)
}

/// Fragile States Index. Ranks arrive as ordinals ("144th"); with a year
/// column only each country's latest year is kept.
async fn fsi<S: IngestStore>(
  dataset: &DatasetConfig,
  source: &RawSource,
  resolver: &CountryResolver<S>,
) -> Result<Extraction> {
  let file = primary(dataset, source)?;
  let headers = file.headers()?;
  if !has_any(&headers, &["country"]) || !has_any(&headers, &["rank"]) {
    return Err(Error::shape(&dataset.id, "Country and Rank columns are required"));
  }
  let fallback_year = if has_any(&headers, &["year"]) {
    None
  } else {
    Some(dataset.year_hint().ok_or_else(|| {
      Error::shape(&dataset.id, "Year column missing and no year hint")
    })?)
  };
  let code = indicator_code(dataset)?;

  let mut out = Extraction::default();
  let mut latest: BTreeMap<i64, IndicatorFact> = BTreeMap::new();
  for record in file.records()? {
    let record = record?;
    let Some(country) = field(&record, &["country"]) else {
      out.reject(&dataset.id, "missing country");
      continue;
    };
    let Some(value) = field(&record, &["rank"]).and_then(parse_rank) else {
      out.reject(&dataset.id, format!("{country:?}: unparseable rank"));
      continue;
    };
    let Some(year) = fallback_year.or_else(|| field(&record, &["year"]).and_then(parse_year))
    else {
      out.reject(&dataset.id, format!("{country:?}: unparseable year"));
      continue;
    };

    match resolver.resolve(country).await? {
      Resolved::Country(c) => {
        let fact = IndicatorFact {
          country_id: c.country_id,
          dataset_id: dataset.id.clone(),
          indicator_code: code.clone(),
          year,
          value,
        };
        if latest.get(&c.country_id).is_none_or(|kept| kept.year <= year) {
          latest.insert(c.country_id, fact);
        }
      }
      Resolved::Rejected(r) => out.exclude(&dataset.id, r),
    }
  }

  out.batches.push(LoadBatch::Indicators(latest.into_values().collect()));
  Ok(out)
}

/// Corruption Perceptions Index. The header row is not always the first
/// line; the year comes from the score column's header when present.
async fn cpi<S: IngestStore>(
  dataset: &DatasetConfig,
  source: &RawSource,
  resolver: &CountryResolver<S>,
) -> Result<Extraction> {
  let file = primary(dataset, source)?;
  let rows = file.rows()?;

  let header_idx = rows
    .iter()
    .take(10)
    .position(|row| is_cpi_header(row))
    .ok_or_else(|| Error::shape(&dataset.id, "header row not found"))?;
  let header: Vec<String> = rows[header_idx].iter().map(|c| c.to_lowercase()).collect();

  let country_idx = header.iter().position(|h| is_country_header(h));
  let score_idx = header.iter().position(|h| is_score_header(h));
  let (Some(country_idx), Some(score_idx)) = (country_idx, score_idx) else {
    return Err(Error::shape(&dataset.id, "required columns missing"));
  };
  let iso_idx = header.iter().position(|h| h == "iso3");
  let year = infer_year(&header[score_idx])
    .or_else(|| dataset.year_hint())
    .ok_or_else(|| Error::shape(&dataset.id, "year not detected"))?;
  let code = indicator_code(dataset)?;

  let mut out = Extraction::default();
  let mut facts = Vec::new();
  for row in &rows[header_idx + 1..] {
    if row.iter().all(|c| c.is_empty()) {
      continue;
    }
    let cell = |idx: usize| row.get(idx).map(String::as_str).filter(|c| !c.is_empty());
    let Some(country) = cell(country_idx) else {
      out.reject(&dataset.id, "missing country");
      continue;
    };
    let Some(value) = cell(score_idx).and_then(|s| s.parse::<f64>().ok()) else {
      out.reject(&dataset.id, format!("{country:?}: unparseable score"));
      continue;
    };
    if !(0.0..=100.0).contains(&value) {
      out.reject(&dataset.id, format!("{country:?}: score {value} outside 0..=100"));
      continue;
    }

    let hint = iso_idx.and_then(cell);
    match resolver.resolve_with_hint(country, hint).await? {
      Resolved::Country(c) => facts.push(IndicatorFact {
        country_id: c.country_id,
        dataset_id: dataset.id.clone(),
        indicator_code: code.clone(),
        year,
        value,
      }),
      Resolved::Rejected(r) => out.exclude(&dataset.id, r),
    }
  }

  out.batches.push(LoadBatch::Indicators(facts));
  Ok(out)
}

fn is_country_header(h: &str) -> bool { h == "country / territory" || h == "country/territory" }

fn is_score_header(h: &str) -> bool { h.contains("cpi") && h.contains("score") }

fn is_cpi_header(row: &[String]) -> bool {
  let lower: Vec<String> = row.iter().map(|c| c.to_lowercase()).collect();
  lower.iter().any(|h| is_country_header(h)) && lower.iter().any(|h| is_score_header(h))
}

// ─── MRDS ────────────────────────────────────────────────────────────────────

async fn mrds<S: IngestStore>(
  dataset: &DatasetConfig,
  source: &RawSource,
  resolver: &CountryResolver<S>,
) -> Result<Extraction> {
  let main = source
    .table("MRDS")
    .ok_or_else(|| Error::shape(&dataset.id, "MRDS table missing from bundle"))?;

  let mut out = Extraction::default();

  // Deposits; their ids bound every other table.
  let mut deposits = Vec::new();
  let mut known = HashSet::new();
  for record in main.records()? {
    let record = record?;
    let Some(dep_id) = field(&record, &["dep_id"]).and_then(|s| s.parse::<i64>().ok()) else {
      out.reject(&dataset.id, "deposit without a numeric dep_id");
      continue;
    };
    let (Ok(latitude), Ok(longitude)) = (
      optional_f64(field(&record, &["latitude"])),
      optional_f64(field(&record, &["longitude"])),
    ) else {
      out.reject(&dataset.id, format!("deposit {dep_id}: unparseable coordinates"));
      continue;
    };
    known.insert(dep_id);
    deposits.push(DepositEntity {
      dep_id,
      name: owned(field(&record, &["name"])),
      dev_stat: owned(field(&record, &["dev_stat"])),
      code_list: owned(field(&record, &["code_list"])),
      latitude,
      longitude,
    });
  }
  out.batches.push(LoadBatch::Deposits(deposits));

  // Locations.
  if let Some(table) = source.table("Location") {
    let mut locations = Vec::new();
    for record in table.records()? {
      let record = record?;
      let Some(dep_id) = owned_dep_id(&record, &known) else {
        out.exclude(&dataset.id, "location for a deposit outside the bundle");
        continue;
      };
      let Some(country) = field(&record, &["country"]) else {
        out.exclude(&dataset.id, format!("deposit {dep_id}: no country"));
        continue;
      };
      match resolver.resolve(country).await? {
        Resolved::Country(c) => locations.push(LocationDetail {
          dep_id,
          country_id: c.country_id,
          state_prov: or_not_available(field(&record, &["state_prov"])),
          region: or_not_available(field(&record, &["region"])),
          county: or_not_available(field(&record, &["county"])),
        }),
        Resolved::Rejected(r) => out.exclude(&dataset.id, r),
      }
    }
    out.batches.push(LoadBatch::Locations(locations));
  }

  // Detail tables. Each table present in the bundle is reloaded for every
  // deposit in the MRDS table, including deposits that no longer have rows.
  let mut details = DetailBatch::default();
  for kind in DetailKind::iter() {
    let Some(table) = source.table(kind.source_stem()) else {
      continue;
    };
    details.kinds.push(kind);
    for record in table.records()? {
      let record = record?;
      match owned_dep_id(&record, &known) {
        Some(dep_id) => details.rows.push(DetailRecord::new(dep_id, detail_value(kind, &record))),
        None => out.exclude(&dataset.id, format!("{kind} row for a deposit outside the bundle")),
      }
    }
  }
  if !details.kinds.is_empty() {
    let mut deposits: Vec<i64> = known.into_iter().collect();
    deposits.sort_unstable();
    details.deposits = deposits;
    out.batches.push(LoadBatch::Details(details));
  }

  Ok(out)
}

fn owned_dep_id(record: &RawRecord, known: &HashSet<i64>) -> Option<i64> {
  field(record, &["dep_id"])
    .and_then(|s| s.parse::<i64>().ok())
    .filter(|id| known.contains(id))
}

fn detail_value(kind: DetailKind, record: &RawRecord) -> DetailValue {
  let get = |names: &[&str]| owned(field(record, names));
  let ordinal = |name: &str| Some(or_not_available(field(record, &[name])));
  match kind {
    DetailKind::Commodity => DetailValue::Commodity(CommodityValue {
      commod:       get(&["commod"]),
      code:         get(&["code"]),
      commod_tp:    get(&["commod_tp"]),
      commod_group: get(&["commod_group"]),
      import:       get(&["import"]),
    }),
    DetailKind::Material => DetailValue::Material(MaterialValue {
      rec:        get(&["rec"]),
      ore_gangue: get(&["ore_gangue", "ore_gauge"]),
      material:   get(&["material"]),
    }),
    DetailKind::Ownership => DetailValue::Ownership(OwnershipValue {
      owner_name: get(&["owner_name"]),
      owner_tp:   get(&["owner_tp"]),
    }),
    DetailKind::Physiography => DetailValue::Physiography(PhysiographyValue {
      phys_div:  get(&["phys_div"]),
      phys_prov: get(&["phys_prov"]),
      phys_sect: get(&["phys_sect"]),
      phys_det:  get(&["phys_det"]),
    }),
    DetailKind::Age => DetailValue::Age(AgeValue {
      age_tp:    get(&["age_tp"]),
      age_young: get(&["age_young"]),
    }),
    DetailKind::Rock => DetailValue::Rock(RockValue {
      rock_cls:      get(&["rock_cls"]),
      first_ord_nm:  ordinal("first_ord_nm"),
      second_ord_nm: ordinal("second_ord_nm"),
      third_ord_nm:  ordinal("third_ord_nm"),
      low_name:      get(&["low_name"]),
    }),
  }
}

// ─── Field helpers ───────────────────────────────────────────────────────────

/// The first non-empty value among `names`, matched case-insensitively.
fn field<'r>(record: &'r RawRecord, names: &[&str]) -> Option<&'r str> {
  names.iter().find_map(|name| {
    record
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
      .filter(|v| !v.is_empty())
  })
}

fn has_any(headers: &[String], names: &[&str]) -> bool {
  headers
    .iter()
    .any(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
}

fn owned(value: Option<&str>) -> Option<String> { value.map(str::to_owned) }

fn or_not_available(value: Option<&str>) -> String {
  value.unwrap_or(NOT_AVAILABLE).to_owned()
}

fn optional_f64(value: Option<&str>) -> std::result::Result<Option<f64>, ()> {
  value
    .map(|s| s.parse::<f64>().map_err(|_| ()))
    .transpose()
}

fn parse_year(text: &str) -> Option<i32> { text.trim().parse().ok() }

/// The leading number of an ordinal rank such as "144th" or "1st".
pub fn parse_rank(text: &str) -> Option<f64> {
  let digits: String = text
    .chars()
    .skip_while(|c| !c.is_ascii_digit())
    .take_while(char::is_ascii_digit)
    .collect();
  digits.parse::<u32>().ok().map(f64::from)
}
