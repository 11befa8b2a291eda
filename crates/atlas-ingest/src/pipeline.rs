//! The end-to-end run.
//!
//! The ISO reference dataset always goes first: the whitelist every other
//! dataset resolves against is read back from the store after it. The
//! remaining datasets then load concurrently, one task each, sharing a
//! cloned store handle and a single country resolver.

use std::{path::PathBuf, sync::Arc};

use atlas_core::{
  audit::AttemptStatus, load::LoadResult, normalize::Normalizer, store::IngestStore,
  whitelist::Whitelist,
};
use tokio::task::JoinSet;

use crate::{
  Error, Result,
  audit::{AttemptHandle, RunAuditor},
  change::{ChangeDetector, fingerprint},
  config::{DatasetConfig, DatasetKind, DatasetRegistry},
  extract::{self, Extraction},
  loader::UpsertLoader,
  resolver::CountryResolver,
  source::RawSource,
};

// ─── Options & reports ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
  /// Load even when a dataset's fingerprint is unchanged.
  pub force: bool,
  /// Restrict the run to these dataset ids. Empty means every active one.
  pub only:  Vec<String>,
}

/// Outcome of one dataset in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetReport {
  pub dataset_id: String,
  pub status:     AttemptStatus,
  pub inserted:   u64,
  pub updated:    u64,
  pub failed:     u64,
  /// Rows dropped as aggregates, unknown countries, or orphans.
  pub excluded:   u64,
  pub error:      Option<String>,
  /// The error was a pipeline-level failure, not a problem with the dataset.
  pub fatal:      bool,
}

impl DatasetReport {
  fn new(dataset_id: &str, status: AttemptStatus) -> Self {
    Self {
      dataset_id: dataset_id.to_owned(),
      status,
      inserted: 0,
      updated: 0,
      failed: 0,
      excluded: 0,
      error: None,
      fatal: false,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
  pub datasets: Vec<DatasetReport>,
}

impl RunSummary {
  pub fn report(&self, dataset_id: &str) -> Option<&DatasetReport> {
    self.datasets.iter().find(|r| r.dataset_id == dataset_id)
  }

  pub fn is_fatal(&self) -> bool { self.datasets.iter().any(|r| r.fatal) }

  /// Non-zero only when a pipeline-level failure occurred; failed datasets
  /// and failed rows alone still exit 0.
  pub fn exit_code(&self) -> i32 { if self.is_fatal() { 1 } else { 0 } }
}

// ─── Run ─────────────────────────────────────────────────────────────────────

/// Run every selected dataset.
///
/// `Err` means the run could not start (unknown `--only` id, store
/// unreachable while seeding or reading the whitelist). Once datasets are
/// running their failures are reported in the summary instead.
pub async fn run<S>(
  store: S,
  registry: Arc<DatasetRegistry>,
  normalizer: Arc<Normalizer>,
  options: RunOptions,
) -> Result<RunSummary>
where
  S: IngestStore + Clone + 'static,
{
  let selected = registry.select(&options.only)?;
  let seeded = store
    .seed_datasets(registry.descriptors())
    .await
    .map_err(Error::store)?;
  tracing::debug!(seeded, "dataset registry seeded");

  let mut summary = RunSummary::default();

  let (iso, rest): (Vec<&DatasetConfig>, Vec<&DatasetConfig>) = selected
    .into_iter()
    .partition(|d| d.kind == DatasetKind::IsoCountryCodes);
  for dataset in iso {
    let report = load_dataset(
      &store,
      dataset,
      registry.resolve_path(dataset),
      options.force,
      Extractor::Iso(&normalizer),
    )
    .await;
    summary.datasets.push(report);
  }

  let entries = store.list_iso_entries().await.map_err(Error::store)?;
  let whitelist = Arc::new(Whitelist::build(entries));
  tracing::info!(countries = whitelist.len(), "whitelist built");
  let resolver = Arc::new(CountryResolver::new(store.clone(), normalizer, whitelist));

  let mut tasks = JoinSet::new();
  for (order, dataset) in rest.into_iter().enumerate() {
    let store = store.clone();
    let resolver = Arc::clone(&resolver);
    let dataset = dataset.clone();
    let path = registry.resolve_path(&dataset);
    let force = options.force;
    tasks.spawn(async move {
      let report =
        load_dataset(&store, &dataset, path, force, Extractor::Resolved(&resolver)).await;
      (order, report)
    });
  }

  let mut reports = Vec::new();
  while let Some(joined) = tasks.join_next().await {
    match joined {
      Ok(done) => reports.push(done),
      Err(e) => {
        tracing::error!(error = %e, "dataset task panicked");
        let mut report = DatasetReport::new("<unknown>", AttemptStatus::Failed);
        report.error = Some(e.to_string());
        report.fatal = true;
        reports.push((usize::MAX, report));
      }
    }
  }
  reports.sort_by_key(|(order, _)| *order);
  summary.datasets.extend(reports.into_iter().map(|(_, r)| r));

  tracing::info!(
    datasets = summary.datasets.len(),
    fatal = summary.is_fatal(),
    "run complete"
  );
  Ok(summary)
}

// ─── One dataset ─────────────────────────────────────────────────────────────

enum Extractor<'r, S> {
  Iso(&'r Normalizer),
  Resolved(&'r CountryResolver<S>),
}

enum Outcome {
  Unchanged,
  Loaded { result: LoadResult, excluded: u64 },
}

async fn load_dataset<S: IngestStore>(
  store: &S,
  dataset: &DatasetConfig,
  path: PathBuf,
  force: bool,
  extractor: Extractor<'_, S>,
) -> DatasetReport {
  let auditor = RunAuditor::new(store, ChangeDetector::new(store, force));
  let mut handle = auditor.begin(&dataset.id);

  let outcome = execute(&auditor, &mut handle, dataset, path, extractor).await;

  let (mut report, recorded) = match outcome {
    Ok(Outcome::Unchanged) => {
      tracing::info!(dataset = %dataset.id, "unchanged; skipped");
      (
        DatasetReport::new(&dataset.id, AttemptStatus::Unchanged),
        auditor.unchanged(handle).await,
      )
    }
    Ok(Outcome::Loaded { result, excluded }) => {
      let mut report = DatasetReport::new(&dataset.id, AttemptStatus::Success);
      report.inserted = result.inserted;
      report.updated = result.updated;
      report.failed = result.failed;
      report.excluded = excluded;
      (report, auditor.complete(handle, &result).await)
    }
    Err(e) => {
      tracing::warn!(dataset = %dataset.id, error = %e, "dataset load failed");
      let mut report = DatasetReport::new(&dataset.id, AttemptStatus::Failed);
      report.error = Some(e.to_string());
      report.fatal = e.is_fatal();
      (report, auditor.fail(handle, &e).await)
    }
  };

  if let Err(e) = recorded {
    tracing::error!(dataset = %dataset.id, error = %e, "could not record load attempt");
    report.fatal = true;
    report.error.get_or_insert_with(|| e.to_string());
  }
  report
}

async fn execute<S: IngestStore>(
  auditor: &RunAuditor<'_, S>,
  handle: &mut AttemptHandle,
  dataset: &DatasetConfig,
  path: PathBuf,
  extractor: Extractor<'_, S>,
) -> Result<Outcome> {
  let source = match dataset.kind {
    DatasetKind::Mrds => RawSource::mrds_bundle(&path)?,
    _ => RawSource::file(&path)?,
  };

  let fingerprint = fingerprint(&source);
  handle.set_fingerprint(fingerprint.clone());
  if !auditor
    .change_detector()
    .should_load(&dataset.id, &fingerprint)
    .await?
  {
    return Ok(Outcome::Unchanged);
  }

  let extraction: Extraction = match extractor {
    Extractor::Iso(normalizer) => extract::extract_iso(dataset, &source, normalizer)?,
    Extractor::Resolved(resolver) => extract::extract(dataset, &source, resolver).await?,
  };
  tracing::debug!(
    dataset = %dataset.id,
    source = %source.origin.display(),
    rows = extraction.rows(),
    excluded = extraction.excluded,
    invalid = extraction.invalid,
    "extracted"
  );

  let loader = UpsertLoader::new(auditor.store());
  let mut total = LoadResult::default();
  for batch in extraction.batches {
    let result = loader.upsert(batch).await?;
    total.absorb(result, &[]);
  }
  total.failed += extraction.invalid;

  Ok(Outcome::Loaded { result: total, excluded: extraction.excluded })
}
