//! atlas-load binary.
//!
//! Reads `atlas.toml` (or the path given with `--config`), layers `ATLAS__*`
//! environment variables on top, opens the SQLite store, and loads every
//! active dataset. Prints a per-dataset summary and per-table row counts.
//!
//! The exit code is non-zero only when the run hit a pipeline-level failure;
//! a dataset whose file is missing or malformed is reported and skipped.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use atlas_core::store::IngestStore;
use atlas_ingest::{
  config::PipelineConfig,
  pipeline::{self, RunOptions, RunSummary},
};
use atlas_store_sqlite::SqliteStore;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Load country-level datasets into the atlas store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "atlas.toml")]
  config: PathBuf,

  /// Load datasets even when their source files are unchanged.
  #[arg(long)]
  force: bool,

  /// Load only this dataset id. May be repeated.
  #[arg(long = "only", value_name = "DATASET_ID")]
  only: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("ATLAS").separator("__"))
    .build()
    .context("failed to read config file")?;

  let mut pipeline_cfg: PipelineConfig = settings
    .try_deserialize()
    .context("failed to deserialise PipelineConfig")?;
  pipeline_cfg.store_path = expand_tilde(&pipeline_cfg.store_path);
  pipeline_cfg.raw_dir = expand_tilde(&pipeline_cfg.raw_dir);

  let normalizer = pipeline_cfg
    .normalizer()
    .context("failed to load normalization tables")?;
  let (alias_version, region_version) = normalizer.versions();
  tracing::info!(alias_version, region_version, "normalization tables loaded");

  let registry = pipeline_cfg
    .registry()
    .context("invalid dataset configuration")?;

  // Open SQLite store.
  let store_path = &pipeline_cfg.store_path;
  if let Some(parent) = store_path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create store directory {parent:?}"))?;
  }
  let store = SqliteStore::open(store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let options = RunOptions {
    force: cli.force || pipeline_cfg.force,
    only:  cli.only,
  };
  let summary = pipeline::run(
    store.clone(),
    Arc::new(registry),
    Arc::new(normalizer),
    options,
  )
  .await
  .context("run aborted")?;

  print_summary(&summary);

  let counts = store
    .table_counts()
    .await
    .context("failed to read table counts")?;
  println!();
  println!("{:<24} {:>10}", "table", "rows");
  for (table, rows) in counts {
    println!("{table:<24} {rows:>10}");
  }

  let code = summary.exit_code();
  if code != 0 {
    tracing::error!("run finished with a pipeline-level failure");
    std::process::exit(code);
  }
  Ok(())
}

fn print_summary(summary: &RunSummary) {
  println!(
    "{:<22} {:<10} {:>9} {:>9} {:>7} {:>9}",
    "dataset", "status", "inserted", "updated", "failed", "excluded"
  );
  for report in &summary.datasets {
    println!(
      "{:<22} {:<10} {:>9} {:>9} {:>7} {:>9}",
      report.dataset_id,
      report.status.to_string(),
      report.inserted,
      report.updated,
      report.failed,
      report.excluded
    );
    if let Some(error) = &report.error {
      println!("  {error}");
    }
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
