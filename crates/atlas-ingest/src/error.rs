//! Error types for `atlas-ingest`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("raw file not found: {}", .0.display())]
  SourceMissing(PathBuf),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("csv error: {0}")]
  Csv(#[from] csv::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("unsupported format {format:?} for dataset {dataset}")]
  UnsupportedFormat { dataset: String, format: String },

  #[error("{dataset}: {message}")]
  Shape { dataset: String, message: String },

  #[error("unknown dataset: {0}")]
  UnknownDataset(String),

  #[error("invalid dataset configuration: {0}")]
  InvalidDescriptor(String),

  #[error(transparent)]
  Core(#[from] atlas_core::Error),
}

impl Error {
  /// Box a backend error.
  pub fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(err))
  }

  pub fn shape(dataset: &str, message: impl Into<String>) -> Self {
    Self::Shape { dataset: dataset.to_owned(), message: message.into() }
  }

  /// Whether this error stops the whole run rather than one dataset.
  ///
  /// A broken store or an unusable dataset registry is fatal; a bad file only
  /// fails its own dataset.
  pub fn is_fatal(&self) -> bool {
    matches!(
      self,
      Self::Store(_) | Self::UnknownDataset(_) | Self::InvalidDescriptor(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
