//! Error types for `atlas-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid alias table: {0}")]
  AliasTable(String),

  #[error("invalid ISO3 code: {0:?}")]
  InvalidIso3(String),

  #[error("ISO reference name {0:?} normalizes to a non-country key")]
  NonCountryReference(String),

  #[error("unknown detail kind: {0:?}")]
  UnknownDetailKind(String),

  #[error("unknown attempt status: {0:?}")]
  UnknownAttemptStatus(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
