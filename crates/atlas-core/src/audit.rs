//! Append-only audit records of load executions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// How a load attempt ended.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttemptStatus {
  /// The dataset was loaded; individual rows may still have failed.
  Success,
  /// The dataset-level load aborted.
  Failed,
  /// The source fingerprint matched the last successful load; nothing written.
  Unchanged,
}

/// One row per load execution. Never updated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadAttempt {
  pub attempt_id:    Uuid,
  pub dataset_id:    String,
  pub fingerprint:   Option<String>,
  pub rows_inserted: u64,
  pub rows_updated:  u64,
  pub rows_failed:   u64,
  pub status:        AttemptStatus,
  pub error:         Option<String>,
  pub duration_ms:   u64,
  pub started_at:    DateTime<Utc>,
  pub recorded_at:   DateTime<Utc>,
}
