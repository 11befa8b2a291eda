//! Dataset descriptors and per-dataset load state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Static configuration of one data source. Seeded from configuration and
/// read by every load; the pipeline never invents descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
  /// Stable short code, e.g. `worldbank_gdp`.
  #[serde(rename = "id")]
  pub dataset_id:   String,
  #[serde(rename = "name")]
  pub display_name: String,
  /// Where the raw file comes from (usually a URL).
  #[serde(rename = "url", default)]
  pub origin:       Option<String>,
  pub format:       String,
  #[serde(default)]
  pub cadence:      Option<String>,
  #[serde(default = "default_active")]
  pub active:       bool,
}

fn default_active() -> bool { true }

/// The latest fingerprint and outcome for a dataset. Overwritten on every
/// run; the history lives in [`crate::audit::LoadAttempt`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetLoadState {
  pub dataset_id:     String,
  pub fingerprint:    String,
  pub last_success:   bool,
  pub last_loaded_at: DateTime<Utc>,
}
