//! Country dimension types.
//!
//! A [`CanonicalCountry`] is the one row every country-keyed fact joins
//! against. It is created lazily the first time a whitelist-admitted key is
//! resolved, and its surrogate id and normalized key never change afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Dimension ───────────────────────────────────────────────────────────────

/// One real-world country in the `dim_country` dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalCountry {
  /// Store-assigned surrogate key; stable once assigned.
  pub country_id:   i64,
  pub display_name: String,
  /// Unique across all rows.
  pub country_norm: String,
  pub iso3:         Option<String>,
  pub created_at:   DateTime<Utc>,
}

/// Input to [`crate::store::IngestStore::get_or_create_country`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCountry {
  pub display_name: String,
  pub country_norm: String,
  pub iso3:         Option<String>,
}

/// Result of a get-or-create: the row, and whether this call inserted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryUpsert {
  pub country: CanonicalCountry,
  pub created: bool,
}

// ─── ISO reference ───────────────────────────────────────────────────────────

/// One ISO 3166-1 country. Serves as the admission whitelist; it is not a
/// foreign-key parent of [`CanonicalCountry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsoReferenceEntry {
  pub display_name: String,
  pub country_norm: String,
  pub iso2:         Option<String>,
  /// Unique across entries.
  pub iso3:         String,
  pub iso_numeric:  Option<String>,
}
