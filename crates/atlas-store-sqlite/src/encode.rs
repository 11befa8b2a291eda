//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. UUIDs are stored as
//! hyphenated lowercase strings. Enums are stored as their `strum` names.

use std::str::FromStr;

use atlas_core::{
  audit::{AttemptStatus, LoadAttempt},
  country::CanonicalCountry,
  dataset::DatasetLoadState,
  deposit::{
    AgeValue, CommodityValue, DetailKind, DetailValue, MaterialValue, OwnershipValue,
    PhysiographyValue, RockValue,
  },
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(e.to_string()))
}

// ─── Counters ────────────────────────────────────────────────────────────────

// SQLite integers are signed; counters never get near the limit.
pub fn encode_count(n: u64) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

pub fn decode_count(n: i64) -> u64 { u64::try_from(n).unwrap_or(0) }

// ─── AttemptStatus ───────────────────────────────────────────────────────────

pub fn encode_status(status: AttemptStatus) -> &'static str {
  match status {
    AttemptStatus::Success => "success",
    AttemptStatus::Failed => "failed",
    AttemptStatus::Unchanged => "unchanged",
  }
}

pub fn decode_status(s: &str) -> Result<AttemptStatus> {
  AttemptStatus::from_str(s)
    .map_err(|_| Error::Core(atlas_core::Error::UnknownAttemptStatus(s.to_owned())))
}

// ─── DetailValue ─────────────────────────────────────────────────────────────

/// Rebuild a detail value from its column strings, in table order.
pub fn decode_detail(kind: DetailKind, mut cols: Vec<Option<String>>) -> DetailValue {
  cols.resize(5, None);
  let mut it = cols.into_iter();
  let mut next = move || it.next().flatten();
  match kind {
    DetailKind::Commodity => DetailValue::Commodity(CommodityValue {
      commod:       next(),
      code:         next(),
      commod_tp:    next(),
      commod_group: next(),
      import:       next(),
    }),
    DetailKind::Material => DetailValue::Material(MaterialValue {
      rec:        next(),
      ore_gangue: next(),
      material:   next(),
    }),
    DetailKind::Ownership => DetailValue::Ownership(OwnershipValue {
      owner_name: next(),
      owner_tp:   next(),
    }),
    DetailKind::Physiography => DetailValue::Physiography(PhysiographyValue {
      phys_div:  next(),
      phys_prov: next(),
      phys_sect: next(),
      phys_det:  next(),
    }),
    DetailKind::Age => DetailValue::Age(AgeValue { age_tp: next(), age_young: next() }),
    DetailKind::Rock => DetailValue::Rock(RockValue {
      rock_cls:      next(),
      first_ord_nm:  next(),
      second_ord_nm: next(),
      third_ord_nm:  next(),
      low_name:      next(),
    }),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `dim_country` row.
pub struct RawCountry {
  pub country_id:   i64,
  pub country_name: String,
  pub country_norm: String,
  pub iso3:         Option<String>,
  pub created_at:   String,
}

impl RawCountry {
  pub const COLUMNS: &'static str = "country_id, country_name, country_norm, iso3, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      country_id:   row.get(0)?,
      country_name: row.get(1)?,
      country_norm: row.get(2)?,
      iso3:         row.get(3)?,
      created_at:   row.get(4)?,
    })
  }

  pub fn into_country(self) -> Result<CanonicalCountry> {
    Ok(CanonicalCountry {
      country_id:   self.country_id,
      display_name: self.country_name,
      country_norm: self.country_norm,
      iso3:         self.iso3,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from an `etl_dataset_state` row.
pub struct RawLoadState {
  pub dataset_id:     String,
  pub last_hash:      String,
  pub last_success:   bool,
  pub last_loaded_at: String,
}

impl RawLoadState {
  pub fn into_state(self) -> Result<DatasetLoadState> {
    Ok(DatasetLoadState {
      dataset_id:     self.dataset_id,
      fingerprint:    self.last_hash,
      last_success:   self.last_success,
      last_loaded_at: decode_dt(&self.last_loaded_at)?,
    })
  }
}

/// Raw values read directly from an `etl_load_log` row.
pub struct RawAttempt {
  pub attempt_id:    String,
  pub dataset_id:    String,
  pub file_hash:     Option<String>,
  pub rows_inserted: i64,
  pub rows_updated:  i64,
  pub rows_failed:   i64,
  pub load_status:   String,
  pub error_message: Option<String>,
  pub duration_ms:   i64,
  pub started_at:    String,
  pub recorded_at:   String,
}

impl RawAttempt {
  pub fn into_attempt(self) -> Result<LoadAttempt> {
    Ok(LoadAttempt {
      attempt_id:    decode_uuid(&self.attempt_id)?,
      dataset_id:    self.dataset_id,
      fingerprint:   self.file_hash,
      rows_inserted: decode_count(self.rows_inserted),
      rows_updated:  decode_count(self.rows_updated),
      rows_failed:   decode_count(self.rows_failed),
      status:        decode_status(&self.load_status)?,
      error:         self.error_message,
      duration_ms:   decode_count(self.duration_ms),
      started_at:    decode_dt(&self.started_at)?,
      recorded_at:   decode_dt(&self.recorded_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_names_match_strum() {
    for status in [AttemptStatus::Success, AttemptStatus::Failed, AttemptStatus::Unchanged] {
      assert_eq!(encode_status(status), status.as_ref());
      assert_eq!(decode_status(encode_status(status)).unwrap(), status);
    }
    assert!(decode_status("running").is_err());
  }

  #[test]
  fn detail_decode_tolerates_short_rows() {
    let value = decode_detail(DetailKind::Ownership, vec![Some("Acme Mining".into())]);
    assert_eq!(
      value,
      DetailValue::Ownership(OwnershipValue {
        owner_name: Some("Acme Mining".into()),
        owner_tp:   None,
      })
    );
  }
}
