//! Validation and conflict-aware upserts.
//!
//! The loader checks every row before the store sees it, submits only the
//! valid ones, and reports failures against the caller's original row
//! positions.

use std::collections::{BTreeMap, BTreeSet};

use atlas_core::{
  country::IsoReferenceEntry,
  deposit::{DepositEntity, DetailKind, DetailRecord, GeoPoint, LocationDetail},
  indicator::IndicatorFact,
  load::{DetailBatch, FailureKind, LoadBatch, LoadResult},
  normalize::normalize_iso3,
  store::IngestStore,
};

use crate::{Error, Result};

/// Accepted observation years.
pub const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1900..=2100;

// ─── Validation ──────────────────────────────────────────────────────────────

pub fn validate_iso(entry: &IsoReferenceEntry) -> Result<(), String> {
  if normalize_iso3(&entry.iso3).as_deref() != Some(entry.iso3.as_str()) {
    return Err(format!("invalid ISO3 code {:?}", entry.iso3));
  }
  if entry.country_norm.is_empty() {
    return Err(format!("{}: empty normalized name", entry.iso3));
  }
  Ok(())
}

pub fn validate_indicator(fact: &IndicatorFact) -> Result<(), String> {
  if fact.country_id <= 0 {
    return Err(format!("invalid country id {}", fact.country_id));
  }
  if fact.dataset_id.trim().is_empty() || fact.indicator_code.trim().is_empty() {
    return Err("dataset id and indicator code are required".into());
  }
  if !YEAR_RANGE.contains(&fact.year) {
    return Err(format!("year {} out of range", fact.year));
  }
  if !fact.value.is_finite() {
    return Err(format!("non-finite value for {}", fact.year));
  }
  Ok(())
}

pub fn validate_deposit(deposit: &DepositEntity) -> Result<(), String> {
  if deposit.dep_id <= 0 {
    return Err(format!("invalid dep_id {}", deposit.dep_id));
  }
  let lat_ok = deposit.latitude.is_none_or(|lat| {
    GeoPoint { latitude: lat, longitude: 0.0 }.is_valid()
  });
  let lon_ok = deposit.longitude.is_none_or(|lon| {
    GeoPoint { latitude: 0.0, longitude: lon }.is_valid()
  });
  if !lat_ok || !lon_ok {
    return Err(format!(
      "deposit {}: coordinates out of range ({:?}, {:?})",
      deposit.dep_id, deposit.latitude, deposit.longitude
    ));
  }
  Ok(())
}

pub fn validate_location(location: &LocationDetail) -> Result<(), String> {
  if location.dep_id <= 0 || location.country_id <= 0 {
    return Err(format!(
      "invalid ids (dep_id {}, country_id {})",
      location.dep_id, location.country_id
    ));
  }
  Ok(())
}

pub fn validate_detail(record: &DetailRecord) -> Result<(), String> {
  if record.dep_id <= 0 {
    return Err(format!("invalid dep_id {}", record.dep_id));
  }
  if record.value.is_blank() {
    return Err(format!("deposit {}: blank {} row", record.dep_id, record.kind()));
  }
  Ok(())
}

/// Split `rows` into the valid ones (with their original positions) and a
/// result already holding the validation failures.
fn partition<T>(
  rows: Vec<T>,
  check: impl Fn(&T) -> Result<(), String>,
) -> (Vec<T>, Vec<usize>, LoadResult) {
  let mut valid = Vec::with_capacity(rows.len());
  let mut positions = Vec::with_capacity(rows.len());
  let mut result = LoadResult::default();
  for (i, row) in rows.into_iter().enumerate() {
    match check(&row) {
      Ok(()) => {
        valid.push(row);
        positions.push(i);
      }
      Err(message) => result.fail(i, FailureKind::Validation, message),
    }
  }
  (valid, positions, result)
}

// ─── Loader ──────────────────────────────────────────────────────────────────

pub struct UpsertLoader<'a, S> {
  store: &'a S,
}

impl<'a, S: IngestStore> UpsertLoader<'a, S> {
  pub fn new(store: &'a S) -> Self { Self { store } }

  /// Validate and upsert one batch. `Err` only when the store fails as a
  /// whole; row problems are itemised in the result.
  pub async fn upsert(&self, batch: LoadBatch) -> Result<LoadResult> {
    let kind = batch.table_kind();
    let submitted = batch.len();

    let result = match batch {
      LoadBatch::IsoReference(rows) => {
        let (valid, positions, mut result) = partition(rows, validate_iso);
        let stored = self.store.upsert_iso_entries(valid).await.map_err(Error::store)?;
        result.absorb(stored, &positions);
        result
      }
      LoadBatch::Indicators(rows) => {
        let (valid, positions, mut result) = partition(rows, validate_indicator);
        let stored = self.store.upsert_indicators(valid).await.map_err(Error::store)?;
        result.absorb(stored, &positions);
        result
      }
      LoadBatch::Deposits(rows) => {
        let (valid, positions, mut result) = partition(rows, validate_deposit);
        let stored = self.store.upsert_deposits(valid).await.map_err(Error::store)?;
        result.absorb(stored, &positions);
        result
      }
      LoadBatch::Locations(rows) => {
        let (valid, positions, mut result) = partition(rows, validate_location);
        let stored = self.store.upsert_locations(valid).await.map_err(Error::store)?;
        result.absorb(stored, &positions);
        result
      }
      LoadBatch::Details(batch) => self.replace_details(batch).await?,
    };

    tracing::debug!(
      table = %kind,
      submitted,
      inserted = result.inserted,
      updated = result.updated,
      failed = result.failed,
      "batch loaded"
    );
    Ok(result)
  }

  /// Replace detail rows per kind. Every kind the batch lists is replaced
  /// for every deposit it lists, even when no rows of that kind remain.
  async fn replace_details(&self, batch: DetailBatch) -> Result<LoadResult> {
    let DetailBatch { deposits, kinds, rows } = batch;
    let (valid, positions, mut result) = partition(rows, validate_detail);

    let scope: Vec<i64> = deposits
      .into_iter()
      .chain(valid.iter().map(|r| r.dep_id))
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect();

    let mut groups: BTreeMap<DetailKind, (Vec<DetailRecord>, Vec<usize>)> =
      kinds.into_iter().map(|kind| (kind, Default::default())).collect();
    for (row, position) in valid.into_iter().zip(positions) {
      let group = groups.entry(row.kind()).or_default();
      group.0.push(row);
      group.1.push(position);
    }

    for (kind, (rows, positions)) in groups {
      let stored = self
        .store
        .replace_details(kind, scope.clone(), rows)
        .await
        .map_err(Error::store)?;
      result.absorb(stored, &positions);
    }
    result.failures.sort_by_key(|f| f.row);
    Ok(result)
  }
}
