//! The `IngestStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `atlas-store-sqlite`).
//! The pipeline (`atlas-ingest`) depends on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use crate::{
  audit::LoadAttempt,
  country::{CanonicalCountry, CountryUpsert, IsoReferenceEntry, NewCountry},
  dataset::{DatasetDescriptor, DatasetLoadState},
  deposit::{DepositEntity, DetailKind, DetailRecord, LocationDetail},
  indicator::IndicatorFact,
  load::LoadResult,
};

/// Abstraction over an Atlas storage backend.
///
/// Keyed writes (`upsert_*`) are insert-or-update on the table's declared
/// key and never duplicate a row. A row rejected by an unrelated constraint
/// is reported in the returned [`LoadResult`] and does not stop the rest of
/// the batch; `Err` is reserved for the store itself being unusable.
///
/// All methods return `Send` futures so the trait can be used from spawned
/// tokio tasks.
pub trait IngestStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Dataset registry ──────────────────────────────────────────────────

  /// Insert or refresh dataset descriptors by id. Returns rows written.
  fn seed_datasets(
    &self,
    descriptors: Vec<DatasetDescriptor>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  fn get_dataset<'a>(
    &'a self,
    dataset_id: &'a str,
  ) -> impl Future<Output = Result<Option<DatasetDescriptor>, Self::Error>> + Send + 'a;

  // ── ISO reference ─────────────────────────────────────────────────────

  /// Upsert ISO entries keyed by ISO3.
  fn upsert_iso_entries(
    &self,
    entries: Vec<IsoReferenceEntry>,
  ) -> impl Future<Output = Result<LoadResult, Self::Error>> + Send + '_;

  fn list_iso_entries(
    &self,
  ) -> impl Future<Output = Result<Vec<IsoReferenceEntry>, Self::Error>> + Send + '_;

  // ── Country dimension ─────────────────────────────────────────────────

  /// Atomically fetch the country with `input.country_norm`, creating it if
  /// absent. Concurrent calls for the same key yield one row. An existing
  /// row keeps its key and id; a missing ISO3 may be back-filled.
  fn get_or_create_country(
    &self,
    input: NewCountry,
  ) -> impl Future<Output = Result<CountryUpsert, Self::Error>> + Send + '_;

  fn find_country<'a>(
    &'a self,
    country_norm: &'a str,
  ) -> impl Future<Output = Result<Option<CanonicalCountry>, Self::Error>> + Send + 'a;

  fn list_countries(
    &self,
  ) -> impl Future<Output = Result<Vec<CanonicalCountry>, Self::Error>> + Send + '_;

  // ── Indicator facts ───────────────────────────────────────────────────

  /// Upsert keyed by `(country_id, dataset_id, indicator_code, year)`.
  fn upsert_indicators(
    &self,
    facts: Vec<IndicatorFact>,
  ) -> impl Future<Output = Result<LoadResult, Self::Error>> + Send + '_;

  fn list_indicators<'a>(
    &'a self,
    dataset_id: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<IndicatorFact>, Self::Error>> + Send + 'a;

  // ── Deposits ──────────────────────────────────────────────────────────

  /// Upsert keyed by `dep_id`.
  fn upsert_deposits(
    &self,
    deposits: Vec<DepositEntity>,
  ) -> impl Future<Output = Result<LoadResult, Self::Error>> + Send + '_;

  fn get_deposit(
    &self,
    dep_id: i64,
  ) -> impl Future<Output = Result<Option<DepositEntity>, Self::Error>> + Send + '_;

  /// Delete a deposit together with its location and detail rows. Returns
  /// `false` if it did not exist.
  fn delete_deposit(
    &self,
    dep_id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Upsert keyed by `dep_id`; the deposit must already exist.
  fn upsert_locations(
    &self,
    locations: Vec<LocationDetail>,
  ) -> impl Future<Output = Result<LoadResult, Self::Error>> + Send + '_;

  fn get_location(
    &self,
    dep_id: i64,
  ) -> impl Future<Output = Result<Option<LocationDetail>, Self::Error>> + Send + '_;

  /// Delete every `kind` detail row owned by `deposits`, then insert `rows`
  /// (all of variant `kind`), in one transaction.
  fn replace_details(
    &self,
    kind: DetailKind,
    deposits: Vec<i64>,
    rows: Vec<DetailRecord>,
  ) -> impl Future<Output = Result<LoadResult, Self::Error>> + Send + '_;

  fn list_details(
    &self,
    dep_id: i64,
    kind: DetailKind,
  ) -> impl Future<Output = Result<Vec<DetailRecord>, Self::Error>> + Send + '_;

  // ── Change detection & audit ──────────────────────────────────────────

  fn get_load_state<'a>(
    &'a self,
    dataset_id: &'a str,
  ) -> impl Future<Output = Result<Option<DatasetLoadState>, Self::Error>> + Send + 'a;

  /// Overwrite the state row for `state.dataset_id`.
  fn put_load_state(
    &self,
    state: DatasetLoadState,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Append an audit row. Attempts are never updated.
  fn append_attempt(
    &self,
    attempt: LoadAttempt,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Attempts in recording order, optionally for one dataset.
  fn list_attempts<'a>(
    &'a self,
    dataset_id: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<LoadAttempt>, Self::Error>> + Send + 'a;

  // ── Diagnostics ───────────────────────────────────────────────────────

  /// Row count per table, for the post-run sanity report.
  fn table_counts(
    &self,
  ) -> impl Future<Output = Result<Vec<(String, u64)>, Self::Error>> + Send + '_;
}
