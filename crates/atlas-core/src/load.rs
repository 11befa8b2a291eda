//! Batches handed to the store and the per-batch outcome.

use serde::{Deserialize, Serialize};
use strum::Display;

use std::collections::BTreeSet;

use crate::{
  country::IsoReferenceEntry,
  deposit::{DepositEntity, DetailKind, DetailRecord, LocationDetail},
  indicator::IndicatorFact,
};

// ─── Batches ─────────────────────────────────────────────────────────────────

/// Which table family a batch targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TableKind {
  IsoReference,
  Indicator,
  Deposit,
  Location,
  Detail,
}

/// A homogeneous set of rows to upsert.
#[derive(Debug, Clone)]
pub enum LoadBatch {
  IsoReference(Vec<IsoReferenceEntry>),
  Indicators(Vec<IndicatorFact>),
  Deposits(Vec<DepositEntity>),
  Locations(Vec<LocationDetail>),
  Details(DetailBatch),
}

/// One reload of the detail tables for a set of deposits.
///
/// For every kind in `kinds`, each deposit in `deposits` loses its stored
/// rows of that kind and gets exactly the matching rows of `rows`, so a
/// detail table that is present but empty clears those deposits.
#[derive(Debug, Clone, Default)]
pub struct DetailBatch {
  pub deposits: Vec<i64>,
  pub kinds:    Vec<DetailKind>,
  pub rows:     Vec<DetailRecord>,
}

impl DetailBatch {
  /// A batch scoped to the deposits and kinds its rows name.
  pub fn from_rows(rows: Vec<DetailRecord>) -> Self {
    let deposits = rows.iter().map(|r| r.dep_id).collect::<BTreeSet<_>>();
    let kinds = rows.iter().map(DetailRecord::kind).collect::<BTreeSet<_>>();
    Self {
      deposits: deposits.into_iter().collect(),
      kinds:    kinds.into_iter().collect(),
      rows,
    }
  }
}

impl LoadBatch {
  pub fn table_kind(&self) -> TableKind {
    match self {
      Self::IsoReference(_) => TableKind::IsoReference,
      Self::Indicators(_) => TableKind::Indicator,
      Self::Deposits(_) => TableKind::Deposit,
      Self::Locations(_) => TableKind::Location,
      Self::Details(_) => TableKind::Detail,
    }
  }

  pub fn len(&self) -> usize {
    match self {
      Self::IsoReference(rows) => rows.len(),
      Self::Indicators(rows) => rows.len(),
      Self::Deposits(rows) => rows.len(),
      Self::Locations(rows) => rows.len(),
      Self::Details(batch) => batch.rows.len(),
    }
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
  /// The row failed type or range rules before reaching the store.
  Validation,
  /// The store rejected the row with a constraint unrelated to the load key.
  StorageConflict,
}

/// One rejected row. `row` indexes into the batch the caller submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
  pub row:     usize,
  pub kind:    FailureKind,
  pub message: String,
}

/// Counts and itemised failures for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadResult {
  pub inserted: u64,
  pub updated:  u64,
  pub failed:   u64,
  pub failures: Vec<RowFailure>,
}

impl LoadResult {
  pub fn fail(&mut self, row: usize, kind: FailureKind, message: impl Into<String>) {
    self.failed += 1;
    self.failures.push(RowFailure { row, kind, message: message.into() });
  }

  /// Fold another result into this one, shifting its row indices through
  /// `index_map` (position in `other`'s batch → position in ours).
  pub fn absorb(&mut self, other: LoadResult, index_map: &[usize]) {
    self.inserted += other.inserted;
    self.updated += other.updated;
    self.failed += other.failed;
    self.failures.extend(other.failures.into_iter().map(|mut f| {
      f.row = index_map.get(f.row).copied().unwrap_or(f.row);
      f
    }));
  }

  /// Rows that reached the store successfully.
  pub fn written(&self) -> u64 { self.inserted + self.updated }
}
