//! Run auditing: one append-only [`LoadAttempt`] per dataset execution.

use std::time::Instant;

use atlas_core::{
  audit::{AttemptStatus, LoadAttempt},
  load::LoadResult,
  store::IngestStore,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Error, Result, change::ChangeDetector};

/// An attempt in progress. Consumed by exactly one of
/// [`RunAuditor::complete`], [`RunAuditor::fail`] or [`RunAuditor::unchanged`].
#[derive(Debug)]
pub struct AttemptHandle {
  pub attempt_id:  Uuid,
  pub dataset_id:  String,
  pub fingerprint: Option<String>,
  pub started_at:  DateTime<Utc>,
  started:         Instant,
}

impl AttemptHandle {
  /// Attach the payload fingerprint once it is known.
  pub fn set_fingerprint(&mut self, fingerprint: impl Into<String>) {
    self.fingerprint = Some(fingerprint.into());
  }

  pub fn elapsed_ms(&self) -> u64 {
    u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
  }
}

pub struct RunAuditor<'a, S> {
  store:  &'a S,
  change: ChangeDetector<'a, S>,
}

impl<'a, S: IngestStore> RunAuditor<'a, S> {
  pub fn new(store: &'a S, change: ChangeDetector<'a, S>) -> Self { Self { store, change } }

  pub fn store(&self) -> &'a S { self.store }

  pub fn change_detector(&self) -> &ChangeDetector<'a, S> { &self.change }

  pub fn begin(&self, dataset_id: &str) -> AttemptHandle {
    AttemptHandle {
      attempt_id:  Uuid::new_v4(),
      dataset_id:  dataset_id.to_owned(),
      fingerprint: None,
      started_at:  Utc::now(),
      started:     Instant::now(),
    }
  }

  /// Record a finished load. Row failures do not make the attempt fail.
  pub async fn complete(&self, handle: AttemptHandle, result: &LoadResult) -> Result<LoadAttempt> {
    let duration_ms = handle.elapsed_ms();
    self
      .finish(handle, AttemptStatus::Success, result, None, duration_ms)
      .await
  }

  /// Record a dataset-level failure.
  pub async fn fail(&self, handle: AttemptHandle, error: &Error) -> Result<LoadAttempt> {
    let duration_ms = handle.elapsed_ms();
    self
      .finish(
        handle,
        AttemptStatus::Failed,
        &LoadResult::default(),
        Some(error.to_string()),
        duration_ms,
      )
      .await
  }

  /// Record a skip because the payload matched the last successful load.
  pub async fn unchanged(&self, handle: AttemptHandle) -> Result<LoadAttempt> {
    let duration_ms = handle.elapsed_ms();
    self
      .finish(handle, AttemptStatus::Unchanged, &LoadResult::default(), None, duration_ms)
      .await
  }

  async fn finish(
    &self,
    handle: AttemptHandle,
    status: AttemptStatus,
    result: &LoadResult,
    error: Option<String>,
    duration_ms: u64,
  ) -> Result<LoadAttempt> {
    let attempt = LoadAttempt {
      attempt_id: handle.attempt_id,
      dataset_id: handle.dataset_id,
      fingerprint: handle.fingerprint,
      rows_inserted: result.inserted,
      rows_updated: result.updated,
      rows_failed: result.failed,
      status,
      error,
      duration_ms,
      started_at: handle.started_at,
      recorded_at: Utc::now(),
    };

    self
      .store
      .append_attempt(attempt.clone())
      .await
      .map_err(Error::store)?;

    // Without a fingerprint there is nothing to compare against next run.
    if let Some(fingerprint) = &attempt.fingerprint {
      self
        .change
        .record_state(
          &attempt.dataset_id,
          fingerprint,
          status != AttemptStatus::Failed,
        )
        .await?;
    }

    tracing::info!(
      dataset = %attempt.dataset_id,
      status = %attempt.status,
      inserted = attempt.rows_inserted,
      updated = attempt.rows_updated,
      failed = attempt.rows_failed,
      duration_ms = attempt.duration_ms,
      "load attempt recorded"
    );
    Ok(attempt)
  }
}
