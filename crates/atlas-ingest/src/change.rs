//! Whole-payload change detection.
//!
//! Fingerprints are SHA-256 over the raw bytes. Bundles hash each file's
//! name and contents in name order, so renaming or adding a table changes the
//! fingerprint just like editing one.

use atlas_core::{dataset::DatasetLoadState, store::IngestStore};
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::{Error, Result, source::RawSource};

/// Hex SHA-256 of a single payload.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
  hex::encode(Sha256::digest(bytes))
}

/// Fingerprint of a whole source. A single file hashes to the digest of its
/// bytes alone.
pub fn fingerprint(source: &RawSource) -> String {
  match source.files() {
    [only] => fingerprint_bytes(&only.bytes),
    files => {
      let mut hasher = Sha256::new();
      for file in files {
        hasher.update(file.name.as_bytes());
        hasher.update((file.bytes.len() as u64).to_le_bytes());
        hasher.update(&file.bytes);
      }
      hex::encode(hasher.finalize())
    }
  }
}

/// Compares fingerprints against the store's per-dataset load state.
pub struct ChangeDetector<'a, S> {
  store: &'a S,
  force: bool,
}

impl<'a, S: IngestStore> ChangeDetector<'a, S> {
  pub fn new(store: &'a S, force: bool) -> Self { Self { store, force } }

  /// `true` unless the last recorded load of `dataset_id` succeeded with
  /// exactly this fingerprint (or `force` is set).
  pub async fn should_load(&self, dataset_id: &str, fingerprint: &str) -> Result<bool> {
    if self.force {
      return Ok(true);
    }
    let state = self
      .store
      .get_load_state(dataset_id)
      .await
      .map_err(Error::store)?;
    Ok(match state {
      None => true,
      Some(state) => state.fingerprint != fingerprint || !state.last_success,
    })
  }

  /// Overwrite the dataset's state row.
  pub async fn record_state(
    &self,
    dataset_id: &str,
    fingerprint: &str,
    success: bool,
  ) -> Result<()> {
    self
      .store
      .put_load_state(DatasetLoadState {
        dataset_id:     dataset_id.to_owned(),
        fingerprint:    fingerprint.to_owned(),
        last_success:   success,
        last_loaded_at: Utc::now(),
      })
      .await
      .map_err(Error::store)
  }
}
