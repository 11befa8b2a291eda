//! Country dimension resolution.
//!
//! Raw label → [`NormalizedKey`] → whitelist entry → [`CanonicalCountry`].
//! Rows whose label is an aggregate or is not a known country are rejected
//! here and never reach the loader.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
};

use atlas_core::{
  country::{CanonicalCountry, IsoReferenceEntry, NewCountry},
  normalize::{NormalizedKey, Normalizer},
  store::IngestStore,
  whitelist::Whitelist,
};

use crate::{Error, Result};

/// Why a label did not resolve to a country.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
  /// The label names a region, income group, or other aggregate.
  NonCountryAggregate { label: String },
  /// The label normalized to a key the whitelist does not admit.
  UnknownCountry { label: String, key: NormalizedKey },
}

impl std::fmt::Display for Rejection {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::NonCountryAggregate { label } => write!(f, "{label:?} is an aggregate"),
      Self::UnknownCountry { label, key } => {
        write!(f, "{label:?} (key {key}) is not a known country")
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
  Country(CanonicalCountry),
  Rejected(Rejection),
}

/// Resolves labels to canonical countries, creating dimension rows on first
/// sight. Shared by every dataset task in a run.
pub struct CountryResolver<S> {
  store:      S,
  normalizer: Arc<Normalizer>,
  whitelist:  Arc<Whitelist>,
  /// Entry key → resolved row. Purely an optimisation.
  cache:      Mutex<HashMap<String, CanonicalCountry>>,
}

impl<S: IngestStore> CountryResolver<S> {
  pub fn new(store: S, normalizer: Arc<Normalizer>, whitelist: Arc<Whitelist>) -> Self {
    if whitelist.is_empty() {
      tracing::warn!("ISO whitelist is empty; every country label will be rejected");
    }
    Self { store, normalizer, whitelist, cache: Mutex::new(HashMap::new()) }
  }

  pub fn normalizer(&self) -> &Normalizer { &self.normalizer }

  pub fn whitelist(&self) -> &Whitelist { &self.whitelist }

  pub async fn resolve(&self, label: &str) -> Result<Resolved> {
    self.resolve_with_hint(label, None).await
  }

  /// Resolve `label`, falling back to `iso3_hint` only when the label itself
  /// is unknown. A hint never rescues an aggregate.
  pub async fn resolve_with_hint(
    &self,
    label: &str,
    iso3_hint: Option<&str>,
  ) -> Result<Resolved> {
    let key = self.normalizer.normalize(label);
    if key.is_non_country() {
      return Ok(Resolved::Rejected(Rejection::NonCountryAggregate {
        label: label.to_owned(),
      }));
    }

    let entry = self
      .whitelist
      .lookup(&key)
      .or_else(|| iso3_hint.and_then(|code| self.whitelist.lookup_iso3(code)));
    let Some(entry) = entry else {
      return Ok(Resolved::Rejected(Rejection::UnknownCountry {
        label: label.to_owned(),
        key,
      }));
    };

    Ok(Resolved::Country(self.get_or_create(entry).await?))
  }

  async fn get_or_create(&self, entry: &IsoReferenceEntry) -> Result<CanonicalCountry> {
    if let Some(hit) = self.cached(&entry.country_norm) {
      return Ok(hit);
    }

    let upsert = self
      .store
      .get_or_create_country(NewCountry {
        display_name: entry.display_name.clone(),
        country_norm: entry.country_norm.clone(),
        iso3:         Some(entry.iso3.clone()),
      })
      .await
      .map_err(Error::store)?;
    if upsert.created {
      tracing::debug!(
        country = %upsert.country.display_name,
        id = upsert.country.country_id,
        "created country"
      );
    }

    if let Ok(mut cache) = self.cache.lock() {
      cache.insert(entry.country_norm.clone(), upsert.country.clone());
    }
    Ok(upsert.country)
  }

  fn cached(&self, key: &str) -> Option<CanonicalCountry> {
    self.cache.lock().ok().and_then(|c| c.get(key).cloned())
  }
}
