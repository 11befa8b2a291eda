//! Country-level indicator observations.

use serde::{Deserialize, Serialize};

/// One `(country, dataset, indicator_code, year)` observation. The 4-tuple is
/// unique in the store and is the upsert key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorFact {
  pub country_id:     i64,
  pub dataset_id:     String,
  pub indicator_code: String,
  pub year:           i32,
  pub value:          f64,
}

impl IndicatorFact {
  /// The composite load key.
  pub fn key(&self) -> (i64, &str, &str, i32) {
    (self.country_id, &self.dataset_id, &self.indicator_code, self.year)
  }
}
