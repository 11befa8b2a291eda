//! Core types and trait definitions for the Atlas ingestion pipeline.
//!
//! Holds the domain model, the country normalizer with its ISO whitelist,
//! and the [`store::IngestStore`] abstraction every backend implements. No
//! database or file-format dependencies live here.

pub mod audit;
pub mod country;
pub mod dataset;
pub mod deposit;
pub mod error;
pub mod indicator;
pub mod load;
pub mod normalize;
pub mod store;
pub mod whitelist;

pub use error::{Error, Result};
