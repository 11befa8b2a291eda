//! The Atlas ingestion pipeline.
//!
//! Turns raw dataset files into country-resolved rows and loads them through
//! any [`IngestStore`]. The pieces run in this order for every dataset:
//!
//! 1. [`change::ChangeDetector`] fingerprints the raw payload and decides
//!    whether it needs loading at all.
//! 2. [`extract`] flattens source records and routes each country label
//!    through the [`resolver::CountryResolver`].
//! 3. [`loader::UpsertLoader`] validates rows and upserts them.
//! 4. [`audit::RunAuditor`] appends one attempt record and advances the
//!    dataset's load state.
//!
//! [`pipeline::run`] drives all of it across the configured datasets.
//!
//! [`IngestStore`]: atlas_core::store::IngestStore

pub mod audit;
pub mod change;
pub mod config;
pub mod error;
pub mod extract;
pub mod loader;
pub mod pipeline;
pub mod resolver;
pub mod source;

pub use error::{Error, Result};

#[cfg(test)]
mod tests;
