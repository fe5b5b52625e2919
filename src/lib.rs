//! Extract-transform-load pipeline for the CityPulse smart-city datasets.
//!
//! The core flow, once per file of a dataset: [`reader`] parses the raw
//! file into a [`types::Batch`], [`validate`] checks it against its
//! schema, [`transform`] maps it onto the canonical column set, and
//! [`load`] bulk-inserts it. Uniqueness constraints declared in [`schema`]
//! make reruns idempotent.

pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod load;
pub mod metadata;
pub mod pipeline;
pub mod reader;
pub mod registry;
pub mod schema;
pub mod transform;
pub mod types;
pub mod validate;

pub use error::{EtlError, Result};
pub use types::*;
