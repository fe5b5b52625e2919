//! Core data types for the pipeline
//! Pure data structures with no behavior

use chrono::NaiveDateTime;
use serde::Deserialize;

/// One entry of the dataset descriptor JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetDescriptor {
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub location: String,
}

/// One entry of the metadata descriptor JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataDescriptor {
    pub name: String,
    pub url: String,
}

/// A registered dataset, resolved by the registry before any file of it
/// is processed.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Dataset {
    pub id: i32,
    pub name: String,
    pub url: String,
    pub data_type_id: i32,
    pub location_id: i32,
}

/// Raw parse result of one file: named columns over rows of raw cells.
/// `None` cells are explicit missing values, never formatted zeroes.
#[derive(Debug, Clone)]
pub struct Batch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Batch {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.as_str() == name)
    }
}

/// A typed cell of a transformed table.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Timestamp(NaiveDateTime),
}

/// Schema-conformant row set ready for bulk insertion. Every row belongs
/// to the dataset identified by `dataset_id`.
#[derive(Debug, Clone)]
pub struct Table {
    pub table: &'static str,
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<Value>>,
    pub dataset_id: i32,
}

/// Why a batch was rejected by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    UniqueViolation,
}

/// Outcome of one bulk-insert attempt. The insert is batch-atomic: either
/// every row commits or none does.
#[derive(Debug, Clone, Default)]
pub struct LoadResult {
    pub attempted: usize,
    pub committed: usize,
    pub rejected_reason: Option<RejectReason>,
}

impl std::fmt::Display for LoadResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.rejected_reason {
            None => write!(f, "attempted: {}, committed: {}", self.attempted, self.committed),
            Some(RejectReason::UniqueViolation) => write!(
                f,
                "attempted: {}, committed: {} (batch rejected: uniqueness constraint)",
                self.attempted, self.committed
            ),
        }
    }
}
