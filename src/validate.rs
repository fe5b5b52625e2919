//! Schema validator - check a batch carries the columns its schema requires

use crate::error::{EtlError, Result};
use crate::schema::{FormatKind, Schema};
use crate::types::Batch;
use tracing::debug;

/// Check that `batch` provides every raw column `schema` requires.
///
/// Delimited schemas are complete: every declared raw column must be
/// present. Field-per-file schemas deliberately carry only a subset per
/// file, so the check is looser: the timestamp column plus exactly one
/// value column must be present. The batch is never mutated.
pub fn validate(batch: &Batch, schema: &Schema) -> Result<()> {
    let raw = schema.raw_columns();
    let missing: Vec<String> = raw
        .iter()
        .filter(|c| batch.column_index(c).is_none())
        .map(|c| c.to_string())
        .collect();

    match schema.format {
        FormatKind::Delimited => {
            if !missing.is_empty() {
                return Err(EtlError::Validation {
                    table: schema.table,
                    missing,
                });
            }
            // The filename-derived column is attached by the reader and
            // required like any other.
            if let Some(name) = schema.filename_report_field {
                if let Some(field) = schema.fields.iter().find(|f| f.name == name) {
                    if batch.column_index(field.raw).is_none() {
                        return Err(EtlError::Validation {
                            table: schema.table,
                            missing: vec![field.raw.to_string()],
                        });
                    }
                }
            }
        }
        FormatKind::FieldPerFile => {
            if batch.column_index("timestamp").is_none() {
                return Err(EtlError::Validation {
                    table: schema.table,
                    missing: vec!["timestamp".to_string()],
                });
            }
            let value_columns = raw
                .iter()
                .filter(|&&c| c != "timestamp")
                .filter(|&&c| batch.column_index(c).is_some())
                .count();
            // At most N-2 columns may be absent: timestamp plus exactly
            // one value column present.
            if value_columns != 1 {
                return Err(EtlError::Validation {
                    table: schema.table,
                    missing,
                });
            }
        }
    }

    debug!("Batch valid for table {}", schema.table);
    Ok(())
}
