//! Raw reader - parse downloaded files into uniform in-memory batches

use crate::error::{EtlError, Result};
use crate::schema::{FormatKind, Schema};
use crate::types::Batch;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Parse one raw file into a [`Batch`] conforming to `schema`'s raw shape.
///
/// The on-disk format is implied by the file extension: `.csv` for
/// delimited tables (with or without a header line), `.txt` for the
/// line-oriented weather encoding. Anything else is a format error and
/// aborts the file.
pub fn read(path: &Path, schema: &Schema) -> Result<Batch> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let batch = match (ext.as_str(), schema.format) {
        ("csv", FormatKind::Delimited) => read_delimited(path, schema)?,
        ("txt", FormatKind::FieldPerFile) => read_field_per_file(path, schema)?,
        _ => {
            return Err(EtlError::Format {
                path: path.to_path_buf(),
                reason: format!("extension {:?} not supported for {}", ext, schema.table),
            })
        }
    };

    info!(
        "Read {} rows x {} columns from {:?}",
        batch.rows.len(),
        batch.columns.len(),
        path.file_name().unwrap_or_default()
    );

    Ok(batch)
}

/// A bare identifier: starts with a letter or underscore, continues with
/// letters, digits or underscores. Quoted and numeric tokens never qualify.
fn is_identifier(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The first line is a header iff every comma-separated token on it is a
/// bare identifier. Known weakness: a real header containing spaces or
/// punctuation is classified as data.
fn is_header_line(line: &str) -> bool {
    line.split(',').all(is_identifier)
}

fn read_delimited(path: &Path, schema: &Schema) -> Result<Batch> {
    let content = fs::read_to_string(path)?;

    let first_line = content.lines().next().ok_or_else(|| EtlError::Format {
        path: path.to_path_buf(),
        reason: "file is empty".to_string(),
    })?;
    let has_header = is_header_line(first_line);
    debug!("Header detected: {} ({:?})", has_header, path.file_name());

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_header)
        .from_reader(content.as_bytes());

    let columns: Vec<String> = if has_header {
        reader.headers()?.iter().map(|h| h.to_string()).collect()
    } else {
        // No header: assign the schema's raw names, in declared order.
        schema.raw_columns().iter().map(|c| c.to_string()).collect()
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() != columns.len() {
            return Err(EtlError::Format {
                path: path.to_path_buf(),
                reason: format!(
                    "expected {} columns, found {}",
                    columns.len(),
                    record.len()
                ),
            });
        }
        let cells = record
            .iter()
            .map(|cell| {
                let cell = cell.trim();
                if cell.is_empty() {
                    None
                } else {
                    Some(cell.to_string())
                }
            })
            .collect();
        rows.push(cells);
    }

    let mut batch = Batch { columns, rows };

    // Sources without an embedded sensor id carry it in the file name.
    if let Some(name) = schema.filename_report_field {
        let report_id = report_id_from_filename(path)?;
        let raw = schema
            .fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.raw)
            .unwrap_or(name);
        batch.columns.push(raw.to_string());
        for row in &mut batch.rows {
            row.push(Some(report_id.clone()));
        }
        debug!("Attached {}={} from file name to {} rows", raw, report_id, batch.rows.len());
    }

    Ok(batch)
}

/// Extract the numeric sensor id embedded in a file name such as
/// `pollutionData158324.csv`.
fn report_id_from_filename(path: &Path) -> Result<String> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let digits: String = stem.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(EtlError::Format {
            path: path.to_path_buf(),
            reason: "no sensor id found in file name".to_string(),
        });
    }
    Ok(digits)
}

/// Weather files hold one value column each: every line is a JSON object
/// mapping timestamp strings to a scalar for the field named by the file's
/// base name. Fan the object out into (timestamp, value) rows; an empty
/// string becomes an explicit missing value.
fn read_field_per_file(path: &Path, schema: &Schema) -> Result<Batch> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let field = schema.field_by_raw(stem).ok_or_else(|| EtlError::Format {
        path: path.to_path_buf(),
        reason: format!("{:?} is not a known field of {}", stem, schema.table),
    })?;

    let content = fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let record: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(line)?;
        for (ts, value) in record {
            let cell = match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) if s.trim().is_empty() => None,
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Number(n) => Some(n.to_string()),
                other => Some(other.to_string()),
            };
            rows.push(vec![Some(ts), cell]);
        }
    }

    Ok(Batch {
        columns: vec!["timestamp".to_string(), field.raw.to_string()],
        rows,
    })
}
