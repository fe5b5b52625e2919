//! Column mapper / transformer - rename raw columns to canonical fields,
//! coerce values, and stamp rows with their owning dataset.

use crate::error::{EtlError, Result};
use crate::schema::{FieldType, FormatKind, Schema};
use crate::types::{Batch, Table, Value};
use chrono::NaiveDateTime;
use std::collections::HashSet;
use tracing::debug;

const TIMESTAMP_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Transform a raw batch into a canonical, schema-conformant table.
///
/// Deterministic: the same batch, schema and dataset id always produce the
/// same table. Raw columns with no mapping are dropped; canonical fields
/// the source never populates are left out of the projection. A timestamp
/// that cannot be parsed fails the whole batch. Rows repeating an earlier
/// row's unique key are collapsed to the first occurrence, so one file can
/// never conflict with itself at load time.
pub fn transform(batch: Batch, schema: &Schema, dataset_id: i32) -> Result<Table> {
    match schema.format {
        FormatKind::Delimited => transform_delimited(batch, schema, dataset_id),
        FormatKind::FieldPerFile => transform_field_per_file(batch, schema, dataset_id),
    }
}

fn transform_delimited(batch: Batch, schema: &Schema, dataset_id: i32) -> Result<Table> {
    let mut rows = batch.rows;

    if schema.drop_exact_duplicates {
        let before = rows.len();
        let mut seen = HashSet::new();
        rows.retain(|row| seen.insert(row.clone()));
        if rows.len() < before {
            debug!(
                "Dropped {} exact-duplicate rows for {}",
                before - rows.len(),
                schema.table
            );
        }
    }

    // Projection plan: canonical fields in schema order, restricted to the
    // raw columns this source actually carries.
    let plan: Vec<(usize, &crate::schema::Field)> = schema
        .fields
        .iter()
        .filter_map(|f| {
            batch
                .columns
                .iter()
                .position(|c| c.as_str() == f.raw)
                .map(|idx| (idx, f))
        })
        .collect();

    let columns: Vec<&'static str> = plan.iter().map(|(_, f)| f.name).collect();

    let mut out = Vec::with_capacity(rows.len());
    for (row_idx, row) in rows.iter().enumerate() {
        let mut cells = Vec::with_capacity(plan.len());
        for (idx, field) in &plan {
            cells.push(coerce(row[*idx].as_deref(), field.ty, field.name, row_idx)?);
        }
        out.push(cells);
    }

    dedup_on_unique_key(&mut out, &columns, schema);

    Ok(Table {
        table: schema.table,
        columns,
        rows: out,
        dataset_id,
    })
}

/// Pivot a single-field weather batch into (timestamp, field, value) rows,
/// with the field renamed to its canonical name.
fn transform_field_per_file(batch: Batch, schema: &Schema, dataset_id: i32) -> Result<Table> {
    let ts_idx = batch
        .column_index("timestamp")
        .ok_or_else(|| EtlError::Validation {
            table: schema.table,
            missing: vec!["timestamp".to_string()],
        })?;
    let (value_idx, field) = batch
        .columns
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != ts_idx)
        .find_map(|(idx, c)| schema.field_by_raw(c).map(|f| (idx, f)))
        .ok_or_else(|| EtlError::Validation {
            table: schema.table,
            missing: vec!["value column".to_string()],
        })?;

    let mut out = Vec::with_capacity(batch.rows.len());
    for (row_idx, row) in batch.rows.iter().enumerate() {
        let ts = coerce(
            row[ts_idx].as_deref(),
            FieldType::Timestamp,
            "timestamp",
            row_idx,
        )?;
        let value = coerce(row[value_idx].as_deref(), FieldType::Real, field.name, row_idx)?;
        out.push(vec![ts, Value::Text(field.name.to_string()), value]);
    }

    let columns = vec!["timestamp", "field", "value"];
    dedup_on_unique_key(&mut out, &columns, schema);

    Ok(Table {
        table: schema.table,
        columns,
        rows: out,
        dataset_id,
    })
}

/// Keep only the first row for each unique-key tuple. The load runs one
/// transaction per file, so a repeated key inside a file would otherwise
/// trip the uniqueness constraint and take the whole batch down with it.
fn dedup_on_unique_key(rows: &mut Vec<Vec<Value>>, columns: &[&'static str], schema: &Schema) {
    // dataset_id is constant per table, so key columns absent from the
    // projection (like dataset_id itself) do not discriminate here.
    let key: Vec<usize> = schema
        .unique_over
        .iter()
        .filter_map(|u| columns.iter().position(|c| c == u))
        .collect();
    if key.is_empty() {
        return;
    }

    let before = rows.len();
    let mut seen = HashSet::new();
    // Value is not hashable (Real carries an f64); its debug rendering is.
    rows.retain(|row| {
        seen.insert(
            key.iter()
                .map(|&idx| format!("{:?}", row[idx]))
                .collect::<Vec<_>>(),
        )
    });
    if rows.len() < before {
        debug!(
            "Dropped {} rows repeating ({}) within one batch for {}",
            before - rows.len(),
            schema.unique_over.join(", "),
            schema.table
        );
    }
}

/// Coerce one raw cell to its canonical type. Missing cells become NULL;
/// a present value that does not parse fails the batch.
fn coerce(cell: Option<&str>, ty: FieldType, column: &str, row: usize) -> Result<Value> {
    let raw = match cell {
        None => return Ok(Value::Null),
        Some(s) => s.trim(),
    };
    if raw.is_empty() {
        return Ok(Value::Null);
    }

    match ty {
        FieldType::Text => Ok(Value::Text(raw.to_string())),
        FieldType::Integer => raw.parse::<i64>().map(Value::Integer).map_err(|_| {
            parse_error(column, raw, "integer", row)
        }),
        FieldType::Real => raw.parse::<f64>().map(Value::Real).map_err(|_| {
            parse_error(column, raw, "real", row)
        }),
        FieldType::Timestamp => parse_timestamp(raw)
            .map(Value::Timestamp)
            .ok_or_else(|| parse_error(column, raw, "timestamp", row)),
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

fn parse_error(column: &str, value: &str, expected: &'static str, row: usize) -> EtlError {
    EtlError::Parse {
        column: column.to_string(),
        value: value.to_string(),
        expected,
        row,
    }
}
