//! Pipeline orchestration - one dataset at a time, one file at a time
//!
//! Control flow per dataset: registry resolves the dataset row, fetch
//! produces local file paths, then each file runs read -> validate ->
//! transform -> load in its own transaction. Format, validation and parse
//! errors abort only the file that raised them; database errors abort the
//! dataset run.

use crate::config::Config;
use crate::error::EtlError;
use crate::load;
use crate::reader;
use crate::registry;
use crate::schema::{self, Schema, SchemaKind};
use crate::transform;
use crate::types::{DatasetDescriptor, LoadResult, RejectReason};
use crate::validate;
use crate::{fetch, Result};
use anyhow::Context;
use sqlx::PgPool;
use std::path::Path;
use tracing::{error, info, warn};

/// Outcome of one dataset's ingestion run.
#[derive(Debug, Default, Clone)]
pub struct DatasetReport {
    pub dataset: String,
    pub files_processed: usize,
    pub files_failed: usize,
    pub rows_attempted: usize,
    pub rows_committed: usize,
    pub batches_rejected: usize,
}

impl std::fmt::Display for DatasetReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "files: {} ({} failed), rows attempted: {}, committed: {}, batches rejected: {}",
            self.files_processed,
            self.files_failed,
            self.rows_attempted,
            self.rows_committed,
            self.batches_rejected
        )
    }
}

/// Run read -> validate -> transform -> load for a single local file.
pub async fn process_file(
    pool: &PgPool,
    schema: &Schema,
    dataset_id: i32,
    path: &Path,
) -> Result<LoadResult> {
    let batch = reader::read(path, schema)?;
    validate::validate(&batch, schema)?;
    let table = transform::transform(batch, schema, dataset_id)?;
    load::load(pool, &table).await
}

/// Run the ETL pipeline for one dataset descriptor.
pub async fn run_dataset(
    pool: &PgPool,
    config: &Config,
    desc: &DatasetDescriptor,
    skip_download: bool,
) -> anyhow::Result<DatasetReport> {
    let kind = SchemaKind::from_data_type(&desc.data_type)
        .with_context(|| format!("unknown data type {:?} for dataset {}", desc.data_type, desc.name))?;
    let schema = schema::schema(kind);

    let dataset = registry::get_or_create_dataset(pool, desc).await?;
    info!("Dataset {:?} registered as id {}", dataset.name, dataset.id);

    let fname = fetch::url_to_filename(&desc.url);
    if skip_download {
        info!("Using cached dataset files (skipping download)");
    } else {
        fetch::download_file(&desc.url, &config.raw_data_dir, fname).await?;
    }

    let files = fetch::dataset_files(&config.raw_data_dir, fname)?;
    info!("{} file(s) to process for dataset {}", files.len(), desc.name);

    let mut report = DatasetReport {
        dataset: desc.name.clone(),
        ..DatasetReport::default()
    };

    for file in &files {
        info!("Processing {:?} into table {}", file.file_name(), schema.table);
        match process_file(pool, schema, dataset.id, file).await {
            Ok(result) => {
                report.files_processed += 1;
                report.rows_attempted += result.attempted;
                report.rows_committed += result.committed;
                if result.rejected_reason == Some(RejectReason::UniqueViolation) {
                    report.batches_rejected += 1;
                    warn!(
                        "{} rows skipped for {:?} due to constraint violation",
                        result.attempted,
                        file.file_name()
                    );
                }
            }
            // Database or connectivity failures poison the whole run.
            Err(e @ EtlError::Database(_)) | Err(e @ EtlError::Connectivity(_)) => {
                return Err(e).with_context(|| format!("while loading {file:?}"));
            }
            // Anything else is contained to this file.
            Err(e) => {
                report.files_failed += 1;
                error!("Skipping file {:?}: {}", file.file_name(), e);
            }
        }
    }

    Ok(report)
}

/// Run the pipeline for every dataset in a descriptor list, sequentially.
///
/// A database or connectivity error aborts the remaining datasets on the
/// spot. Any other per-dataset failure is logged and the loop moves on,
/// but the overall result is still an error, so the process exits
/// non-zero when any dataset run failed.
pub async fn run_pipelines(
    pool: &PgPool,
    config: &Config,
    descriptors: &[DatasetDescriptor],
    skip_download: bool,
) -> anyhow::Result<()> {
    let mut failed = 0usize;
    for desc in descriptors {
        info!("=== Dataset: {} ({}) ===", desc.name, desc.data_type);
        match run_dataset(pool, config, desc, skip_download).await {
            Ok(report) => info!("{} complete: {}", desc.name, report),
            Err(e) if is_fatal(&e) => {
                return Err(e).with_context(|| format!("aborting pipeline at dataset {}", desc.name));
            }
            Err(e) => {
                failed += 1;
                error!("{} failed: {:#}", desc.name, e);
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} dataset run(s) failed", failed, descriptors.len());
    }
    Ok(())
}

fn is_fatal(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<EtlError>(),
        Some(EtlError::Database(_)) | Some(EtlError::Connectivity(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::fs;

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for db tests");
        let pool = PgPool::connect(&url).await.unwrap();
        db::clear(&pool).await.unwrap();
        db::init(&pool).await.unwrap();
        sqlx::query("INSERT INTO parking_lots (garage_code) VALUES ('G1')")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    #[ignore] // Requires a live PostgreSQL at DATABASE_URL
    async fn test_parking_file_with_near_duplicate_persists_one_row() {
        let pool = test_pool().await;
        let dir = tempfile::tempdir().unwrap();

        // Two raw rows sharing (garagecode, updatetime): the second file
        // load is rejected whole, so exactly one row survives per pair.
        let first = dir.path().join("parking_a.csv");
        fs::write(
            &first,
            "vehiclecount,updatetime,_id,totalspaces,garagecode,streamtime\n\
             10,2014-01-01T00:00:00,1,50,G1,2014-01-01T00:00:05\n",
        )
        .unwrap();
        let second = dir.path().join("parking_b.csv");
        fs::write(
            &second,
            "vehiclecount,updatetime,_id,totalspaces,garagecode,streamtime\n\
             11,2014-01-01T00:00:00,2,50,G1,2014-01-01T00:00:06\n",
        )
        .unwrap();

        let dataset = registry::get_or_create_dataset(
            &pool,
            &DatasetDescriptor {
                name: "aarhus_parking".to_string(),
                url: "http://example.com/parking.csv".to_string(),
                data_type: "Parking Data".to_string(),
                location: "Aarhus".to_string(),
            },
        )
        .await
        .unwrap();

        let schema = schema::schema(SchemaKind::Parking);
        let a = process_file(&pool, schema, dataset.id, &first).await.unwrap();
        assert_eq!(a.committed, 1);

        let b = process_file(&pool, schema, dataset.id, &second).await.unwrap();
        assert_eq!(b.committed, 0);
        assert_eq!(b.rejected_reason, Some(RejectReason::UniqueViolation));

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM parking WHERE garage_code = 'G1' AND timestamp = '2014-01-01 00:00:00'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    #[ignore] // Requires a live PostgreSQL at DATABASE_URL
    async fn test_parking_near_duplicates_in_one_file_persist_one_row() {
        let pool = test_pool().await;
        let dir = tempfile::tempdir().unwrap();

        // Both rows share (garagecode, updatetime) within a single file;
        // transform keeps the first, so the file still commits.
        let file = dir.path().join("parking.csv");
        fs::write(
            &file,
            "vehiclecount,updatetime,_id,totalspaces,garagecode,streamtime\n\
             10,2014-01-01T00:00:00,1,50,G1,2014-01-01T00:00:05\n\
             11,2014-01-01T00:00:00,2,50,G1,2014-01-01T00:00:06\n",
        )
        .unwrap();

        let dataset = registry::get_or_create_dataset(
            &pool,
            &DatasetDescriptor {
                name: "aarhus_parking_single".to_string(),
                url: "http://example.com/parking.csv".to_string(),
                data_type: "Parking Data".to_string(),
                location: "Aarhus".to_string(),
            },
        )
        .await
        .unwrap();

        let schema = schema::schema(SchemaKind::Parking);
        let result = process_file(&pool, schema, dataset.id, &file).await.unwrap();
        assert_eq!(result.committed, 1);
        assert_eq!(result.rejected_reason, None);

        let (count, vehicle_count): (i64, Option<i64>) = sqlx::query_as(
            "SELECT COUNT(*), MIN(vehicle_count) FROM parking \
             WHERE garage_code = 'G1' AND timestamp = '2014-01-01 00:00:00'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
        assert_eq!(vehicle_count, Some(10));
    }

    #[tokio::test]
    async fn test_failed_dataset_run_fails_the_pipeline() {
        // connect_lazy never touches the server; the unknown data type
        // fails before any query is issued.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/etl_unused")
            .unwrap();
        let config = Config {
            database_url: "postgres://localhost/etl_unused".to_string(),
            raw_data_dir: std::env::temp_dir(),
        };
        let descriptors = vec![DatasetDescriptor {
            name: "mystery".to_string(),
            url: "http://example.com/mystery.csv".to_string(),
            data_type: "Seismic Data".to_string(),
            location: "Aarhus".to_string(),
        }];

        let err = run_pipelines(&pool, &config, &descriptors, true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1 of 1"));
    }
}
