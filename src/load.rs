//! Loader - bulk-insert transformed tables into PostgreSQL

use crate::error::{EtlError, Result};
use crate::types::{LoadResult, RejectReason, Table, Value};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{info, warn};

// Postgres caps a statement at 65535 bind parameters.
const INSERT_CHUNK: usize = 1000;

/// Bulk-insert every row of `table` in a single transaction.
///
/// The insert is batch-atomic: a uniqueness-constraint violation anywhere
/// in the batch rolls the whole file back, and the result reports zero
/// committed rows with a rejection reason. Non-conflicting rows are not
/// salvaged row-by-row. Any other database error is fatal.
pub async fn load(pool: &PgPool, table: &Table) -> Result<LoadResult> {
    let attempted = table.rows.len();
    if attempted == 0 {
        return Ok(LoadResult {
            attempted: 0,
            committed: 0,
            rejected_reason: None,
        });
    }

    let mut tx = pool.begin().await?;
    match insert_rows(&mut tx, table).await {
        Ok(()) => {
            tx.commit().await?;
            info!("Committed {} rows into {}", attempted, table.table);
            Ok(LoadResult {
                attempted,
                committed: attempted,
                rejected_reason: None,
            })
        }
        Err(e) if is_unique_violation(&e) => {
            tx.rollback().await.ok();
            warn!(
                "Uniqueness constraint violated on {}: skipping all {} rows of the batch",
                table.table, attempted
            );
            Ok(LoadResult {
                attempted,
                committed: 0,
                rejected_reason: Some(RejectReason::UniqueViolation),
            })
        }
        Err(e) => Err(EtlError::Database(e)),
    }
}

async fn insert_rows(
    tx: &mut Transaction<'_, Postgres>,
    table: &Table,
) -> std::result::Result<(), sqlx::Error> {
    let mut column_list = table.columns.join(", ");
    column_list.push_str(", dataset_id");

    for chunk in table.rows.chunks(INSERT_CHUNK) {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} ({}) ", table.table, column_list));
        builder.push_values(chunk, |mut b, row| {
            for value in row {
                match value {
                    Value::Null => {
                        b.push("NULL");
                    }
                    Value::Text(s) => {
                        b.push_bind(s.clone());
                    }
                    Value::Integer(n) => {
                        b.push_bind(*n);
                    }
                    Value::Real(x) => {
                        b.push_bind(*x);
                    }
                    Value::Timestamp(ts) => {
                        b.push_bind(*ts);
                    }
                }
            }
            b.push_bind(table.dataset_id);
        });
        builder.build().execute(&mut **tx).await?;
    }

    Ok(())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::registry;
    use crate::types::DatasetDescriptor;
    use chrono::NaiveDate;

    fn parking_table(dataset_id: i32, rows: Vec<Vec<Value>>) -> Table {
        Table {
            table: "parking",
            columns: vec!["vehicle_count", "timestamp", "total_spaces", "garage_code", "stream_time"],
            rows,
            dataset_id,
        }
    }

    fn parking_row(garage: &str, ts: &str, count: i64) -> Vec<Value> {
        let ts = NaiveDate::parse_from_str(&ts[..10], "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(0, 0, count as u32 % 60)
            .unwrap();
        vec![
            Value::Integer(count),
            Value::Timestamp(ts),
            Value::Integer(50),
            Value::Text(garage.to_string()),
            Value::Null,
        ]
    }

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for db tests");
        let pool = PgPool::connect(&url).await.unwrap();
        db::clear(&pool).await.unwrap();
        db::init(&pool).await.unwrap();
        // Parking rows carry a foreign key into the parking_lots metadata.
        for garage in ["G1", "G2", "G3"] {
            sqlx::query("INSERT INTO parking_lots (garage_code) VALUES ($1) ON CONFLICT DO NOTHING")
                .bind(garage)
                .execute(&pool)
                .await
                .unwrap();
        }
        pool
    }

    async fn test_dataset(pool: &PgPool, name: &str) -> i32 {
        registry::get_or_create_dataset(
            pool,
            &DatasetDescriptor {
                name: name.to_string(),
                url: format!("http://example.com/{name}.csv"),
                data_type: "Parking Data".to_string(),
                location: "Aarhus".to_string(),
            },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    #[ignore] // Requires a live PostgreSQL at DATABASE_URL
    async fn test_load_reports_counts() {
        let pool = test_pool().await;
        let ds = test_dataset(&pool, "load_counts").await;

        let rows = (0..10).map(|i| parking_row("G1", "2014-01-01", i)).collect();
        let result = load(&pool, &parking_table(ds, rows)).await.unwrap();
        assert_eq!(result.attempted, 10);
        assert_eq!(result.committed, 10);
        assert_eq!(result.rejected_reason, None);
    }

    #[tokio::test]
    #[ignore] // Requires a live PostgreSQL at DATABASE_URL
    async fn test_second_load_is_idempotent() {
        let pool = test_pool().await;
        let ds = test_dataset(&pool, "idempotent").await;

        let rows: Vec<_> = (0..5).map(|i| parking_row("G2", "2014-01-02", i)).collect();
        let first = load(&pool, &parking_table(ds, rows.clone())).await.unwrap();
        assert_eq!(first.committed, 5);

        // Rerunning the same file commits nothing new.
        let second = load(&pool, &parking_table(ds, rows)).await.unwrap();
        assert_eq!(second.committed, 0);
        assert_eq!(second.rejected_reason, Some(RejectReason::UniqueViolation));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM parking")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 5);
    }

    #[tokio::test]
    #[ignore] // Requires a live PostgreSQL at DATABASE_URL
    async fn test_one_duplicate_rejects_whole_batch() {
        let pool = test_pool().await;
        let ds = test_dataset(&pool, "batch_atomic").await;

        let first = load(&pool, &parking_table(ds, vec![parking_row("G3", "2014-01-03", 1)]))
            .await
            .unwrap();
        assert_eq!(first.committed, 1);

        // Nine fresh rows plus one duplicate: batch-atomic behaviour
        // commits zero rows, it does not salvage the nine.
        let mut rows: Vec<_> = (10..19).map(|i| parking_row("G3", "2014-01-03", i)).collect();
        rows.push(parking_row("G3", "2014-01-03", 1));
        let result = load(&pool, &parking_table(ds, rows)).await.unwrap();
        assert_eq!(result.attempted, 10);
        assert_eq!(result.committed, 0);
        assert_eq!(result.rejected_reason, Some(RejectReason::UniqueViolation));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM parking")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
