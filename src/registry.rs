//! Dataset registry - get-or-create semantics for the reference tables
//!
//! The upserts here are INSERT .. ON CONFLICT DO NOTHING followed by a
//! SELECT. Each statement is atomic, but the pipeline as a whole assumes a
//! single process per store: concurrent runs are unsupported.

use crate::error::Result;
use crate::types::{Dataset, DatasetDescriptor};
use sqlx::PgPool;
use tracing::debug;

/// Resolve a location name to its id, creating the row if needed.
pub async fn get_or_create_location(pool: &PgPool, name: &str) -> Result<i32> {
    sqlx::query("INSERT INTO locations (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
        .bind(name)
        .execute(pool)
        .await?;
    let id = sqlx::query_scalar::<_, i32>("SELECT id FROM locations WHERE name = $1")
        .bind(name)
        .fetch_one(pool)
        .await?;
    debug!("Location {:?} -> id {}", name, id);
    Ok(id)
}

/// Resolve a data-type name to its id, creating the row if needed.
pub async fn get_or_create_data_type(pool: &PgPool, name: &str) -> Result<i32> {
    sqlx::query("INSERT INTO data_types (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
        .bind(name)
        .execute(pool)
        .await?;
    let id = sqlx::query_scalar::<_, i32>("SELECT id FROM data_types WHERE name = $1")
        .bind(name)
        .fetch_one(pool)
        .await?;
    debug!("Data type {:?} -> id {}", name, id);
    Ok(id)
}

/// Resolve a dataset descriptor to its registered row, creating the
/// dataset and its location/data-type references if needed. Datasets are
/// immutable once created: a descriptor whose name matches an existing
/// row returns that row unchanged.
pub async fn get_or_create_dataset(pool: &PgPool, desc: &DatasetDescriptor) -> Result<Dataset> {
    let location_id = get_or_create_location(pool, &desc.location).await?;
    let data_type_id = get_or_create_data_type(pool, &desc.data_type).await?;

    sqlx::query(
        r#"
        INSERT INTO datasets (name, url, data_type_id, location_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (name) DO NOTHING
        "#,
    )
    .bind(&desc.name)
    .bind(&desc.url)
    .bind(data_type_id)
    .bind(location_id)
    .execute(pool)
    .await?;

    let dataset = sqlx::query_as::<_, Dataset>(
        "SELECT id, name, url, data_type_id, location_id FROM datasets WHERE name = $1",
    )
    .bind(&desc.name)
    .fetch_one(pool)
    .await?;

    debug!("Dataset {:?} -> id {}", dataset.name, dataset.id);
    Ok(dataset)
}
