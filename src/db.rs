//! Database setup - connection pool and schema DDL
//!
//! The data tables are generated from the static schema descriptors so the
//! declared uniqueness constraints and the loader always agree.

use crate::config::Config;
use crate::error::Result;
use crate::schema::{self, FormatKind, Schema, SchemaKind};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

const REFERENCE_TABLES: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS locations (
        id SERIAL PRIMARY KEY,
        name TEXT UNIQUE NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS data_types (
        id SERIAL PRIMARY KEY,
        name TEXT UNIQUE NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS datasets (
        id SERIAL PRIMARY KEY,
        name TEXT UNIQUE NOT NULL,
        url TEXT UNIQUE NOT NULL,
        data_type_id INTEGER NOT NULL REFERENCES data_types(id),
        location_id INTEGER NOT NULL REFERENCES locations(id)
    )",
    "CREATE TABLE IF NOT EXISTS traffic_sensors (
        report_id BIGINT PRIMARY KEY,
        point_1_name TEXT,
        point_1_street TEXT,
        point_1_city TEXT,
        point_1_postal_code TEXT,
        point_1_lat DOUBLE PRECISION,
        point_1_lng DOUBLE PRECISION,
        point_2_name TEXT,
        point_2_street TEXT,
        point_2_city TEXT,
        point_2_postal_code TEXT,
        point_2_lat DOUBLE PRECISION,
        point_2_lng DOUBLE PRECISION,
        distance_in_meters DOUBLE PRECISION,
        duration_in_sec DOUBLE PRECISION,
        ndt_in_kmh DOUBLE PRECISION,
        road_type TEXT,
        organization TEXT,
        ext_id TEXT
    )",
    "CREATE TABLE IF NOT EXISTS parking_lots (
        garage_code TEXT PRIMARY KEY,
        city TEXT,
        postal_code TEXT,
        street TEXT,
        house_number TEXT,
        latitude DOUBLE PRECISION,
        longitude DOUBLE PRECISION
    )",
];

/// Connect a pool against the configured database.
pub async fn connect(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    Ok(pool)
}

/// DDL for one data-type table, derived from its schema descriptor.
pub fn create_table_sql(schema: &Schema) -> String {
    let mut columns = vec![
        "id BIGSERIAL PRIMARY KEY".to_string(),
        "dataset_id INTEGER NOT NULL REFERENCES datasets(id)".to_string(),
    ];

    for (name, ty) in schema.table_columns() {
        let mut column = format!("{} {}", name, ty.sql_type());
        if schema.format == FormatKind::Delimited {
            if let Some(target) = schema
                .fields
                .iter()
                .find(|f| f.name == name)
                .and_then(|f| f.references)
            {
                column.push_str(" REFERENCES ");
                column.push_str(target);
            }
        }
        columns.push(column);
    }

    if !schema.unique_over.is_empty() {
        columns.push(format!("UNIQUE ({})", schema.unique_over.join(", ")));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        schema.table,
        columns.join(",\n    ")
    )
}

/// Create every table the pipeline needs, reference tables first.
pub async fn init(pool: &PgPool) -> Result<()> {
    for ddl in REFERENCE_TABLES {
        sqlx::query(ddl).execute(pool).await?;
    }
    for kind in SchemaKind::all() {
        let s = schema::schema(kind);
        sqlx::query(&create_table_sql(s)).execute(pool).await?;
    }
    info!("Database initialised");
    Ok(())
}

/// Drop every pipeline table. The only deletion event the store supports.
pub async fn clear(pool: &PgPool) -> Result<()> {
    for kind in SchemaKind::all() {
        let s = schema::schema(kind);
        sqlx::query(&format!("DROP TABLE IF EXISTS {} CASCADE", s.table))
            .execute(pool)
            .await?;
    }
    for table in ["parking_lots", "traffic_sensors", "datasets", "data_types", "locations"] {
        sqlx::query(&format!("DROP TABLE IF EXISTS {} CASCADE", table))
            .execute(pool)
            .await?;
    }
    info!("Database cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traffic_ddl_carries_unique_constraint() {
        let sql = create_table_sql(schema::schema(SchemaKind::RoadTraffic));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS road_traffic"));
        assert!(sql.contains("UNIQUE (timestamp, report_id)"));
        assert!(sql.contains("report_id BIGINT REFERENCES traffic_sensors(report_id)"));
        assert!(sql.contains("dataset_id INTEGER NOT NULL REFERENCES datasets(id)"));
    }

    #[test]
    fn test_parking_ddl_references_parking_lots() {
        let sql = create_table_sql(schema::schema(SchemaKind::Parking));
        assert!(sql.contains("garage_code TEXT REFERENCES parking_lots(garage_code)"));
        assert!(sql.contains("UNIQUE (timestamp, garage_code)"));
    }

    #[test]
    fn test_weather_ddl_is_narrow() {
        let sql = create_table_sql(schema::schema(SchemaKind::Weather));
        assert!(sql.contains("field TEXT"));
        assert!(sql.contains("value DOUBLE PRECISION"));
        assert!(sql.contains("UNIQUE (dataset_id, timestamp, field)"));
        // The wide raw fields never become columns.
        assert!(!sql.contains("temperature"));
    }

    #[test]
    fn test_event_tables_unique_on_event_id() {
        for kind in [
            SchemaKind::SocialEvents,
            SchemaKind::CulturalEvents,
            SchemaKind::LibraryEvents,
        ] {
            let sql = create_table_sql(schema::schema(kind));
            assert!(sql.contains("UNIQUE (event_id)"), "{}", sql);
        }
    }
}
