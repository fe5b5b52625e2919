//! Metadata loading - traffic sensor and parking lot reference entities
//!
//! Loaded once from small CSV files before any time-series ingestion;
//! effectively static afterward. Time-series rows attach to these via
//! foreign keys (report_id / garage_code).

use crate::config::Config;
use crate::error::Result;
use crate::fetch;
use crate::types::MetadataDescriptor;
use serde::Deserialize;
use sqlx::PgPool;
use std::path::Path;
use tracing::info;

pub const TRAFFIC_SENSOR: &str = "Traffic Sensor";
pub const PARKING_LOT: &str = "Parking Lot";

/// One row of the traffic sensor metadata CSV.
#[derive(Debug, Deserialize)]
pub struct TrafficSensorRow {
    #[serde(rename = "REPORT_ID")]
    pub report_id: i64,

    #[serde(rename = "POINT_1_NAME")]
    pub point_1_name: Option<String>,

    #[serde(rename = "POINT_1_STREET")]
    pub point_1_street: Option<String>,

    #[serde(rename = "POINT_1_CITY")]
    pub point_1_city: Option<String>,

    #[serde(rename = "POINT_1_POSTAL_CODE")]
    pub point_1_postal_code: Option<String>,

    #[serde(rename = "POINT_1_LAT")]
    pub point_1_lat: Option<f64>,

    #[serde(rename = "POINT_1_LNG")]
    pub point_1_lng: Option<f64>,

    #[serde(rename = "POINT_2_NAME")]
    pub point_2_name: Option<String>,

    #[serde(rename = "POINT_2_STREET")]
    pub point_2_street: Option<String>,

    #[serde(rename = "POINT_2_CITY")]
    pub point_2_city: Option<String>,

    #[serde(rename = "POINT_2_POSTAL_CODE")]
    pub point_2_postal_code: Option<String>,

    #[serde(rename = "POINT_2_LAT")]
    pub point_2_lat: Option<f64>,

    #[serde(rename = "POINT_2_LNG")]
    pub point_2_lng: Option<f64>,

    #[serde(rename = "DISTANCE_IN_METERS")]
    pub distance_in_meters: Option<f64>,

    #[serde(rename = "DURATION_IN_SEC")]
    pub duration_in_sec: Option<f64>,

    #[serde(rename = "NDT_IN_KMH")]
    pub ndt_in_kmh: Option<f64>,

    #[serde(rename = "ROAD_TYPE")]
    pub road_type: Option<String>,

    #[serde(rename = "ORGANIZATION")]
    pub organization: Option<String>,

    #[serde(rename = "EXT_ID")]
    pub ext_id: Option<String>,
}

/// One row of the parking lot metadata CSV.
#[derive(Debug, Deserialize)]
pub struct ParkingLotRow {
    #[serde(rename = "garagecode")]
    pub garage_code: String,

    #[serde(rename = "city")]
    pub city: Option<String>,

    #[serde(rename = "postalcode")]
    pub postal_code: Option<String>,

    #[serde(rename = "street")]
    pub street: Option<String>,

    #[serde(rename = "housenumber")]
    pub house_number: Option<String>,

    #[serde(rename = "latitude")]
    pub latitude: Option<f64>,

    #[serde(rename = "longitude")]
    pub longitude: Option<f64>,
}

pub fn read_traffic_sensors(path: &Path) -> Result<Vec<TrafficSensorRow>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize::<TrafficSensorRow>() {
        rows.push(row?);
    }
    Ok(rows)
}

pub fn read_parking_lots(path: &Path) -> Result<Vec<ParkingLotRow>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize::<ParkingLotRow>() {
        rows.push(row?);
    }
    Ok(rows)
}

async fn insert_traffic_sensors(pool: &PgPool, rows: &[TrafficSensorRow]) -> Result<usize> {
    let mut inserted = 0;
    for row in rows {
        let result = sqlx::query(
            r#"
            INSERT INTO traffic_sensors (
                report_id, point_1_name, point_1_street, point_1_city,
                point_1_postal_code, point_1_lat, point_1_lng,
                point_2_name, point_2_street, point_2_city,
                point_2_postal_code, point_2_lat, point_2_lng,
                distance_in_meters, duration_in_sec, ndt_in_kmh,
                road_type, organization, ext_id
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19
            )
            ON CONFLICT (report_id) DO NOTHING
            "#,
        )
        .bind(row.report_id)
        .bind(&row.point_1_name)
        .bind(&row.point_1_street)
        .bind(&row.point_1_city)
        .bind(&row.point_1_postal_code)
        .bind(row.point_1_lat)
        .bind(row.point_1_lng)
        .bind(&row.point_2_name)
        .bind(&row.point_2_street)
        .bind(&row.point_2_city)
        .bind(&row.point_2_postal_code)
        .bind(row.point_2_lat)
        .bind(row.point_2_lng)
        .bind(row.distance_in_meters)
        .bind(row.duration_in_sec)
        .bind(row.ndt_in_kmh)
        .bind(&row.road_type)
        .bind(&row.organization)
        .bind(&row.ext_id)
        .execute(pool)
        .await?;
        inserted += result.rows_affected() as usize;
    }
    Ok(inserted)
}

async fn insert_parking_lots(pool: &PgPool, rows: &[ParkingLotRow]) -> Result<usize> {
    let mut inserted = 0;
    for row in rows {
        let result = sqlx::query(
            r#"
            INSERT INTO parking_lots (
                garage_code, city, postal_code, street, house_number,
                latitude, longitude
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (garage_code) DO NOTHING
            "#,
        )
        .bind(&row.garage_code)
        .bind(&row.city)
        .bind(&row.postal_code)
        .bind(&row.street)
        .bind(&row.house_number)
        .bind(row.latitude)
        .bind(row.longitude)
        .execute(pool)
        .await?;
        inserted += result.rows_affected() as usize;
    }
    Ok(inserted)
}

/// Download one metadata file and load it into its reference table.
/// Returns the number of newly inserted entities.
pub async fn initialise_metadata(
    pool: &PgPool,
    config: &Config,
    desc: &MetadataDescriptor,
) -> anyhow::Result<usize> {
    let fname = fetch::url_to_filename(&desc.url);
    let path = fetch::download_file(&desc.url, &config.raw_data_dir, fname).await?;

    let inserted = match desc.name.as_str() {
        TRAFFIC_SENSOR => {
            let rows = read_traffic_sensors(&path)?;
            info!("Read {} traffic sensors from {:?}", rows.len(), path);
            insert_traffic_sensors(pool, &rows).await?
        }
        PARKING_LOT => {
            let rows = read_parking_lots(&path)?;
            info!("Read {} parking lots from {:?}", rows.len(), path);
            insert_parking_lots(pool, &rows).await?
        }
        other => anyhow::bail!("unknown metadata schema: {other}"),
    };

    info!("Inserted {} {} entities", inserted, desc.name);
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_read_parking_lots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aarhus_parking_address.csv");
        fs::write(
            &path,
            "garagecode,city,postalcode,street,housenumber,latitude,longitude\n\
             NORREPORT,Aarhus,8000,Noerreport,26,56.161,10.212\n\
             BUSGADEHUSET,Aarhus,8000,Busgade,,56.153,10.206\n",
        )
        .unwrap();

        let rows = read_parking_lots(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].garage_code, "NORREPORT");
        assert_eq!(rows[0].latitude, Some(56.161));
        assert_eq!(rows[1].house_number, None);
    }

    #[test]
    fn test_read_traffic_sensors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trafficMetaData.csv");
        fs::write(
            &path,
            "REPORT_ID,POINT_1_NAME,POINT_1_STREET,POINT_1_CITY,POINT_1_POSTAL_CODE,\
             POINT_1_LAT,POINT_1_LNG,POINT_2_NAME,POINT_2_STREET,POINT_2_CITY,\
             POINT_2_POSTAL_CODE,POINT_2_LAT,POINT_2_LNG,DISTANCE_IN_METERS,\
             DURATION_IN_SEC,NDT_IN_KMH,ROAD_TYPE,ORGANIZATION,EXT_ID\n\
             158324,4620466,Hinnerup,Hinnerup,8382,56.259,10.053,4620463,Grenaavej,\
             Aarhus,8200,56.220,10.119,1671.0,132.0,60.0,MAJOR_ROAD,COWI,668\n",
        )
        .unwrap();

        let rows = read_traffic_sensors(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].report_id, 158324);
        assert_eq!(rows[0].road_type.as_deref(), Some("MAJOR_ROAD"));
        assert_eq!(rows[0].distance_in_meters, Some(1671.0));
    }
}
