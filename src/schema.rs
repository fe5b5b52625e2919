//! Static schema descriptors for the CityPulse data types.
//!
//! Each descriptor declares the raw source columns, their canonical names
//! and types, the target table, the uniqueness constraint guarding against
//! duplicate ingestion, and the on-disk format the reader should expect.
//! The set of schemas is closed: adding a data type means adding a variant
//! here together with whatever parsing quirks it brings.

/// The seven CityPulse data-type schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    RoadTraffic,
    Pollution,
    Weather,
    Parking,
    SocialEvents,
    CulturalEvents,
    LibraryEvents,
}

impl SchemaKind {
    /// Resolve a dataset descriptor's `data_type` string to a schema kind.
    pub fn from_data_type(name: &str) -> Option<SchemaKind> {
        match name {
            "Road Traffic Data" => Some(SchemaKind::RoadTraffic),
            "Pollution Data" => Some(SchemaKind::Pollution),
            "Weather Data" => Some(SchemaKind::Weather),
            "Parking Data" => Some(SchemaKind::Parking),
            "Social Event Data" => Some(SchemaKind::SocialEvents),
            "Cultural Event Data" => Some(SchemaKind::CulturalEvents),
            "Library Event Data" => Some(SchemaKind::LibraryEvents),
            _ => None,
        }
    }

    pub fn all() -> [SchemaKind; 7] {
        [
            SchemaKind::RoadTraffic,
            SchemaKind::Pollution,
            SchemaKind::Weather,
            SchemaKind::Parking,
            SchemaKind::SocialEvents,
            SchemaKind::CulturalEvents,
            SchemaKind::LibraryEvents,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Real,
    Timestamp,
}

impl FieldType {
    /// PostgreSQL column type for DDL generation.
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::Text => "TEXT",
            FieldType::Integer => "BIGINT",
            FieldType::Real => "DOUBLE PRECISION",
            FieldType::Timestamp => "TIMESTAMP",
        }
    }
}

/// How the raw file encodes its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    /// Comma-delimited table, with or without a header line.
    Delimited,
    /// One value column per file (weather): each line is a JSON object
    /// mapping timestamp strings to a scalar for the field named by the
    /// file's base name.
    FieldPerFile,
}

/// One column: raw source name, canonical name, type, and an optional
/// foreign-key target for metadata-linked columns.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub raw: &'static str,
    pub name: &'static str,
    pub ty: FieldType,
    pub references: Option<&'static str>,
}

const fn field(raw: &'static str, name: &'static str, ty: FieldType) -> Field {
    Field {
        raw,
        name,
        ty,
        references: None,
    }
}

const fn fk(
    raw: &'static str,
    name: &'static str,
    ty: FieldType,
    target: &'static str,
) -> Field {
    Field {
        raw,
        name,
        ty,
        references: Some(target),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub kind: SchemaKind,
    /// Display name, matches the dataset descriptor's `data_type`.
    pub data_type: &'static str,
    pub table: &'static str,
    pub fields: &'static [Field],
    /// Canonical column names the target table is unique over.
    /// Empty means no idempotence guard for this table.
    pub unique_over: &'static [&'static str],
    pub format: FormatKind,
    /// Exact-duplicate rows are dropped before transformation.
    pub drop_exact_duplicates: bool,
    /// Canonical name of a column whose value is parsed out of the file
    /// name rather than the file body (pollution sensors).
    pub filename_report_field: Option<&'static str>,
}

impl Schema {
    /// Raw column names expected in the file body, in declared order.
    /// Used both for validation and for naming headerless columns.
    pub fn raw_columns(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| Some(f.name) != self.filename_report_field)
            .map(|f| f.raw)
            .collect()
    }

    pub fn field_by_raw(&self, raw: &str) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.raw == raw)
    }

    /// Columns of the target table (excluding the auto id and dataset_id).
    ///
    /// For `FieldPerFile` schemas the table is narrow: one row per
    /// (timestamp, field) pair, so that files carrying different value
    /// columns for the same timestamps never collide.
    pub fn table_columns(&self) -> Vec<(&'static str, FieldType)> {
        match self.format {
            FormatKind::Delimited => {
                self.fields.iter().map(|f| (f.name, f.ty)).collect()
            }
            FormatKind::FieldPerFile => vec![
                ("timestamp", FieldType::Timestamp),
                ("field", FieldType::Text),
                ("value", FieldType::Real),
            ],
        }
    }
}

const ROAD_TRAFFIC: Schema = Schema {
    kind: SchemaKind::RoadTraffic,
    data_type: "Road Traffic Data",
    table: "road_traffic",
    fields: &[
        field("status", "status", FieldType::Text),
        field("avgMeasuredTime", "avg_measured_time", FieldType::Integer),
        field("avgSpeed", "avg_speed", FieldType::Integer),
        field("medianMeasuredTime", "median_measured_time", FieldType::Integer),
        field("vehicleCount", "vehicle_count", FieldType::Integer),
        field("extID", "ext_id", FieldType::Text),
        field("TIMESTAMP", "timestamp", FieldType::Timestamp),
        fk("REPORT_ID", "report_id", FieldType::Integer, "traffic_sensors(report_id)"),
    ],
    unique_over: &["timestamp", "report_id"],
    format: FormatKind::Delimited,
    drop_exact_duplicates: true,
    filename_report_field: None,
};

// Pollution files carry no header and no per-row sensor id; the id is
// encoded in the file name (e.g. pollutionData158324.csv).
const POLLUTION: Schema = Schema {
    kind: SchemaKind::Pollution,
    data_type: "Pollution Data",
    table: "pollution",
    fields: &[
        field("ozone", "ozone", FieldType::Real),
        field("particullate_matter", "particulate_matter", FieldType::Real),
        field("carbon_monoxide", "carbon_monoxide", FieldType::Real),
        field("sulfure_dioxide", "sulfur_dioxide", FieldType::Real),
        field("nitrogen_dioxide", "nitrogen_dioxide", FieldType::Real),
        field("longitude", "longitude", FieldType::Real),
        field("latitude", "latitude", FieldType::Real),
        field("timestamp", "timestamp", FieldType::Timestamp),
        fk("report_id", "report_id", FieldType::Integer, "traffic_sensors(report_id)"),
    ],
    unique_over: &["timestamp", "report_id"],
    format: FormatKind::Delimited,
    drop_exact_duplicates: false,
    filename_report_field: Some("report_id"),
};

const WEATHER: Schema = Schema {
    kind: SchemaKind::Weather,
    data_type: "Weather Data",
    table: "weather",
    fields: &[
        field("timestamp", "timestamp", FieldType::Timestamp),
        field("tempm", "temperature", FieldType::Real),
        field("dewptm", "dew_point", FieldType::Real),
        field("hum", "humidity", FieldType::Real),
        field("pressurem", "pressure", FieldType::Real),
        field("wspdm", "wind_speed", FieldType::Real),
        field("wdird", "wind_direction", FieldType::Real),
    ],
    unique_over: &["dataset_id", "timestamp", "field"],
    format: FormatKind::FieldPerFile,
    drop_exact_duplicates: false,
    filename_report_field: None,
};

const PARKING: Schema = Schema {
    kind: SchemaKind::Parking,
    data_type: "Parking Data",
    table: "parking",
    fields: &[
        field("vehiclecount", "vehicle_count", FieldType::Integer),
        field("updatetime", "timestamp", FieldType::Timestamp),
        field("totalspaces", "total_spaces", FieldType::Integer),
        fk("garagecode", "garage_code", FieldType::Text, "parking_lots(garage_code)"),
        field("streamtime", "stream_time", FieldType::Timestamp),
    ],
    unique_over: &["timestamp", "garage_code"],
    format: FormatKind::Delimited,
    drop_exact_duplicates: false,
    filename_report_field: None,
};

const SOCIAL_EVENTS: Schema = Schema {
    kind: SchemaKind::SocialEvents,
    data_type: "Social Event Data",
    table: "social_events",
    fields: &[
        field("id", "event_id", FieldType::Text),
        field("title", "title", FieldType::Text),
        field("start_time", "start_time", FieldType::Timestamp),
        field("stop_time", "stop_time", FieldType::Timestamp),
        field("venue_name", "venue_name", FieldType::Text),
        field("venue_address", "venue_address", FieldType::Text),
        field("latitude", "latitude", FieldType::Real),
        field("longitude", "longitude", FieldType::Real),
        field("url", "url", FieldType::Text),
    ],
    unique_over: &["event_id"],
    format: FormatKind::Delimited,
    drop_exact_duplicates: false,
    filename_report_field: None,
};

const CULTURAL_EVENTS: Schema = Schema {
    kind: SchemaKind::CulturalEvents,
    data_type: "Cultural Event Data",
    table: "cultural_events",
    fields: &[
        field("id", "event_id", FieldType::Text),
        field("title", "title", FieldType::Text),
        field("organizer", "organizer", FieldType::Text),
        field("price", "price", FieldType::Text),
        field("venue", "venue", FieldType::Text),
        field("city", "city", FieldType::Text),
        field("zipcode", "zip_code", FieldType::Text),
        field("starttime", "start_time", FieldType::Timestamp),
        field("endtime", "end_time", FieldType::Timestamp),
        field("urlToEvent", "url", FieldType::Text),
    ],
    unique_over: &["event_id"],
    format: FormatKind::Delimited,
    drop_exact_duplicates: false,
    filename_report_field: None,
};

const LIBRARY_EVENTS: Schema = Schema {
    kind: SchemaKind::LibraryEvents,
    data_type: "Library Event Data",
    table: "library_events",
    fields: &[
        field("id", "event_id", FieldType::Text),
        field("city", "city", FieldType::Text),
        field("library", "library", FieldType::Text),
        field("title", "title", FieldType::Text),
        field("teaser", "teaser", FieldType::Text),
        field("street", "street", FieldType::Text),
        field("zipcode", "zip_code", FieldType::Text),
        field("price", "price", FieldType::Text),
        field("status", "status", FieldType::Text),
        field("changed", "changed", FieldType::Timestamp),
        field("url", "url", FieldType::Text),
        field("starttime", "start_time", FieldType::Timestamp),
        field("endtime", "end_time", FieldType::Timestamp),
        field("latitude", "latitude", FieldType::Real),
        field("longitude", "longitude", FieldType::Real),
    ],
    unique_over: &["event_id"],
    format: FormatKind::Delimited,
    drop_exact_duplicates: false,
    filename_report_field: None,
};

/// Look up the static descriptor for a schema kind.
pub fn schema(kind: SchemaKind) -> &'static Schema {
    match kind {
        SchemaKind::RoadTraffic => &ROAD_TRAFFIC,
        SchemaKind::Pollution => &POLLUTION,
        SchemaKind::Weather => &WEATHER,
        SchemaKind::Parking => &PARKING,
        SchemaKind::SocialEvents => &SOCIAL_EVENTS,
        SchemaKind::CulturalEvents => &CULTURAL_EVENTS,
        SchemaKind::LibraryEvents => &LIBRARY_EVENTS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_data_type_resolution() {
        assert_eq!(
            SchemaKind::from_data_type("Road Traffic Data"),
            Some(SchemaKind::RoadTraffic)
        );
        assert_eq!(
            SchemaKind::from_data_type("Parking Data"),
            Some(SchemaKind::Parking)
        );
        assert_eq!(SchemaKind::from_data_type("Unknown Data"), None);
    }

    #[test]
    fn test_every_kind_has_a_descriptor() {
        for kind in SchemaKind::all() {
            let s = schema(kind);
            assert_eq!(s.kind, kind);
            assert_eq!(SchemaKind::from_data_type(s.data_type), Some(kind));
        }
    }

    #[test]
    fn test_canonical_names_are_unique_per_schema() {
        for kind in SchemaKind::all() {
            let s = schema(kind);
            let names: HashSet<_> = s.fields.iter().map(|f| f.name).collect();
            assert_eq!(names.len(), s.fields.len(), "{}", s.table);
        }
    }

    #[test]
    fn test_unique_columns_exist_in_table() {
        for kind in SchemaKind::all() {
            let s = schema(kind);
            let cols: HashSet<_> =
                s.table_columns().iter().map(|(n, _)| *n).collect();
            for u in s.unique_over {
                assert!(
                    cols.contains(u) || *u == "dataset_id",
                    "{}: unique column {} not in table",
                    s.table,
                    u
                );
            }
        }
    }

    #[test]
    fn test_pollution_raw_columns_exclude_filename_field() {
        let s = schema(SchemaKind::Pollution);
        let raw = s.raw_columns();
        assert_eq!(raw.len(), 8);
        assert!(!raw.contains(&"report_id"));
        assert_eq!(raw[0], "ozone");
        assert_eq!(raw[7], "timestamp");
    }

    #[test]
    fn test_weather_table_is_narrow() {
        let s = schema(SchemaKind::Weather);
        let cols: Vec<_> = s.table_columns().iter().map(|(n, _)| *n).collect();
        assert_eq!(cols, vec!["timestamp", "field", "value"]);
    }
}
