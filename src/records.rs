use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::projection::GeoPoint;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read data file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing column {0:?}")]
    MissingColumn(&'static str),

    #[error("{0}")]
    Format(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EarthquakeRecord {
    pub location: GeoPoint,
    pub magnitude: f64,
    pub place: String,
    pub time: Option<DateTime<Utc>>,
    pub depth_km: Option<f64>,
}

impl EarthquakeRecord {
    pub fn new(location: GeoPoint, magnitude: f64, place: impl Into<String>) -> Self {
        Self {
            location,
            magnitude,
            place: place.into(),
            time: None,
            depth_km: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationRecord {
    pub location: GeoPoint,
    pub code: String,
    pub name: String,
    pub network: String,
    pub elevation: f64, // meters
    pub telemetry: String,
}

/// Anything drawn as a point marker on a globe.
pub trait PointRecord {
    fn location(&self) -> GeoPoint;
}

impl PointRecord for EarthquakeRecord {
    fn location(&self) -> GeoPoint {
        self.location
    }
}

impl PointRecord for StationRecord {
    fn location(&self) -> GeoPoint {
        self.location
    }
}

/// Split one CSV line, honouring double quotes and `""` escapes.
pub fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);

    fields
}

struct CsvTable<'a> {
    columns: HashMap<String, usize>,
    rows: Vec<(usize, Vec<String>)>,
    source: &'a str,
}

impl<'a> CsvTable<'a> {
    fn parse(contents: &str, source: &'a str) -> Result<Self, DataError> {
        let mut lines = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let (_, header) = lines
            .next()
            .ok_or_else(|| DataError::Format(format!("{source}: empty file")))?;
        let columns = split_csv_line(header.trim_start_matches('\u{feff}'))
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_lowercase(), i))
            .collect();

        let rows = lines
            .map(|(index, line)| (index + 1, split_csv_line(line)))
            .collect();

        Ok(Self {
            columns,
            rows,
            source,
        })
    }

    /// Index of the first column found among `names`.
    fn column(&self, names: &[&'static str]) -> Result<usize, DataError> {
        names
            .iter()
            .find_map(|name| self.columns.get(*name).copied())
            .ok_or(DataError::MissingColumn(names[0]))
    }

    fn optional_column(&self, names: &[&'static str]) -> Option<usize> {
        self.column(names).ok()
    }
}

fn field(row: &[String], index: usize) -> &str {
    row.get(index).map(|s| s.trim()).unwrap_or("")
}

fn number(row: &[String], index: usize) -> Option<f64> {
    field(row, index)
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn optional_text(row: &[String], index: Option<usize>) -> String {
    index.map(|i| field(row, i).to_string()).unwrap_or_default()
}

fn location(row: &[String], longitude: usize, latitude: usize) -> Option<GeoPoint> {
    GeoPoint::checked(number(row, longitude)?, number(row, latitude)?).ok()
}

/// Parse earthquake CSV (USGS feed layout).
///
/// Rows with non-finite coordinates or magnitude are dropped.
pub fn parse_earthquakes(contents: &str) -> Result<Vec<EarthquakeRecord>, DataError> {
    let table = CsvTable::parse(contents, "earthquakes")?;
    let latitude = table.column(&["latitude", "lat"])?;
    let longitude = table.column(&["longitude", "lon", "lng"])?;
    let magnitude = table.column(&["mag", "magnitude"])?;
    let place = table.column(&["place"])?;
    let time = table.optional_column(&["time"]);
    let depth = table.optional_column(&["depth"]);

    let mut records = Vec::with_capacity(table.rows.len());
    let mut dropped = 0usize;

    for (line, row) in &table.rows {
        let parsed = location(row, longitude, latitude).zip(number(row, magnitude));
        let Some((point, mag)) = parsed.filter(|(_, mag)| *mag >= 0.0) else {
            dropped += 1;
            tracing::trace!(line, source = table.source, "dropping earthquake row");
            continue;
        };

        let mut record = EarthquakeRecord::new(point, mag, field(row, place));
        record.time = time.and_then(|i| {
            DateTime::parse_from_rfc3339(field(row, i))
                .ok()
                .map(|t| t.with_timezone(&Utc))
        });
        record.depth_km = depth.and_then(|i| number(row, i));
        records.push(record);
    }

    if dropped > 0 {
        warn!(dropped, kept = records.len(), "dropped invalid earthquake rows");
    }
    Ok(records)
}

pub fn parse_stations(contents: &str) -> Result<Vec<StationRecord>, DataError> {
    let table = CsvTable::parse(contents, "stations")?;
    let latitude = table.column(&["latitude", "lat"])?;
    let longitude = table.column(&["longitude", "lon", "lng"])?;
    let code = table.column(&["station code", "station", "code"])?;
    let name = table.optional_column(&["name", "site name"]);
    let network = table.optional_column(&["network code", "network"]);
    let elevation = table.optional_column(&["elevation"]);
    let telemetry = table.optional_column(&["telemetry"]);

    let mut records = Vec::with_capacity(table.rows.len());
    let mut dropped = 0usize;

    for (_, row) in &table.rows {
        let Some(point) = location(row, longitude, latitude) else {
            dropped += 1;
            continue;
        };

        records.push(StationRecord {
            location: point,
            code: field(row, code).to_string(),
            name: optional_text(row, name),
            network: optional_text(row, network),
            elevation: elevation.and_then(|i| number(row, i)).unwrap_or(0.0),
            telemetry: optional_text(row, telemetry),
        });
    }

    if dropped > 0 {
        warn!(dropped, kept = records.len(), "dropped invalid station rows");
    }
    Ok(records)
}

pub fn load_earthquakes<P: AsRef<Path>>(path: P) -> Result<Vec<EarthquakeRecord>, DataError> {
    let records = parse_earthquakes(&std::fs::read_to_string(path.as_ref())?)?;
    info!(count = records.len(), path = %path.as_ref().display(), "loaded earthquakes");
    Ok(records)
}

pub fn load_stations<P: AsRef<Path>>(path: P) -> Result<Vec<StationRecord>, DataError> {
    let records = parse_stations(&std::fs::read_to_string(path.as_ref())?)?;
    info!(count = records.len(), path = %path.as_ref().display(), "loaded stations");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const QUAKES: &str = "\
time,latitude,longitude,depth,mag,magType,place
2025-01-07T01:05:16.000Z,28.639,87.361,10,7.1,mww,\"93 km NNE of Lobuche, Nepal\"
2025-01-07T02:00:00.000Z,,120.1,5,4.2,mb,missing latitude
2025-01-08T00:00:00.000Z,35.0,139.0,40,NaN,mb,\"Honshu, Japan\"
2025-01-09T00:00:00.000Z,-20.1,-70.3,35.5,5.4,mww,\"\"\"Quoted\"\" place\"
";

    #[test]
    fn test_split_csv_line_quotes() {
        assert_eq!(
            split_csv_line(r#"a,"b, c","d ""e""",f"#),
            vec!["a", "b, c", "d \"e\"", "f"]
        );
        assert_eq!(split_csv_line(""), vec![""]);
    }

    #[test]
    fn test_parse_earthquakes_filters_invalid_rows() {
        let records = parse_earthquakes(QUAKES).unwrap();
        assert_eq!(records.len(), 2);

        let nepal = &records[0];
        assert_eq!(nepal.place, "93 km NNE of Lobuche, Nepal");
        assert_eq!(nepal.magnitude, 7.1);
        assert_eq!(nepal.location, GeoPoint::new(87.361, 28.639));
        assert_eq!(nepal.depth_km, Some(10.0));
        assert!(nepal.time.is_some());

        assert_eq!(records[1].place, "\"Quoted\" place");
    }

    #[test]
    fn test_parse_earthquakes_requires_columns() {
        assert!(matches!(
            parse_earthquakes("latitude,longitude,place\n1,2,x\n"),
            Err(DataError::MissingColumn("mag"))
        ));
    }

    #[test]
    fn test_parse_stations() {
        let csv = "\
Network Code,Station Code,Name,Latitude,Longitude,Elevation,Telemetry
IU,ANMO,\"Albuquerque, New Mexico\",34.9459,-106.4572,1850,Real-time
XX,BAD,Nowhere,95,0,0,None
";
        let records = parse_stations(csv).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].code, "ANMO");
        assert_eq!(records[0].network, "IU");
        assert_eq!(records[0].name, "Albuquerque, New Mexico");
        assert_eq!(records[0].elevation, 1850.0);
        assert_eq!(records[0].telemetry, "Real-time");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(QUAKES.as_bytes()).unwrap();

        let records = load_earthquakes(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(matches!(
            load_stations("/nonexistent/stations.csv"),
            Err(DataError::Io(_))
        ));
    }
}
