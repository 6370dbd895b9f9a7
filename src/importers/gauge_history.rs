//! Bulk import of gauge history dumps
//!
//! Each dump is a CSV with `Mareografo`, `Fecha` and `Nivel` columns (`Altura`
//! is accepted too). `Fecha` may carry a UTC offset; the offset is dropped and
//! the wall-clock time kept, which matches how hourly heights are stored.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::db::ObservationRecord;
use crate::utils::parse_decimal;

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%#z"];
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Deserialize)]
struct HistoryRow {
    #[serde(rename = "Mareografo")]
    station: String,
    #[serde(rename = "Fecha")]
    timestamp: String,
    #[serde(rename = "Nivel", alias = "Altura", default)]
    height: String,
}

/// Timestamp of a dump row as local wall-clock time
///
/// ```
/// use tide_monitor::importers::parse_history_timestamp;
///
/// let with_offset = parse_history_timestamp("2024-06-01 10:00:00-03:00").unwrap();
/// let naive = parse_history_timestamp("2024-06-01 10:00:00").unwrap();
/// assert_eq!(with_offset, naive);
/// ```
pub fn parse_history_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.naive_local())
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        })
}

/// Observation records from one dump; `path` only labels errors and logs
pub fn parse_history_csv(
    content: &str,
    path: &Path,
) -> Result<Vec<ObservationRecord>, HistoryError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    let mut bad_timestamps = 0;
    for row in reader.deserialize::<HistoryRow>() {
        let row = row.map_err(|source| HistoryError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let timestamp = parse_history_timestamp(&row.timestamp);
        if timestamp.is_none() {
            bad_timestamps += 1;
        }
        records.push(ObservationRecord {
            station: row.station,
            timestamp,
            height: parse_decimal(&row.height).ok(),
        });
    }

    if bad_timestamps > 0 {
        warn!(
            "{}: {} rows with an unreadable Fecha will be dropped",
            path.display(),
            bad_timestamps
        );
    }
    debug!("{}: {} history rows", path.display(), records.len());
    Ok(records)
}

/// Read every `*.csv` in `dir`, in file name order
#[instrument]
pub fn read_history_dir(dir: &Path) -> Result<Vec<ObservationRecord>, HistoryError> {
    let io_error = |source| HistoryError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_error)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();

    if files.is_empty() {
        warn!("No CSV files found in {}", dir.display());
    }

    let mut records = Vec::new();
    for path in &files {
        let content = fs::read_to_string(path).map_err(|source| HistoryError::Io {
            path: path.clone(),
            source,
        })?;
        records.extend(parse_history_csv(&content, path)?);
    }

    info!("Read {} history rows from {} files", records.len(), files.len());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_offset_is_dropped_not_applied() {
        assert_eq!(parse_history_timestamp("2024-06-01 10:00:00-03:00"), Some(at(10)));
        assert_eq!(parse_history_timestamp("2024-06-01T10:00:00+00:00"), Some(at(10)));
        assert_eq!(parse_history_timestamp("2024-06-01 10:00:00"), Some(at(10)));
        assert_eq!(parse_history_timestamp("01/06/2024"), None);
    }

    #[test]
    fn test_parse_history_csv_renames_nivel() {
        let content = "Mareografo,Fecha,Nivel\n\
            La Plata,2024-06-01 10:00:00-03:00,0.82\n\
            La Plata,2024-06-01 11:00:00-03:00,\n\
            La Plata,sin fecha,0.90\n";

        let records = parse_history_csv(content, Path::new("la_plata.csv")).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].station, "La Plata");
        assert_eq!(records[0].timestamp, Some(at(10)));
        assert_eq!(records[0].height, Some(0.82));
        assert_eq!(records[1].height, None);
        assert_eq!(records[2].timestamp, None);
    }

    #[test]
    fn test_parse_history_csv_accepts_altura_column() {
        let content = "Fecha,Mareografo,Altura\n2024-06-01 12:00:00,Oyarvide,\"0,70\"\n";

        let records = parse_history_csv(content, Path::new("oyarvide.csv")).unwrap();
        assert_eq!(records[0].station, "Oyarvide");
        assert_eq!(records[0].height, Some(0.70));
    }

    #[test]
    fn test_missing_station_column_is_an_error() {
        let content = "Fecha,Nivel\n2024-06-01 12:00:00,0.70\n";

        let result = parse_history_csv(content, Path::new("broken.csv"));
        assert!(matches!(result, Err(HistoryError::Csv { .. })));
    }
}
