use chrono::{Local, NaiveDateTime, NaiveTime, Timelike};
use tracing::{debug, instrument, warn};

use crate::db::{ForecastRecord, ObservationRecord};
use crate::extract_error::ExtractError;
use crate::extractor::{self, RawTable};

/// Header labels of the heights table, e.g. "14/03/2025 10:00"
pub const OBSERVATION_LABEL_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Date and time columns of the forecast tables, joined with a space
pub const FORECAST_TARGET_FORMAT: &str = "%d/%m/%Y %H:%M";

pub fn parse_observation_label(label: &str) -> Result<NaiveDateTime, ExtractError> {
    NaiveDateTime::parse_from_str(label.trim(), OBSERVATION_LABEL_FORMAT).map_err(|_| {
        ExtractError::UnparsableValue {
            field: "observation timestamp",
            value: label.to_string(),
        }
    })
}

pub fn parse_forecast_target(date: &str, time: &str) -> Result<NaiveDateTime, ExtractError> {
    let combined = format!("{} {}", date.trim(), time.trim());
    NaiveDateTime::parse_from_str(&combined, FORECAST_TARGET_FORMAT).map_err(|_| {
        ExtractError::UnparsableValue {
            field: "forecast target",
            value: combined.clone(),
        }
    })
}

/// Truncate to the start of the hour; forecast runs are identified at hour resolution
pub fn issue_hour(at: NaiveDateTime) -> NaiveDateTime {
    let hour = NaiveTime::from_hms_opt(at.hour(), 0, 0).unwrap_or(NaiveTime::MIN);
    NaiveDateTime::new(at.date(), hour)
}

/// The issue hour for a batch read now, in local time
pub fn current_issue_hour() -> NaiveDateTime {
    issue_hour(Local::now().naive_local())
}

/// Build observation records from the wide heights table
///
/// One record per gauge and header label. A label that does not parse gives a
/// record with a null timestamp; it is kept here and dropped by the store.
#[instrument(skip(table), fields(rows = table.rows.len()))]
pub fn normalize_heights(table: &RawTable) -> Result<Vec<ObservationRecord>, ExtractError> {
    let rows = extractor::extract_heights(table)?;

    let records: Vec<ObservationRecord> = rows
        .into_iter()
        .flat_map(|row| {
            let station = row.station;
            row.values.into_iter().map(move |cell| ObservationRecord {
                station: station.clone(),
                timestamp: parse_observation_label(&cell.label).ok(),
                height: cell.height,
            })
        })
        .collect();

    let null_timestamps = records.iter().filter(|r| r.timestamp.is_none()).count();
    if null_timestamps > 0 {
        warn!("{} observations have an unparsable timestamp", null_timestamps);
    }
    debug!("Normalized {} observation records", records.len());
    Ok(records)
}

/// Build forecast records from the forecast tables of one run
///
/// All records share `issue_hour(issued_at)`.
#[instrument(skip(tables), fields(tables = tables.len()))]
pub fn normalize_forecast(
    tables: &[RawTable],
    issued_at: NaiveDateTime,
) -> Result<Vec<ForecastRecord>, ExtractError> {
    if tables.is_empty() {
        return Err(ExtractError::MalformedTable(
            "no forecast tables to normalize".to_string(),
        ));
    }

    let issue_timestamp = issue_hour(issued_at);
    let records: Vec<ForecastRecord> = tables
        .iter()
        .flat_map(extractor::extract_forecast)
        .map(|row| ForecastRecord {
            target_timestamp: parse_forecast_target(&row.date, &row.time).ok(),
            place: row.place,
            state: row.state,
            height: row.height,
            issue_timestamp,
        })
        .collect();

    let null_targets = records
        .iter()
        .filter(|r| r.target_timestamp.is_none())
        .count();
    if null_targets > 0 {
        warn!("{} forecasts have an unparsable target time", null_targets);
    }
    debug!(
        "Normalized {} forecast records issued at {}",
        records.len(),
        issue_timestamp
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn at(day: u32, hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_observation_label() {
        assert_eq!(parse_observation_label("14/03/2025 10:00").unwrap(), at(14, 10, 0));
        assert_eq!(parse_observation_label(" 14/03/2025 10:00").unwrap(), at(14, 10, 0));
        assert!(parse_observation_label("Nro").is_err());
    }

    #[test]
    fn test_parse_forecast_target() {
        assert_eq!(parse_forecast_target("14/03/2025", "17:30").unwrap(), at(14, 17, 30));
        assert!(parse_forecast_target("14/03/2025", "").is_err());
    }

    #[test]
    fn test_issue_hour_truncates() {
        let issued = NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(12, 34, 56)
            .unwrap();
        assert_eq!(issue_hour(issued), at(14, 12, 0));
    }

    #[test]
    fn test_normalize_heights() {
        let table = RawTable {
            headers: row(&["#", "Mareógrafo", "14/03/2025 10:00", "bad label"]),
            rows: vec![row(&["1", "La Plata(*)", "0,80", "0,85"])],
        };

        let records = normalize_heights(&table).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            ObservationRecord {
                station: "La Plata".to_string(),
                timestamp: Some(at(14, 10, 0)),
                height: Some(0.80),
            }
        );
        // Kept with a null timestamp; the store drops it
        assert_eq!(records[1].timestamp, None);
        assert_eq!(records[1].height, Some(0.85));
    }

    #[test]
    fn test_normalize_forecast_stamps_one_issue_hour() {
        let interior = RawTable {
            headers: Vec::new(),
            rows: vec![
                row(&["SAN FERNANDO", "PLEAMAR", "11:00", "1,25", "14/03/2025"]),
                row(&["", "BAJAMAR", "17:30", "0,40", "14/03/2025"]),
            ],
        };
        let exterior = RawTable {
            headers: Vec::new(),
            rows: vec![row(&["PUERTO LA PLATA", "PLEAMAR", "xx", "0,98", "14/03/2025"])],
        };
        let issued = NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(6, 31, 0)
            .unwrap();

        let records = normalize_forecast(&[interior, exterior], issued).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.issue_timestamp == at(14, 6, 0)));
        assert_eq!(records[1].place, "SAN FERNANDO");
        assert_eq!(records[1].target_timestamp, Some(at(14, 17, 30)));
        assert_eq!(records[2].place, "PUERTO LA PLATA");
        assert_eq!(records[2].target_timestamp, None);
    }

    #[test]
    fn test_normalize_forecast_carry_does_not_cross_tables() {
        let interior = RawTable {
            headers: Vec::new(),
            rows: vec![row(&["SAN FERNANDO", "PLEAMAR", "11:00", "1,25", "14/03/2025"])],
        };
        let exterior = RawTable {
            headers: Vec::new(),
            rows: vec![row(&["", "BAJAMAR", "17:30", "0,40", "14/03/2025"])],
        };

        let records = normalize_forecast(&[interior, exterior], at(14, 6, 0)).unwrap();
        assert_eq!(records[1].place, "");
    }

    #[test]
    fn test_normalize_forecast_without_tables() {
        let result = normalize_forecast(&[], at(14, 6, 0));
        assert!(matches!(result, Err(ExtractError::MalformedTable(_))));
    }
}
