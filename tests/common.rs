#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::SqlitePool;
use tide_monitor::db::{self, ForecastRecord, ObservationRecord};

pub const HEIGHTS_PAGE: &str = include_str!("../http/samples/alturas_horarias.html");
pub const FORECAST_PAGE: &str = include_str!("../http/samples/pronostico.html");

/// Fresh in-memory database with both tables; each test gets its own
pub async fn test_pool() -> SqlitePool {
    db::connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory test database")
}

pub fn at(day: u32, hour: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, day)
        .unwrap()
        .and_hms_opt(hour, min, 0)
        .unwrap()
}

pub fn observation(station: &str, timestamp: NaiveDateTime, height: f64) -> ObservationRecord {
    ObservationRecord {
        station: station.to_string(),
        timestamp: Some(timestamp),
        height: Some(height),
    }
}

pub fn forecast(
    place: &str,
    target: NaiveDateTime,
    height: f64,
    issue: NaiveDateTime,
) -> ForecastRecord {
    ForecastRecord {
        place: place.to_string(),
        state: "PLEAMAR".to_string(),
        height: Some(height),
        target_timestamp: Some(target),
        issue_timestamp: issue,
    }
}
