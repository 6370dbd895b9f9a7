use chrono::NaiveDateTime;
use serde::Serialize;

/// Storage format of `Fecha` columns
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Storage format of `Fecha_Prono`, hour resolution
pub const ISSUE_FORMAT: &str = "%Y-%m-%d %H";

// Persisted record shapes. Keys are composite; a `None` key component means
// the record cannot be stored and is dropped before insertion.

/// Hourly height measured by a tide gauge (row of `alturas_horarias`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationRecord {
    pub station: String,
    pub timestamp: Option<NaiveDateTime>,
    pub height: Option<f64>,
}

/// Forecast height for a place, stamped with the hour the forecast run was read
/// (row of `pronosticos_mareas`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRecord {
    pub place: String,
    pub state: String,
    pub height: Option<f64>,
    pub target_timestamp: Option<NaiveDateTime>,
    pub issue_timestamp: NaiveDateTime,
}

impl ObservationRecord {
    pub fn key(&self) -> Option<(String, NaiveDateTime)> {
        self.timestamp.map(|ts| (self.station.clone(), ts))
    }
}

impl ForecastRecord {
    pub fn key(&self) -> Option<(String, NaiveDateTime, NaiveDateTime)> {
        self.target_timestamp
            .map(|target| (self.place.clone(), target, self.issue_timestamp))
    }

    /// Hours between issue and target; negative when the target precedes the issue
    pub fn lead_hours(&self) -> Option<f64> {
        self.target_timestamp
            .map(|target| (target - self.issue_timestamp).num_seconds() as f64 / 3600.0)
    }
}
