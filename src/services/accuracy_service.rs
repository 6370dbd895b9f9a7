use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::analysis::{
    self, LeadTimeSummary, MetricsError, MetricsSummary, ReconcileOptions, ReconciledSample,
    DEFAULT_PERCENTILE, DEFAULT_THRESHOLD_M,
};
use crate::db::{DbError, ForecastRecord, ForecastRepository, ObservationRecord, ObservationRepository};
use crate::stations::{StationMap, StationPair};

#[derive(Debug, thiserror::Error)]
pub enum AccuracyError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("No forecast place is mapped to station '{0}'")]
    UnknownStation(String),
}

#[derive(Debug, Clone, Copy)]
pub struct AccuracySettings {
    pub options: ReconcileOptions,
    pub threshold_m: f64,
    pub percentile: f64,
    pub lead_bucket_hours: f64,
}

impl Default for AccuracySettings {
    fn default() -> Self {
        Self {
            options: ReconcileOptions::default(),
            threshold_m: DEFAULT_THRESHOLD_M,
            percentile: DEFAULT_PERCENTILE,
            lead_bucket_hours: 24.0,
        }
    }
}

/// One stored forecast with how far ahead of its target it was issued
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastLeadTime {
    pub place: String,
    /// Gauge covering the place, when the map has one
    pub station: Option<String>,
    pub state: String,
    pub height: Option<f64>,
    pub target_timestamp: NaiveDateTime,
    pub issue_timestamp: NaiveDateTime,
    pub lead_hours: f64,
}

/// Reconciled samples and metrics for one gauge/place pair
///
/// `summary` is `Err(MetricsError::InsufficientData)` when no forecast could
/// be matched with an observation.
#[derive(Debug, Clone)]
pub struct StationReport {
    pub pair: StationPair,
    pub samples: Vec<ReconciledSample>,
    pub summary: Result<MetricsSummary, MetricsError>,
    pub lead_times: Vec<LeadTimeSummary>,
}

impl StationReport {
    /// Summary, or the reason there is none, with optional per-sample detail
    pub fn to_json(&self, with_samples: bool) -> serde_json::Value {
        let mut value = match &self.summary {
            Ok(summary) => json!({
                "station": self.pair.station,
                "place": self.pair.place,
                "summary": summary,
                "lead_times": self.lead_times,
            }),
            Err(e) => json!({
                "station": self.pair.station,
                "place": self.pair.place,
                "error": e.to_string(),
            }),
        };
        if with_samples {
            value["samples"] = json!(self.samples);
        }
        value
    }
}

#[derive(Clone)]
pub struct AccuracyService {
    observation_repo: ObservationRepository,
    forecast_repo: ForecastRepository,
    settings: AccuracySettings,
}

impl AccuracyService {
    pub fn new(
        observation_repo: ObservationRepository,
        forecast_repo: ForecastRepository,
        settings: AccuracySettings,
    ) -> Self {
        Self {
            observation_repo,
            forecast_repo,
            settings,
        }
    }

    /// Read both series of a pair from the store and score the forecasts
    #[instrument(skip(self), fields(station = %pair.station))]
    pub async fn station_report(&self, pair: &StationPair) -> Result<StationReport, AccuracyError> {
        let observations = self.observation_repo.find_by_station(&pair.station).await?;
        let forecasts = self.forecast_repo.find_by_place(&pair.place).await?;

        Ok(build_report(pair, &observations, &forecasts, &self.settings))
    }

    /// Reports for every pair of the map, in map order
    #[instrument(skip(self, map), fields(pairs = map.pairs().len()))]
    pub async fn report_all(&self, map: &StationMap) -> Result<Vec<StationReport>, AccuracyError> {
        let mut reports = Vec::with_capacity(map.pairs().len());
        for pair in map.pairs() {
            reports.push(self.station_report(pair).await?);
        }
        Ok(reports)
    }

    /// Lead time of every stored forecast, optionally for the place of one gauge
    #[instrument(skip(self, map))]
    pub async fn forecast_lead_times(
        &self,
        map: &StationMap,
        station: Option<&str>,
    ) -> Result<Vec<ForecastLeadTime>, AccuracyError> {
        let forecasts = match station {
            Some(station) => {
                let place = map
                    .place_for(station)
                    .ok_or_else(|| AccuracyError::UnknownStation(station.to_string()))?;
                self.forecast_repo.find_by_place(place).await?
            }
            None => self.forecast_repo.find_all().await?,
        };

        let listing: Vec<ForecastLeadTime> = forecasts
            .into_iter()
            .filter_map(|f| {
                let lead_hours = f.lead_hours()?;
                let target_timestamp = f.target_timestamp?;
                Some(ForecastLeadTime {
                    station: map.station_for(&f.place).map(str::to_string),
                    place: f.place,
                    state: f.state,
                    height: f.height,
                    target_timestamp,
                    issue_timestamp: f.issue_timestamp,
                    lead_hours,
                })
            })
            .collect();

        debug!("Listed lead times of {} forecasts", listing.len());
        Ok(listing)
    }
}

/// Reconcile and summarize in-memory series; no store access
pub fn build_report(
    pair: &StationPair,
    observations: &[ObservationRecord],
    forecasts: &[ForecastRecord],
    settings: &AccuracySettings,
) -> StationReport {
    let samples = analysis::reconcile(observations, forecasts, pair, &settings.options);
    let summary = analysis::summarize(
        &pair.station,
        &samples,
        settings.threshold_m,
        settings.percentile,
    );

    match &summary {
        Ok(s) => info!(
            station = %pair.station,
            samples = s.sample_count,
            rmse = %format!("{:.3}", s.rmse),
            "Forecast accuracy computed"
        ),
        Err(e) => warn!(station = %pair.station, error = %e, "No accuracy metrics"),
    }

    let lead_times = if samples.is_empty() {
        Vec::new()
    } else {
        analysis::summarize_by_lead_time(
            &pair.station,
            &samples,
            settings.lead_bucket_hours,
            settings.threshold_m,
            settings.percentile,
        )
        .unwrap_or_else(|e| {
            warn!(station = %pair.station, error = %e, "No lead time breakdown");
            Vec::new()
        })
    };

    StationReport {
        pair: pair.clone(),
        samples,
        summary,
        lead_times,
    }
}
