use std::path::Path;

use chrono::NaiveDateTime;
use tracing::{info, instrument, warn};

use crate::db::{DbError, ForecastRepository, ObservationRepository};
use crate::extract_error::ExtractError;
use crate::extractor;
use crate::importers::{self, HistoryError};
use crate::normalizer;

/// Error types for ingest runs
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("History import failed: {0}")]
    History(#[from] HistoryError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl IngestError {
    /// A failed write can be retried as a whole batch; a malformed page cannot
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Database(_))
    }
}

/// Turns already-downloaded pages into stored records
///
/// A page is fully parsed and normalized before anything is written, so a
/// malformed page leaves the store untouched.
#[derive(Clone)]
pub struct IngestService {
    observation_repo: ObservationRepository,
    forecast_repo: ForecastRepository,
}

impl IngestService {
    pub fn new(observation_repo: ObservationRepository, forecast_repo: ForecastRepository) -> Self {
        Self {
            observation_repo,
            forecast_repo,
        }
    }

    /// Store the hourly heights page; returns the number of new observations
    #[instrument(skip(self, html), fields(html_size = html.len()))]
    pub async fn ingest_heights_html(&self, html: &str) -> Result<usize, IngestError> {
        let table = extractor::parse_heights_page(html)?;
        let records = normalizer::normalize_heights(&table)?;
        info!("Normalized {} observations from heights page", records.len());

        if records.is_empty() {
            warn!("No observations found in heights page");
        }

        let inserted = self.observation_repo.upsert_batch(&records).await?;
        Ok(inserted)
    }

    /// Store one forecast run; every record is stamped with the hour of `issued_at`
    #[instrument(skip(self, html), fields(html_size = html.len()))]
    pub async fn ingest_forecast_html(
        &self,
        html: &str,
        issued_at: NaiveDateTime,
    ) -> Result<usize, IngestError> {
        let tables = extractor::parse_forecast_page(html)?;
        let records = normalizer::normalize_forecast(&tables, issued_at)?;
        info!("Normalized {} forecasts from forecast page", records.len());

        if records.is_empty() {
            warn!("No forecasts found in forecast page");
        }

        let inserted = self.forecast_repo.upsert_batch(&records).await?;
        Ok(inserted)
    }

    /// Backfill observations from the gauge history dumps in `dir`
    ///
    /// Rows already stored are skipped, so overlapping dumps and re-runs are safe.
    #[instrument(skip(self))]
    pub async fn ingest_gauge_history(&self, dir: &Path) -> Result<usize, IngestError> {
        let records = importers::read_history_dir(dir)?;

        if records.is_empty() {
            warn!("No observations found in gauge history");
        }

        let inserted = self.observation_repo.upsert_batch(&records).await?;
        info!("Inserted {} of {} history observations", inserted, records.len());
        Ok(inserted)
    }
}
