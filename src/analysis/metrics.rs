use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::analysis::reconciler::ReconciledSample;

/// Absolute error above which a forecast counts as a miss, in metres
pub const DEFAULT_THRESHOLD_M: f64 = 0.20;

/// Error level exceeded 3% of the time
pub const DEFAULT_PERCENTILE: f64 = 97.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    #[error("Insufficient data for station {station}")]
    InsufficientData { station: String },

    #[error("Percentile must be within 0..=100, got {0}")]
    InvalidPercentile(f64),

    #[error("Lead time bucket must be positive, got {0} hours")]
    InvalidBucket(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub station_id: String,
    pub sample_count: usize,
    pub rmse: f64,
    pub threshold_m: f64,
    pub pct_exceeding_threshold: f64,
    pub percentile: f64,
    pub percentile_abs_error: f64,
}

/// Metrics for the samples whose lead time falls in `[from_hours, to_hours)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadTimeSummary {
    pub from_hours: f64,
    pub to_hours: f64,
    pub summary: MetricsSummary,
}

/// Percentile of sorted values, interpolating linearly between closest ranks
///
/// The rank of `p` is `p / 100 * (n - 1)`. Returns `None` for empty input or
/// `p` outside `0..=100`.
///
/// ```
/// use tide_monitor::analysis::metrics::percentile_linear;
///
/// let p97 = percentile_linear(&[0.10, 0.10, 0.20], 97.0).unwrap();
/// assert!((p97 - 0.194).abs() < 1e-9);
/// ```
pub fn percentile_linear(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=100.0).contains(&p) {
        return None;
    }

    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// RMSE, share of errors above `threshold_m` and error percentile for one station
#[instrument(skip(samples), fields(samples = samples.len()))]
pub fn summarize(
    station_id: &str,
    samples: &[ReconciledSample],
    threshold_m: f64,
    percentile: f64,
) -> Result<MetricsSummary, MetricsError> {
    if !(0.0..=100.0).contains(&percentile) {
        return Err(MetricsError::InvalidPercentile(percentile));
    }
    if samples.is_empty() {
        return Err(MetricsError::InsufficientData {
            station: station_id.to_string(),
        });
    }

    let mut errors: Vec<f64> = samples
        .iter()
        .map(|s| (s.forecast_height - s.observed_height).abs())
        .collect();
    let n = errors.len() as f64;

    let rmse = (errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt();
    let exceeding = errors.iter().filter(|e| **e > threshold_m).count();
    let pct_exceeding_threshold = 100.0 * exceeding as f64 / n;

    errors.sort_by(f64::total_cmp);
    let percentile_abs_error = percentile_linear(&errors, percentile)
        .ok_or(MetricsError::InvalidPercentile(percentile))?;

    debug!(
        "Station {}: rmse={:.3} m, {:.2}% above {:.2} m, p{}={:.3} m",
        station_id, rmse, pct_exceeding_threshold, threshold_m, percentile, percentile_abs_error
    );

    Ok(MetricsSummary {
        station_id: station_id.to_string(),
        sample_count: samples.len(),
        rmse,
        threshold_m,
        pct_exceeding_threshold,
        percentile,
        percentile_abs_error,
    })
}

/// `summarize` per lead-time bucket of `bucket_hours`, ascending, empty buckets omitted
#[instrument(skip(samples), fields(samples = samples.len()))]
pub fn summarize_by_lead_time(
    station_id: &str,
    samples: &[ReconciledSample],
    bucket_hours: f64,
    threshold_m: f64,
    percentile: f64,
) -> Result<Vec<LeadTimeSummary>, MetricsError> {
    if !bucket_hours.is_finite() || bucket_hours <= 0.0 {
        return Err(MetricsError::InvalidBucket(bucket_hours));
    }

    let mut buckets: BTreeMap<i64, Vec<ReconciledSample>> = BTreeMap::new();
    for sample in samples {
        // saturates for very narrow buckets
        let bucket = (sample.anticipation_hours / bucket_hours).floor() as i64;
        buckets.entry(bucket).or_default().push(sample.clone());
    }

    buckets
        .into_iter()
        .map(|(bucket, bucket_samples)| {
            let from_hours = bucket as f64 * bucket_hours;
            Ok(LeadTimeSummary {
                from_hours,
                to_hours: from_hours + bucket_hours,
                summary: summarize(station_id, &bucket_samples, threshold_m, percentile)?,
            })
        })
        .collect()
}
