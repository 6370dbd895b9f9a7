use std::env;

use chrono::Duration;

use crate::analysis::{IssuePreference, ReconcileOptions, DEFAULT_PERCENTILE, DEFAULT_THRESHOLD_M};
use crate::services::AccuracySettings;

/// Narrower lead-time buckets than this fall back to the default width
const MIN_LEAD_BUCKET_HOURS: f64 = 1.0 / 60.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown FORECAST_TIE_BREAK '{0}', expected 'earliest' or 'latest'")]
    UnknownTieBreak(String),

    #[error("MAX_INTERPOLATION_GAP_HOURS must be a non-negative number of hours, got '{0}'")]
    InvalidMaxGap(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub error_threshold_m: f64,
    pub error_percentile: f64,
    pub max_interpolation_gap: Option<Duration>,
    pub issue_preference: IssuePreference,
    pub lead_bucket_hours: f64,
    pub ingest_max_retries: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable numbers fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let issue_preference = match lookup("FORECAST_TIE_BREAK") {
            Some(value) => value.parse().map_err(ConfigError::UnknownTieBreak)?,
            None => IssuePreference::default(),
        };
        let max_interpolation_gap = match lookup("MAX_INTERPOLATION_GAP_HOURS") {
            Some(value) => Some(parse_gap_hours(&value)?),
            None => None,
        };

        Ok(Config {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://prono_shn.db?mode=rwc".to_string()),
            error_threshold_m: lookup("ERROR_THRESHOLD_M")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_THRESHOLD_M),
            error_percentile: lookup("ERROR_PERCENTILE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PERCENTILE),
            max_interpolation_gap,
            issue_preference,
            lead_bucket_hours: lookup("LEAD_BUCKET_HOURS")
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|h| h.is_finite() && *h >= MIN_LEAD_BUCKET_HOURS)
                .unwrap_or(24.0),
            ingest_max_retries: lookup("INGEST_MAX_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
        })
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            max_gap: self.max_interpolation_gap,
            issue_preference: self.issue_preference,
        }
    }

    pub fn accuracy_settings(&self) -> AccuracySettings {
        AccuracySettings {
            options: self.reconcile_options(),
            threshold_m: self.error_threshold_m,
            percentile: self.error_percentile,
            lead_bucket_hours: self.lead_bucket_hours,
        }
    }
}

fn parse_gap_hours(value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|hours| *hours >= 0)
        .and_then(Duration::try_hours)
        .ok_or_else(|| ConfigError::InvalidMaxGap(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite://prono_shn.db?mode=rwc");
        assert_eq!(config.error_threshold_m, 0.20);
        assert_eq!(config.error_percentile, 97.0);
        assert_eq!(config.max_interpolation_gap, None);
        assert_eq!(config.issue_preference, IssuePreference::Earliest);
        assert_eq!(config.lead_bucket_hours, 24.0);
        assert_eq!(config.ingest_max_retries, 3);
        assert!(config.reconcile_options().max_gap.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("ERROR_THRESHOLD_M", "0.15"),
            ("MAX_INTERPOLATION_GAP_HOURS", "6"),
            ("FORECAST_TIE_BREAK", "latest"),
        ])
        .unwrap();
        assert_eq!(config.error_threshold_m, 0.15);
        assert_eq!(config.reconcile_options().max_gap, Some(Duration::hours(6)));
        assert_eq!(config.issue_preference, IssuePreference::Latest);
    }

    #[test]
    fn test_unparsable_number_falls_back() {
        let config = config_from(&[("ERROR_PERCENTILE", "high")]).unwrap();
        assert_eq!(config.error_percentile, 97.0);
    }

    #[test]
    fn test_out_of_range_max_gap_is_rejected() {
        for value in ["9223372036854775807", "-3", "six"] {
            let result = config_from(&[("MAX_INTERPOLATION_GAP_HOURS", value)]);
            assert!(
                matches!(&result, Err(ConfigError::InvalidMaxGap(v)) if v == value),
                "{value} accepted"
            );
        }
    }

    #[test]
    fn test_zero_max_gap_only_matches_exact_hours() {
        let config = config_from(&[("MAX_INTERPOLATION_GAP_HOURS", "0")]).unwrap();
        assert_eq!(config.reconcile_options().max_gap, Some(Duration::zero()));
    }

    #[test]
    fn test_degenerate_lead_bucket_falls_back() {
        for value in ["1e-300", "0", "-6", "inf", "NaN"] {
            let config = config_from(&[("LEAD_BUCKET_HOURS", value)]).unwrap();
            assert_eq!(config.lead_bucket_hours, 24.0, "{value}");
        }
        let config = config_from(&[("LEAD_BUCKET_HOURS", "6")]).unwrap();
        assert_eq!(config.lead_bucket_hours, 6.0);
    }

    #[test]
    fn test_unknown_tie_break_is_rejected() {
        let result = config_from(&[("FORECAST_TIE_BREAK", "newest")]);
        assert!(matches!(result, Err(ConfigError::UnknownTieBreak(v)) if v == "newest"));
    }
}
