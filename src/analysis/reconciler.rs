//! Alignment of observed and forecast heights on a shared time axis
//!
//! Forecasts target arbitrary minutes (high and low water times) while gauges
//! report hourly, so the observed height at a forecast target is interpolated
//! in time between the surrounding observations.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, instrument};

use crate::db::{ForecastRecord, ObservationRecord};
use crate::stations::StationPair;

/// Which forecast survives when several runs target the same timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum IssuePreference {
    /// First issued wins: the longest look-ahead is scored
    #[default]
    Earliest,
    /// Last issued wins: the freshest forecast is scored
    Latest,
}

impl std::str::FromStr for IssuePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "earliest" => Ok(IssuePreference::Earliest),
            "latest" => Ok(IssuePreference::Latest),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Gaps between observations longer than this are not interpolated; `None` bridges any gap
    pub max_gap: Option<Duration>,
    pub issue_preference: IssuePreference,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledSample {
    pub timestamp: NaiveDateTime,
    pub observed_height: f64,
    pub forecast_height: f64,
    pub issue_timestamp: NaiveDateTime,
    pub anticipation_hours: f64,
    pub absolute_error: f64,
    /// `None` when the observed height is zero
    pub relative_error_pct: Option<f64>,
}

impl ReconciledSample {
    pub fn new(
        timestamp: NaiveDateTime,
        observed_height: f64,
        forecast_height: f64,
        issue_timestamp: NaiveDateTime,
    ) -> Self {
        let error = observed_height - forecast_height;
        let relative_error_pct = if observed_height == 0.0 {
            None
        } else {
            Some(100.0 * error / observed_height)
        };

        Self {
            timestamp,
            observed_height,
            forecast_height,
            issue_timestamp,
            anticipation_hours: hours_between(issue_timestamp, timestamp),
            absolute_error: error.abs(),
            relative_error_pct,
        }
    }
}

fn hours_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_seconds() as f64 / 3600.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    target: NaiveDateTime,
    height: f64,
    issue: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
struct TimelineRow {
    timestamp: NaiveDateTime,
    observed: Option<f64>,
    forecast: Option<Candidate>,
}

/// Observed height at `at`, linear in elapsed time between the bracketing points
///
/// `known` must be sorted by time with unique timestamps. Returns `None`
/// before the first or after the last point, and across a gap longer than
/// `max_gap`.
pub fn interpolate_at(
    known: &[(NaiveDateTime, f64)],
    at: NaiveDateTime,
    max_gap: Option<Duration>,
) -> Option<f64> {
    let idx = known.partition_point(|(t, _)| *t < at);
    if let Some(&(t, v)) = known.get(idx) {
        if t == at {
            return Some(v);
        }
    }
    if idx == 0 || idx >= known.len() {
        return None;
    }

    let (t0, v0) = known[idx - 1];
    let (t1, v1) = known[idx];
    let span = t1 - t0;
    if max_gap.is_some_and(|limit| span > limit) {
        return None;
    }

    let fraction = (at - t0).num_seconds() as f64 / span.num_seconds() as f64;
    Some(v0 + (v1 - v0) * fraction)
}

/// Forecasts for one place with usable height and target, repeated (height, target) rows collapsed
fn candidate_forecasts(forecasts: &[ForecastRecord], place: &str) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = forecasts
        .iter()
        .filter(|f| f.place == place)
        .filter_map(|f| {
            Some(Candidate {
                target: f.target_timestamp?,
                height: f.height?,
                issue: f.issue_timestamp,
            })
        })
        .collect();

    candidates.sort_by(|a, b| a.target.cmp(&b.target).then(a.issue.cmp(&b.issue)));

    // -0.0 and 0.0 are the same height
    let mut seen = HashSet::new();
    candidates.retain(|c| seen.insert((c.target, (c.height + 0.0).to_bits())));
    candidates
}

fn outer_join(
    observed: &BTreeMap<NaiveDateTime, Option<f64>>,
    candidates: &[Candidate],
) -> Vec<TimelineRow> {
    let mut by_target: BTreeMap<NaiveDateTime, Vec<Candidate>> = BTreeMap::new();
    for candidate in candidates {
        by_target.entry(candidate.target).or_default().push(*candidate);
    }

    let timestamps: BTreeSet<NaiveDateTime> = observed
        .keys()
        .chain(by_target.keys())
        .copied()
        .collect();

    let mut timeline = Vec::with_capacity(timestamps.len());
    for timestamp in timestamps {
        let observed_height = observed.get(&timestamp).copied().flatten();
        match by_target.get(&timestamp) {
            Some(forecasts) => timeline.extend(forecasts.iter().map(|f| TimelineRow {
                timestamp,
                observed: observed_height,
                forecast: Some(*f),
            })),
            None => timeline.push(TimelineRow {
                timestamp,
                observed: observed_height,
                forecast: None,
            }),
        }
    }
    timeline
}

fn interpolate_observed(
    timeline: &mut [TimelineRow],
    known: &[(NaiveDateTime, f64)],
    max_gap: Option<Duration>,
) -> usize {
    let mut filled = 0;
    for row in timeline.iter_mut().filter(|r| r.observed.is_none()) {
        row.observed = interpolate_at(known, row.timestamp, max_gap);
        if row.observed.is_some() {
            filled += 1;
        }
    }
    filled
}

/// Pair each forecast of `pair.place` with the observed height of `pair.station` at its target
///
/// Samples with a negative lead time are dropped, as is any forecast whose
/// target cannot be given an observed height. When several forecast runs
/// target the same timestamp one sample survives, chosen by
/// `options.issue_preference`. The result is sorted by timestamp.
#[instrument(
    skip(observations, forecasts, options),
    fields(station = %pair.station, place = %pair.place)
)]
pub fn reconcile(
    observations: &[ObservationRecord],
    forecasts: &[ForecastRecord],
    pair: &StationPair,
    options: &ReconcileOptions,
) -> Vec<ReconciledSample> {
    let mut observed: BTreeMap<NaiveDateTime, Option<f64>> = BTreeMap::new();
    for record in observations.iter().filter(|o| o.station == pair.station) {
        if let Some(timestamp) = record.timestamp {
            let height = observed.entry(timestamp).or_insert(None);
            if height.is_none() {
                *height = record.height;
            }
        }
    }
    let known: Vec<(NaiveDateTime, f64)> = observed
        .iter()
        .filter_map(|(t, h)| h.map(|h| (*t, h)))
        .collect();

    let candidates = candidate_forecasts(forecasts, &pair.place);
    debug!(
        "{} observations ({} with height), {} distinct forecasts",
        observed.len(),
        known.len(),
        candidates.len()
    );

    let mut timeline = outer_join(&observed, &candidates);
    let filled = interpolate_observed(&mut timeline, &known, options.max_gap);
    debug!("Timeline has {} rows, {} observed heights interpolated", timeline.len(), filled);

    let mut negative_lead = 0;
    let mut samples: Vec<ReconciledSample> = timeline
        .into_iter()
        .filter_map(|row| {
            let forecast = row.forecast?;
            let observed_height = row.observed?;
            Some(ReconciledSample::new(
                row.timestamp,
                observed_height,
                forecast.height,
                forecast.issue,
            ))
        })
        .filter(|s| {
            let valid = s.anticipation_hours >= 0.0;
            if !valid {
                negative_lead += 1;
            }
            valid
        })
        .collect();

    if negative_lead > 0 {
        debug!("Dropped {} samples targeting a time before their issue", negative_lead);
    }

    let preference = options.issue_preference;
    samples.sort_by(|a, b| {
        a.timestamp.cmp(&b.timestamp).then_with(|| match preference {
            IssuePreference::Earliest => a.issue_timestamp.cmp(&b.issue_timestamp),
            IssuePreference::Latest => b.issue_timestamp.cmp(&a.issue_timestamp),
        })
    });
    samples.dedup_by_key(|s| s.timestamp);

    debug!("Reconciled {} samples", samples.len());
    samples
}
