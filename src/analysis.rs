// Forecast accuracy analysis
//
// reconciler: aligns observed and forecast heights per station pair
// metrics: error statistics over the aligned samples

pub mod metrics;
pub mod reconciler;

pub use metrics::{
    summarize, summarize_by_lead_time, LeadTimeSummary, MetricsError, MetricsSummary,
    DEFAULT_PERCENTILE, DEFAULT_THRESHOLD_M,
};
pub use reconciler::{reconcile, IssuePreference, ReconcileOptions, ReconciledSample};
