pub mod accuracy_service;
pub mod ingest_service;

pub use accuracy_service::{
    AccuracyError, AccuracyService, AccuracySettings, ForecastLeadTime, StationReport,
};
pub use ingest_service::{IngestError, IngestService};
