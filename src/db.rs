pub mod error;
pub mod forecast_repository;
pub mod models;
pub mod observation_repository;
pub mod pool;
pub mod upsert;

pub use error::DbError;
pub use forecast_repository::ForecastRepository;
pub use models::*;
pub use observation_repository::ObservationRepository;
pub use pool::{connect, ensure_schema};
pub use upsert::{upsert_batch, StoredRecord};
