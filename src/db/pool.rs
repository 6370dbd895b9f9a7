use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info, instrument};

use crate::db::upsert::StoredRecord;
use crate::db::{DbError, ForecastRecord, ObservationRecord};

/// Open a pool on a SQLite database, creating the file if needed, and ensure both tables exist
///
/// An in-memory database lives inside a single connection, so such URLs get
/// a pool of one connection.
#[instrument]
pub async fn connect(database_url: &str) -> Result<SqlitePool, DbError> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let in_memory = database_url.contains(":memory:");

    info!("Connecting to database...");
    let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
    if in_memory {
        // dropping the only connection would drop the database with it
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }
    let pool = pool_options.connect_with(options).await?;
    info!("Database connection established");

    ensure_schema(&pool).await?;
    Ok(pool)
}

/// Create `alturas_horarias` and `pronosticos_mareas` if absent
#[instrument(skip(pool))]
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), DbError> {
    sqlx::query(ObservationRecord::CREATE_TABLE)
        .execute(pool)
        .await?;
    sqlx::query(ForecastRecord::CREATE_TABLE)
        .execute(pool)
        .await?;
    debug!("Schema ready");
    Ok(())
}
