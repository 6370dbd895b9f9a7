use chrono::{NaiveDateTime, NaiveTime};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument, warn};

use crate::db::upsert::{self, SqliteQuery, StoredRecord};
use crate::db::{DbError, ForecastRecord, ISSUE_FORMAT, TIMESTAMP_FORMAT};

impl StoredRecord for ForecastRecord {
    type Key = (String, String, String);

    const TABLE: &'static str = "pronosticos_mareas";
    const CREATE_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS pronosticos_mareas (
            Lugar TEXT NOT NULL,
            Estado TEXT,
            Altura REAL,
            Fecha TEXT NOT NULL,
            Fecha_Prono TEXT NOT NULL,
            PRIMARY KEY (Lugar, Fecha, Fecha_Prono)
        )
    "#;
    const SELECT_KEYS: &'static str = "SELECT Lugar, Fecha, Fecha_Prono FROM pronosticos_mareas";
    const INSERT: &'static str = r#"
        INSERT INTO pronosticos_mareas (Lugar, Estado, Altura, Fecha, Fecha_Prono)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT (Lugar, Fecha, Fecha_Prono) DO NOTHING
    "#;

    fn storage_key(&self) -> Option<Self::Key> {
        self.key().map(|(place, target, issue)| {
            (
                place,
                target.format(TIMESTAMP_FORMAT).to_string(),
                issue.format(ISSUE_FORMAT).to_string(),
            )
        })
    }

    fn key_from_row(row: &SqliteRow) -> Result<Self::Key, sqlx::Error> {
        Ok((
            row.try_get("Lugar")?,
            row.try_get("Fecha")?,
            row.try_get("Fecha_Prono")?,
        ))
    }

    fn bind_insert<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.place.as_str())
            .bind(self.state.as_str())
            .bind(self.height)
            .bind(
                self.target_timestamp
                    .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string()),
            )
            .bind(self.issue_timestamp.format(ISSUE_FORMAT).to_string())
    }
}

/// Parse a stored `Fecha_Prono` ("2025-03-14 06") back to the start of that hour
pub fn parse_issue(value: &str) -> Option<NaiveDateTime> {
    let (date, hour) = value.trim().rsplit_once(' ')?;
    let date = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let hour = NaiveTime::from_hms_opt(hour.parse().ok()?, 0, 0)?;
    Some(date.and_time(hour))
}

#[derive(Clone)]
pub struct ForecastRepository {
    pool: SqlitePool,
}

impl ForecastRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert forecasts whose (place, target, issue) is not stored yet
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn upsert_batch(&self, records: &[ForecastRecord]) -> Result<usize, DbError> {
        upsert::upsert_batch(&self.pool, records).await
    }

    /// Forecasts for one place, ordered by target then issue time
    #[instrument(skip(self))]
    pub async fn find_by_place(&self, place: &str) -> Result<Vec<ForecastRecord>, DbError> {
        debug!("Querying forecasts for place '{}'", place);

        let rows = sqlx::query(
            r#"
            SELECT Lugar, Estado, Altura, Fecha, Fecha_Prono
            FROM pronosticos_mareas
            WHERE Lugar = ?1
            ORDER BY Fecha ASC, Fecha_Prono ASC
            "#,
        )
        .bind(place)
        .fetch_all(&self.pool)
        .await?;

        let records = decode_rows(&rows)?;
        debug!("Found {} forecasts", records.len());
        Ok(records)
    }

    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<ForecastRecord>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT Lugar, Estado, Altura, Fecha, Fecha_Prono
            FROM pronosticos_mareas
            ORDER BY Lugar ASC, Fecha ASC, Fecha_Prono ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let records = decode_rows(&rows)?;
        debug!("Found {} forecasts", records.len());
        Ok(records)
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<usize, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pronosticos_mareas")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as usize)
    }
}

fn decode_rows(rows: &[SqliteRow]) -> Result<Vec<ForecastRecord>, DbError> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let place: String = row.try_get("Lugar")?;
        let state: Option<String> = row.try_get("Estado")?;
        let height: Option<f64> = row.try_get("Altura")?;
        let fecha: String = row.try_get("Fecha")?;
        let fecha_prono: String = row.try_get("Fecha_Prono")?;

        let target = NaiveDateTime::parse_from_str(&fecha, TIMESTAMP_FORMAT).ok();
        let issue = parse_issue(&fecha_prono);
        match (target, issue) {
            (Some(target), Some(issue)) => records.push(ForecastRecord {
                place,
                state: state.unwrap_or_default(),
                height,
                target_timestamp: Some(target),
                issue_timestamp: issue,
            }),
            _ => warn!(
                place = %place,
                fecha = %fecha,
                fecha_prono = %fecha_prono,
                "Skipping stored forecast with unreadable timestamps"
            ),
        }
    }
    Ok(records)
}
