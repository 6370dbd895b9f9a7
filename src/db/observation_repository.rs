use chrono::NaiveDateTime;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument, warn};

use crate::db::upsert::{self, SqliteQuery, StoredRecord};
use crate::db::{DbError, ObservationRecord, TIMESTAMP_FORMAT};

impl StoredRecord for ObservationRecord {
    type Key = (String, String);

    const TABLE: &'static str = "alturas_horarias";
    const CREATE_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS alturas_horarias (
            Mareografo TEXT NOT NULL,
            Fecha TEXT NOT NULL,
            Altura REAL,
            PRIMARY KEY (Mareografo, Fecha)
        )
    "#;
    const SELECT_KEYS: &'static str = "SELECT Mareografo, Fecha FROM alturas_horarias";
    const INSERT: &'static str = r#"
        INSERT INTO alturas_horarias (Mareografo, Fecha, Altura)
        VALUES (?1, ?2, ?3)
        ON CONFLICT (Mareografo, Fecha) DO NOTHING
    "#;

    fn storage_key(&self) -> Option<Self::Key> {
        self.key()
            .map(|(station, ts)| (station, ts.format(TIMESTAMP_FORMAT).to_string()))
    }

    fn key_from_row(row: &SqliteRow) -> Result<Self::Key, sqlx::Error> {
        Ok((row.try_get("Mareografo")?, row.try_get("Fecha")?))
    }

    fn bind_insert<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.station.as_str())
            .bind(
                self.timestamp
                    .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string()),
            )
            .bind(self.height)
    }
}

#[derive(Clone)]
pub struct ObservationRepository {
    pool: SqlitePool,
}

impl ObservationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert observations whose (station, timestamp) is not stored yet
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn upsert_batch(&self, records: &[ObservationRecord]) -> Result<usize, DbError> {
        upsert::upsert_batch(&self.pool, records).await
    }

    /// Observations of one gauge, oldest first
    #[instrument(skip(self))]
    pub async fn find_by_station(&self, station: &str) -> Result<Vec<ObservationRecord>, DbError> {
        debug!("Querying observations for station '{}'", station);

        let rows = sqlx::query(
            r#"
            SELECT Mareografo, Fecha, Altura
            FROM alturas_horarias
            WHERE Mareografo = ?1
            ORDER BY Fecha ASC
            "#,
        )
        .bind(station)
        .fetch_all(&self.pool)
        .await?;

        let records = decode_rows(&rows)?;
        debug!("Found {} observations", records.len());
        Ok(records)
    }

    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<ObservationRecord>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT Mareografo, Fecha, Altura
            FROM alturas_horarias
            ORDER BY Mareografo ASC, Fecha ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let records = decode_rows(&rows)?;
        debug!("Found {} observations", records.len());
        Ok(records)
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<usize, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM alturas_horarias")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as usize)
    }
}

fn decode_rows(rows: &[SqliteRow]) -> Result<Vec<ObservationRecord>, DbError> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let station: String = row.try_get("Mareografo")?;
        let fecha: String = row.try_get("Fecha")?;
        let height: Option<f64> = row.try_get("Altura")?;

        match NaiveDateTime::parse_from_str(&fecha, TIMESTAMP_FORMAT) {
            Ok(ts) => records.push(ObservationRecord {
                station,
                timestamp: Some(ts),
                height,
            }),
            Err(e) => warn!(
                station = %station,
                fecha = %fecha,
                error = %e,
                "Skipping stored observation with unreadable timestamp"
            ),
        }
    }
    Ok(records)
}
