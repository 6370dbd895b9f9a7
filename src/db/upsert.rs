use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::SqlitePool;
use tracing::{debug, info, instrument};

use crate::db::DbError;

pub type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// A record kind persisted in its own keyed table
///
/// Keys are the stored text of the key columns, so comparisons agree with the
/// table's primary key.
pub trait StoredRecord: Send + Sync {
    type Key: Eq + Hash + Clone + Debug + Send;

    const TABLE: &'static str;
    const CREATE_TABLE: &'static str;
    const SELECT_KEYS: &'static str;
    const INSERT: &'static str;

    /// `None` when a key component is null; such records are never stored
    fn storage_key(&self) -> Option<Self::Key>;

    fn key_from_row(row: &SqliteRow) -> Result<Self::Key, sqlx::Error>;

    fn bind_insert<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q>;
}

/// Insert the records whose key is not stored yet, in one transaction
///
/// Existing rows are never touched. Within the batch the first record with a
/// given key wins. Records with a null key component are dropped. If any
/// statement fails the transaction rolls back and nothing is written, so the
/// whole batch can be retried. `ON CONFLICT DO NOTHING` makes a key inserted
/// by a concurrent batch a no-op.
///
/// Returns the number of rows inserted.
#[instrument(skip(pool, records), fields(table = R::TABLE, count = records.len()))]
pub async fn upsert_batch<R: StoredRecord>(
    pool: &SqlitePool,
    records: &[R],
) -> Result<usize, DbError> {
    debug!("Beginning transaction to upsert {} records", records.len());
    let mut tx = pool.begin().await?;

    sqlx::query(R::CREATE_TABLE).execute(&mut *tx).await?;

    let mut known: HashSet<R::Key> = sqlx::query(R::SELECT_KEYS)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(R::key_from_row)
        .collect::<Result<_, _>>()?;
    debug!("Found {} existing keys", known.len());

    let mut pending = Vec::new();
    let mut null_keys = 0;
    let mut duplicates = 0;
    for record in records {
        match record.storage_key() {
            None => null_keys += 1,
            Some(key) => {
                if known.insert(key) {
                    pending.push(record);
                } else {
                    duplicates += 1;
                }
            }
        }
    }

    if null_keys > 0 {
        debug!("Dropped {} records with a null key", null_keys);
    }

    let mut inserted = 0;
    for record in pending {
        let result = record
            .bind_insert(sqlx::query(R::INSERT))
            .execute(&mut *tx)
            .await?;
        inserted += result.rows_affected() as usize;
    }

    tx.commit().await?;
    info!(
        "Inserted {} new records into {}, {} duplicates skipped",
        inserted,
        R::TABLE,
        duplicates
    );
    Ok(inserted)
}
