//! `SQLite` record store using `SQLx`.
//!
//! - Connection pooling (no Arc<Mutex<>>)
//! - Simple embedded schema (no migration files)
//! - Every status change is one `UPDATE ... WHERE number = ? AND status = ?
//!   RETURNING ...` statement, so the guard and the write are atomic
//! - Timestamps and durations are stored as epoch / span milliseconds

use std::{path::Path, str::FromStr, time::Duration as StdDuration};

use chrono::{DateTime, Duration, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

use super::{DeletePredicate, RecordFilter, RecordStore};
use crate::{
    record::{NewRecord, Record, RecordId, RecordUpdate},
    status::RecordStatus,
    Error, OperatorId, Result,
};

/// Database schema as SQL string - executed once on open
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS numbers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    number TEXT NOT NULL UNIQUE,
    owner_id TEXT NOT NULL,
    status TEXT NOT NULL CHECK(status IN ('waiting', 'hold', 'success', 'failed')),
    created_at INTEGER NOT NULL,
    hold_start INTEGER,
    hold_end INTEGER,
    hold_duration_ms INTEGER,
    hold_set_by TEXT,
    elapsed_hold_ms INTEGER,
    resolved_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_numbers_status ON numbers(status);
CREATE INDEX IF NOT EXISTS idx_numbers_created_at ON numbers(created_at);
CREATE INDEX IF NOT EXISTS idx_numbers_owner ON numbers(owner_id);
";

const COLUMNS: &str = "id, number, owner_id, status, created_at, hold_start, hold_end, \
                       hold_duration_ms, hold_set_by, elapsed_hold_ms, resolved_at";

/// Busy timeout for writers waiting on another connection's lock.
const BUSY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// A row in the numbers table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct RecordRow {
    id: i64,
    number: String,
    owner_id: String,
    status: String,
    created_at: i64,
    hold_start: Option<i64>,
    hold_end: Option<i64>,
    hold_duration_ms: Option<i64>,
    hold_set_by: Option<String>,
    elapsed_hold_ms: Option<i64>,
    resolved_at: Option<i64>,
}

fn timestamp(ms: i64, column: &str) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::CorruptRecord(format!("{column} out of range: {ms}")))
}

fn opt_timestamp(ms: Option<i64>, column: &str) -> Result<Option<DateTime<Utc>>> {
    ms.map(|ms| timestamp(ms, column)).transpose()
}

impl TryFrom<RecordRow> for Record {
    type Error = Error;

    fn try_from(row: RecordRow) -> Result<Self> {
        Ok(Self {
            id: RecordId::new(row.id),
            status: RecordStatus::from_str(&row.status)?,
            created_at: timestamp(row.created_at, "created_at")?,
            hold_start: opt_timestamp(row.hold_start, "hold_start")?,
            hold_end: opt_timestamp(row.hold_end, "hold_end")?,
            hold_duration: row.hold_duration_ms.map(Duration::milliseconds),
            hold_set_by: row.hold_set_by.map(OperatorId::new),
            elapsed_hold_time: row.elapsed_hold_ms.map(Duration::milliseconds),
            resolved_at: opt_timestamp(row.resolved_at, "resolved_at")?,
            owner_id: OperatorId::new(row.owner_id),
            number: row.number,
        })
    }
}

fn decode_all(rows: Vec<RecordRow>) -> Result<Vec<Record>> {
    rows.into_iter().map(Record::try_from).collect()
}

/// Attach `context` to a driver error, keeping its classification.
fn db_error(context: &str, err: sqlx::Error) -> Error {
    match Error::from(err) {
        Error::StorageUnavailable(msg) => Error::StorageUnavailable(format!("{context}: {msg}")),
        Error::CorruptRecord(msg) => Error::CorruptRecord(format!("{context}: {msg}")),
        other => other,
    }
}

fn to_i64(value: u64, what: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::InvalidConfig(format!("{what} too large: {value}")))
}

/// Record store backed by an sqlx `SQLite` pool.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Get a reference to the underlying connection pool
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open or create a database file, enable WAL and initialize the schema.
    pub async fn open(path: &Path, max_connections: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::StorageUnavailable(format!("Failed to create parent directory: {e}"))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .min_connections(1)
            .acquire_timeout(BUSY_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| db_error("Failed to connect to database", e))?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database, for tests and throwaway use.
    ///
    /// Pinned to one connection that never expires, since every `SQLite`
    /// memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| db_error("Failed to create in-memory database", e))?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, initializing the schema if needed.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        init_schema(&pool).await?;
        Ok(Self { pool })
    }
}

/// Initialize database schema
async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA)
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|e| db_error("Failed to initialize schema", e))
}

#[async_trait::async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert_unique(&self, record: NewRecord) -> Result<RecordId> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO numbers (number, owner_id, status, created_at)
             VALUES (?1, ?2, 'waiting', ?3)
             RETURNING id",
        )
        .bind(&record.number)
        .bind(record.owner_id.as_str())
        .bind(record.created_at.timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map(RecordId::new)
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Error::DuplicateNumber(record.number.clone())
            }
            other => db_error("Failed to insert number", other),
        })
    }

    async fn conditional_update(
        &self,
        number: &str,
        expected: RecordStatus,
        update: RecordUpdate,
    ) -> Result<Option<Record>> {
        expected
            .validate_transition(update.target())
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        let hold_end = update.hold_end();
        let row: Option<RecordRow> = match update {
            RecordUpdate::TakeHold {
                hold_start,
                hold_duration,
                hold_set_by,
            } => {
                let sql = format!(
                    "UPDATE numbers
                     SET status = 'hold', hold_start = ?1, hold_end = ?2,
                         hold_duration_ms = ?3, hold_set_by = ?4
                     WHERE number = ?5 AND status = ?6
                     RETURNING {COLUMNS}"
                );
                sqlx::query_as(&sql)
                    .bind(hold_start.timestamp_millis())
                    .bind(hold_end.map(|t| t.timestamp_millis()))
                    .bind(hold_duration.map(|d| d.num_milliseconds()))
                    .bind(hold_set_by.as_str())
                    .bind(number)
                    .bind(expected.as_str())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| db_error("Failed to take hold", e))?
            }
            RecordUpdate::Resolve {
                status,
                resolved_at,
            } => {
                let sql = format!(
                    "UPDATE numbers
                     SET status = ?1, resolved_at = ?2, elapsed_hold_ms = ?2 - hold_start
                     WHERE number = ?3 AND status = ?4 AND hold_start IS NOT NULL
                     RETURNING {COLUMNS}"
                );
                sqlx::query_as(&sql)
                    .bind(status.as_str())
                    .bind(resolved_at.timestamp_millis())
                    .bind(number)
                    .bind(expected.as_str())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| db_error("Failed to resolve hold", e))?
            }
        };

        row.map(Record::try_from).transpose()
    }

    async fn get(&self, number: &str) -> Result<Option<Record>> {
        let sql = format!("SELECT {COLUMNS} FROM numbers WHERE number = ?1");
        let row: Option<RecordRow> = sqlx::query_as(&sql)
            .bind(number)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to get number", e))?;
        row.map(Record::try_from).transpose()
    }

    async fn query_page(
        &self,
        filter: &RecordFilter,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM numbers
             WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR owner_id = ?2)
             ORDER BY created_at ASC, id ASC
             LIMIT ?3 OFFSET ?4"
        );
        let rows: Vec<RecordRow> = sqlx::query_as(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.owner_id.as_ref().map(OperatorId::as_str))
            .bind(i64::from(limit))
            .bind(to_i64(offset, "offset")?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to query numbers", e))?;
        decode_all(rows)
    }

    async fn count(&self, filter: &RecordFilter) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM numbers
             WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR owner_id = ?2)",
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.owner_id.as_ref().map(OperatorId::as_str))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to count numbers", e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn due_holds(
        &self,
        now: DateTime<Utc>,
        default: Option<Duration>,
    ) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM numbers
             WHERE status = 'hold' AND hold_start IS NOT NULL
               AND ((hold_duration_ms IS NOT NULL AND hold_start + hold_duration_ms <= ?1)
                 OR (hold_duration_ms IS NULL AND ?2 IS NOT NULL AND hold_start + ?2 <= ?1))
             ORDER BY created_at ASC, id ASC"
        );
        let rows: Vec<RecordRow> = sqlx::query_as(&sql)
            .bind(now.timestamp_millis())
            .bind(default.map(|d| d.num_milliseconds()))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to query due holds", e))?;
        decode_all(rows)
    }

    async fn delete_where(&self, predicate: DeletePredicate) -> Result<u64> {
        let result = match predicate {
            DeletePredicate::Number(number) => {
                sqlx::query("DELETE FROM numbers WHERE number = ?1")
                    .bind(number)
                    .execute(&self.pool)
                    .await
            }
            DeletePredicate::CreatedBefore { status, cutoff } => {
                sqlx::query("DELETE FROM numbers WHERE status = ?1 AND created_at < ?2")
                    .bind(status.as_str())
                    .bind(cutoff.timestamp_millis())
                    .execute(&self.pool)
                    .await
            }
            DeletePredicate::All => sqlx::query("DELETE FROM numbers").execute(&self.pool).await,
        };
        result
            .map(|r| r.rows_affected())
            .map_err(|e| db_error("Failed to delete numbers", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(number: &str, owner: &str, created_at: DateTime<Utc>) -> NewRecord {
        NewRecord {
            number: number.to_string(),
            owner_id: OperatorId::new(owner),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_schema_init_is_idempotent() -> Result<()> {
        let store = SqliteRecordStore::in_memory().await?;
        init_schema(store.pool()).await?;
        assert_eq!(store.count(&RecordFilter::all()).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_unique_violation_maps_to_duplicate() -> Result<()> {
        let store = SqliteRecordStore::in_memory().await?;
        let now = Utc::now();
        store.insert_unique(new_record("123", "a", now)).await?;
        let second = store.insert_unique(new_record("123", "b", now)).await;
        assert_eq!(second, Err(Error::DuplicateNumber("123".to_string())));
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_computes_elapsed_in_store() -> Result<()> {
        let store = SqliteRecordStore::in_memory().await?;
        let start = timestamp(1_700_000_000_123, "start")?;
        store.insert_unique(new_record("9", "a", start)).await?;
        store
            .conditional_update(
                "9",
                RecordStatus::Waiting,
                RecordUpdate::TakeHold {
                    hold_start: start,
                    hold_duration: Some(Duration::hours(2)),
                    hold_set_by: OperatorId::new("admin"),
                },
            )
            .await?;

        let resolved = store
            .conditional_update(
                "9",
                RecordStatus::Hold,
                RecordUpdate::Resolve {
                    status: RecordStatus::Failed,
                    resolved_at: start + Duration::minutes(45),
                },
            )
            .await?
            .ok_or_else(|| Error::NotFound("9".into()))?;

        assert_eq!(resolved.status, RecordStatus::Failed);
        assert_eq!(resolved.elapsed_hold_time, Some(Duration::minutes(45)));
        assert_eq!(resolved.hold_end, Some(start + Duration::hours(2)));
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_status_is_reported() -> Result<()> {
        let store = SqliteRecordStore::in_memory().await?;
        sqlx::query("PRAGMA ignore_check_constraints = ON")
            .execute(store.pool())
            .await
            .map_err(|e| db_error("pragma", e))?;
        sqlx::query(
            "INSERT INTO numbers (number, owner_id, status, created_at) VALUES ('x', 'a', 'Холдинг', 0)",
        )
        .execute(store.pool())
        .await
        .map_err(|e| db_error("insert", e))?;

        assert!(matches!(store.get("x").await, Err(Error::CorruptRecord(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_file_database_persists_across_opens() -> Result<()> {
        let dir = tempfile::tempdir().map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        let path = dir.path().join("nested").join("numbers.db");

        {
            let store = SqliteRecordStore::open(&path, 2).await?;
            store.insert_unique(new_record("42", "a", Utc::now())).await?;
            store.pool().close().await;
        }

        let reopened = SqliteRecordStore::open(&path, 2).await?;
        let record = reopened.get("42").await?;
        assert_eq!(record.map(|r| r.owner_id), Some(OperatorId::new("a")));
        Ok(())
    }

    #[tokio::test]
    async fn test_filters_combine() -> Result<()> {
        let store = SqliteRecordStore::in_memory().await?;
        let now = Utc::now();
        store.insert_unique(new_record("1", "a", now)).await?;
        store.insert_unique(new_record("2", "b", now)).await?;
        store.insert_unique(new_record("3", "a", now)).await?;

        let by_owner = RecordFilter::all().with_owner(OperatorId::new("a"));
        assert_eq!(store.count(&by_owner).await?, 2);
        let held = by_owner.clone().with_status(RecordStatus::Hold);
        assert_eq!(store.count(&held).await?, 0);

        let page = store.query_page(&by_owner, 10, 0).await?;
        let numbers: Vec<_> = page.iter().map(|r| r.number.as_str()).collect();
        assert_eq!(numbers, vec!["1", "3"]);
        Ok(())
    }
}
