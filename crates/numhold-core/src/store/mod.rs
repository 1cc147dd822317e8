//! Record Store Trait - Abstraction boundary for record persistence.
//!
//! The transition engine needs only a handful of primitives from storage:
//! unique insert, a status-guarded conditional update, point lookup, ordered
//! paged range queries, and predicate delete. Every status change goes
//! through [`RecordStore::conditional_update`]; no implementation may offer a
//! read-modify-write path for status.
//!
//! Implementations:
//! - [`SqliteRecordStore`]: `SQLite` via sqlx, shareable across processes.
//! - [`MemoryRecordStore`]: in-process map, for tests and embedding.

use chrono::{DateTime, Duration, Utc};

use crate::{
    record::{NewRecord, Record, RecordId, RecordUpdate},
    status::RecordStatus,
    OperatorId, Result,
};

mod memory;
mod sqlite;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

/// Conjunctive filter for range queries and counts. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub status: Option<RecordStatus>,
    pub owner_id: Option<OperatorId>,
}

impl RecordFilter {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_owner(mut self, owner_id: OperatorId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    /// Whether `record` satisfies every set field.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.status.map_or(true, |s| record.status == s)
            && self
                .owner_id
                .as_ref()
                .map_or(true, |o| &record.owner_id == o)
    }
}

/// Predicate for bulk deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletePredicate {
    /// Exactly the record with this number.
    Number(String),
    /// Records in `status` created strictly before `cutoff`.
    CreatedBefore {
        status: RecordStatus,
        cutoff: DateTime<Utc>,
    },
    /// Every record.
    All,
}

impl DeletePredicate {
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Number(number) => &record.number == number,
            Self::CreatedBefore { status, cutoff } => {
                record.status == *status && record.created_at < *cutoff
            }
            Self::All => true,
        }
    }
}

/// Persistence boundary for records.
///
/// # Error Handling
///
/// `insert_unique` reports a taken key as `Error::DuplicateNumber`. Every
/// other failure to reach or decode storage is `StorageUnavailable` or
/// `CorruptRecord`. A guard mismatch is not an error at this layer:
/// `conditional_update` returns `None`.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// Insert a `waiting` record; the number must not exist in any status.
    async fn insert_unique(&self, record: NewRecord) -> Result<RecordId>;

    /// Apply `update` to the record with `number` only if its status is
    /// `expected`, as one atomic write.
    ///
    /// Returns the updated record when one row changed, `None` when zero rows
    /// changed (absent key or guard mismatch).
    async fn conditional_update(
        &self,
        number: &str,
        expected: RecordStatus,
        update: RecordUpdate,
    ) -> Result<Option<Record>>;

    /// Point lookup by number.
    async fn get(&self, number: &str) -> Result<Option<Record>>;

    /// Records matching `filter`, ordered by `created_at` then `id`.
    async fn query_page(&self, filter: &RecordFilter, limit: u32, offset: u64)
        -> Result<Vec<Record>>;

    /// Count of records matching `filter`.
    async fn count(&self, filter: &RecordFilter) -> Result<u64>;

    /// Held records due at `now`: `hold_start + (hold_duration ?? default)
    /// <= now`. Records with neither duration are never due.
    async fn due_holds(&self, now: DateTime<Utc>, default: Option<Duration>)
        -> Result<Vec<Record>>;

    /// Delete every record matching `predicate`; returns rows removed.
    async fn delete_where(&self, predicate: DeletePredicate) -> Result<u64>;
}
