//! Guarded transition engine.
//!
//! Every state change is a single conditional write keyed on the expected
//! current status. The engine holds no locks of its own: when several
//! operators (or an operator and the expiration sweep) race on one number,
//! the store decides the winner and every loser gets
//! [`Error::PreconditionFailed`].
//!
//! A point lookup happens only after a guarded write changed nothing, to tell
//! a missing number from a lost race. Its result never feeds another write.

use std::{future::Future, sync::Arc, time::Duration as StdDuration};

use chrono::Duration;
use tracing::{debug, info, warn};

use crate::{
    clock::{Clock, SystemClock},
    hold_config::{check_hold_duration, HoldConfig},
    record::{normalize_number, NewRecord, Page, Record, RecordId, RecordUpdate, Resolution},
    status::RecordStatus,
    store::{DeletePredicate, RecordFilter, RecordStore},
    Error, OperatorId, Result,
};

/// Default bound on a single store call.
pub const DEFAULT_STORE_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// What `take_hold` recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldReceipt {
    pub record: Record,
}

/// Guarded state-change operations over a shared [`RecordStore`].
#[derive(Debug)]
pub struct TransitionEngine {
    store: Arc<dyn RecordStore>,
    config: Arc<HoldConfig>,
    clock: Arc<dyn Clock>,
    store_timeout: StdDuration,
}

impl TransitionEngine {
    /// Engine using the system clock and the default store timeout.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, config: Arc<HoldConfig>) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Replace the clock, e.g. with a `ManualClock` in tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bound every store call by `timeout`.
    #[must_use]
    pub const fn with_store_timeout(mut self, timeout: StdDuration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    #[must_use]
    pub fn hold_config(&self) -> &Arc<HoldConfig> {
        &self.config
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run a store call under the configured timeout.
    pub(crate) async fn bounded<T>(
        &self,
        op: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                if err.is_transient() {
                    warn!(op, error = %err, "Store call failed");
                }
                Err(err)
            }
            Err(_) => {
                let timeout_ms = u64::try_from(self.store_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(op, timeout_ms, "Store call timed out");
                Err(Error::StorageUnavailable(format!(
                    "{op} timed out after {timeout_ms}ms"
                )))
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // TRANSITIONS
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Add `number` to the waiting list on behalf of `owner`.
    ///
    /// Uniqueness is enforced by the store, so concurrent enqueues of the same
    /// number produce exactly one record.
    pub async fn enqueue(&self, owner: &OperatorId, number: &str) -> Result<RecordId> {
        let number = normalize_number(number)?;
        let record = NewRecord {
            number: number.clone(),
            owner_id: owner.clone(),
            created_at: self.clock.now(),
        };
        match self
            .bounded("enqueue", self.store.insert_unique(record))
            .await
        {
            Ok(id) => {
                info!(%number, owner = %owner, id = %id, "Number enqueued");
                Ok(id)
            }
            Err(err @ Error::DuplicateNumber(_)) => {
                debug!(%number, "Number already tracked");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Move `number` from `waiting` to `hold`.
    ///
    /// `duration = None` uses the current default from [`HoldConfig`]
    /// (captured into the record now, not re-read later).
    pub async fn take_hold(
        &self,
        number: &str,
        duration: Option<Duration>,
        set_by: &OperatorId,
    ) -> Result<HoldReceipt> {
        let duration = duration
            .map(|d| check_hold_duration("hold duration", d))
            .transpose()?;
        let hold_duration = duration.or_else(|| self.config.get());
        let hold_start = self.clock.now();
        if hold_duration.is_some_and(|d| hold_start.checked_add_signed(d).is_none()) {
            return Err(Error::InvalidConfig(format!(
                "hold taken at {hold_start} would end past the supported calendar"
            )));
        }
        let update = RecordUpdate::TakeHold {
            hold_start,
            hold_duration,
            hold_set_by: set_by.clone(),
        };

        let record = self.guarded(number, RecordStatus::Waiting, update).await?;
        info!(
            number = %record.number,
            set_by = %set_by,
            hold_ms = hold_duration.map(|d| d.num_milliseconds()),
            "Hold taken"
        );
        Ok(HoldReceipt { record })
    }

    /// Resolve a held number as `success`.
    pub async fn mark_success(&self, number: &str) -> Result<Resolution> {
        self.resolve(number, RecordStatus::Success).await
    }

    /// Resolve a held number as `failed`.
    pub async fn mark_failed(&self, number: &str) -> Result<Resolution> {
        self.resolve(number, RecordStatus::Failed).await
    }

    async fn resolve(&self, number: &str, status: RecordStatus) -> Result<Resolution> {
        let update = RecordUpdate::Resolve {
            status,
            resolved_at: self.clock.now(),
        };
        let record = self.guarded(number, RecordStatus::Hold, update).await?;
        let resolution = Resolution::try_from(record)?;
        info!(
            number = %resolution.number,
            status = %resolution.status,
            elapsed_ms = resolution.elapsed_hold_time.num_milliseconds(),
            "Hold resolved"
        );
        Ok(resolution)
    }

    /// Apply a guarded update and classify a miss.
    async fn guarded(
        &self,
        number: &str,
        expected: RecordStatus,
        update: RecordUpdate,
    ) -> Result<Record> {
        let number = number.trim();
        let target = update.target();
        let updated = self
            .bounded(
                "conditional_update",
                self.store.conditional_update(number, expected, update),
            )
            .await?;
        if let Some(record) = updated {
            return Ok(record);
        }

        match self.bounded("get", self.store.get(number)).await? {
            None => Err(Error::NotFound(number.to_string())),
            Some(current) => {
                debug!(
                    %number,
                    actual = %current.status,
                    %expected,
                    %target,
                    "Transition guard did not match"
                );
                Err(Error::PreconditionFailed {
                    number: number.to_string(),
                    expected,
                    actual: current.status,
                })
            }
        }
    }

    /// Delete `number` regardless of status.
    pub async fn remove(&self, number: &str) -> Result<()> {
        let number = number.trim();
        let removed = self
            .bounded(
                "remove",
                self.store
                    .delete_where(DeletePredicate::Number(number.to_string())),
            )
            .await?;
        if removed == 0 {
            return Err(Error::NotFound(number.to_string()));
        }
        info!(%number, "Number removed");
        Ok(())
    }

    /// Delete every record. Returns how many were removed.
    pub async fn clear_all(&self) -> Result<u64> {
        let removed = self
            .bounded("clear_all", self.store.delete_where(DeletePredicate::All))
            .await?;
        warn!(removed, "All numbers cleared");
        Ok(removed)
    }

    /// Set (or clear, with `None`) the default hold duration.
    pub fn set_default_hold_duration(&self, duration: Option<Duration>) -> Result<()> {
        self.config.set(duration)?;
        info!(
            default_ms = duration.map(|d| d.num_milliseconds()),
            "Default hold duration updated"
        );
        Ok(())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // QUERIES
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// One page of records in `status`. Pages are 1-based.
    pub async fn query_by_status(
        &self,
        status: RecordStatus,
        page: u32,
        page_size: u32,
    ) -> Result<Page> {
        self.page(RecordFilter::all().with_status(status), page, page_size)
            .await
    }

    /// One page of all records. Pages are 1-based.
    pub async fn query_all(&self, page: u32, page_size: u32) -> Result<Page> {
        self.page(RecordFilter::all(), page, page_size).await
    }

    async fn page(&self, filter: RecordFilter, page: u32, page_size: u32) -> Result<Page> {
        if page == 0 || page_size == 0 {
            return Err(Error::InvalidConfig(format!(
                "page and page size must be positive (page={page}, page_size={page_size})"
            )));
        }
        let offset = u64::from(page - 1) * u64::from(page_size);
        let records = self
            .bounded(
                "query_page",
                self.store.query_page(&filter, page_size, offset),
            )
            .await?;
        let total = self.bounded("count", self.store.count(&filter)).await?;
        Ok(Page {
            records,
            total,
            page,
            page_size,
        })
    }

    /// Look up a record by number.
    pub async fn find_by_number(&self, number: &str) -> Result<Record> {
        let number = number.trim();
        self.bounded("get", self.store.get(number))
            .await?
            .ok_or_else(|| Error::NotFound(number.to_string()))
    }

    /// Count records, optionally restricted to one owner and/or status.
    pub async fn count_records(
        &self,
        owner: Option<&OperatorId>,
        status: Option<RecordStatus>,
    ) -> Result<u64> {
        let filter = RecordFilter {
            status,
            owner_id: owner.cloned(),
        };
        self.bounded("count", self.store.count(&filter)).await
    }

    /// Every record owned by `owner`, optionally in one status.
    pub async fn list_by_owner(
        &self,
        owner: &OperatorId,
        status: Option<RecordStatus>,
    ) -> Result<Vec<Record>> {
        let filter = RecordFilter {
            status,
            owner_id: Some(owner.clone()),
        };
        let total = self.bounded("count", self.store.count(&filter)).await?;
        let limit = u32::try_from(total).unwrap_or(u32::MAX);
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.bounded("query_page", self.store.query_page(&filter, limit, 0))
            .await
    }
}
