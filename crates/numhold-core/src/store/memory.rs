//! In-process record store.
//!
//! All operations take one async mutex, which makes each call atomic with
//! respect to every other call, matching the per-row atomicity the `SQLite`
//! store gets from single statements.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::{DeletePredicate, RecordFilter, RecordStore};
use crate::{
    record::{NewRecord, Record, RecordId, RecordUpdate},
    status::RecordStatus,
    Error, Result,
};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    by_number: BTreeMap<String, Record>,
}

/// Record store backed by an in-memory map.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    state: Mutex<State>,
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted(mut records: Vec<Record>) -> Vec<Record> {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    records
}

fn apply(record: &mut Record, update: RecordUpdate) -> Result<()> {
    let hold_end = update.hold_end();
    match update {
        RecordUpdate::TakeHold {
            hold_start,
            hold_duration,
            hold_set_by,
        } => {
            record.status = RecordStatus::Hold;
            record.hold_start = Some(hold_start);
            record.hold_end = hold_end;
            record.hold_duration = hold_duration;
            record.hold_set_by = Some(hold_set_by);
        }
        RecordUpdate::Resolve {
            status,
            resolved_at,
        } => {
            let hold_start = record.hold_start.ok_or_else(|| {
                Error::CorruptRecord(format!(
                    "held number '{}' has no hold start",
                    record.number
                ))
            })?;
            record.status = status;
            record.resolved_at = Some(resolved_at);
            record.elapsed_hold_time = Some(resolved_at - hold_start);
        }
    }
    Ok(())
}

#[async_trait::async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_unique(&self, record: NewRecord) -> Result<RecordId> {
        let mut state = self.state.lock().await;
        if state.by_number.contains_key(&record.number) {
            return Err(Error::DuplicateNumber(record.number));
        }
        state.next_id += 1;
        let id = RecordId::new(state.next_id);
        state.by_number.insert(
            record.number.clone(),
            Record {
                id,
                number: record.number,
                owner_id: record.owner_id,
                status: RecordStatus::Waiting,
                created_at: record.created_at,
                hold_start: None,
                hold_end: None,
                hold_duration: None,
                hold_set_by: None,
                elapsed_hold_time: None,
                resolved_at: None,
            },
        );
        Ok(id)
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

        let mut state = self.state.lock().await;
        let Some(record) = state.by_number.get_mut(number) else {
            return Ok(None);
        };
        if record.status != expected {
            return Ok(None);
        }
        let mut updated = record.clone();
        apply(&mut updated, update)?;
        *record = updated.clone();
        Ok(Some(updated))
    }

    async fn get(&self, number: &str) -> Result<Option<Record>> {
        Ok(self.state.lock().await.by_number.get(number).cloned())
    }

    async fn query_page(
        &self,
        filter: &RecordFilter,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<Record>> {
        let state = self.state.lock().await;
        let matching = state
            .by_number
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let take = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(sorted(matching).into_iter().skip(skip).take(take).collect())
    }

    async fn count(&self, filter: &RecordFilter) -> Result<u64> {
        let state = self.state.lock().await;
        let n = state.by_number.values().filter(|r| filter.matches(r)).count();
        Ok(u64::try_from(n).unwrap_or(u64::MAX))
    }

    async fn due_holds(
        &self,
        now: DateTime<Utc>,
        default: Option<Duration>,
    ) -> Result<Vec<Record>> {
        let state = self.state.lock().await;
        let due = state
            .by_number
            .values()
            .filter(|r| r.hold_deadline(default).is_some_and(|deadline| deadline <= now))
            .cloned()
            .collect();
        Ok(sorted(due))
    }

    async fn delete_where(&self, predicate: DeletePredicate) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.by_number.len();
        state.by_number.retain(|_, r| !predicate.matches(r));
        let removed = before - state.by_number.len();
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}
