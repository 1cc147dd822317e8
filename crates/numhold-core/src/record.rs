//! Record types for tracked numbers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{status::RecordStatus, Error, Result};

/// Longest accepted number key, in characters.
pub const MAX_NUMBER_LEN: usize = 64;

/// Store-assigned record identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(i64);

impl RecordId {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an operator (the person or process acting on records).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperatorId(String);

impl OperatorId {
    /// Create a new operator ID
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tracked number and its lifecycle metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub number: String,
    pub owner_id: OperatorId,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub hold_start: Option<DateTime<Utc>>,
    /// `None` while the hold is indefinite.
    pub hold_end: Option<DateTime<Utc>>,
    /// Duration captured when the hold was taken; `None` means indefinite.
    #[serde(with = "opt_duration_ms")]
    pub hold_duration: Option<Duration>,
    pub hold_set_by: Option<OperatorId>,
    /// Time spent in `Hold`, set when the record is resolved.
    #[serde(with = "opt_duration_ms")]
    pub elapsed_hold_time: Option<Duration>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Time spent in hold so far, for records still in `Hold`.
    #[must_use]
    pub fn hold_elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self.status {
            RecordStatus::Hold => self.hold_start.map(|start| now - start),
            _ => self.elapsed_hold_time,
        }
    }

    /// When this hold comes due, given the current default duration.
    ///
    /// A captured `hold_duration` wins; otherwise `default` applies. `None`
    /// when the record is not held, neither duration is known, or the
    /// deadline falls outside the representable range (never due).
    #[must_use]
    pub fn hold_deadline(&self, default: Option<Duration>) -> Option<DateTime<Utc>> {
        if self.status != RecordStatus::Hold {
            return None;
        }
        let start = self.hold_start?;
        self.hold_duration
            .or(default)
            .and_then(|d| start.checked_add_signed(d))
    }
}

/// A record about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub number: String,
    pub owner_id: OperatorId,
    pub created_at: DateTime<Utc>,
}

/// Field changes applied by a conditional update.
///
/// The store applies exactly one variant, and only when the row's current
/// status equals the update's guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordUpdate {
    /// `waiting -> hold`.
    TakeHold {
        hold_start: DateTime<Utc>,
        hold_duration: Option<Duration>,
        hold_set_by: OperatorId,
    },
    /// `hold -> success | failed`. The store derives `elapsed_hold_time`
    /// from the stored `hold_start` inside the same write.
    Resolve {
        status: RecordStatus,
        resolved_at: DateTime<Utc>,
    },
}

impl RecordUpdate {
    /// Status the record ends in after this update.
    #[must_use]
    pub const fn target(&self) -> RecordStatus {
        match self {
            Self::TakeHold { .. } => RecordStatus::Hold,
            Self::Resolve { status, .. } => *status,
        }
    }

    /// Hold end implied by a `TakeHold` update. `None` when the end would
    /// overflow the calendar.
    #[must_use]
    pub fn hold_end(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::TakeHold {
                hold_start,
                hold_duration,
                ..
            } => hold_duration.and_then(|d| hold_start.checked_add_signed(d)),
            Self::Resolve { .. } => None,
        }
    }
}

/// Outcome of a successful `MarkSuccess` / `MarkFailed`.
///
/// Carries what a notification layer needs to report the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub number: String,
    pub status: RecordStatus,
    pub owner_id: OperatorId,
    pub hold_set_by: Option<OperatorId>,
    #[serde(with = "duration_ms")]
    pub elapsed_hold_time: Duration,
    pub resolved_at: DateTime<Utc>,
}

impl TryFrom<Record> for Resolution {
    type Error = Error;

    fn try_from(record: Record) -> Result<Self> {
        let (Some(elapsed_hold_time), Some(resolved_at)) =
            (record.elapsed_hold_time, record.resolved_at)
        else {
            return Err(Error::CorruptRecord(format!(
                "resolved number '{}' has no elapsed hold time",
                record.number
            )));
        };
        Ok(Self {
            number: record.number,
            status: record.status,
            owner_id: record.owner_id,
            hold_set_by: record.hold_set_by,
            elapsed_hold_time,
            resolved_at,
        })
    }
}

/// One page of records plus the total matching the filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub records: Vec<Record>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl Page {
    /// Number of pages needed to show `total` records.
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.page_size))
    }
}

/// Validate and normalize a number key.
pub fn normalize_number(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidNumber(
            "number cannot be empty or whitespace-only".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_NUMBER_LEN {
        return Err(Error::InvalidNumber(format!(
            "number is longer than {MAX_NUMBER_LEN} characters"
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(Error::InvalidNumber(
            "number cannot contain control characters".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Serialize a `chrono::Duration` as signed milliseconds.
mod duration_ms {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        i64::deserialize(d).map(Duration::milliseconds)
    }
}

mod opt_duration_ms {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.num_milliseconds()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<i64>::deserialize(d).map(|ms| ms.map(Duration::milliseconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held_record(start: DateTime<Utc>, duration: Option<Duration>) -> Record {
        Record {
            id: RecordId::new(1),
            number: "555".to_string(),
            owner_id: OperatorId::new("alice"),
            status: RecordStatus::Hold,
            created_at: start,
            hold_start: Some(start),
            hold_end: duration.map(|d| start + d),
            hold_duration: duration,
            hold_set_by: Some(OperatorId::new("bob")),
            elapsed_hold_time: None,
            resolved_at: None,
        }
    }

    #[test]
    fn test_normalize_number_trims() -> Result<()> {
        assert_eq!(normalize_number("  +7 900 123 \n")?, "+7 900 123");
        Ok(())
    }

    #[test]
    fn test_normalize_number_rejects_empty_and_long() {
        assert!(matches!(normalize_number("   "), Err(Error::InvalidNumber(_))));
        let long = "9".repeat(MAX_NUMBER_LEN + 1);
        assert!(matches!(normalize_number(&long), Err(Error::InvalidNumber(_))));
        assert!(normalize_number(&"9".repeat(MAX_NUMBER_LEN)).is_ok());
    }

    #[test]
    fn test_captured_duration_beats_default() {
        let start = Utc::now();
        let record = held_record(start, Some(Duration::hours(2)));
        assert_eq!(
            record.hold_deadline(Some(Duration::hours(5))),
            Some(start + Duration::hours(2))
        );
    }

    #[test]
    fn test_indefinite_hold_falls_back_to_default() {
        let start = Utc::now();
        let record = held_record(start, None);
        assert_eq!(record.hold_deadline(None), None);
        assert_eq!(
            record.hold_deadline(Some(Duration::hours(3))),
            Some(start + Duration::hours(3))
        );
    }

    #[test]
    fn test_take_hold_update_computes_end() {
        let start = Utc::now();
        let update = RecordUpdate::TakeHold {
            hold_start: start,
            hold_duration: Some(Duration::minutes(90)),
            hold_set_by: OperatorId::new("bob"),
        };
        assert_eq!(update.target(), RecordStatus::Hold);
        assert_eq!(update.hold_end(), Some(start + Duration::minutes(90)));
    }

    #[test]
    fn test_unrepresentable_deadline_is_never_due() {
        let start = Utc::now();
        let huge = Duration::days(200_000_000);
        let record = held_record(start, None);
        assert_eq!(record.hold_deadline(Some(huge)), None);

        let update = RecordUpdate::TakeHold {
            hold_start: start,
            hold_duration: Some(huge),
            hold_set_by: OperatorId::new("bob"),
        };
        assert_eq!(update.hold_end(), None);
    }

    #[test]
    fn test_resolution_requires_elapsed_time() {
        let record = held_record(Utc::now(), None);
        assert!(matches!(
            Resolution::try_from(record),
            Err(Error::CorruptRecord(_))
        ));
    }

    #[test]
    fn test_durations_serialize_as_milliseconds() -> std::result::Result<(), serde_json::Error> {
        let record = held_record(Utc::now(), Some(Duration::seconds(90)));
        let json = serde_json::to_value(&record)?;
        assert_eq!(json["hold_duration"], 90_000);
        assert_eq!(json["status"], "hold");
        assert!(json["elapsed_hold_time"].is_null());

        let back: Record = serde_json::from_value(json)?;
        assert_eq!(back.hold_duration, Some(Duration::seconds(90)));
        Ok(())
    }

    #[test]
    fn test_total_pages_rounds_up() {
        let page = Page {
            records: Vec::new(),
            total: 21,
            page: 1,
            page_size: 10,
        };
        assert_eq!(page.total_pages(), 3);
    }
}
