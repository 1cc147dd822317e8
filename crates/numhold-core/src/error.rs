//! Error types for numhold-core.
//!
//! Errors fall into two groups:
//!
//! - **Business outcomes**: `DuplicateNumber`, `NotFound`, `PreconditionFailed`,
//!   `InvalidNumber`, `InvalidConfig`. Expected results of an operation that
//!   callers branch on.
//! - **Infrastructure failures**: `StorageUnavailable`, `CorruptRecord`. The
//!   store could not be reached or returned something undecodable.

use thiserror::Error;

use crate::status::RecordStatus;

/// Core error type for numhold operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// A record with this number already exists, in any status.
    #[error("number '{0}' already exists")]
    DuplicateNumber(String),

    /// No record with this number exists.
    #[error("number '{0}' not found")]
    NotFound(String),

    /// The record exists but its status did not match the transition guard.
    #[error("number '{number}' is {actual}, expected {expected}")]
    PreconditionFailed {
        number: String,
        expected: RecordStatus,
        actual: RecordStatus,
    },

    /// The number key is empty or malformed.
    #[error("invalid number: {0}")]
    InvalidNumber(String),

    /// A configuration value or argument is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The store could not be reached, timed out, or rejected the statement.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A stored row could not be decoded into a record.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}

impl Error {
    /// True for outcomes an operation is expected to produce in normal use.
    #[must_use]
    pub const fn is_business_outcome(&self) -> bool {
        matches!(
            self,
            Self::DuplicateNumber(_)
                | Self::NotFound(_)
                | Self::PreconditionFailed { .. }
                | Self::InvalidNumber(_)
                | Self::InvalidConfig(_)
        )
    }

    /// True when retrying later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }

    /// True when a guarded transition lost to a concurrent writer.
    #[must_use]
    pub const fn is_lost_race(&self) -> bool {
        matches!(self, Self::PreconditionFailed { .. })
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DuplicateNumber(_) => "DUPLICATE_NUMBER",
            Self::NotFound(_) => "NOT_FOUND",
            Self::PreconditionFailed { .. } => "PRECONDITION_FAILED",
            Self::InvalidNumber(_) => "INVALID_NUMBER",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Self::CorruptRecord(_) => "CORRUPT_RECORD",
        }
    }

    /// Process exit code for the CLI.
    ///
    /// - 1: business outcome (duplicate, missing, wrong state, bad input)
    /// - 3: storage failure
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.is_business_outcome() {
            1
        } else {
            3
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::CorruptRecord(err.to_string())
            }
            other => Self::StorageUnavailable(other.to_string()),
        }
    }
}

/// Result type alias for numhold-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_outcomes_are_not_transient() {
        let outcomes = [
            Error::DuplicateNumber("1".into()),
            Error::NotFound("1".into()),
            Error::PreconditionFailed {
                number: "1".into(),
                expected: RecordStatus::Waiting,
                actual: RecordStatus::Hold,
            },
            Error::InvalidConfig("negative".into()),
        ];
        for err in outcomes {
            assert!(err.is_business_outcome(), "{err}");
            assert!(!err.is_transient(), "{err}");
            assert_eq!(err.exit_code(), 1);
        }
    }

    #[test]
    fn test_storage_errors_are_transient() {
        let err = Error::StorageUnavailable("timed out".into());
        assert!(err.is_transient());
        assert!(!err.is_business_outcome());
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_precondition_message_names_both_states() {
        let err = Error::PreconditionFailed {
            number: "555".into(),
            expected: RecordStatus::Hold,
            actual: RecordStatus::Failed,
        };
        assert_eq!(err.to_string(), "number '555' is failed, expected hold");
        assert!(err.is_lost_race());
    }
}
