//! Record Status State Machine (Pure Domain Logic)
//!
//! This module contains the lifecycle state machine for tracked numbers:
//! - `RecordStatus` enum for record states
//! - Pure transition validation (no DB, no async, no side effects)
//!
//! # State Machine
//!
//! ```text
//! waiting -> hold -> success
//!              |
//!              +---> failed
//! ```
//!
//! Terminal states: `success`, `failed`
//!
//! Stores use [`RecordStatus::required_prior`] as the guard of their
//! conditional update, so the table below is the single source of truth for
//! which writes are allowed.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Error, Result};

/// Error type for invalid record state transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid state transition: cannot transition from {from} to {to}")]
pub struct TransitionError {
    pub from: RecordStatus,
    pub to: RecordStatus,
}

/// Lifecycle state of a tracked number.
///
/// Valid transitions:
/// - waiting -> hold
/// - hold -> success
/// - hold -> failed
///
/// There are no self-transitions: a second `hold` on a held record is a lost
/// race, not a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Queued, not yet claimed.
    Waiting,
    /// Reserved for a trial, optionally time-bounded.
    Hold,
    /// The hold ran its course or was accepted by an operator.
    Success,
    /// An operator rejected the number while it was held.
    Failed,
}

impl RecordStatus {
    /// Returns the string representation of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Hold => "hold",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Returns true if this status has no outgoing transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// The status a record must currently have to move into `target`.
    ///
    /// `None` for `Waiting`, which is only ever entered by insertion.
    #[must_use]
    pub const fn required_prior(target: Self) -> Option<Self> {
        match target {
            Self::Waiting => None,
            Self::Hold => Some(Self::Waiting),
            Self::Success | Self::Failed => Some(Self::Hold),
        }
    }

    /// Returns true if a transition from `self` to `target` is valid.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        self.validate_transition(target).is_ok()
    }

    /// Validates that a transition from `self` to `target` is allowed.
    pub fn validate_transition(&self, target: Self) -> std::result::Result<(), TransitionError> {
        match Self::required_prior(target) {
            Some(prior) if prior == *self => Ok(()),
            _ => Err(TransitionError {
                from: *self,
                to: target,
            }),
        }
    }

    /// Returns all statuses in lifecycle order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Waiting, Self::Hold, Self::Success, Self::Failed]
    }

    /// Position in the lifecycle; terminal states share the last rank.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::Hold => 1,
            Self::Success | Self::Failed => 2,
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "hold" => Ok(Self::Hold),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(Error::CorruptRecord(format!("Invalid record status: {s}"))),
        }
    }
}

impl TryFrom<String> for RecordStatus {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::from_str(&s)
    }
}
