//! Process-wide default hold duration.
//!
//! One nullable duration, read concurrently by every `take_hold` that omits a
//! duration and by the hold-expiry sweep. Stored as an atomic millisecond
//! count; a negative value means "indefinite".

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Duration;

use crate::{Error, Result};

const INDEFINITE: i64 = -1;

/// Longest accepted hold, in days (ten years).
pub const MAX_HOLD_DAYS: i64 = 365 * 10;

/// Accept `d` as a hold duration: zero or more, at most [`MAX_HOLD_DAYS`].
pub(crate) fn check_hold_duration(what: &str, d: Duration) -> Result<Duration> {
    if d < Duration::zero() {
        return Err(Error::InvalidConfig(format!(
            "{what} cannot be negative ({}ms)",
            d.num_milliseconds()
        )));
    }
    if d > Duration::days(MAX_HOLD_DAYS) {
        return Err(Error::InvalidConfig(format!(
            "{what} cannot exceed {MAX_HOLD_DAYS} days"
        )));
    }
    Ok(d)
}

/// Shared default hold duration.
#[derive(Debug)]
pub struct HoldConfig {
    default_ms: AtomicI64,
}

impl Default for HoldConfig {
    fn default() -> Self {
        Self::indefinite()
    }
}

impl HoldConfig {
    /// A config whose default hold is indefinite.
    #[must_use]
    pub const fn indefinite() -> Self {
        Self {
            default_ms: AtomicI64::new(INDEFINITE),
        }
    }

    /// A config seeded with `default`.
    pub fn with_default(default: Option<Duration>) -> Result<Self> {
        let config = Self::indefinite();
        config.set(default)?;
        Ok(config)
    }

    /// Current default; `None` means holds without an explicit duration never
    /// expire.
    #[must_use]
    pub fn get(&self) -> Option<Duration> {
        let ms = self.default_ms.load(Ordering::Acquire);
        (ms >= 0).then(|| Duration::milliseconds(ms))
    }

    /// Replace the default. Negative or over-long durations are rejected and
    /// leave the current value untouched.
    pub fn set(&self, default: Option<Duration>) -> Result<()> {
        let ms = match default {
            Some(d) => check_hold_duration("default hold duration", d)?.num_milliseconds(),
            None => INDEFINITE,
        };
        self.default_ms.store(ms, Ordering::Release);
        Ok(())
    }

    /// Make the default indefinite.
    pub fn clear(&self) {
        self.default_ms.store(INDEFINITE, Ordering::Release);
    }
}
