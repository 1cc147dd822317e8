//! # numhold core
//!
//! Lifecycle tracking for claimed numbers:
//!
//! ```text
//! waiting -> hold -> success | failed
//! ```
//!
//! - [`TransitionEngine`]: every state change as one guarded conditional
//!   write, safe under any number of concurrent operators.
//! - [`ExpirationScheduler`]: periodic hold expiry and stale-record purge.
//! - [`HoldConfig`]: the shared default hold duration.
//! - [`RecordStore`]: persistence boundary, with `SQLite` and in-memory
//!   implementations.
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` / `expect()` / `panic!()` outside tests
//! - No `unsafe`

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod clock;
pub mod engine;
mod error;
pub mod hold_config;
pub mod record;
pub mod scheduler;
pub mod settings;
pub mod status;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{HoldReceipt, TransitionEngine, DEFAULT_STORE_TIMEOUT};
pub use error::{Error, Result};
pub use hold_config::HoldConfig;
pub use record::{OperatorId, Page, Record, RecordId, Resolution};
pub use scheduler::{
    ExpirationScheduler, PurgeReport, SchedulerConfig, SchedulerHandle, SweepReport,
};
pub use settings::{load_settings, Settings};
pub use status::{RecordStatus, TransitionError};
pub use store::{
    DeletePredicate, MemoryRecordStore, RecordFilter, RecordStore, SqliteRecordStore,
};
