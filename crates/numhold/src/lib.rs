//! numhold CLI library interface
//!
//! Exposes the command layer so integration tests can drive it without
//! spawning the binary.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod cli;
pub mod commands;
pub mod output;
