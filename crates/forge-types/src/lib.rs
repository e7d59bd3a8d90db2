//! Shared domain types for Forge.
//!
//! This crate contains the plain data types used across the Forge workspace:
//! checkpoint snapshots, recovery and engine configuration, run status,
//! lifecycle events, and the persistence error type.
//!
//! Zero runtime dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod recovery;
pub mod run;
pub mod snapshot;
