//! Observability setup for Forge binaries.
//!
//! Libraries in the workspace only emit `tracing` events; this crate owns
//! installing the subscriber that renders them.

pub mod tracing_setup;

pub use tracing_setup::{Verbosity, init_tracing, shutdown_tracing};
