//! Snapshot persistence port.
//!
//! Defines the storage interface used for checkpointing and recovery.
//! Implementations (in-memory, file, SQLite) live in forge-infra.

pub mod box_store;
pub mod snapshot_store;

pub use box_store::{BoxSnapshotStore, SnapshotStoreDyn};
pub use snapshot_store::SnapshotStore;
