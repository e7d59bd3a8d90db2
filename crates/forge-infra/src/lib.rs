//! Infrastructure layer for Forge.
//!
//! Implementations of the `SnapshotStore` port defined in `forge-core`
//! (in-memory, filesystem JSON, SQLite) plus configuration loading.

pub mod config;
pub mod file;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use file::FileSnapshotStore;
pub use memory::InMemorySnapshotStore;
pub use sqlite::SqliteSnapshotStore;
pub use store::{StoreKind, open_store};
