//! Shared fixtures for forge-core integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use forge_core::engine::{Foundry, Operation, OperationError};
use forge_core::persistence::SnapshotStore;
use forge_types::error::PersistenceError;
use forge_types::snapshot::Snapshot;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// Ordered record of forward and restore calls.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

// ---------------------------------------------------------------------------
// Sightings
// ---------------------------------------------------------------------------

/// Values of one Foundry property as an operation saw them on entry, per call.
#[derive(Clone, Default)]
pub struct Sightings(Arc<Mutex<Vec<Option<Value>>>>);

impl Sightings {
    pub fn values(&self) -> Vec<Option<Value>> {
        self.0.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// StepOperation
// ---------------------------------------------------------------------------

/// Operation that appends its name to a JSON array input and journals calls.
///
/// `fail_times` forward failures happen before it starts succeeding;
/// `u32::MAX` means it always fails. A scribbling step writes its key to the
/// Foundry before each failure.
pub struct StepOperation {
    name: String,
    journal: Journal,
    fail_times: u32,
    failures: AtomicU32,
    restore_fails: bool,
    scribble: Option<String>,
    watch: Option<(String, Sightings)>,
}

impl StepOperation {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            fail_times: 0,
            failures: AtomicU32::new(0),
            restore_fails: false,
            scribble: None,
            watch: None,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_times = u32::MAX;
        self
    }

    pub fn flaky(mut self, times: u32) -> Self {
        self.fail_times = times;
        self
    }

    pub fn restore_fails(mut self) -> Self {
        self.restore_fails = true;
        self
    }

    pub fn scribbling(mut self, key: &str) -> Self {
        self.scribble = Some(key.to_string());
        self
    }

    pub fn watching(mut self, key: &str, sightings: &Sightings) -> Self {
        self.watch = Some((key.to_string(), sightings.clone()));
        self
    }
}

impl Operation for StepOperation {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_restore(&self) -> bool {
        true
    }

    async fn forge(
        &self,
        input: Value,
        foundry: &mut Foundry,
        _cancel: &CancellationToken,
    ) -> Result<Value, OperationError> {
        self.journal.push(format!("forge:{}", self.name));
        if let Some((key, sightings)) = &self.watch {
            sightings.0.lock().unwrap().push(foundry.get(key).cloned());
        }

        if self.failures.load(Ordering::SeqCst) < self.fail_times {
            self.failures.fetch_add(1, Ordering::SeqCst);
            if let Some(key) = &self.scribble {
                foundry.set(key.as_str(), true);
            }
            return Err(OperationError::failed(format!("{} failed", self.name)));
        }

        let mut trail = input.as_array().cloned().unwrap_or_default();
        trail.push(json!(self.name));
        foundry.set("progress", trail.len());
        Ok(Value::Array(trail))
    }

    async fn restore(
        &self,
        output: Value,
        _foundry: &mut Foundry,
        _cancel: &CancellationToken,
    ) -> Result<(), OperationError> {
        self.journal.push(format!("restore:{}:{}", self.name, output));
        if self.restore_fails {
            return Err(OperationError::failed(format!("{} restore failed", self.name)));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Minimal in-process snapshot store for engine tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<(Uuid, Uuid), Snapshot>>>,
    saves: Arc<AtomicU32>,
}

impl MemoryStore {
    pub fn get(&self, foundry_id: Uuid, workflow_id: Uuid) -> Option<Snapshot> {
        self.inner.lock().unwrap().get(&(foundry_id, workflow_id)).cloned()
    }

    pub fn insert(&self, snapshot: Snapshot) {
        self.inner
            .lock()
            .unwrap()
            .insert((snapshot.foundry_execution_id, snapshot.workflow_id), snapshot);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn save_count(&self) -> u32 {
        self.saves.load(Ordering::SeqCst)
    }
}

impl SnapshotStore for MemoryStore {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.insert(snapshot.clone());
        Ok(())
    }

    async fn try_load(
        &self,
        foundry_id: &Uuid,
        workflow_id: &Uuid,
    ) -> Result<Option<Snapshot>, PersistenceError> {
        Ok(self.get(*foundry_id, *workflow_id))
    }

    async fn delete(&self, foundry_id: &Uuid, workflow_id: &Uuid) -> Result<(), PersistenceError> {
        self.inner.lock().unwrap().remove(&(*foundry_id, *workflow_id));
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Snapshot>, PersistenceError> {
        Ok(self.inner.lock().unwrap().values().cloned().collect())
    }
}

/// Store whose writes always fail.
#[derive(Clone, Default)]
pub struct BrokenStore;

impl SnapshotStore for BrokenStore {
    async fn save(&self, _snapshot: &Snapshot) -> Result<(), PersistenceError> {
        Err(PersistenceError::Connection("disk unplugged".to_string()))
    }

    async fn try_load(
        &self,
        _foundry_id: &Uuid,
        _workflow_id: &Uuid,
    ) -> Result<Option<Snapshot>, PersistenceError> {
        Ok(None)
    }

    async fn delete(&self, _foundry_id: &Uuid, _workflow_id: &Uuid) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Snapshot>, PersistenceError> {
        Ok(Vec::new())
    }
}
