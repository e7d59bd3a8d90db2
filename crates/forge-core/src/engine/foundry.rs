//! Foundry: the shared execution context threaded through every operation.
//!
//! A Foundry carries the run's execution id, a string-keyed property bag of
//! JSON values, the workflow currently executing, typed services and the
//! operation-level middleware chain. The Smith holds it by `&mut` for the
//! duration of a run; operations and middleware receive the same reference
//! in turn, so there is exactly one writer at a time.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use forge_types::run::RunStatus;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use super::definition::Workflow;
use super::middleware::{OperationMiddleware, OperationMiddlewareDyn};

/// Identity of the workflow a Foundry is currently running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowRef {
    pub id: Uuid,
    pub name: String,
    pub operation_count: usize,
}

impl From<&Workflow> for WorkflowRef {
    fn from(workflow: &Workflow) -> Self {
        Self {
            id: workflow.id(),
            name: workflow.name().to_string(),
            operation_count: workflow.len(),
        }
    }
}

/// Execution context shared by all operations of a run.
pub struct Foundry {
    execution_id: Uuid,
    pinned: bool,
    properties: HashMap<String, Value>,
    current_workflow: Option<WorkflowRef>,
    status: RunStatus,
    middleware: Vec<Arc<dyn OperationMiddlewareDyn>>,
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Foundry {
    /// Create an empty Foundry with a fresh execution id.
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::now_v7(),
            pinned: false,
            properties: HashMap::new(),
            current_workflow: None,
            status: RunStatus::NotStarted,
            middleware: Vec::new(),
            services: HashMap::new(),
        }
    }

    /// Create a Foundry whose execution id stays fixed across runs.
    pub fn with_execution_id(execution_id: Uuid) -> Self {
        let mut foundry = Self::new();
        foundry.pin_execution_id(execution_id);
        foundry
    }

    /// Seed the property bag.
    pub fn with_properties(mut self, properties: HashMap<String, Value>) -> Self {
        self.properties = properties;
        self
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Fix the execution id. Subsequent runs reuse it instead of generating a new one.
    pub fn pin_execution_id(&mut self, execution_id: Uuid) {
        self.execution_id = execution_id;
        self.pinned = true;
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Workflow currently being executed, if a run is in progress.
    pub fn current_workflow(&self) -> Option<&WorkflowRef> {
        self.current_workflow.as_ref()
    }

    /// Status of the most recent run.
    pub fn status(&self) -> RunStatus {
        self.status
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Read a property and deserialize it into `T`.
    ///
    /// Returns `None` when the key is missing or the value has a different shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.properties
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Read a typed property, falling back to `default`.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get_as(key).unwrap_or(default)
    }

    /// Set a property, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Serialize `value` and store it under `key`.
    pub fn set_json<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.properties.insert(key.into(), value);
        Ok(())
    }

    /// Remove a property. Returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.properties.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }

    pub fn clear_properties(&mut self) {
        self.properties.clear();
    }

    /// Merge restored properties into the bag; restored values win on conflict.
    pub fn restore_properties(&mut self, properties: HashMap<String, Value>) {
        self.properties.extend(properties);
    }

    // -----------------------------------------------------------------------
    // Services
    // -----------------------------------------------------------------------

    /// Register a shared service, replacing any previous one of the same type.
    pub fn insert_service<T: Send + Sync + 'static>(&mut self, service: Arc<T>) {
        self.services.insert(TypeId::of::<T>(), service);
    }

    /// Look up a service registered with [`Foundry::insert_service`].
    pub fn service<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|service| service.downcast::<T>().ok())
    }

    // -----------------------------------------------------------------------
    // Operation middleware
    // -----------------------------------------------------------------------

    /// Append a middleware to the operation chain. The first one added is outermost.
    pub fn use_middleware<M: OperationMiddleware + 'static>(&mut self, middleware: M) {
        self.middleware.push(Arc::new(middleware));
    }

    /// Append an already shared middleware.
    pub fn use_middleware_arc(&mut self, middleware: Arc<dyn OperationMiddlewareDyn>) {
        self.middleware.push(middleware);
    }

    pub fn operation_middleware(&self) -> &[Arc<dyn OperationMiddlewareDyn>] {
        &self.middleware
    }

    pub fn clear_middleware(&mut self) {
        self.middleware.clear();
    }

    // -----------------------------------------------------------------------
    // Run bookkeeping (driven by the Smith)
    // -----------------------------------------------------------------------

    pub(crate) fn begin_run(&mut self, workflow: WorkflowRef) {
        if !self.pinned {
            self.execution_id = Uuid::now_v7();
        }
        self.current_workflow = Some(workflow);
        self.status = RunStatus::Running;
    }

    pub(crate) fn set_status(&mut self, status: RunStatus) {
        self.status = status;
    }

    pub(crate) fn end_run(&mut self) {
        self.current_workflow = None;
    }
}

impl Default for Foundry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Foundry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Foundry")
            .field("execution_id", &self.execution_id)
            .field("pinned", &self.pinned)
            .field("properties", &self.properties)
            .field("current_workflow", &self.current_workflow)
            .field("status", &self.status)
            .field("middleware_count", &self.middleware.len())
            .field("service_count", &self.services.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn set_and_get_properties() {
        let mut foundry = Foundry::new();
        foundry.set("order_id", "ord-42");
        foundry.set("quantity", 3);

        assert_eq!(foundry.get("order_id"), Some(&json!("ord-42")));
        assert_eq!(foundry.get_as::<u32>("quantity"), Some(3));
        assert!(foundry.contains("quantity"));
        assert!(foundry.get("missing").is_none());
    }

    #[test]
    fn get_as_wrong_shape_is_none() {
        let mut foundry = Foundry::new();
        foundry.set("quantity", "three");
        assert_eq!(foundry.get_as::<u32>("quantity"), None);
        assert_eq!(foundry.get_or("quantity", 7u32), 7);
    }

    #[test]
    fn set_json_roundtrips_structs() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Reservation {
            sku: String,
            units: u32,
        }

        let mut foundry = Foundry::new();
        let reservation = Reservation {
            sku: "SKU-1".to_string(),
            units: 2,
        };
        foundry.set_json("reservation", &reservation).unwrap();
        assert_eq!(foundry.get_as::<Reservation>("reservation"), Some(reservation));
    }

    #[test]
    fn remove_reports_presence() {
        let mut foundry = Foundry::new();
        foundry.set("k", true);
        assert!(foundry.remove("k"));
        assert!(!foundry.remove("k"));
    }

    #[test]
    fn restore_properties_overwrites_conflicts() {
        let mut foundry = Foundry::new();
        foundry.set("a", 1);
        foundry.set("b", 1);

        let restored = HashMap::from([("b".to_string(), json!(2)), ("c".to_string(), json!(3))]);
        foundry.restore_properties(restored);

        assert_eq!(foundry.get_as::<i32>("a"), Some(1));
        assert_eq!(foundry.get_as::<i32>("b"), Some(2));
        assert_eq!(foundry.get_as::<i32>("c"), Some(3));
    }

    #[test]
    fn execution_id_refreshes_unless_pinned() {
        let workflow = WorkflowRef {
            id: Uuid::nil(),
            name: "wf".to_string(),
            operation_count: 1,
        };

        let mut foundry = Foundry::new();
        let first = foundry.execution_id();
        foundry.begin_run(workflow.clone());
        assert_ne!(foundry.execution_id(), first);
        assert_eq!(foundry.status(), RunStatus::Running);
        assert_eq!(foundry.current_workflow(), Some(&workflow));

        let pinned = Uuid::now_v7();
        let mut foundry = Foundry::with_execution_id(pinned);
        foundry.begin_run(workflow);
        assert_eq!(foundry.execution_id(), pinned);
        foundry.end_run();
        assert!(foundry.current_workflow().is_none());
    }

    #[test]
    fn services_are_typed() {
        struct Clock(u64);
        struct Ledger;

        let mut foundry = Foundry::new();
        foundry.insert_service(Arc::new(Clock(99)));

        assert_eq!(foundry.service::<Clock>().map(|c| c.0), Some(99));
        assert!(foundry.service::<Ledger>().is_none());
    }
}
