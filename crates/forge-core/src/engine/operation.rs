//! Operation trait, its object-safe companion and a closure-backed implementation.
//!
//! Same layering as the other dynamic-dispatch seams in this crate:
//! 1. [`Operation`] uses native async fn in traits (RPITIT)
//! 2. [`OperationDyn`] is blanket-implemented with boxed futures
//! 3. [`BoxOperation`] wraps `Arc<dyn OperationDyn>` so workflows can hold
//!    heterogeneous operations and share them between workflows

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::BoxFuture;
use super::error::OperationError;
use super::foundry::Foundry;
use super::identity::StableKey;

/// A single unit of work with an optional compensating action.
///
/// `forge` receives the previous operation's output (or the run input) and
/// returns the value handed to the next operation. `restore` receives the
/// output `forge` produced and undoes its effects. Operations that cannot be
/// undone keep the default no-op `restore`.
pub trait Operation: Send + Sync {
    /// Human-readable name used in logs, events and errors.
    fn name(&self) -> &str;

    /// Stable identifier. Defaults to a name-derived UUID.
    fn id(&self) -> Uuid {
        StableKey::derive(self.name())
    }

    /// Whether `restore` does anything. Informational only; compensation
    /// invokes `restore` on every completed operation regardless.
    fn supports_restore(&self) -> bool {
        false
    }

    /// Execute the forward action.
    fn forge(
        &self,
        input: Value,
        foundry: &mut Foundry,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Value, OperationError>> + Send;

    /// Undo the forward action given the output it produced.
    fn restore(
        &self,
        output: Value,
        foundry: &mut Foundry,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), OperationError>> + Send {
        let _ = (output, foundry, cancel);
        async { Ok(()) }
    }
}

/// Object-safe version of [`Operation`] with boxed futures.
pub trait OperationDyn: Send + Sync {
    fn name(&self) -> &str;

    fn id(&self) -> Uuid;

    fn supports_restore(&self) -> bool;

    fn forge_boxed<'a>(
        &'a self,
        input: Value,
        foundry: &'a mut Foundry,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value, OperationError>>;

    fn restore_boxed<'a>(
        &'a self,
        output: Value,
        foundry: &'a mut Foundry,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), OperationError>>;
}

impl<T: Operation> OperationDyn for T {
    fn name(&self) -> &str {
        Operation::name(self)
    }

    fn id(&self) -> Uuid {
        Operation::id(self)
    }

    fn supports_restore(&self) -> bool {
        Operation::supports_restore(self)
    }

    fn forge_boxed<'a>(
        &'a self,
        input: Value,
        foundry: &'a mut Foundry,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value, OperationError>> {
        Box::pin(self.forge(input, foundry, cancel))
    }

    fn restore_boxed<'a>(
        &'a self,
        output: Value,
        foundry: &'a mut Foundry,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), OperationError>> {
        Box::pin(self.restore(output, foundry, cancel))
    }
}

/// Type-erased, cheaply clonable operation.
#[derive(Clone)]
pub struct BoxOperation {
    inner: Arc<dyn OperationDyn>,
}

impl BoxOperation {
    pub fn new<T: Operation + 'static>(operation: T) -> Self {
        Self {
            inner: Arc::new(operation),
        }
    }

    /// Wrap an operation that is already shared elsewhere.
    pub fn shared<T: Operation + 'static>(operation: Arc<T>) -> Self {
        Self { inner: operation }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn id(&self) -> Uuid {
        self.inner.id()
    }

    pub fn supports_restore(&self) -> bool {
        self.inner.supports_restore()
    }

    /// Call the forward action directly, bypassing any middleware.
    pub async fn forge(
        &self,
        input: Value,
        foundry: &mut Foundry,
        cancel: &CancellationToken,
    ) -> Result<Value, OperationError> {
        self.inner.forge_boxed(input, foundry, cancel).await
    }

    pub async fn restore(
        &self,
        output: Value,
        foundry: &mut Foundry,
        cancel: &CancellationToken,
    ) -> Result<(), OperationError> {
        self.inner.restore_boxed(output, foundry, cancel).await
    }

    pub(crate) fn forge_boxed<'a>(
        &'a self,
        input: Value,
        foundry: &'a mut Foundry,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value, OperationError>> {
        self.inner.forge_boxed(input, foundry, cancel)
    }
}

impl std::fmt::Debug for BoxOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxOperation")
            .field("name", &self.name())
            .field("id", &self.id())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// FnOperation
// ---------------------------------------------------------------------------

type ForwardFn = dyn Fn(Value, &mut Foundry) -> Result<Value, OperationError> + Send + Sync;
type RestoreFn = dyn Fn(Value, &mut Foundry) -> Result<(), OperationError> + Send + Sync;

/// Operation built from synchronous closures.
///
/// ```ignore
/// let reserve = FnOperation::new("reserve-stock", |order, foundry| {
///     foundry.set("reserved", true);
///     Ok(order)
/// })
/// .with_restore(|_, foundry| {
///     foundry.set("reserved", false);
///     Ok(())
/// });
/// ```
#[derive(Clone)]
pub struct FnOperation {
    id: Uuid,
    name: String,
    forward: Arc<ForwardFn>,
    restore: Option<Arc<RestoreFn>>,
}

impl FnOperation {
    pub fn new<F>(name: impl Into<String>, forward: F) -> Self
    where
        F: Fn(Value, &mut Foundry) -> Result<Value, OperationError> + Send + Sync + 'static,
    {
        let name = name.into();
        Self {
            id: StableKey::derive(&name),
            name,
            forward: Arc::new(forward),
            restore: None,
        }
    }

    /// Attach a compensating action.
    pub fn with_restore<R>(mut self, restore: R) -> Self
    where
        R: Fn(Value, &mut Foundry) -> Result<(), OperationError> + Send + Sync + 'static,
    {
        self.restore = Some(Arc::new(restore));
        self
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }
}

impl Operation for FnOperation {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn supports_restore(&self) -> bool {
        self.restore.is_some()
    }

    async fn forge(
        &self,
        input: Value,
        foundry: &mut Foundry,
        cancel: &CancellationToken,
    ) -> Result<Value, OperationError> {
        if cancel.is_cancelled() {
            return Err(OperationError::Cancelled);
        }
        (self.forward)(input, foundry)
    }

    async fn restore(
        &self,
        output: Value,
        foundry: &mut Foundry,
        _cancel: &CancellationToken,
    ) -> Result<(), OperationError> {
        match &self.restore {
            Some(restore) => restore(output, foundry),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for FnOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnOperation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("supports_restore", &self.restore.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
