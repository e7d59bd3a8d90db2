//! Recovery across process restarts using durable snapshot stores.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use forge_core::engine::{FnOperation, ForgeError, Foundry, OperationError, Smith, Workflow};
use forge_core::persistence::BoxSnapshotStore;
use forge_infra::{FileSnapshotStore, StoreKind, open_store};
use forge_types::recovery::RecoveryPolicy;
use serde_json::{Value, json};

/// Three-step workflow whose middle step fails while `outage` is set.
fn workflow(outage: Arc<AtomicBool>, calls: Arc<std::sync::Mutex<Vec<String>>>) -> Workflow {
    let record = |name: &'static str, calls: Arc<std::sync::Mutex<Vec<String>>>| {
        move |input: Value, foundry: &mut Foundry| {
            calls.lock().unwrap().push(name.to_string());
            let mut trail = input.as_array().cloned().unwrap_or_default();
            trail.push(json!(name));
            foundry.set(format!("{name}.done"), true);
            Ok::<_, OperationError>(Value::Array(trail))
        }
    };

    let charge_calls = calls.clone();
    Workflow::builder("order-processing")
        .then(FnOperation::new("reserve", record("reserve", calls.clone())))
        .then(FnOperation::new("charge", move |input: Value, foundry: &mut Foundry| {
            charge_calls.lock().unwrap().push("charge".to_string());
            if outage.load(Ordering::SeqCst) {
                return Err(OperationError::failed("payment gateway unavailable"));
            }
            let mut trail = input.as_array().cloned().unwrap_or_default();
            trail.push(json!("charge"));
            foundry.set("charge.done", true);
            Ok(Value::Array(trail))
        }))
        .then(FnOperation::new("ship", record("ship", calls)))
        .build()
        .unwrap()
}

async fn resumes_after_restart(kind: StoreKind) {
    let data_dir = tempfile::tempdir().unwrap();
    let outage = Arc::new(AtomicBool::new(true));
    let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
    let policy = RecoveryPolicy::fixed(2, Duration::ZERO);

    // First process: the gateway is down for every attempt.
    {
        let store = open_store(kind, data_dir.path()).await.unwrap();
        let err = Smith::default()
            .run_with_recovery(
                &workflow(outage.clone(), calls.clone()),
                &mut Foundry::new(),
                &store,
                "order-1001",
                "order-processing",
                &policy,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::RecoveryExhausted { attempts: 2, .. }));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    // Second process: fresh store handle, Smith and Foundry; same keys.
    outage.store(false, Ordering::SeqCst);
    let store = open_store(kind, data_dir.path()).await.unwrap();
    let mut foundry = Foundry::new();
    let out = Smith::default()
        .run_with_recovery(
            &workflow(outage, calls.clone()),
            &mut foundry,
            &store,
            "order-1001",
            "order-processing",
            &policy,
        )
        .await
        .unwrap();

    assert_eq!(out, json!(["reserve", "charge", "ship"]));
    assert_eq!(
        *calls.lock().unwrap(),
        vec!["reserve", "charge", "charge", "charge", "ship"]
    );
    // Properties written before the restart were restored from the snapshot.
    assert_eq!(foundry.get_as::<bool>("reserve.done"), Some(true));
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn file_store_survives_restart() {
    resumes_after_restart(StoreKind::File).await;
}

#[tokio::test]
async fn sqlite_store_survives_restart() {
    resumes_after_restart(StoreKind::Sqlite).await;
}

#[tokio::test]
async fn file_store_can_be_shared_between_smiths() {
    let data_dir = tempfile::tempdir().unwrap();
    let store = BoxSnapshotStore::new(FileSnapshotStore::new(data_dir.path()));
    let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
    let wf = workflow(Arc::new(AtomicBool::new(false)), calls);

    let smith = Smith::default().with_store(store.clone());
    smith.run(&wf, &mut Foundry::new(), Value::Null).await.unwrap();

    assert!(store.list().await.unwrap().is_empty());
}
