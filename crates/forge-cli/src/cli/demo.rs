//! Demonstration order workflow: reserve stock, charge payment, ship.
//!
//! Each step records its effect in Foundry properties and undoes it in
//! `restore`, so a failed run shows the rollback in the final property table.
//! Failures are injected with [`DemoFaults`].

use forge_core::engine::{RECOVERY_ATTEMPT_KEY, StableKey};
use forge_core::{Foundry, Operation, OperationError, Workflow};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Key the demo workflow is checkpointed under.
pub const WORKFLOW_KEY: &str = "order-fulfilment";

/// Failure injection for a demo run.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoFaults {
    /// Index of the step that always fails.
    pub fail_at: Option<usize>,
    /// Number of attempts on which the charge step fails before succeeding.
    pub flaky_charge: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Reserve,
    Charge,
    Ship,
}

impl Step {
    fn name(self) -> &'static str {
        match self {
            Step::Reserve => "reserve-stock",
            Step::Charge => "charge-payment",
            Step::Ship => "ship-order",
        }
    }
}

/// One step of the order workflow.
#[derive(Debug)]
struct OrderStep {
    step: Step,
    always_fails: bool,
    flaky: u32,
}

impl OrderStep {
    fn attempt(foundry: &Foundry) -> u32 {
        foundry.get_or(RECOVERY_ATTEMPT_KEY, 1)
    }
}

fn order_key(input: &Value) -> Result<String, OperationError> {
    input
        .get("order")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| OperationError::failed("input has no order key"))
}

impl Operation for OrderStep {
    fn name(&self) -> &str {
        self.step.name()
    }

    fn supports_restore(&self) -> bool {
        self.step != Step::Ship
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
        if self.always_fails {
            return Err(OperationError::failed(format!("{} failed (injected)", self.name())));
        }

        let order = order_key(&input)?;
        match self.step {
            Step::Reserve => {
                let quantity = input.get("quantity").and_then(Value::as_u64).unwrap_or(1);
                foundry.set("stock.reserved", quantity);
                Ok(json!({
                    "order": order,
                    "amount_cents": input.get("amount_cents").cloned().unwrap_or(Value::Null),
                    "reservation": StableKey::derive(&format!("reservation:{order}")).to_string(),
                }))
            }
            Step::Charge => {
                let attempt = Self::attempt(foundry);
                if attempt <= self.flaky {
                    return Err(OperationError::failed(format!(
                        "payment gateway unavailable (attempt {attempt})"
                    )));
                }
                let amount = input.get("amount_cents").and_then(Value::as_u64).unwrap_or(0);
                foundry.set("payment.charged_cents", amount);
                Ok(json!({
                    "order": order,
                    "charge": Uuid::now_v7().to_string(),
                }))
            }
            Step::Ship => {
                let tracking = format!("TRK-{}", &StableKey::derive(&order).simple().to_string()[..10]);
                foundry.set("shipping.tracking", tracking.clone());
                Ok(json!({ "order": order, "tracking": tracking }))
            }
        }
    }

    async fn restore(
        &self,
        output: Value,
        foundry: &mut Foundry,
        _cancel: &CancellationToken,
    ) -> Result<(), OperationError> {
        match self.step {
            Step::Reserve => {
                foundry.set("stock.reserved", 0);
                tracing::info!(reservation = %output["reservation"], "released reservation");
            }
            Step::Charge => {
                let refunded: u64 = foundry.get_or("payment.charged_cents", 0);
                foundry.set("payment.charged_cents", 0);
                foundry.set("payment.refunded_cents", refunded);
                tracing::info!(charge = %output["charge"], refunded, "refunded charge");
            }
            Step::Ship => {}
        }
        Ok(())
    }
}

/// Build the order workflow with `faults` injected.
pub fn order_workflow(faults: DemoFaults) -> Result<Workflow, forge_core::ForgeError> {
    let mut builder = Workflow::builder("order-fulfilment")
        .id(StableKey::derive(WORKFLOW_KEY))
        .description("reserve stock, charge payment, ship order");

    for (index, step) in [Step::Reserve, Step::Charge, Step::Ship].into_iter().enumerate() {
        builder = builder.then(OrderStep {
            step,
            always_fails: faults.fail_at == Some(index),
            flaky: if step == Step::Charge { faults.flaky_charge } else { 0 },
        });
    }
    builder.build()
}

/// Initial payload for an order.
pub fn order_input(order: &str, quantity: u32, amount_cents: u64) -> Value {
    json!({
        "order": order,
        "quantity": quantity,
        "amount_cents": amount_cents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::Smith;
    use forge_core::engine::FailureDisposition;
    use forge_types::config::EngineConfig;

    #[tokio::test]
    async fn happy_path_ships() {
        let workflow = order_workflow(DemoFaults::default()).unwrap();
        let smith = Smith::new(EngineConfig::default());
        let mut foundry = Foundry::new();

        let output = smith
            .run(&workflow, &mut foundry, order_input("o-1", 3, 1200))
            .await
            .unwrap();

        assert!(output["tracking"].as_str().unwrap().starts_with("TRK-"));
        assert_eq!(foundry.get_as::<u64>("stock.reserved"), Some(3));
        assert_eq!(foundry.get_as::<u64>("payment.charged_cents"), Some(1200));
    }

    #[tokio::test]
    async fn failing_ship_refunds_and_releases() {
        let workflow = order_workflow(DemoFaults {
            fail_at: Some(2),
            flaky_charge: 0,
        })
        .unwrap();
        let smith = Smith::new(EngineConfig::default());
        let mut foundry = Foundry::new();

        let err = smith
            .run(&workflow, &mut foundry, order_input("o-2", 1, 500))
            .await
            .unwrap_err();

        assert_eq!(err.disposition(), FailureDisposition::Compensated);
        assert_eq!(foundry.get_as::<u64>("stock.reserved"), Some(0));
        assert_eq!(foundry.get_as::<u64>("payment.charged_cents"), Some(0));
        assert_eq!(foundry.get_as::<u64>("payment.refunded_cents"), Some(500));
        assert!(!foundry.contains("shipping.tracking"));
    }

    #[tokio::test]
    async fn flaky_charge_fails_without_recovery() {
        let workflow = order_workflow(DemoFaults {
            fail_at: None,
            flaky_charge: 1,
        })
        .unwrap();
        let err = Smith::new(EngineConfig::default())
            .run(&workflow, &mut Foundry::new(), order_input("o-3", 1, 100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("payment gateway unavailable"));
    }

    #[test]
    fn workflow_id_is_stable() {
        let a = order_workflow(DemoFaults::default()).unwrap();
        let b = order_workflow(DemoFaults::default()).unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(a.len(), 3);
    }
}
