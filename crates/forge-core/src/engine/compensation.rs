//! Backward compensation over completed operations.
//!
//! When a run fails, every operation that completed in that run has its
//! `restore` invoked in reverse completion order with the output it produced.
//! Two policy switches shape the walk:
//!
//! - `fail_fast`: stop at the first restore failure; earlier operations are
//!   reported as skipped.
//! - `throw_on_error`: surface restore failures in the run's error instead
//!   of only logging them.

use forge_types::config::EngineConfig;
use forge_types::event::ForgeEvent;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::error::CompensationError;
use super::foundry::Foundry;
use super::operation::BoxOperation;
use crate::event::EventBus;

/// An operation that completed during the current run, with its output.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedOperation {
    pub index: usize,
    pub output: Value,
}

/// Policy switches for the compensation walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompensationPolicy {
    pub fail_fast: bool,
    pub throw_on_error: bool,
}

impl From<&EngineConfig> for CompensationPolicy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            fail_fast: config.fail_fast_compensation,
            throw_on_error: config.throw_on_compensation_error,
        }
    }
}

/// Outcome of a compensation walk. Indices are in the order they were visited.
#[derive(Debug, Default)]
pub struct CompensationReport {
    pub restored: Vec<usize>,
    pub failures: Vec<CompensationError>,
    pub skipped: Vec<usize>,
}

impl CompensationReport {
    /// Every completed operation was restored.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }
}

/// Runs compensating actions for a failed run.
pub struct Compensator<'a> {
    policy: CompensationPolicy,
    events: Option<&'a EventBus>,
}

impl<'a> Compensator<'a> {
    pub fn new(policy: CompensationPolicy, events: Option<&'a EventBus>) -> Self {
        Self { policy, events }
    }

    /// Restore `completed` operations (indices into `operations`) newest first.
    ///
    /// Restores run under a fresh cancellation token: a cancelled run still
    /// gets a complete rollback.
    pub async fn compensate(
        &self,
        operations: &[BoxOperation],
        completed: &[CompletedOperation],
        foundry: &mut Foundry,
        failed_index: usize,
    ) -> CompensationReport {
        let execution_id = foundry.execution_id();
        let cancel = CancellationToken::new();
        let mut report = CompensationReport::default();

        self.publish(ForgeEvent::CompensationStarted {
            execution_id,
            failed_index,
            pending: completed.len(),
        });
        tracing::info!(
            execution_id = %execution_id,
            failed_index,
            pending = completed.len(),
            "compensating completed operations"
        );

        for (position, done) in completed.iter().enumerate().rev() {
            let Some(operation) = operations.get(done.index) else {
                report.skipped.push(done.index);
                continue;
            };

            match operation.restore(done.output.clone(), foundry, &cancel).await {
                Ok(()) => {
                    tracing::debug!(operation = %operation.name(), index = done.index, "operation restored");
                    self.publish(ForgeEvent::OperationRestored {
                        execution_id,
                        index: done.index,
                        operation: operation.name().to_string(),
                    });
                    report.restored.push(done.index);
                }
                Err(source) => {
                    tracing::warn!(
                        operation = %operation.name(),
                        index = done.index,
                        error = %source,
                        "restore failed"
                    );
                    self.publish(ForgeEvent::RestoreFailed {
                        execution_id,
                        index: done.index,
                        operation: operation.name().to_string(),
                        error: source.to_string(),
                    });
                    report.failures.push(CompensationError {
                        operation: operation.name().to_string(),
                        index: done.index,
                        source,
                    });

                    if self.policy.fail_fast {
                        report
                            .skipped
                            .extend(completed[..position].iter().rev().map(|c| c.index));
                        break;
                    }
                }
            }
        }

        self.publish(ForgeEvent::CompensationFinished {
            execution_id,
            restored: report.restored.len(),
            failed: report.failures.len(),
            skipped: report.skipped.len(),
        });
        report
    }

    fn publish(&self, event: ForgeEvent) {
        if let Some(bus) = self.events {
            bus.publish(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::OperationError;
    use crate::engine::operation::FnOperation;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn journaled(name: &'static str, journal: Arc<Mutex<Vec<String>>>, fail: bool) -> BoxOperation {
        BoxOperation::new(FnOperation::new(name, |input, _| Ok(input)).with_restore(
            move |output, _| {
                journal.lock().unwrap().push(format!("{name}:{output}"));
                if fail {
                    Err(OperationError::failed(format!("{name} cannot be undone")))
                } else {
                    Ok(())
                }
            },
        ))
    }

    fn completed(n: usize) -> Vec<CompletedOperation> {
        (0..n)
            .map(|index| CompletedOperation {
                index,
                output: json!(index),
            })
            .collect()
    }

    #[tokio::test]
    async fn restores_in_reverse_with_outputs() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let ops = vec![
            journaled("a", journal.clone(), false),
            journaled("b", journal.clone(), false),
            journaled("c", journal.clone(), false),
        ];

        let report = Compensator::new(CompensationPolicy::default(), None)
            .compensate(&ops, &completed(3), &mut Foundry::new(), 3)
            .await;

        assert_eq!(*journal.lock().unwrap(), vec!["c:2", "b:1", "a:0"]);
        assert_eq!(report.restored, vec![2, 1, 0]);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn continues_past_failures_by_default() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let ops = vec![
            journaled("a", journal.clone(), false),
            journaled("b", journal.clone(), true),
            journaled("c", journal.clone(), false),
        ];

        let report = Compensator::new(CompensationPolicy::default(), None)
            .compensate(&ops, &completed(3), &mut Foundry::new(), 3)
            .await;

        assert_eq!(journal.lock().unwrap().len(), 3);
        assert_eq!(report.restored, vec![2, 0]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert!(report.skipped.is_empty());
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn fail_fast_skips_remaining() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let ops = vec![
            journaled("a", journal.clone(), false),
            journaled("b", journal.clone(), true),
            journaled("c", journal.clone(), false),
        ];
        let policy = CompensationPolicy {
            fail_fast: true,
            throw_on_error: false,
        };

        let report = Compensator::new(policy, None)
            .compensate(&ops, &completed(3), &mut Foundry::new(), 3)
            .await;

        assert_eq!(*journal.lock().unwrap(), vec!["c:2", "b:1"]);
        assert_eq!(report.restored, vec![2]);
        assert_eq!(report.skipped, vec![0]);
    }

    #[tokio::test]
    async fn publishes_events() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let ops = vec![journaled("a", journal.clone(), false)];
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        Compensator::new(CompensationPolicy::default(), Some(&bus))
            .compensate(&ops, &completed(1), &mut Foundry::new(), 1)
            .await;

        assert!(matches!(rx.try_recv().unwrap(), ForgeEvent::CompensationStarted { pending: 1, .. }));
        assert!(matches!(rx.try_recv().unwrap(), ForgeEvent::OperationRestored { index: 0, .. }));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ForgeEvent::CompensationFinished { restored: 1, failed: 0, skipped: 0, .. }
        ));
    }

    #[test]
    fn policy_from_config() {
        let config = EngineConfig {
            fail_fast_compensation: true,
            ..Default::default()
        };
        let policy = CompensationPolicy::from(&config);
        assert!(policy.fail_fast);
        assert!(!policy.throw_on_error);
    }
}
