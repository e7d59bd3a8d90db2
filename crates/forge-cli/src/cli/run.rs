//! `forge run`: execute the demonstration order workflow.
//!
//! By default the run goes through the recovery driver, keyed by the order,
//! so rerunning a failed order resumes from its last checkpoint. With
//! `--no-recover` the workflow runs once and compensates on failure.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use forge_core::engine::{
    FailureDisposition, RecoveryDriver, StableKey, TimingMiddleware, TracingWorkflowMiddleware,
};
use forge_core::event::EventBus;
use forge_core::{Foundry, Smith};
use forge_types::event::ForgeEvent;

use super::RunArgs;
use super::demo::{DemoFaults, WORKFLOW_KEY, order_input, order_workflow};
use crate::state::AppState;

/// Run the order workflow and report the outcome.
pub async fn run_order(state: &AppState, args: RunArgs, json: bool, quiet: bool) -> Result<()> {
    let mut config = state.config.clone();
    if let Some(attempts) = args.attempts {
        config.recovery.max_attempts = attempts;
    }

    let workflow = order_workflow(DemoFaults {
        fail_at: args.fail_at,
        flaky_charge: args.flaky,
    })?;

    let events = EventBus::default();
    let printer = (!json && !quiet).then(|| tokio::spawn(print_events(events.subscribe())));

    let mut smith = Smith::new(config.clone())
        .with_event_bus(events)
        .with_workflow_middleware(TracingWorkflowMiddleware);
    if args.no_recover {
        smith = smith.with_store(state.store.clone());
    }

    let mut foundry = Foundry::new();
    foundry.pin_execution_id(StableKey::derive(&args.order));
    foundry.use_middleware(TimingMiddleware);

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let input = order_input(&args.order, args.quantity, args.amount_cents);
    let result = if args.no_recover {
        smith.run_with_cancel(&workflow, &mut foundry, input, &cancel).await
    } else {
        RecoveryDriver::new(&smith)
            .run_with_recovery_cancel(
                &workflow,
                &mut foundry,
                &state.store,
                &args.order,
                WORKFLOW_KEY,
                &config.recovery,
                &cancel,
            )
            .await
    };

    watcher.abort();
    // Dropping the Smith closes the event channel so the printer drains and exits.
    drop(smith);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    match result {
        Ok(output) => {
            if json {
                let report = serde_json::json!({
                    "order": args.order,
                    "status": "completed",
                    "output": output,
                    "properties": foundry.properties(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if !quiet {
                println!();
                println!(
                    "  {} Order '{}' completed",
                    style("✓").green().bold(),
                    style(&args.order).cyan()
                );
                println!("  {}", style(output.to_string()).dim());
                print_properties(&foundry);
            }
            Ok(())
        }
        Err(error) => {
            let disposition = error.disposition();
            if json {
                let report = serde_json::json!({
                    "order": args.order,
                    "status": "failed",
                    "disposition": disposition_label(disposition),
                    "error": error.to_string(),
                    "properties": foundry.properties(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if !quiet {
                println!();
                println!(
                    "  {} Order '{}' failed ({})",
                    style("✗").red().bold(),
                    style(&args.order).cyan(),
                    disposition_label(disposition)
                );
                print_properties(&foundry);
                if matches!(
                    disposition,
                    FailureDisposition::Resumable | FailureDisposition::Exhausted
                ) && !args.no_recover
                {
                    println!(
                        "  {} Checkpoint kept. Resume with: {}",
                        style("i").blue().bold(),
                        style(format!("forge run --order {}", args.order)).yellow()
                    );
                    println!();
                }
            }
            Err(error.into())
        }
    }
}

/// Short label for how a failed run left things.
pub fn disposition_label(disposition: FailureDisposition) -> &'static str {
    match disposition {
        FailureDisposition::Compensated => "compensated",
        FailureDisposition::Resumable => "resumable",
        FailureDisposition::Exhausted => "recovery exhausted",
        FailureDisposition::Fatal => "fatal",
    }
}

/// One progress line per interesting event.
pub fn describe(event: &ForgeEvent) -> Option<String> {
    let line = match event {
        ForgeEvent::RunStarted {
            workflow_name,
            operation_count,
            start_index,
            ..
        } if *start_index > 0 => format!(
            "{} {workflow_name}: resuming at #{start_index} of {operation_count}",
            style("▶").cyan()
        ),
        ForgeEvent::RunStarted {
            workflow_name,
            operation_count,
            ..
        } => format!(
            "{} {workflow_name}: {operation_count} operation(s)",
            style("▶").cyan()
        ),
        ForgeEvent::OperationCompleted {
            index,
            operation,
            duration_ms,
            ..
        } => format!(
            "  {} #{index} {operation} {}",
            style("✓").green(),
            style(format!("({duration_ms} ms)")).dim()
        ),
        ForgeEvent::OperationFailed {
            index,
            operation,
            error,
            ..
        } => format!("  {} #{index} {operation}: {error}", style("✗").red()),
        ForgeEvent::CompensationStarted { pending, .. } => format!(
            "{} compensating {pending} operation(s)",
            style("↺").yellow()
        ),
        ForgeEvent::OperationRestored {
            index, operation, ..
        } => format!("  {} #{index} {operation} restored", style("↺").yellow()),
        ForgeEvent::RestoreFailed {
            index,
            operation,
            error,
            ..
        } => format!(
            "  {} #{index} {operation} restore failed: {error}",
            style("✗").red()
        ),
        ForgeEvent::RecoveryAttemptStarted {
            attempt,
            max_attempts,
            ..
        } => format!(
            "{}",
            style(format!("attempt {attempt}/{max_attempts}")).dim()
        ),
        ForgeEvent::RecoveryAttemptFailed {
            will_retry: true,
            retry_in_ms: Some(delay),
            ..
        } => format!("{}", style(format!("retrying in {delay} ms")).dim()),
        _ => return None,
    };
    Some(line)
}

async fn print_events(mut rx: broadcast::Receiver<ForgeEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(line) = describe(&event) {
                    println!("  {line}");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "progress printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_properties(foundry: &Foundry) {
    let mut entries: Vec<(&String, &Value)> = foundry.properties().iter().collect();
    if entries.is_empty() {
        println!();
        return;
    }
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Property").fg(Color::White),
        Cell::new("Value").fg(Color::White),
    ]);
    for (key, value) in entries {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        table.add_row(vec![Cell::new(key).fg(Color::Cyan), Cell::new(rendered)]);
    }

    println!();
    println!("{table}");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn describes_progress_events() {
        let started = ForgeEvent::RunStarted {
            execution_id: Uuid::nil(),
            workflow_name: "order-fulfilment".into(),
            operation_count: 3,
            start_index: 1,
        };
        assert!(describe(&started).unwrap().contains("resuming at #1 of 3"));

        let retry = ForgeEvent::RecoveryAttemptFailed {
            execution_id: Uuid::nil(),
            attempt: 1,
            error: "boom".into(),
            will_retry: true,
            retry_in_ms: Some(250),
        };
        assert!(describe(&retry).unwrap().contains("retrying in 250 ms"));
    }

    #[test]
    fn skips_bookkeeping_events() {
        let saved = ForgeEvent::CheckpointSaved {
            execution_id: Uuid::nil(),
            workflow_id: Uuid::nil(),
            next_operation_index: 1,
        };
        assert!(describe(&saved).is_none());

        let final_failure = ForgeEvent::RecoveryAttemptFailed {
            execution_id: Uuid::nil(),
            attempt: 3,
            error: "boom".into(),
            will_retry: false,
            retry_in_ms: None,
        };
        assert!(describe(&final_failure).is_none());
    }

    #[test]
    fn disposition_labels() {
        assert_eq!(disposition_label(FailureDisposition::Compensated), "compensated");
        assert_eq!(disposition_label(FailureDisposition::Exhausted), "recovery exhausted");
    }
}
