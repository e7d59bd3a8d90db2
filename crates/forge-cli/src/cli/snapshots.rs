//! `forge snapshots`: list, show and clear stored checkpoints.

use anyhow::{Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use forge_core::engine::StableKey;
use forge_infra::StoreKind;

use super::SnapshotsCommand;
use super::demo::WORKFLOW_KEY;
use crate::state::AppState;

/// Accept either a literal UUID or a key to derive one from.
pub fn resolve_id(value: &str) -> Uuid {
    Uuid::parse_str(value).unwrap_or_else(|_| StableKey::derive(value))
}

fn resolve_workflow(workflow: Option<&str>) -> Uuid {
    resolve_id(workflow.unwrap_or(WORKFLOW_KEY))
}

pub async fn handle(state: &AppState, action: SnapshotsCommand, json: bool) -> Result<()> {
    match action {
        SnapshotsCommand::List => list(state, json).await,
        SnapshotsCommand::Show { foundry, workflow } => {
            show(state, resolve_id(&foundry), resolve_workflow(workflow.as_deref()), json).await
        }
        SnapshotsCommand::Clear {
            foundry,
            workflow,
            all,
        } => {
            if all {
                return clear_all(state, json).await;
            }
            let Some(foundry) = foundry else {
                bail!("pass a foundry id or order key, or --all");
            };
            clear(state, resolve_id(&foundry), resolve_workflow(workflow.as_deref()), json).await
        }
    }
}

async fn list(state: &AppState, json: bool) -> Result<()> {
    let snapshots = state.store.list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(());
    }

    if snapshots.is_empty() {
        println!();
        println!("  {} No snapshots stored ({} store).", style("i").blue().bold(), state.store_kind);
        if state.store_kind == StoreKind::Memory {
            println!(
                "  {}",
                style("The memory store does not outlive the process; use --store file or sqlite.").dim()
            );
        }
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Foundry").fg(Color::White),
        Cell::new("Workflow").fg(Color::White),
        Cell::new("Next").fg(Color::White),
        Cell::new("Properties").fg(Color::White),
        Cell::new("Saved").fg(Color::White),
    ]);

    for snapshot in &snapshots {
        table.add_row(vec![
            Cell::new(snapshot.foundry_execution_id).fg(Color::Cyan),
            Cell::new(&snapshot.workflow_name),
            Cell::new(format!("#{}", snapshot.next_operation_index)),
            Cell::new(snapshot.properties.len()),
            Cell::new(snapshot.saved_at.format("%Y-%m-%d %H:%M:%S").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} snapshot{}",
        style(snapshots.len()).bold(),
        if snapshots.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}

async fn show(state: &AppState, foundry_id: Uuid, workflow_id: Uuid, json: bool) -> Result<()> {
    let Some(snapshot) = state.store.try_load(&foundry_id, &workflow_id).await? else {
        bail!("no snapshot for foundry {foundry_id} / workflow {workflow_id}");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} at #{}",
        style("◆").bold(),
        style(&snapshot.workflow_name).cyan(),
        snapshot.next_operation_index
    );
    println!("  Foundry:  {}", snapshot.foundry_execution_id);
    println!("  Workflow: {}", snapshot.workflow_id);
    println!("  Saved:    {}", snapshot.saved_at.to_rfc3339());
    if let Some(output) = &snapshot.last_output {
        println!("  Output:   {}", style(output.to_string()).dim());
    }

    let mut keys: Vec<&String> = snapshot.properties.keys().collect();
    keys.sort();
    if !keys.is_empty() {
        println!();
        for key in keys {
            println!("    {} = {}", style(key).cyan(), snapshot.properties[key]);
        }
    }
    println!();

    Ok(())
}

async fn clear(state: &AppState, foundry_id: Uuid, workflow_id: Uuid, json: bool) -> Result<()> {
    let existed = state.store.try_load(&foundry_id, &workflow_id).await?.is_some();
    state.store.delete(&foundry_id, &workflow_id).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({"cleared": if existed { 1 } else { 0 }, "foundry": foundry_id, "workflow": workflow_id})
        );
    } else if existed {
        println!("  {} Cleared snapshot {foundry_id}", style("✓").green().bold());
    } else {
        println!("  {} No snapshot for {foundry_id}", style("i").blue().bold());
    }
    Ok(())
}

async fn clear_all(state: &AppState, json: bool) -> Result<()> {
    let snapshots = state.store.list().await?;
    for snapshot in &snapshots {
        state
            .store
            .delete(&snapshot.foundry_execution_id, &snapshot.workflow_id)
            .await?;
    }

    if json {
        println!("{}", serde_json::json!({"cleared": snapshots.len()}));
    } else {
        println!(
            "  {} Cleared {} snapshot{}",
            style("✓").green().bold(),
            snapshots.len(),
            if snapshots.len() == 1 { "" } else { "s" }
        );
    }
    Ok(())
}
