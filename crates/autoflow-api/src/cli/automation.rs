//! Automation lifecycle CLI commands: create, list, show, delete, clone, toggle.

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;

use autoflow_core::automation::tree::all_blocks;
use autoflow_types::automation::StepId;

use super::output::{format_path, parse_step_id, print_info, print_json, print_success};
use crate::state::AppState;

/// Create an automation with a trigger and no steps.
pub async fn create_automation(state: &AppState, name: &str, trigger: &str, json: bool) -> Result<()> {
    let step_id = parse_step_id(trigger)?;
    if !matches!(step_id, StepId::Trigger(_)) {
        bail!("'{trigger}' is not a trigger kind");
    }
    let creatable = state
        .store
        .definitions()
        .creatable_triggers()
        .any(|d| d.step_id == step_id);
    if !creatable {
        bail!("automations cannot be created with a '{trigger}' trigger");
    }

    let trigger = state.store.construct_block(step_id).await?;
    let automation = state.store.create(name, trigger).await?;

    if json {
        return print_json(&automation);
    }
    print_success(&format!(
        "Automation {} created ({})",
        style(&automation.name).cyan(),
        style(automation.id.as_deref().unwrap_or_default()).dim()
    ));
    Ok(())
}

/// List automations in a table.
pub async fn list_automations(state: &AppState, json: bool) -> Result<()> {
    let automations = state.store.automations().await;
    if json {
        return print_json(&automations);
    }

    if automations.is_empty() {
        print_info(&format!(
            "No automations found. Create one with: {}",
            style("aflow create automation <name>").yellow()
        ));
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Name").fg(Color::White),
        Cell::new("ID").fg(Color::White),
        Cell::new("Trigger").fg(Color::White),
        Cell::new("Steps").fg(Color::White),
        Cell::new("Status").fg(Color::White),
    ]);

    for automation in &automations {
        let trigger = automation
            .definition
            .trigger
            .as_ref()
            .map(|t| t.step_id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let status = if automation.disabled {
            Cell::new("○ disabled").fg(Color::Yellow)
        } else {
            Cell::new("● enabled").fg(Color::Green)
        };
        table.add_row(vec![
            Cell::new(&automation.name),
            Cell::new(automation.id.as_deref().unwrap_or_default()).fg(Color::DarkGrey),
            Cell::new(trigger),
            Cell::new(all_blocks(&automation.definition).len().saturating_sub(1)),
            status,
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

/// List the block kinds that can be added.
pub async fn list_blocks(state: &AppState, json: bool) -> Result<()> {
    let definitions = state.store.definitions();
    let available: Vec<_> = definitions
        .creatable_triggers()
        .chain(definitions.actions().filter(|d| !d.deprecated))
        .collect();
    if json {
        return print_json(&available);
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Kind").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Description").fg(Color::White),
    ]);
    for definition in available {
        let kind = Cell::new(definition.step_id.to_string());
        let kind = match definition.step_id {
            StepId::Trigger(_) => kind.fg(Color::Magenta),
            StepId::Action(_) => kind.fg(Color::Cyan),
        };
        table.add_row(vec![
            kind,
            Cell::new(&definition.name),
            Cell::new(&definition.description),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

/// Print an automation's tree with each block's address.
pub async fn show_automation(state: &AppState, id: &str, json: bool) -> Result<()> {
    state.select(id).await?;
    let selected = state
        .store
        .selected()
        .await
        .context("automation disappeared while loading")?;
    if json {
        return print_json(&selected.automation);
    }

    let automation = &selected.automation;
    println!();
    println!(
        "  {} {}",
        style(&automation.name).cyan().bold(),
        style(automation.revision.as_deref().unwrap_or_default()).dim()
    );
    println!();

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Path").fg(Color::White),
        Cell::new("ID").fg(Color::White),
        Cell::new("Kind").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Notes").fg(Color::White),
    ]);

    for block in all_blocks(&automation.definition) {
        let Some(block_ref) = selected.index.get(&block.id) else {
            continue;
        };
        let depth = block_ref.depth().saturating_sub(1);
        let name = automation.definition.display_name(block).unwrap_or_default();

        let mut notes = Vec::new();
        if let Some(target) = &block.block_to_loop {
            notes.push(format!("loops {target}"));
        }
        if let Some(wrapper) = selected.index.looped_by(&block.id) {
            notes.push(format!("looped by {wrapper}"));
        }
        if let Some(inputs) = block.branch_inputs() {
            let names: Vec<&str> = inputs.branches.iter().map(|b| b.name.as_str()).collect();
            notes.push(format!("branches: {}", names.join(", ")));
        }
        if block_ref.terminating {
            notes.push("terminating".to_string());
        }

        table.add_row(vec![
            Cell::new(format_path(&block_ref.path_to)),
            Cell::new(&block.id).fg(Color::DarkGrey),
            Cell::new(block.step_id.to_string()),
            Cell::new(format!("{}{name}", "  ".repeat(depth))),
            Cell::new(notes.join("; ")),
        ]);
    }

    println!("{table}");
    println!();
    Ok(())
}

/// Delete an automation, asking first unless `force` is set.
pub async fn delete_automation(state: &AppState, id: &str, force: bool, json: bool) -> Result<()> {
    state.select(id).await?;

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete automation '{id}'? This cannot be undone"))
            .default(false)
            .interact()?;
        if !confirmed {
            print_info("Cancelled.");
            return Ok(());
        }
    }

    state.store.delete(id).await?;
    if json {
        return print_json(&serde_json::json!({ "deleted": id }));
    }
    print_success(&format!("Automation {} deleted", style(id).cyan()));
    Ok(())
}

pub async fn clone_automation(state: &AppState, id: &str, json: bool) -> Result<()> {
    let copy = state.store.duplicate(id).await?;
    if json {
        return print_json(&copy);
    }
    print_success(&format!(
        "Created {} ({})",
        style(&copy.name).cyan(),
        style(copy.id.as_deref().unwrap_or_default()).dim()
    ));
    Ok(())
}

pub async fn toggle_automation(state: &AppState, id: &str, json: bool) -> Result<()> {
    let automation = state.store.toggle_disabled(id).await?;
    if json {
        return print_json(&automation);
    }
    let status = if automation.disabled {
        style("disabled").yellow()
    } else {
        style("enabled").green()
    };
    print_success(&format!("Automation {} {status}", style(&automation.name).cyan()));
    Ok(())
}
