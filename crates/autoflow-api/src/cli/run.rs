//! Binding inspection and runtime commands: bindings, test, trigger.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use autoflow_types::results::{AutomationStatus, TestAutomationResponse};

use super::output::{print_info, print_json};
use crate::state::AppState;

/// List the bindings available to a block.
pub async fn list_bindings(state: &AppState, automation: &str, block: &str, json: bool) -> Result<()> {
    state.select(automation).await?;
    let bindings = state.store.path_bindings(block).await?;
    if json {
        return print_json(&bindings);
    }

    if bindings.is_empty() {
        print_info("No bindings available at this step.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Binding").fg(Color::White),
        Cell::new("Runtime").fg(Color::White),
        Cell::new("Type").fg(Color::White),
        Cell::new("Category").fg(Color::White),
    ]);
    for binding in &bindings {
        table.add_row(vec![
            Cell::new(&binding.readable_binding).fg(Color::Cyan),
            Cell::new(&binding.runtime_binding).fg(Color::DarkGrey),
            Cell::new(
                binding
                    .display
                    .display_type
                    .as_deref()
                    .or(binding.binding_type.as_deref())
                    .unwrap_or("-"),
            ),
            Cell::new(&binding.category),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn parse_json_arg(raw: &str, what: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("{what} is not valid JSON"))
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner
}

fn print_response(response: &TestAutomationResponse) {
    println!();
    match response {
        TestAutomationResponse::DidNotTrigger(rejected) => {
            println!(
                "  {} {}",
                style("○").yellow().bold(),
                style(&rejected.message).yellow()
            );
        }
        TestAutomationResponse::Results(results) => {
            let status = match results.status {
                Some(AutomationStatus::Success) | None => style("success").green(),
                Some(AutomationStatus::Stopped) => style("stopped").yellow(),
                Some(AutomationStatus::NoConditionMet) => style("no condition met").yellow(),
                Some(AutomationStatus::Error | AutomationStatus::StoppedError) => {
                    style("error").red()
                }
            };
            println!("  {} Run finished: {status}", style("✓").green().bold());
            println!();
            for step in std::iter::once(&results.trigger).chain(&results.steps) {
                println!(
                    "  {} {} {}",
                    style("•").dim(),
                    step.step_id,
                    style(step.id.as_deref().unwrap_or_default()).dim()
                );
                println!("      {}", step.outputs);
            }
        }
    }
    println!();
}

/// Test the automation, printing every block's outputs.
pub async fn test_automation(
    state: &AppState,
    automation: &str,
    data: Option<&str>,
    json: bool,
) -> Result<()> {
    state.select(automation).await?;
    let data = data.map(|raw| parse_json_arg(raw, "--data")).transpose()?;

    let progress = (!json).then(|| spinner("Running test..."));
    let result = state.store.test(data).await;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }
    let response = result?;

    if json {
        let context = state.store.evaluation_context().await?;
        return print_json(&serde_json::json!({
            "response": response,
            "context": context,
        }));
    }
    print_response(&response);
    Ok(())
}

pub async fn trigger_automation(
    state: &AppState,
    automation: &str,
    payload: &str,
    json: bool,
) -> Result<()> {
    let payload = parse_json_arg(payload, "--payload")?;

    let progress = (!json).then(|| spinner("Triggering..."));
    let result = state.store.trigger(automation, payload).await;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }
    let response = result?;

    if json {
        return print_json(&response);
    }
    print_response(&response);
    Ok(())
}
