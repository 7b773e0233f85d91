//! Shared parsing and formatting helpers for CLI commands.

use anyhow::{Result, bail};
use console::style;
use serde::Serialize;

use autoflow_types::automation::StepId;
use autoflow_types::path::BlockPath;

/// Parse a block kind such as `server_log` or `ROW_SAVED`.
pub fn parse_step_id(kind: &str) -> Result<StepId> {
    let normalized = kind.trim().replace('-', "_").to_uppercase();
    match serde_json::from_value(serde_json::Value::String(normalized)) {
        Ok(step_id) => Ok(step_id),
        Err(_) => bail!("unknown block kind '{kind}' (see `aflow list blocks`)"),
    }
}

/// Parse `<branch-step-id>:<branch-index>`.
pub fn parse_branch_ref(value: &str) -> Result<(String, usize)> {
    let Some((id, idx)) = value.rsplit_once(':') else {
        bail!("expected <branch-step-id>:<branch-index>, got '{value}'");
    };
    let idx = idx
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid branch index '{idx}'"))?;
    Ok((id.to_string(), idx))
}

/// Compact path notation: `2` for a root step, `2/b1.0` inside a branch.
pub fn format_path(path: &[BlockPath]) -> String {
    path.iter()
        .map(|segment| match (segment.branch_idx, &segment.branch_step_id) {
            (Some(branch), Some(_)) => format!("b{branch}.^"),
            (Some(branch), None) => format!("b{branch}.{}", segment.step_idx),
            (None, _) => segment.step_idx.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(message: &str) {
    println!();
    println!("  {} {message}", style("✓").green().bold());
    println!();
}

pub fn print_info(message: &str) {
    println!();
    println!("  {} {message}", style("i").blue().bold());
    println!();
}
