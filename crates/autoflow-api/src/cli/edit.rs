//! Structural editing commands: blocks, branches, loops and edit scripts.
//!
//! Every edit goes through the store, which persists the result and bumps the
//! automation's revision. Edits inside one `apply` script share a store, so
//! `undo` and `redo` steps work across the script.

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use console::style;
use serde::Deserialize;
use serde_json::{Map, Value};

use autoflow_types::automation::Automation;
use autoflow_types::path::{BlockPath, PathAddress};

use super::DropTarget;
use super::output::{parse_branch_ref, parse_step_id, print_info, print_json, print_success};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum BlockCommand {
    /// Add a new step.
    Add {
        /// Block kind (see `aflow list blocks`).
        kind: String,

        #[command(flatten)]
        target: DropTarget,

        /// Display name for the new step.
        #[arg(long)]
        name: Option<String>,
    },

    /// Remove a step (a looped step takes its loop with it).
    #[command(alias = "rm")]
    Delete {
        /// Block id.
        block: String,
    },

    /// Move a step to a new position.
    #[command(alias = "mv")]
    Move {
        /// Block id.
        block: String,

        #[command(flatten)]
        target: DropTarget,
    },

    /// Set a step's display name (an empty name clears it).
    Rename {
        /// Block id.
        block: String,

        /// New name.
        name: String,
    },

    /// Set step inputs as key=value pairs (values parsed as JSON when valid).
    Set {
        /// Block id.
        block: String,

        /// Inputs such as `text="hello"` or `iterations=3`. `key=` clears.
        #[arg(required = true)]
        values: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum BranchCommand {
    /// Branch at a step: wrap it and its followers, or add a branch to a
    /// branch step.
    Create {
        /// Block id.
        block: String,
    },

    /// Delete a branch, given as `<branch-step-id>:<branch-index>`.
    Delete { branch: String },

    /// Swap a branch with its left neighbour.
    Left { branch: String },

    /// Swap a branch with its right neighbour.
    Right { branch: String },
}

#[derive(Subcommand)]
pub enum LoopCommand {
    /// Wrap a step in a new loop.
    Add {
        /// Block id of the step to iterate.
        block: String,
    },

    /// Remove the loop around a step (removes the looped step too).
    Remove {
        /// Block id of the looped step.
        block: String,
    },
}

/// One step of an edit script.
///
/// ```json
/// [
///   { "op": "add", "kind": "server_log", "id": "log", "after": "trigger" },
///   { "op": "branch", "block": "log" },
///   { "op": "undo" }
/// ]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptOp {
    Add {
        kind: String,
        /// Fixed id for the new block, so later steps can refer to it.
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        after: Option<String>,
        #[serde(default)]
        into: Option<String>,
    },
    Delete {
        block: String,
    },
    Move {
        block: String,
        #[serde(default)]
        after: Option<String>,
        #[serde(default)]
        into: Option<String>,
    },
    Rename {
        block: String,
        name: String,
    },
    Set {
        block: String,
        inputs: Map<String, Value>,
    },
    Branch {
        block: String,
    },
    DeleteBranch {
        branch: String,
    },
    BranchLeft {
        branch: String,
    },
    BranchRight {
        branch: String,
    },
    Loop {
        block: String,
    },
    Unloop {
        block: String,
    },
    Undo,
    Redo,
}

// ---------------------------------------------------------------------------
// Addressing
// ---------------------------------------------------------------------------

async fn block_path(state: &AppState, block_id: &str) -> Result<PathAddress> {
    Ok(state.store.block_ref(block_id).await?.path_to)
}

/// Path of a drop target. No target means the top of the flow.
async fn target_path(state: &AppState, target: &DropTarget) -> Result<PathAddress> {
    match (&target.after, &target.into) {
        (Some(_), Some(_)) => bail!("use either --after or --into, not both"),
        (Some(after), None) => block_path(state, after).await,
        (None, Some(into)) => {
            let (branch_step, branch_idx) = parse_branch_ref(into)?;
            let mut path = block_path(state, &branch_step).await?;
            path.push(BlockPath::branch_entry(branch_step, branch_idx));
            Ok(path)
        }
        (None, None) => Ok(vec![BlockPath::root(0)]),
    }
}

/// Path addressing branch `<id>:<idx>`.
async fn branch_path(state: &AppState, branch: &str) -> Result<PathAddress> {
    let (branch_step, branch_idx) = parse_branch_ref(branch)?;
    let mut path = block_path(state, &branch_step).await?;
    path.push(BlockPath::branch(branch_idx, 0));
    Ok(path)
}

/// Parse `key=value`. Values that are not valid JSON are taken as strings.
fn parse_input(pair: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = pair.split_once('=') else {
        bail!("expected key=value, got '{pair}'");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("empty input name in '{pair}'");
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Apply one edit to the selected automation. Returns a short description.
pub async fn apply_op(state: &AppState, op: ScriptOp) -> Result<String> {
    let store = &state.store;
    let message = match op {
        ScriptOp::Add {
            kind,
            id,
            name,
            after,
            into,
        } => {
            let mut block = store.construct_block(parse_step_id(&kind)?).await?;
            if let Some(id) = id {
                block.id = id;
            }
            let block_id = block.id.clone();
            let path = target_path(state, &DropTarget { after, into }).await?;
            store.add_block(block, &path).await?;
            if let Some(name) = name {
                store.update_block_title(&block_id, &name).await?;
            }
            format!("added {kind} block {block_id}")
        }
        ScriptOp::Delete { block } => {
            let path = block_path(state, &block).await?;
            store.delete_block(&path).await?;
            format!("deleted block {block}")
        }
        ScriptOp::Move { block, after, into } => {
            let source = block_path(state, &block).await?;
            let dest = target_path(state, &DropTarget { after, into }).await?;
            match store.move_block(&source, &dest).await? {
                Some(_) => format!("moved block {block}"),
                None => format!("block {block} is already there"),
            }
        }
        ScriptOp::Rename { block, name } => {
            store.update_block_title(&block, &name).await?;
            format!("renamed block {block}")
        }
        ScriptOp::Set { block, inputs } => match store.update_block_inputs(&block, inputs).await? {
            Some(_) => format!("updated inputs of {block}"),
            None => format!("inputs of {block} unchanged"),
        },
        ScriptOp::Branch { block } => {
            let path = block_path(state, &block).await?;
            store.branch_automation(&path).await?;
            format!("branched at {block}")
        }
        ScriptOp::DeleteBranch { branch } => {
            store.delete_branch(&branch_path(state, &branch).await?).await?;
            format!("deleted branch {branch}")
        }
        ScriptOp::BranchLeft { branch } => {
            store.branch_left(&branch_path(state, &branch).await?).await?;
            format!("moved branch {branch} left")
        }
        ScriptOp::BranchRight { branch } => {
            store.branch_right(&branch_path(state, &branch).await?).await?;
            format!("moved branch {branch} right")
        }
        ScriptOp::Loop { block } => {
            store.add_looping(&block).await?;
            format!("looped block {block}")
        }
        ScriptOp::Unloop { block } => {
            store.remove_looping(&block).await?;
            format!("removed loop around {block}")
        }
        ScriptOp::Undo => {
            store.undo().await?;
            "undid last change".to_string()
        }
        ScriptOp::Redo => {
            store.redo().await?;
            "redid last change".to_string()
        }
    };
    Ok(message)
}

async fn finish(state: &AppState, message: &str, json: bool) -> Result<()> {
    let current: Option<Automation> = state.store.selected().await.map(|s| s.automation);
    if json {
        return print_json(&current);
    }
    let revision = current
        .as_ref()
        .and_then(|a| a.revision.clone())
        .unwrap_or_default();
    print_success(&format!("{message} {}", style(format!("(rev {revision})")).dim()));
    Ok(())
}

pub async fn run_block(
    state: &AppState,
    automation: &str,
    command: BlockCommand,
    json: bool,
) -> Result<()> {
    state.select(automation).await?;
    let op = match command {
        BlockCommand::Add { kind, target, name } => ScriptOp::Add {
            kind,
            id: None,
            name,
            after: target.after,
            into: target.into,
        },
        BlockCommand::Delete { block } => ScriptOp::Delete { block },
        BlockCommand::Move { block, target } => ScriptOp::Move {
            block,
            after: target.after,
            into: target.into,
        },
        BlockCommand::Rename { block, name } => ScriptOp::Rename { block, name },
        BlockCommand::Set { block, values } => {
            let inputs = values
                .iter()
                .map(|pair| parse_input(pair))
                .collect::<Result<Map<String, Value>>>()?;
            ScriptOp::Set { block, inputs }
        }
    };
    let message = apply_op(state, op).await?;
    finish(state, &message, json).await
}

pub async fn run_branch(
    state: &AppState,
    automation: &str,
    command: BranchCommand,
    json: bool,
) -> Result<()> {
    state.select(automation).await?;
    let op = match command {
        BranchCommand::Create { block } => ScriptOp::Branch { block },
        BranchCommand::Delete { branch } => ScriptOp::DeleteBranch { branch },
        BranchCommand::Left { branch } => ScriptOp::BranchLeft { branch },
        BranchCommand::Right { branch } => ScriptOp::BranchRight { branch },
    };
    let message = apply_op(state, op).await?;
    finish(state, &message, json).await
}

pub async fn run_loop(
    state: &AppState,
    automation: &str,
    command: LoopCommand,
    json: bool,
) -> Result<()> {
    state.select(automation).await?;
    let op = match command {
        LoopCommand::Add { block } => ScriptOp::Loop { block },
        LoopCommand::Remove { block } => ScriptOp::Unloop { block },
    };
    let message = apply_op(state, op).await?;
    finish(state, &message, json).await
}

/// Run every step of a script in order, stopping at the first failure.
pub async fn apply_script(state: &AppState, automation: &str, script: &Path, json: bool) -> Result<()> {
    let content = tokio::fs::read_to_string(script)
        .await
        .with_context(|| format!("failed to read {}", script.display()))?;
    let ops: Vec<ScriptOp> = serde_json::from_str(&content)
        .with_context(|| format!("invalid edit script {}", script.display()))?;
    if ops.is_empty() {
        print_info("Script is empty, nothing to do.");
        return Ok(());
    }

    state.select(automation).await?;
    let total = ops.len();
    for (n, op) in ops.into_iter().enumerate() {
        let message = apply_op(state, op)
            .await
            .with_context(|| format!("step {} of {total} failed", n + 1))?;
        tracing::info!(step = n + 1, "{message}");
        if !json {
            println!("  {} {message}", style(format!("[{}/{total}]", n + 1)).dim());
        }
    }
    finish(state, &format!("Applied {total} edits"), json).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_inputs() {
        assert_eq!(
            parse_input("text=hello").unwrap(),
            ("text".to_string(), json!("hello"))
        );
        assert_eq!(
            parse_input("iterations=3").unwrap(),
            ("iterations".to_string(), json!(3))
        );
        assert_eq!(parse_input("text=").unwrap(), ("text".to_string(), json!("")));
        assert!(parse_input("novalue").is_err());
        assert!(parse_input("=x").is_err());
    }

    #[test]
    fn parses_script() {
        let ops: Vec<ScriptOp> = serde_json::from_value(json!([
            { "op": "add", "kind": "server_log", "id": "log", "after": "trigger" },
            { "op": "set", "block": "log", "inputs": { "text": "hi" } },
            { "op": "delete_branch", "branch": "br:1" },
            { "op": "undo" }
        ]))
        .unwrap();

        assert_eq!(ops.len(), 4);
        assert!(matches!(&ops[0], ScriptOp::Add { id: Some(id), .. } if id == "log"));
        assert!(matches!(&ops[2], ScriptOp::DeleteBranch { branch } if branch == "br:1"));
        assert!(matches!(ops[3], ScriptOp::Undo));
    }
}
