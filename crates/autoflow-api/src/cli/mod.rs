//! CLI command definitions and dispatch for the `aflow` binary.
//!
//! Uses clap derive macros for argument parsing. The CLI follows a verb-noun
//! pattern (e.g., `aflow create automation`, `aflow list automations`).
//! Blocks are addressed by id; drop positions are given as `--after <id>` or
//! `--into <branch-step-id>:<branch>`.

pub mod automation;
pub mod edit;
pub mod output;
pub mod run;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// Edit workflow automations.
#[derive(Parser)]
#[command(name = "aflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout via OpenTelemetry.
    #[arg(long, global = true, hide = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new automation.
    Create {
        #[command(subcommand)]
        resource: CreateResource,
    },

    /// List resources.
    #[command(alias = "ls")]
    List {
        #[command(subcommand)]
        resource: ListResource,
    },

    /// Show an automation's step tree.
    Show {
        /// Automation id.
        id: String,
    },

    /// Delete an automation.
    #[command(alias = "rm")]
    Delete {
        #[command(subcommand)]
        resource: DeleteResource,
    },

    /// Copy an automation under "<name> - copy".
    Clone {
        /// Automation id.
        id: String,
    },

    /// Enable or disable an automation.
    Toggle {
        /// Automation id.
        id: String,
    },

    /// Add, move, rename, configure or remove steps.
    Block {
        /// Automation id.
        automation: String,

        #[command(subcommand)]
        action: edit::BlockCommand,
    },

    /// Split a sequence into branches or edit existing branches.
    Branch {
        /// Automation id.
        automation: String,

        #[command(subcommand)]
        action: edit::BranchCommand,
    },

    /// Wrap a step in a loop or remove its loop.
    Loop {
        /// Automation id.
        automation: String,

        #[command(subcommand)]
        action: edit::LoopCommand,
    },

    /// Apply a JSON script of edits (including undo/redo) in order.
    Apply {
        /// Automation id.
        automation: String,

        /// Path to the script file.
        script: std::path::PathBuf,
    },

    /// List the bindings available to a step.
    Bindings {
        /// Automation id.
        automation: String,

        /// Block id.
        block: String,
    },

    /// Run an automation against test data via the runtime.
    Test {
        /// Automation id.
        automation: String,

        /// Test data as inline JSON (defaults to the stored test data).
        #[arg(long)]
        data: Option<String>,
    },

    /// Trigger an automation via the runtime.
    Trigger {
        /// Automation id.
        automation: String,

        /// Trigger payload as inline JSON.
        #[arg(long, default_value = "{}")]
        payload: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum CreateResource {
    /// Create a new automation.
    Automation {
        /// Automation name.
        name: String,

        /// Trigger kind (app, row_saved, row_updated, row_deleted, webhook, cron).
        #[arg(long, default_value = "app")]
        trigger: String,
    },
}

#[derive(Subcommand)]
pub enum ListResource {
    /// List all automations.
    Automations,

    /// List the block kinds that can be added.
    Blocks,
}

#[derive(Subcommand)]
pub enum DeleteResource {
    /// Delete an automation permanently.
    Automation {
        /// Automation id.
        id: String,

        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,
    },
}

/// A drop position: after a block, or at the top of a branch.
#[derive(Args, Debug, Clone, Default)]
pub struct DropTarget {
    /// Place after this block (use the trigger's id for the top of the flow).
    #[arg(long, conflicts_with = "into")]
    pub after: Option<String>,

    /// Place at the top of a branch, as `<branch-step-id>:<branch-index>`.
    #[arg(long)]
    pub into: Option<String>,
}
