//! Autoflow CLI entry point.
//!
//! Binary name: `aflow`
//!
//! Parses CLI arguments, opens the automation store, then dispatches to the
//! command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands, CreateResource, DeleteResource, ListResource};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,autoflow_core=debug,autoflow_infra=debug",
        _ => "trace",
    };
    autoflow_observe::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "aflow", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init().await?;
    tracing::debug!(data_dir = %state.data_dir.display(), "store ready");

    let json = cli.json;
    let result = match cli.command {
        Commands::Create { resource } => match resource {
            CreateResource::Automation { name, trigger } => {
                cli::automation::create_automation(&state, &name, &trigger, json).await
            }
        },

        Commands::List { resource } => match resource {
            ListResource::Automations => cli::automation::list_automations(&state, json).await,
            ListResource::Blocks => cli::automation::list_blocks(&state, json).await,
        },

        Commands::Show { id } => cli::automation::show_automation(&state, &id, json).await,

        Commands::Delete { resource } => match resource {
            DeleteResource::Automation { id, force } => {
                cli::automation::delete_automation(&state, &id, force, json).await
            }
        },

        Commands::Clone { id } => cli::automation::clone_automation(&state, &id, json).await,

        Commands::Toggle { id } => cli::automation::toggle_automation(&state, &id, json).await,

        Commands::Block { automation, action } => {
            cli::edit::run_block(&state, &automation, action, json).await
        }

        Commands::Branch { automation, action } => {
            cli::edit::run_branch(&state, &automation, action, json).await
        }

        Commands::Loop { automation, action } => {
            cli::edit::run_loop(&state, &automation, action, json).await
        }

        Commands::Apply { automation, script } => {
            cli::edit::apply_script(&state, &automation, &script, json).await
        }

        Commands::Bindings { automation, block } => {
            cli::run::list_bindings(&state, &automation, &block, json).await
        }

        Commands::Test { automation, data } => {
            cli::run::test_automation(&state, &automation, data.as_deref(), json).await
        }

        Commands::Trigger {
            automation,
            payload,
        } => cli::run::trigger_automation(&state, &automation, &payload, json).await,

        // Handled above.
        Commands::Completions { .. } => Ok(()),
    };

    autoflow_observe::shutdown_tracing();
    result
}
