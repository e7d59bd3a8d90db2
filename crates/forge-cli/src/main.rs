//! Forge CLI entry point.
//!
//! Binary name: `forge`
//!
//! Parses CLI arguments, installs tracing, resolves the data directory and
//! snapshot store, then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use forge_observe::{Verbosity, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(Verbosity::from_flags(cli.verbose, cli.quiet), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        // Shell completions don't need app state
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "forge", &mut std::io::stdout());
            Ok(())
        }

        Commands::Run(args) => {
            let state = AppState::init(cli.data_dir, args.config.as_deref(), cli.store).await?;
            cli::run::run_order(&state, args, cli.json, cli.quiet).await
        }

        Commands::Snapshots { action } => {
            let state = AppState::init(cli.data_dir, None, cli.store).await?;
            cli::snapshots::handle(&state, action, cli.json).await
        }
    }
}
