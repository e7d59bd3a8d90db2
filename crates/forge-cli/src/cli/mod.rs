//! CLI command definitions for the `forge` binary.
//!
//! Uses clap derive macros. `forge run` executes the demonstration order
//! workflow; `forge snapshots` inspects and clears stored checkpoints.

pub mod demo;
pub mod run;
pub mod snapshots;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use forge_infra::StoreKind;
use forge_infra::config::DATA_DIR_ENV;

/// Run workflows with compensation and checkpoint recovery.
#[derive(Parser)]
#[command(name = "forge", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    /// Directory holding forge.toml and persisted snapshots.
    #[arg(long, global = true, env = DATA_DIR_ENV)]
    pub data_dir: Option<PathBuf>,

    /// Snapshot backend: memory, file or sqlite.
    #[arg(long, global = true, default_value_t = StoreKind::File)]
    pub store: StoreKind,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the demonstration order workflow (reserve, charge, ship).
    Run(RunArgs),

    /// Inspect or clear stored snapshots.
    #[command(alias = "snap")]
    Snapshots {
        #[command(subcommand)]
        action: SnapshotsCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Order key. Reusing a key resumes that order's checkpoint.
    #[arg(long, default_value = "order-1001")]
    pub order: String,

    /// Units to reserve.
    #[arg(long, default_value_t = 2)]
    pub quantity: u32,

    /// Amount to charge, in cents.
    #[arg(long, default_value_t = 4_999)]
    pub amount_cents: u64,

    /// Make the operation at this index (0 = reserve) fail on every attempt.
    #[arg(long)]
    pub fail_at: Option<usize>,

    /// Make the charge step fail on its first N attempts.
    #[arg(long, default_value_t = 0)]
    pub flaky: u32,

    /// Override the configured number of recovery attempts.
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Run once with compensation instead of through the recovery driver.
    #[arg(long)]
    pub no_recover: bool,

    /// Engine configuration file (defaults to {data-dir}/forge.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SnapshotsCommand {
    /// List stored snapshots, newest first.
    #[command(alias = "ls")]
    List,

    /// Show one snapshot in full.
    Show {
        /// Foundry execution id, or the order key it was derived from.
        foundry: String,

        /// Workflow id or key (defaults to the demo workflow).
        #[arg(long)]
        workflow: Option<String>,
    },

    /// Delete snapshots.
    #[command(alias = "rm")]
    Clear {
        /// Foundry execution id or order key. Omit with --all to clear everything.
        foundry: Option<String>,

        /// Workflow id or key (defaults to the demo workflow).
        #[arg(long)]
        workflow: Option<String>,

        /// Delete every stored snapshot.
        #[arg(long, conflicts_with = "foundry")]
        all: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "forge", "run", "--fail-at", "2", "--flaky", "1", "--store", "sqlite", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.store, StoreKind::Sqlite);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.fail_at, Some(2));
        assert_eq!(args.flaky, 1);
        assert_eq!(args.order, "order-1001");
        assert!(!args.no_recover);
    }

    #[test]
    fn rejects_unknown_store() {
        assert!(Cli::try_parse_from(["forge", "--store", "redis", "snapshots", "list"]).is_err());
    }

    #[test]
    fn clear_all_conflicts_with_key() {
        assert!(Cli::try_parse_from(["forge", "snapshots", "clear", "order-1", "--all"]).is_err());
        assert!(Cli::try_parse_from(["forge", "snapshots", "clear", "--all"]).is_ok());
    }
}
