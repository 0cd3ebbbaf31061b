//! Tally CLI - rule-based transaction categorization in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{categorize, demo, logs, rules};

/// Tally - categorize transactions with ordered rules
#[derive(Parser)]
#[command(name = "tally", version, about, long_about = None)]
struct Cli {
    /// Tenant to operate on (defaults to app.defaultTenant)
    #[arg(long, global = true, env = "TALLY_TENANT")]
    tenant: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage categorization rules
    Rules {
        #[command(subcommand)]
        command: rules::RulesCommands,
    },

    /// Categorize transactions with the active rules
    Categorize {
        /// Transaction IDs to categorize (or pipe them on stdin)
        #[arg(long, value_delimiter = ',', conflicts_with = "account")]
        ids: Vec<i64>,
        /// Categorize every transaction of this account
        #[arg(long)]
        account: Option<i64>,
        /// First transaction date, inclusive (YYYY-MM-DD)
        #[arg(long, requires = "account")]
        from: Option<String>,
        /// Last transaction date, inclusive (YYYY-MM-DD)
        #[arg(long, requires = "account")]
        to: Option<String>,
        /// Stop after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage demo mode
    Demo {
        #[command(subcommand)]
        command: Option<demo::DemoCommands>,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TALLY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let tenant = cli.tenant;
    match cli.command {
        Commands::Rules { command } => rules::run(command, tenant),
        Commands::Categorize { ids, account, from, to, timeout, json } => {
            categorize::run(categorize::CategorizeArgs { ids, account, from, to, timeout }, tenant, json)
        }
        Commands::Demo { command } => demo::run(command),
        Commands::Logs { command } => logs::run(command),
    }
}
