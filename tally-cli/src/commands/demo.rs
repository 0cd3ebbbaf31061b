//! Demo command - manage demo mode

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use super::{get_logger, get_tally_dir, log_event};
use tally_core::services::{DemoService, LogEvent};

#[derive(Subcommand)]
pub enum DemoCommands {
    /// Enable demo mode with freshly seeded data
    #[command(name = "on")]
    On,
    /// Disable demo mode
    #[command(name = "off")]
    Off {
        /// Also delete the demo database
        #[arg(long)]
        clean: bool,
    },
    /// Show demo mode status
    Status,
}

pub fn run(command: Option<DemoCommands>) -> Result<()> {
    let tally_dir = get_tally_dir()?;
    std::fs::create_dir_all(&tally_dir)?;
    let demo_service = DemoService::new(&tally_dir);
    let logger = get_logger();

    match command {
        Some(DemoCommands::On) => {
            let seed = demo_service.enable()?;
            log_event(&logger, LogEvent::new("demo_enabled").with_command("demo on"));
            println!("{}", "Demo mode enabled".green());
            println!(
                "Seeded {} categories, {} rules and {} transactions for tenant '{}'.",
                seed.categories, seed.rules, seed.transactions, seed.tenant
            );
            println!("Run 'tally rules list' to see the demo rules.");
            Ok(())
        }
        Some(DemoCommands::Off { clean }) => {
            demo_service.disable(clean)?;
            log_event(&logger, LogEvent::new("demo_disabled").with_command("demo off"));
            println!("{}", "Demo mode disabled".yellow());
            Ok(())
        }
        Some(DemoCommands::Status) | None => {
            if demo_service.is_enabled()? {
                println!("Demo mode is {}", "ON".green());
            } else {
                println!("Demo mode is {}", "OFF".yellow());
            }
            Ok(())
        }
    }
}
