//! CLI command implementations

pub mod categorize;
pub mod demo;
pub mod logs;
pub mod rules;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tally_core::services::{EntryPoint, LogEvent, LoggingService};
use tally_core::TallyContext;

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let tally_dir = get_tally_dir().ok()?;
    std::fs::create_dir_all(&tally_dir).ok()?;
    match LoggingService::new(&tally_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")) {
        Ok(service) => Some(service),
        Err(e) => {
            tracing::debug!(error = %e, "Event log unavailable");
            None
        }
    }
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        if let Err(e) = l.log(event) {
            tracing::debug!(error = %e, "Failed to write event log");
        }
    }
}

/// Get the tally directory from `TALLY_DIR` or `~/.tally`
pub fn get_tally_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TALLY_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".tally"))
        .context("Could not find home directory; set TALLY_DIR")
}

/// Open the tally context, switching tenant when one was given
pub fn get_context(tenant: Option<String>) -> Result<TallyContext> {
    let tally_dir = get_tally_dir()?;
    std::fs::create_dir_all(&tally_dir)
        .with_context(|| format!("Failed to create tally directory: {:?}", tally_dir))?;

    let ctx = TallyContext::new(&tally_dir).context("Failed to initialize tally context")?;
    Ok(match tenant {
        Some(tenant) if !tenant.trim().is_empty() => ctx.with_tenant(tenant.trim()),
        _ => ctx,
    })
}
