//! Categorize command - run the active rules over transactions

use std::io::{self, Read};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use super::{get_context, get_logger, log_event};
use crate::output;
use tally_core::domain::DateRange;
use tally_core::services::{LogEvent, RunControl, TransactionSelection};

pub struct CategorizeArgs {
    pub ids: Vec<i64>,
    pub account: Option<i64>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub timeout: Option<u64>,
}

fn parse_date(value: &str, flag: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid {} date '{}', expected YYYY-MM-DD", flag, value))
}

/// Parse ids piped on stdin, one per line or comma separated
fn parse_ids(input: &str) -> Result<Vec<i64>> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .with_context(|| format!("Invalid transaction id '{}'", s))
        })
        .collect()
}

fn selection(args: &CategorizeArgs) -> Result<TransactionSelection> {
    if let Some(account_id) = args.account {
        let start = args.from.as_deref().map(|d| parse_date(d, "--from")).transpose()?;
        let end = args.to.as_deref().map(|d| parse_date(d, "--to")).transpose()?;
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                bail!("--from {} is after --to {}", start, end);
            }
        }
        let range = (start.is_some() || end.is_some()).then(|| DateRange::new(start, end));
        return Ok(TransactionSelection::Account { account_id, range });
    }

    let ids = if args.ids.is_empty() && atty::isnt(atty::Stream::Stdin) {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        parse_ids(&buffer)?
    } else {
        args.ids.clone()
    };

    if ids.is_empty() {
        bail!("No transactions selected. Use --ids, --account, or pipe IDs from stdin.");
    }
    Ok(TransactionSelection::Ids(ids))
}

pub fn run(args: CategorizeArgs, tenant: Option<String>, json: bool) -> Result<()> {
    let selection = selection(&args)?;
    let ctx = get_context(tenant)?;
    let logger = get_logger();

    let mut control = RunControl::new();
    if let Some(secs) = args.timeout {
        control = control.with_timeout(Duration::from_secs(secs));
    }

    let spinner = if json {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
        pb.set_message("Categorizing transactions...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    };

    let started = Instant::now();
    let result = ctx.bulk.categorize_many_with(&selection, &ctx.tenant, &control);
    spinner.finish_and_clear();

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            log_event(
                &logger,
                LogEvent::new("categorize_failed")
                    .with_command("categorize")
                    .with_error(e.to_string()),
            );
            return Err(e.into());
        }
    };

    log_event(
        &logger,
        LogEvent::new("categorize_completed")
            .with_command("categorize")
            .with_count(result.total)
            .with_duration_ms(started.elapsed().as_millis()),
    );

    if json {
        return output::print_json(&result);
    }

    if result.total == 0 {
        output::warning("No matching transactions found.");
        return Ok(());
    }

    println!(
        "{} Categorized {} of {} transaction(s)",
        "✓".green(),
        result.categorized,
        result.total
    );
    if result.failed > 0 {
        println!(
            "{} {} transaction(s) left uncategorized",
            "✗".yellow(),
            result.failed
        );
    }
    if result.cancelled {
        output::warning(&format!(
            "Stopped early: {} transaction(s) not processed",
            result.skipped
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ids() {
        assert_eq!(parse_ids("1\n2\n3\n").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_ids("4, 5,6").unwrap(), vec![4, 5, 6]);
        assert!(parse_ids("").unwrap().is_empty());
        assert!(parse_ids("7,x").is_err());
    }

    #[test]
    fn test_account_selection_with_range() {
        let args = CategorizeArgs {
            ids: Vec::new(),
            account: Some(3),
            from: Some("2024-01-01".to_string()),
            to: None,
            timeout: None,
        };
        match selection(&args).unwrap() {
            TransactionSelection::Account { account_id, range } => {
                assert_eq!(account_id, 3);
                let range = range.unwrap();
                assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 1, 1));
                assert!(range.end.is_none());
            }
            other => panic!("unexpected selection {:?}", other),
        }
    }

    #[test]
    fn test_inverted_range_rejected() {
        let args = CategorizeArgs {
            ids: Vec::new(),
            account: Some(3),
            from: Some("2024-02-01".to_string()),
            to: Some("2024-01-01".to_string()),
            timeout: None,
        };
        assert!(selection(&args).is_err());
    }
}
