//! Rules command - author and inspect categorization rules

use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use dialoguer::Confirm;
use rust_decimal::Decimal;

use super::{get_context, get_logger, log_event};
use crate::output;
use tally_core::domain::{MatchField, NewRule, Rule, RuleType, RuleUpdate};
use tally_core::ports::TransactionRepository;
use tally_core::services::LogEvent;

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Create a rule
    Add(AddArgs),
    /// List rules in evaluation order
    List {
        /// Only rules targeting this category id
        #[arg(long)]
        category: Option<i64>,
        /// Hide archived rules
        #[arg(long)]
        active_only: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one rule with its statistics
    Show {
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a rule's settings
    Update(UpdateArgs),
    /// Deactivate a rule without deleting it
    Archive {
        id: i64,
        #[arg(long)]
        by: Option<String>,
    },
    /// Reactivate an archived rule
    Unarchive {
        id: i64,
        #[arg(long)]
        by: Option<String>,
    },
    /// Soft delete a rule (system and high performing rules are protected)
    Delete {
        id: i64,
        #[arg(long)]
        by: Option<String>,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
    /// Evaluate a rule against existing transactions without changing anything
    Test {
        id: i64,
        /// Number of transactions to sample (defaults to categorization.testSampleSize)
        #[arg(long)]
        sample: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Summary statistics over all rules
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Zero a rule's match counters
    Reset { id: i64 },
}

#[derive(Args)]
pub struct AddArgs {
    /// Rule name
    name: String,
    /// Rule type: keyword, regex, amount, merchant, combined
    #[arg(long = "type", default_value = "keyword")]
    rule_type: String,
    /// Pattern searched in the matched field
    #[arg(long)]
    pattern: String,
    /// Target category id
    #[arg(long)]
    category: i64,
    /// Transaction field to match
    #[arg(long, default_value = "description")]
    field: String,
    /// Treat the pattern as a regular expression (default for regex rules)
    #[arg(long)]
    regex: bool,
    #[arg(long)]
    case_sensitive: bool,
    /// Inclusive minimum amount
    #[arg(long)]
    min: Option<String>,
    /// Inclusive maximum amount
    #[arg(long)]
    max: Option<String>,
    #[arg(long)]
    subcategory: Option<String>,
    #[arg(long)]
    priority: Option<i32>,
    /// Confidence recorded on categorized transactions (0.00 - 1.00)
    #[arg(long)]
    confidence: Option<String>,
    #[arg(long)]
    max_per_day: Option<u32>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    /// Comma-separated tags
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,
    /// Owning user
    #[arg(long)]
    user: Option<String>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct UpdateArgs {
    id: i64,
    #[arg(long)]
    name: Option<String>,
    #[arg(long = "type")]
    rule_type: Option<String>,
    #[arg(long)]
    pattern: Option<String>,
    #[arg(long)]
    category: Option<i64>,
    #[arg(long)]
    field: Option<String>,
    #[arg(long)]
    regex: Option<bool>,
    #[arg(long)]
    case_sensitive: Option<bool>,
    #[arg(long, conflicts_with = "clear_min")]
    min: Option<String>,
    #[arg(long, conflicts_with = "clear_max")]
    max: Option<String>,
    #[arg(long)]
    clear_min: bool,
    #[arg(long)]
    clear_max: bool,
    #[arg(long, conflicts_with = "clear_subcategory")]
    subcategory: Option<String>,
    #[arg(long)]
    clear_subcategory: bool,
    #[arg(long)]
    priority: Option<i32>,
    #[arg(long)]
    confidence: Option<String>,
    #[arg(long)]
    max_per_day: Option<u32>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    /// Replace tags (comma-separated, empty to clear)
    #[arg(long, value_delimiter = ',')]
    tags: Option<Vec<String>>,
    #[arg(long)]
    by: Option<String>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

fn parse_decimal(value: &str, flag: &str) -> Result<Decimal> {
    Decimal::from_str(value.trim()).with_context(|| format!("Invalid {} '{}'", flag, value))
}

fn parse_optional_decimal(value: Option<&str>, flag: &str) -> Result<Option<Decimal>> {
    value.map(|v| parse_decimal(v, flag)).transpose()
}

fn build_new_rule(args: AddArgs, tenant: &str) -> Result<NewRule> {
    let rule_type = RuleType::from_str(&args.rule_type)?;
    let field = MatchField::from_str(&args.field)?;

    let mut new_rule = NewRule::new(tenant, args.name, rule_type, args.pattern, args.category)
        .field(field)
        .case_sensitive(args.case_sensitive)
        .amount_range(
            parse_optional_decimal(args.min.as_deref(), "--min")?,
            parse_optional_decimal(args.max.as_deref(), "--max")?,
        )
        .tags(&args.tags);
    if args.regex {
        new_rule = new_rule.regex(true);
    }
    if let Some(subcategory) = args.subcategory {
        new_rule = new_rule.subcategory(subcategory);
    }
    if let Some(priority) = args.priority {
        new_rule = new_rule.priority(priority);
    }
    if let Some(confidence) = args.confidence.as_deref() {
        new_rule = new_rule.confidence(parse_decimal(confidence, "--confidence")?);
    }
    if let Some(max) = args.max_per_day {
        new_rule = new_rule.max_matches_per_day(max);
    }
    if let Some(user) = args.user {
        new_rule = new_rule.owned_by(user);
    }
    new_rule.description = args.description;
    new_rule.notes = args.notes;
    Ok(new_rule)
}

fn build_update(args: &UpdateArgs) -> Result<RuleUpdate> {
    let amount_min = if args.clear_min {
        Some(None)
    } else {
        parse_optional_decimal(args.min.as_deref(), "--min")?.map(Some)
    };
    let amount_max = if args.clear_max {
        Some(None)
    } else {
        parse_optional_decimal(args.max.as_deref(), "--max")?.map(Some)
    };
    let subcategory = if args.clear_subcategory {
        Some(None)
    } else {
        args.subcategory.clone().map(Some)
    };

    Ok(RuleUpdate {
        name: args.name.clone(),
        description: args.description.clone().map(Some),
        rule_type: args.rule_type.as_deref().map(RuleType::from_str).transpose()?,
        pattern: args.pattern.clone(),
        field_to_match: args.field.as_deref().map(MatchField::from_str).transpose()?,
        is_case_sensitive: args.case_sensitive,
        is_regex: args.regex,
        amount_min,
        amount_max,
        category_id: args.category,
        subcategory,
        priority: args.priority,
        confidence_threshold: parse_optional_decimal(args.confidence.as_deref(), "--confidence")?,
        max_matches_per_day: args.max_per_day,
        notes: args.notes.clone().map(Some),
        tags: args.tags.clone(),
    })
}

fn status_label(rule: &Rule) -> String {
    if rule.is_active {
        "active".green().to_string()
    } else {
        "archived".yellow().to_string()
    }
}

fn print_rule_table(rules: &[Rule]) {
    let mut table = output::create_table();
    table.set_header(vec![
        "ID", "Name", "Type", "Field", "Pattern", "Amount", "Category", "Priority", "Status",
        "Matches", "Success",
    ]);
    for rule in rules {
        table.add_row(vec![
            rule.id.to_string(),
            rule.name.clone(),
            rule.rule_type.to_string(),
            rule.field_to_match.to_string(),
            rule.pattern.clone(),
            output::format_amount_range(rule.amount_min, rule.amount_max),
            rule.category.name.clone(),
            rule.priority.to_string(),
            status_label(rule),
            rule.match_count().to_string(),
            output::format_rate(rule.success_rate()),
        ]);
    }
    println!("{}", table);
}

fn print_rule_detail(rule: &Rule) {
    println!("{} {}", format!("Rule {}:", rule.id).bold(), rule.name);
    if let Some(description) = &rule.description {
        println!("  {}", description.dimmed());
    }
    println!("  Status:      {}", status_label(rule));
    println!("  Type:        {}", rule.rule_type);
    println!(
        "  Match:       {} {} '{}'{}",
        rule.field_to_match,
        if rule.is_regex { "~" } else { "contains" },
        rule.pattern,
        if rule.is_case_sensitive { " (case sensitive)" } else { "" }
    );
    println!("  Amount:      {}", output::format_amount_range(rule.amount_min, rule.amount_max));
    match &rule.subcategory {
        Some(sub) => println!("  Category:    {} / {}", rule.category.name, sub),
        None => println!("  Category:    {}", rule.category.name),
    }
    println!("  Priority:    {}", rule.priority);
    println!("  Confidence:  {}", rule.confidence_threshold);
    println!("  Cap:         {}", rule.max_matches_per_day);
    if rule.is_system {
        println!("  System rule");
    }
    if !rule.tags.is_empty() {
        println!("  Tags:        {}", rule.tags.join(", "));
    }
    if let Some(notes) = &rule.notes {
        println!("  Notes:       {}", notes);
    }

    let stats = rule.stats();
    println!();
    println!("{}", "Statistics".bold());
    println!("  Matches:     {}", stats.match_count());
    println!("  Successes:   {}", stats.success_count());
    println!("  Success rate {}", output::format_rate(stats.success_rate()));
    if let Some(at) = stats.last_matched_at() {
        println!("  Last match:  {}", at.format("%Y-%m-%d %H:%M:%S"));
    }
    if rule.is_high_performing() {
        println!("  {}", "High performing".green());
    } else if rule.is_low_performing() {
        println!("  {}", "Low performing".red());
    }
    if rule.is_capped() {
        println!("  {}", "Capped: matches are passed to the next rule".yellow());
    }
}

pub fn run(command: RulesCommands, tenant: Option<String>) -> Result<()> {
    let ctx = get_context(tenant)?;
    let service = &ctx.rule_service;
    let tenant = ctx.tenant.as_str();
    let logger = get_logger();

    match command {
        RulesCommands::Add(args) => {
            let json = args.json;
            let rule = service.create_rule(build_new_rule(args, tenant)?)?;
            log_event(&logger, LogEvent::new("rule_created").with_command("rules add").with_rule(rule.id));
            if json {
                return output::print_json(&rule);
            }
            output::success(&format!("Created rule {} '{}'", rule.id, rule.name));
        }
        RulesCommands::List { category, active_only, json } => {
            let rules = match category {
                Some(category_id) => service.rules_by_category(category_id, tenant, active_only)?,
                None => {
                    let mut rules = service.list_rules(tenant)?;
                    if active_only {
                        rules.retain(|r| r.is_active);
                    }
                    rules
                }
            };
            if json {
                return output::print_json(&rules);
            }
            if rules.is_empty() {
                println!("No rules found. Use 'tally rules add' to create one.");
                return Ok(());
            }
            print_rule_table(&rules);
        }
        RulesCommands::Show { id, json } => {
            let rule = service.get_rule(id, tenant)?;
            if json {
                return output::print_json(&rule);
            }
            print_rule_detail(&rule);
        }
        RulesCommands::Update(args) => {
            let update = build_update(&args)?;
            if update.is_empty() {
                output::warning("Nothing to update.");
                return Ok(());
            }
            let rule = service.update_rule(args.id, tenant, &update, args.by.as_deref())?;
            log_event(&logger, LogEvent::new("rule_updated").with_command("rules update").with_rule(rule.id));
            if args.json {
                return output::print_json(&rule);
            }
            output::success(&format!("Updated rule {}", rule.id));
        }
        RulesCommands::Archive { id, by } => {
            service.archive_rule(id, tenant, by.as_deref())?;
            log_event(&logger, LogEvent::new("rule_archived").with_command("rules archive").with_rule(id));
            output::success(&format!("Archived rule {}", id));
        }
        RulesCommands::Unarchive { id, by } => {
            service.unarchive_rule(id, tenant, by.as_deref())?;
            log_event(&logger, LogEvent::new("rule_unarchived").with_command("rules unarchive").with_rule(id));
            output::success(&format!("Unarchived rule {}", id));
        }
        RulesCommands::Delete { id, by, force } => {
            let rule = service.get_rule(id, tenant)?;
            if !force {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Delete rule {} '{}'?", rule.id, rule.name))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    println!("Cancelled.");
                    return Ok(());
                }
            }
            if let Err(e) = service.delete_rule(id, tenant, by.as_deref()) {
                log_event(
                    &logger,
                    LogEvent::new("rule_delete_refused")
                        .with_command("rules delete")
                        .with_rule(id)
                        .with_error(e.to_string()),
                );
                return Err(e.into());
            }
            log_event(&logger, LogEvent::new("rule_deleted").with_command("rules delete").with_rule(id));
            output::success(&format!("Deleted rule {}", id));
        }
        RulesCommands::Test { id, sample, json } => {
            let result = match sample {
                Some(limit) => {
                    let transactions = ctx.repository.fetch_sample(tenant, limit)?;
                    service.test_rule(id, tenant, Some(&transactions))?
                }
                None => service.test_rule(id, tenant, None)?,
            };
            log_event(
                &logger,
                LogEvent::new("rule_tested")
                    .with_command("rules test")
                    .with_rule(id)
                    .with_count(result.total_tested),
            );
            if json {
                return output::print_json(&serde_json::json!({
                    "rule_id": id,
                    "result": result,
                    "match_rate": result.match_rate(),
                    "precision": result.precision(),
                }));
            }

            println!("{}", format!("Test results for rule {}", id).bold());
            let mut table = output::create_table();
            table.set_header(vec!["Tested", "Matches", "Successes", "False +", "False -", "Match rate", "Precision"]);
            table.add_row(vec![
                result.total_tested.to_string(),
                result.matches.to_string(),
                result.successes.to_string(),
                result.false_positives.to_string(),
                result.false_negatives.to_string(),
                output::format_rate(result.match_rate()),
                output::format_rate(result.precision()),
            ]);
            println!("{}", table);
        }
        RulesCommands::Stats { json } => {
            let summary = service.rule_stats(tenant)?;
            if json {
                return output::print_json(&summary);
            }

            println!("{}", "Rule Statistics".bold());
            println!(
                "  Total: {}  Active: {}  Archived: {}  System: {}  User: {}",
                summary.total_rules,
                summary.active_rules,
                summary.inactive_rules,
                summary.system_rules,
                summary.user_rules
            );
            if !summary.rules_by_type.is_empty() {
                let by_type: Vec<String> = summary
                    .rules_by_type
                    .iter()
                    .map(|(rule_type, count)| format!("{} {}", count, rule_type))
                    .collect();
                println!("  Active by type: {}", by_type.join(", "));
            }
            if !summary.top_rules.is_empty() {
                println!();
                println!("{}", "Top rules".bold());
                print_rule_table(&summary.top_rules);
            }
            if !summary.low_performing_rules.is_empty() {
                println!();
                println!("{}", "Low performing rules".red().bold());
                print_rule_table(&summary.low_performing_rules);
            }
        }
        RulesCommands::Reset { id } => {
            service.reset_statistics(id, tenant)?;
            log_event(&logger, LogEvent::new("rule_stats_reset").with_command("rules reset").with_rule(id));
            output::success(&format!("Reset statistics for rule {}", id));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: RulesCommands,
    }

    fn parse(args: &[&str]) -> RulesCommands {
        let mut full = vec!["rules"];
        full.extend_from_slice(args);
        TestCli::parse_from(full).command
    }

    #[test]
    fn test_add_builds_new_rule() {
        let RulesCommands::Add(args) = parse(&[
            "add", "Coffee", "--type", "regex", "--pattern", "^STARBUCKS", "--category", "4",
            "--field", "merchant", "--min", "1.50", "--tags", "food,daily", "--priority", "150",
        ]) else {
            panic!("expected add");
        };
        let rule = build_new_rule(args, "acme").unwrap();
        assert_eq!(rule.rule_type, RuleType::Regex);
        assert!(rule.is_regex);
        assert_eq!(rule.field_to_match, MatchField::MerchantName);
        assert_eq!(rule.amount_min, Some(Decimal::new(150, 2)));
        assert_eq!(rule.priority, Some(150));
        assert_eq!(rule.tags, vec!["food".to_string(), "daily".to_string()]);
        assert_eq!(rule.category_id, 4);
    }

    #[test]
    fn test_add_rejects_unknown_type_and_field() {
        let RulesCommands::Add(args) = parse(&["add", "x", "--type", "fuzzy", "--pattern", "x", "--category", "1"]) else {
            panic!("expected add");
        };
        assert!(build_new_rule(args, "acme").is_err());

        let RulesCommands::Add(args) = parse(&["add", "x", "--pattern", "x", "--category", "1", "--field", "memo"]) else {
            panic!("expected add");
        };
        assert!(build_new_rule(args, "acme").is_err());
    }

    #[test]
    fn test_update_clear_flags() {
        let RulesCommands::Update(args) = parse(&["update", "7", "--clear-min", "--clear-subcategory", "--priority", "5"]) else {
            panic!("expected update");
        };
        let update = build_update(&args).unwrap();
        assert_eq!(update.amount_min, Some(None));
        assert_eq!(update.amount_max, None);
        assert_eq!(update.subcategory, Some(None));
        assert_eq!(update.priority, Some(5));
        assert!(!update.is_empty());

        let RulesCommands::Update(args) = parse(&["update", "7"]) else {
            panic!("expected update");
        };
        assert!(build_update(&args).unwrap().is_empty());
    }
}
