//! Demo data generator
//!
//! Generates a realistic, deterministic demo dataset:
//! - a handful of expense and income categories
//! - categorization rules covering keyword, regex, merchant and amount styles
//! - 120 days of uncategorized transactions on two accounts

use chrono::{Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::domain::{Category, MatchField, Rule, RuleType, TenantId, Transaction};

/// Demo checking account id
pub const DEMO_CHECKING_ACCOUNT: i64 = 1;

/// Demo credit card account id
pub const DEMO_CARD_ACCOUNT: i64 = 2;

const CATEGORIES: &[(&str, &str)] = &[
    ("Income", "income"),
    ("Housing", "expense"),
    ("Utilities", "expense"),
    ("Groceries", "expense"),
    ("Dining", "expense"),
    ("Transportation", "expense"),
    ("Entertainment", "expense"),
    ("Shopping", "expense"),
    ("Transfers", "transfer"),
];

/// Generate demo categories (ids are assigned on insert)
pub fn generate_demo_categories(tenant: &TenantId) -> Vec<Category> {
    CATEGORIES
        .iter()
        .map(|(name, kind)| {
            let mut category = Category::new(0, tenant, *name, *kind);
            category.is_system = true;
            category
        })
        .collect()
}

struct DemoRule {
    name: &'static str,
    rule_type: RuleType,
    pattern: &'static str,
    field: MatchField,
    is_regex: bool,
    category: &'static str,
    subcategory: Option<&'static str>,
    priority: i32,
    amount_min: Option<i64>,
}

const RULES: &[DemoRule] = &[
    DemoRule {
        name: "Payroll",
        rule_type: RuleType::Keyword,
        pattern: "payroll",
        field: MatchField::Description,
        is_regex: false,
        category: "Income",
        subcategory: Some("Salary"),
        priority: 200,
        amount_min: None,
    },
    DemoRule {
        name: "Rent",
        rule_type: RuleType::Keyword,
        pattern: "rent payment",
        field: MatchField::Description,
        is_regex: false,
        category: "Housing",
        subcategory: Some("Rent"),
        priority: 150,
        amount_min: None,
    },
    DemoRule {
        name: "Utilities",
        rule_type: RuleType::Regex,
        pattern: r"(utilities|comcast|internet)",
        field: MatchField::Description,
        is_regex: true,
        category: "Utilities",
        subcategory: None,
        priority: 120,
        amount_min: None,
    },
    DemoRule {
        name: "Grocery stores",
        rule_type: RuleType::Merchant,
        pattern: "whole foods",
        field: MatchField::MerchantName,
        is_regex: false,
        category: "Groceries",
        subcategory: None,
        priority: 100,
        amount_min: None,
    },
    DemoRule {
        name: "Coffee shops",
        rule_type: RuleType::Keyword,
        pattern: "starbucks",
        field: MatchField::Description,
        is_regex: false,
        category: "Dining",
        subcategory: Some("Coffee"),
        priority: 110,
        amount_min: None,
    },
    DemoRule {
        name: "Restaurants",
        rule_type: RuleType::Regex,
        pattern: r"^(CHIPOTLE|SWEETGREEN|SHAKE SHACK)",
        field: MatchField::Description,
        is_regex: true,
        category: "Dining",
        subcategory: Some("Restaurants"),
        priority: 100,
        amount_min: None,
    },
    DemoRule {
        name: "Fuel",
        rule_type: RuleType::Keyword,
        pattern: "shell oil",
        field: MatchField::Description,
        is_regex: false,
        category: "Transportation",
        subcategory: Some("Fuel"),
        priority: 100,
        amount_min: None,
    },
    DemoRule {
        name: "Streaming",
        rule_type: RuleType::Regex,
        pattern: r"(netflix|spotify)",
        field: MatchField::Description,
        is_regex: true,
        category: "Entertainment",
        subcategory: Some("Subscriptions"),
        priority: 100,
        amount_min: None,
    },
    DemoRule {
        name: "Large Amazon orders",
        rule_type: RuleType::Combined,
        pattern: "amzn",
        field: MatchField::Description,
        is_regex: false,
        category: "Shopping",
        subcategory: Some("Large purchases"),
        priority: 90,
        amount_min: Some(10000),
    },
    DemoRule {
        name: "Savings transfers",
        rule_type: RuleType::Keyword,
        pattern: "transfer to savings",
        field: MatchField::Description,
        is_regex: false,
        category: "Transfers",
        subcategory: None,
        priority: 80,
        amount_min: None,
    },
];

/// Generate demo rules targeting the given (already stored) categories
///
/// Rules whose category is missing from `categories` are skipped.
pub fn generate_demo_rules(tenant: &TenantId, categories: &[Category]) -> Vec<Rule> {
    RULES
        .iter()
        .filter_map(|demo| {
            let category = categories.iter().find(|c| c.name == demo.category)?;
            let mut rule = Rule::new(
                0,
                tenant,
                demo.name,
                demo.rule_type,
                demo.pattern,
                category.reference(),
            );
            rule.field_to_match = demo.field;
            rule.is_regex = demo.is_regex;
            rule.subcategory = demo.subcategory.map(str::to_string);
            rule.priority = demo.priority;
            rule.amount_min = demo.amount_min.map(|cents| Decimal::new(cents, 2));
            rule.is_system = true;
            Some(rule)
        })
        .collect()
}

/// Generate demo transactions ending today
pub fn generate_demo_transactions(tenant: &TenantId) -> Vec<Transaction> {
    generate_demo_transactions_until(tenant, Utc::now().date_naive())
}

/// Generate 120 days of demo transactions ending on `today`
pub fn generate_demo_transactions_until(tenant: &TenantId, today: NaiveDate) -> Vec<Transaction> {
    let mut transactions = Vec::new();

    for days_ago in 0..120i64 {
        let date = today - Duration::days(days_ago);
        let day_of_month = date.day();

        // Paycheck on 1st and 15th
        if day_of_month == 1 || day_of_month == 15 {
            let mut tx = create_transaction(
                tenant,
                DEMO_CHECKING_ACCOUNT,
                date,
                425000,
                "ACME CORP PAYROLL DIRECT DEPOSIT",
                None,
            );
            tx.transaction_type = "credit".to_string();
            transactions.push(tx);
        }

        if day_of_month == 5 {
            transactions.push(create_transaction(
                tenant,
                DEMO_CHECKING_ACCOUNT,
                date,
                225000,
                "APARTMENT RENT PAYMENT",
                None,
            ));
        }

        if day_of_month == 10 {
            transactions.push(create_transaction(
                tenant,
                DEMO_CHECKING_ACCOUNT,
                date,
                15000,
                "CITY UTILITIES - ELECTRIC",
                None,
            ));
            transactions.push(create_transaction(
                tenant,
                DEMO_CHECKING_ACCOUNT,
                date,
                7500,
                "COMCAST INTERNET",
                None,
            ));
        }

        if day_of_month == 16 {
            let mut tx = create_transaction(
                tenant,
                DEMO_CHECKING_ACCOUNT,
                date,
                75000,
                "TRANSFER TO SAVINGS",
                None,
            );
            tx.transaction_type = "transfer".to_string();
            transactions.push(tx);
        }

        // Groceries every 3 days
        if days_ago % 3 == 0 {
            let amounts = [8523i64, 6745, 9234, 7100, 5899, 10523];
            transactions.push(create_transaction(
                tenant,
                DEMO_CARD_ACCOUNT,
                date,
                amounts[days_ago as usize % amounts.len()],
                "WFM #10234 AUSTIN TX",
                Some("Whole Foods Market"),
            ));
        }

        // Coffee every 2 days
        if days_ago % 2 == 0 {
            transactions.push(create_transaction(
                tenant,
                DEMO_CARD_ACCOUNT,
                date,
                565,
                "STARBUCKS STORE 04521",
                Some("Starbucks"),
            ));
        }

        // Dining out a few times a week
        if days_ago % 3 == 1 || days_ago % 7 == 0 {
            let restaurants = [
                ("CHIPOTLE MEXICAN GRILL", 1250i64),
                ("SWEETGREEN", 1450),
                ("THE CAPITAL GRILLE", 8500),
                ("PHO RESTAURANTS", 2200),
                ("SHAKE SHACK", 1875),
            ];
            let (name, amount) = restaurants[days_ago as usize % restaurants.len()];
            transactions.push(create_transaction(tenant, DEMO_CARD_ACCOUNT, date, amount, name, None));
        }

        if days_ago % 7 == 0 {
            transactions.push(create_transaction(
                tenant,
                DEMO_CARD_ACCOUNT,
                date,
                5500,
                "SHELL OIL 57442",
                None,
            ));
        }

        if day_of_month == 3 {
            transactions.push(create_transaction(tenant, DEMO_CARD_ACCOUNT, date, 1599, "NETFLIX.COM", None));
        }
        if day_of_month == 7 {
            transactions.push(create_transaction(tenant, DEMO_CARD_ACCOUNT, date, 1099, "SPOTIFY PREMIUM", None));
        }

        // Amazon orders, small and large
        if days_ago % 11 == 0 {
            let amount = if days_ago % 2 == 0 { 2499 } else { 18999 };
            transactions.push(create_transaction(
                tenant,
                DEMO_CARD_ACCOUNT,
                date,
                amount,
                "AMZN MKTP US*2K4LP",
                Some("Amazon"),
            ));
        }
    }

    transactions
}

fn create_transaction(
    tenant: &TenantId,
    account_id: i64,
    date: NaiveDate,
    cents: i64,
    description: &str,
    merchant: Option<&str>,
) -> Transaction {
    let mut tx = Transaction::new(0, tenant, account_id, Decimal::new(cents, 2), description, date);
    tx.original_description = Some(description.to_string());
    tx.merchant_name = merchant.map(str::to_string);
    tx.payment_method = Some(if account_id == DEMO_CARD_ACCOUNT { "card" } else { "ach" }.to_string());
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::matches;

    fn stored_categories() -> Vec<Category> {
        generate_demo_categories("demo")
            .into_iter()
            .enumerate()
            .map(|(i, mut c)| {
                c.id = i as i64 + 1;
                c
            })
            .collect()
    }

    #[test]
    fn test_every_rule_has_a_category() {
        let rules = generate_demo_rules("demo", &stored_categories());
        assert_eq!(rules.len(), RULES.len());
        for rule in &rules {
            rule.validate().unwrap();
        }
    }

    #[test]
    fn test_transactions_are_deterministic() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let a = generate_demo_transactions_until("demo", today);
        let b = generate_demo_transactions_until("demo", today);
        assert_eq!(a.len(), b.len());
        assert!(a.iter().all(|t| t.amount > Decimal::ZERO));
        assert!(a.iter().all(|t| !t.is_categorized()));
    }

    #[test]
    fn test_demo_rules_cover_demo_data() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let rules = generate_demo_rules("demo", &stored_categories());
        let txs = generate_demo_transactions_until("demo", today);
        let covered = txs
            .iter()
            .filter(|t| rules.iter().any(|r| matches(r, *t)))
            .count();
        // The upscale restaurant and small Amazon orders stay uncategorized
        assert!(covered > txs.len() / 2);
        assert!(covered < txs.len());
    }
}
