//! Categorization engine - applies the first applicable rule to a transaction

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::domain::{Matcher, Rule, TenantId, Transaction};
use crate::ports::{RuleRepository, TransactionRepository};
use crate::services::selector::RuleSelector;

/// Result of categorizing one transaction
#[derive(Debug, Clone, Serialize)]
pub struct CategorizationOutcome {
    pub applied: bool,
    /// The applied rule, counters included
    pub rule: Option<Rule>,
}

impl CategorizationOutcome {
    fn applied(rule: Rule) -> Self {
        Self {
            applied: true,
            rule: Some(rule),
        }
    }

    fn no_match() -> Self {
        Self {
            applied: false,
            rule: None,
        }
    }
}

/// Categorizes transactions with the first matching, uncapped rule
///
/// Rules are scanned in evaluation order. A rule that matches but has reached
/// its cap is passed over and the scan continues. On a hit the transaction
/// and the rule's counters are written to storage as one unit. The caller's
/// transaction and rule are only updated once that write succeeded.
#[derive(Clone)]
pub struct CategorizationEngine {
    selector: RuleSelector,
    transactions: Arc<dyn TransactionRepository>,
}

impl CategorizationEngine {
    pub fn new(rules: Arc<dyn RuleRepository>, transactions: Arc<dyn TransactionRepository>) -> Self {
        Self {
            selector: RuleSelector::new(rules),
            transactions,
        }
    }

    pub fn selector(&self) -> &RuleSelector {
        &self.selector
    }

    /// Categorize one transaction against the tenant's active rules
    ///
    /// Errors fetching rules and storage errors while applying a rule are
    /// returned as-is. A transaction that matches nothing is left untouched.
    pub fn categorize(&self, tx: &mut Transaction, tenant: &TenantId) -> Result<CategorizationOutcome> {
        if tx.tenant_id != tenant {
            return Err(Error::not_found(format!(
                "Transaction {} for tenant {}",
                tx.id, tenant
            )));
        }
        let mut rules = self.selector.active_rules(tenant, None)?;
        self.categorize_with_rules(tx, &mut rules, &Matcher::new())
    }

    /// Categorize against an already selected rule list
    ///
    /// `rules` must be in evaluation order. The applied rule's in-memory
    /// counters are updated so later transactions of the same batch see the
    /// cap move.
    pub fn categorize_with_rules(
        &self,
        tx: &mut Transaction,
        rules: &mut [Rule],
        matcher: &Matcher,
    ) -> Result<CategorizationOutcome> {
        for rule in rules.iter_mut() {
            if !matcher.matches(rule, tx) {
                continue;
            }
            if rule.is_capped() {
                tracing::debug!(
                    rule_id = rule.id,
                    match_count = rule.match_count(),
                    max_matches_per_day = rule.max_matches_per_day,
                    "Rule matched but is capped, trying next rule"
                );
                continue;
            }

            let now = Utc::now();
            let mut categorized = tx.clone();
            categorized.categorize(
                &rule.category.name,
                rule.subcategory.as_deref(),
                Some(rule.confidence_threshold),
                Some(rule.id),
            );

            self.transactions.apply_categorization(&categorized, rule.id, now)?;

            *tx = categorized;
            rule.record_match(true, now);

            tracing::info!(
                transaction_id = tx.id,
                rule_id = rule.id,
                tenant_id = %rule.tenant_id,
                "Transaction categorized"
            );
            return Ok(CategorizationOutcome::applied(rule.clone()));
        }

        tracing::debug!(transaction_id = tx.id, "No matching rule found for transaction");
        Ok(CategorizationOutcome::no_match())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRepository;
    use crate::domain::{CategoryRef, RuleStats, RuleType};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn setup() -> (Arc<InMemoryRepository>, CategorizationEngine) {
        let repo = Arc::new(InMemoryRepository::new());
        let engine = CategorizationEngine::new(repo.clone(), repo.clone());
        (repo, engine)
    }

    fn rule(id: i64, pattern: &str, priority: i32, category: &str) -> Rule {
        let mut r = Rule::new(
            id,
            "acme",
            format!("rule {}", id),
            RuleType::Keyword,
            pattern,
            CategoryRef::new(id * 10, category),
        );
        r.priority = priority;
        r
    }

    fn tx(repo: &InMemoryRepository, description: &str) -> Transaction {
        repo.add_transaction(Transaction::new(
            0,
            "acme",
            1,
            Decimal::new(1250, 2),
            description,
            NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
        ))
        .unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let (repo, engine) = setup();
        repo.add_rule(rule(1, "coffee", 200, "Dining")).unwrap();
        repo.add_rule(rule(2, "coffee", 100, "Groceries")).unwrap();
        let mut t = tx(&repo, "Blue Bottle Coffee");

        let outcome = engine.categorize(&mut t, "acme").unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.rule.as_ref().map(|r| r.id), Some(1));
        assert_eq!(t.transaction_category.as_deref(), Some("Dining"));
        assert!(t.is_auto_categorized);
        assert_eq!(t.categorization_rule_id, Some(1));
        assert_eq!(t.categorization_confidence, Some(Decimal::new(80, 2)));

        let r1 = repo.rule(1).unwrap().unwrap();
        assert_eq!(r1.match_count(), 1);
        assert_eq!(r1.success_count(), 1);
        assert!(r1.stats().last_matched_at().is_some());
        assert!(r1.stats().last_success_at().is_some());

        let r2 = repo.rule(2).unwrap().unwrap();
        assert_eq!(r2.stats(), &RuleStats::default());

        // Persisted too
        let stored = repo.transaction(t.id).unwrap().unwrap();
        assert_eq!(stored.transaction_category.as_deref(), Some("Dining"));
    }

    #[test]
    fn test_deterministic_selection() {
        let (repo, engine) = setup();
        repo.add_rule(rule(7, "coffee", 100, "A")).unwrap();
        repo.add_rule(rule(3, "coffee", 100, "B")).unwrap();

        for _ in 0..3 {
            let mut t = tx(&repo, "coffee");
            let outcome = engine.categorize(&mut t, "acme").unwrap();
            assert_eq!(outcome.rule.map(|r| r.id), Some(3));
        }
    }

    #[test]
    fn test_no_match_leaves_everything_untouched() {
        let (repo, engine) = setup();
        repo.add_rule(rule(1, "coffee", 100, "Dining")).unwrap();
        let mut t = tx(&repo, "Shell Oil");
        let before = t.clone();

        let outcome = engine.categorize(&mut t, "acme").unwrap();
        assert!(!outcome.applied);
        assert!(outcome.rule.is_none());
        assert_eq!(t.transaction_category, before.transaction_category);
        assert!(!t.is_auto_categorized);
        assert_eq!(repo.rule(1).unwrap().unwrap().match_count(), 0);
    }

    #[test]
    fn test_capped_rule_falls_through() {
        let (repo, engine) = setup();
        let mut capped = rule(1, "coffee", 200, "Dining");
        capped.max_matches_per_day = 2;
        repo.add_rule(capped.with_stats(RuleStats::restore(2, 2, None, None))).unwrap();
        repo.add_rule(rule(2, "coffee", 100, "Groceries")).unwrap();

        let mut t = tx(&repo, "coffee beans");
        let outcome = engine.categorize(&mut t, "acme").unwrap();
        assert_eq!(outcome.rule.map(|r| r.id), Some(2));
        assert_eq!(t.transaction_category.as_deref(), Some("Groceries"));
        assert_eq!(repo.rule(1).unwrap().unwrap().match_count(), 2);
    }

    #[test]
    fn test_cap_reached_within_batch() {
        let (repo, engine) = setup();
        let mut limited = rule(1, "coffee", 100, "Dining");
        limited.max_matches_per_day = 1;
        repo.add_rule(limited).unwrap();

        let mut rules = engine.selector().active_rules("acme", None).unwrap();
        let matcher = Matcher::new();

        let mut first = tx(&repo, "coffee");
        assert!(engine.categorize_with_rules(&mut first, &mut rules, &matcher).unwrap().applied);
        let mut second = tx(&repo, "coffee");
        assert!(!engine.categorize_with_rules(&mut second, &mut rules, &matcher).unwrap().applied);
    }

    #[test]
    fn test_persist_failure_leaves_transaction_and_rule_untouched() {
        let (repo, engine) = setup();
        repo.add_rule(rule(1, "coffee", 100, "Dining")).unwrap();
        let mut t = tx(&repo, "coffee");
        repo.fail_persist_for(t.id).unwrap();

        assert!(engine.categorize(&mut t, "acme").is_err());
        assert!(t.transaction_category.is_none());
        assert_eq!(repo.rule(1).unwrap().unwrap().match_count(), 0);
    }

    #[test]
    fn test_missing_rule_rolls_back_transaction() {
        let (repo, engine) = setup();
        // Selected earlier, gone from storage since
        let mut rules = vec![rule(99, "coffee", 100, "Dining")];
        let mut t = tx(&repo, "coffee");

        assert!(engine
            .categorize_with_rules(&mut t, &mut rules, &Matcher::new())
            .is_err());
        assert!(t.transaction_category.is_none());
        assert_eq!(rules[0].match_count(), 0);
        let stored = repo.transaction(t.id).unwrap().unwrap();
        assert!(stored.transaction_category.is_none());
        assert!(stored.categorization_rule_id.is_none());
    }

    #[test]
    fn test_foreign_transaction_rejected() {
        let (repo, engine) = setup();
        let mut t = tx(&repo, "coffee");
        assert!(engine.categorize(&mut t, "other").is_err());
    }

    #[test]
    fn test_subcategory_written() {
        let (repo, engine) = setup();
        let mut r = rule(1, "uber", 100, "Transportation");
        r.subcategory = Some("Rideshare".to_string());
        r.confidence_threshold = Decimal::new(95, 2);
        repo.add_rule(r).unwrap();

        let mut t = tx(&repo, "UBER *TRIP");
        engine.categorize(&mut t, "acme").unwrap();
        assert_eq!(t.transaction_subcategory.as_deref(), Some("Rideshare"));
        assert_eq!(t.categorization_confidence, Some(Decimal::new(95, 2)));
    }
}
