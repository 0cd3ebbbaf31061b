//! Rule service - authoring, lifecycle and reporting for categorization rules

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::domain::{
    test_against_sample, CategoryRef, NewRule, Rule, RuleDefaults, RuleTestResult, RuleType,
    RuleUpdate, TenantId, Transaction,
};
use crate::ports::{CategoryRepository, RuleRepository, TransactionRepository};

/// Number of rules listed in `RuleStatsSummary::top_rules`
const TOP_RULES: usize = 5;

/// Aggregate view over a tenant's rules
#[derive(Debug, Clone, Serialize)]
pub struct RuleStatsSummary {
    pub total_rules: usize,
    pub active_rules: usize,
    pub inactive_rules: usize,
    pub system_rules: usize,
    pub user_rules: usize,
    /// Active rules per rule type
    pub rules_by_type: BTreeMap<String, usize>,
    /// Most successful active rules
    pub top_rules: Vec<Rule>,
    pub low_performing_rules: Vec<Rule>,
}

pub struct RuleService {
    rules: Arc<dyn RuleRepository>,
    transactions: Arc<dyn TransactionRepository>,
    categories: Arc<dyn CategoryRepository>,
    defaults: RuleDefaults,
    sample_size: usize,
}

impl RuleService {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        transactions: Arc<dyn TransactionRepository>,
        categories: Arc<dyn CategoryRepository>,
        defaults: RuleDefaults,
        sample_size: usize,
    ) -> Self {
        Self {
            rules,
            transactions,
            categories,
            defaults,
            sample_size,
        }
    }

    /// Validate and store a new rule
    ///
    /// The target category must exist for the tenant. Control settings the
    /// caller left unset come from the configured defaults.
    pub fn create_rule(&self, new_rule: NewRule) -> Result<Rule> {
        let category = self.resolve_category(new_rule.category_id, &new_rule.tenant_id)?;
        let rule = new_rule.into_rule(category, &self.defaults);
        rule.validate()?;

        let created = self.rules.insert(&rule)?;
        tracing::info!(
            rule_id = created.id,
            tenant_id = %created.tenant_id,
            rule_type = %created.rule_type,
            "Created rule"
        );
        Ok(created)
    }

    pub fn get_rule(&self, rule_id: i64, tenant: &TenantId) -> Result<Rule> {
        self.rules
            .get(rule_id, tenant)?
            .ok_or_else(|| Error::not_found(format!("Rule {}", rule_id)))
    }

    /// All non-deleted rules, in evaluation order
    pub fn list_rules(&self, tenant: &TenantId) -> Result<Vec<Rule>> {
        self.rules.list(tenant)
    }

    pub fn rules_by_category(&self, category_id: i64, tenant: &TenantId, active_only: bool) -> Result<Vec<Rule>> {
        let mut rules = self.rules.list(tenant)?;
        rules.retain(|r| r.category.id == category_id && (!active_only || r.is_active));
        Ok(rules)
    }

    /// Apply a partial update and re-validate the whole rule
    ///
    /// Counters are never touched by an update.
    pub fn update_rule(
        &self,
        rule_id: i64,
        tenant: &TenantId,
        update: &RuleUpdate,
        updated_by: Option<&str>,
    ) -> Result<Rule> {
        let mut rule = self.get_rule(rule_id, tenant)?;
        if update.is_empty() {
            return Ok(rule);
        }

        if let Some(category_id) = update.category_id {
            rule.category = self.resolve_category(category_id, tenant)?;
        }
        update.apply(&mut rule);
        rule.validate()?;
        rule.touch(updated_by);

        self.rules.persist(&rule)?;
        tracing::info!(rule_id, tenant_id = tenant, "Updated rule");
        Ok(rule)
    }

    pub fn archive_rule(&self, rule_id: i64, tenant: &TenantId, by: Option<&str>) -> Result<Rule> {
        let mut rule = self.get_rule(rule_id, tenant)?;
        rule.archive(by);
        self.rules.persist(&rule)?;
        tracing::info!(rule_id, tenant_id = tenant, "Archived rule");
        Ok(rule)
    }

    pub fn unarchive_rule(&self, rule_id: i64, tenant: &TenantId, by: Option<&str>) -> Result<Rule> {
        let mut rule = self.get_rule(rule_id, tenant)?;
        rule.unarchive(by);
        self.rules.persist(&rule)?;
        tracing::info!(rule_id, tenant_id = tenant, "Unarchived rule");
        Ok(rule)
    }

    /// Soft delete a rule
    ///
    /// System rules and high performing rules are refused with a
    /// validation error.
    pub fn delete_rule(&self, rule_id: i64, tenant: &TenantId, by: Option<&str>) -> Result<Rule> {
        let mut rule = self.get_rule(rule_id, tenant)?;
        if let Err(e) = rule.soft_delete(by) {
            tracing::warn!(
                rule_id,
                is_system = rule.is_system,
                success_rate = rule.success_rate(),
                "Refused to delete protected rule"
            );
            return Err(e);
        }
        self.rules.persist(&rule)?;
        tracing::info!(rule_id, tenant_id = tenant, "Deleted rule");
        Ok(rule)
    }

    /// Evaluate a rule against a sample without changing anything
    ///
    /// Without an explicit sample, the first configured number of the
    /// tenant's transactions is used.
    pub fn test_rule(
        &self,
        rule_id: i64,
        tenant: &TenantId,
        sample: Option<&[Transaction]>,
    ) -> Result<RuleTestResult> {
        let rule = self.get_rule(rule_id, tenant)?;
        let result = match sample {
            Some(sample) => test_against_sample(&rule, sample),
            None => {
                let sample = self.transactions.fetch_sample(tenant, self.sample_size)?;
                test_against_sample(&rule, &sample)
            }
        };
        tracing::debug!(
            rule_id,
            total_tested = result.total_tested,
            matches = result.matches,
            "Tested rule"
        );
        Ok(result)
    }

    /// Zero a rule's counters and timestamps
    pub fn reset_statistics(&self, rule_id: i64, tenant: &TenantId) -> Result<Rule> {
        let mut rule = self.get_rule(rule_id, tenant)?;
        self.rules.reset_stats(rule_id, tenant)?;
        rule.reset_statistics();
        tracing::info!(rule_id, tenant_id = tenant, "Reset rule statistics");
        Ok(rule)
    }

    pub fn rule_stats(&self, tenant: &TenantId) -> Result<RuleStatsSummary> {
        let rules = self.rules.list(tenant)?;

        let active: Vec<&Rule> = rules.iter().filter(|r| r.is_active).collect();
        let system_rules = rules.iter().filter(|r| r.is_system).count();

        let mut rules_by_type: BTreeMap<String, usize> =
            RuleType::ALL.iter().map(|t| (t.to_string(), 0)).collect();
        for rule in &active {
            *rules_by_type.entry(rule.rule_type.to_string()).or_insert(0) += 1;
        }

        let mut top: Vec<&Rule> = active.clone();
        top.sort_by(|a, b| {
            b.success_count()
                .cmp(&a.success_count())
                .then(a.id.cmp(&b.id))
        });
        let top_rules = top.into_iter().take(TOP_RULES).cloned().collect();

        let low_performing_rules = active
            .iter()
            .filter(|r| r.is_low_performing())
            .map(|r| (*r).clone())
            .collect();

        Ok(RuleStatsSummary {
            total_rules: rules.len(),
            active_rules: active.len(),
            inactive_rules: rules.len() - active.len(),
            system_rules,
            user_rules: rules.len() - system_rules,
            rules_by_type,
            top_rules,
            low_performing_rules,
        })
    }

    fn resolve_category(&self, category_id: i64, tenant: &TenantId) -> Result<CategoryRef> {
        self.categories
            .get(category_id, tenant)?
            .map(|c| c.reference())
            .ok_or_else(|| Error::validation(format!("Category {} does not exist", category_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRepository;
    use crate::domain::{Category, RuleStats};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    struct Fixture {
        repo: Arc<InMemoryRepository>,
        service: RuleService,
        dining: Category,
        travel: Category,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryRepository::new());
        let dining = repo.add_category(Category::new(0, "acme", "Dining", "expense")).unwrap();
        let travel = repo.add_category(Category::new(0, "acme", "Travel", "expense")).unwrap();
        let service = RuleService::new(
            repo.clone(),
            repo.clone(),
            repo.clone(),
            RuleDefaults::default(),
            50,
        );
        Fixture {
            repo,
            service,
            dining,
            travel,
        }
    }

    fn keyword(f: &Fixture, pattern: &str) -> Rule {
        f.service
            .create_rule(NewRule::new("acme", pattern, RuleType::Keyword, pattern, f.dining.id))
            .unwrap()
    }

    #[test]
    fn test_create_applies_defaults() {
        let f = fixture();
        let rule = keyword(&f, "coffee");
        assert!(rule.id > 0);
        assert_eq!(rule.priority, 100);
        assert_eq!(rule.confidence_threshold, Decimal::new(80, 2));
        assert_eq!(rule.max_matches_per_day, 1000);
        assert_eq!(rule.category, f.dining.reference());
        assert_eq!(rule.match_count(), 0);
    }

    #[test]
    fn test_create_uses_configured_defaults() {
        let repo = Arc::new(InMemoryRepository::new());
        let cat = repo.add_category(Category::new(0, "acme", "Dining", "expense")).unwrap();
        let defaults = RuleDefaults {
            priority: 7,
            confidence: Decimal::new(50, 2),
            max_matches_per_day: 3,
        };
        let service = RuleService::new(repo.clone(), repo.clone(), repo.clone(), defaults, 10);
        let rule = service
            .create_rule(NewRule::new("acme", "x", RuleType::Keyword, "x", cat.id).priority(9))
            .unwrap();
        assert_eq!(rule.priority, 9);
        assert_eq!(rule.confidence_threshold, Decimal::new(50, 2));
        assert_eq!(rule.max_matches_per_day, 3);
    }

    #[test]
    fn test_create_rejects_invalid_rules() {
        let f = fixture();

        let unknown = f
            .service
            .create_rule(NewRule::new("acme", "x", RuleType::Keyword, "x", 999))
            .unwrap_err();
        assert!(unknown.is_validation());

        // Category of another tenant
        let foreign = f
            .service
            .create_rule(NewRule::new("other", "x", RuleType::Keyword, "x", f.dining.id))
            .unwrap_err();
        assert!(foreign.is_validation());

        let bad_regex = f
            .service
            .create_rule(NewRule::new("acme", "x", RuleType::Regex, "([a-z", f.dining.id))
            .unwrap_err();
        assert!(bad_regex.is_validation());

        let inverted = f
            .service
            .create_rule(
                NewRule::new("acme", "x", RuleType::Amount, "x", f.dining.id)
                    .amount_range(Some(Decimal::new(50, 0)), Some(Decimal::new(10, 0))),
            )
            .unwrap_err();
        assert!(inverted.is_validation());

        let confidence = f
            .service
            .create_rule(NewRule::new("acme", "x", RuleType::Keyword, "x", f.dining.id).confidence(Decimal::new(15, 1)))
            .unwrap_err();
        assert!(confidence.is_validation());

        assert!(f.service.list_rules("acme").unwrap().is_empty());
    }

    #[test]
    fn test_update_revalidates_and_keeps_counters() {
        let f = fixture();
        let rule = keyword(&f, "coffee");
        f.repo
            .record_match(rule.id, "acme", true, chrono::Utc::now())
            .unwrap();

        let update = RuleUpdate {
            priority: Some(250),
            category_id: Some(f.travel.id),
            ..Default::default()
        };
        let updated = f.service.update_rule(rule.id, "acme", &update, Some("alice")).unwrap();
        assert_eq!(updated.priority, 250);
        assert_eq!(updated.category.name, "Travel");
        assert_eq!(updated.updated_by.as_deref(), Some("alice"));
        assert_eq!(updated.match_count(), 1);

        let bad = RuleUpdate {
            is_regex: Some(true),
            pattern: Some("(".to_string()),
            ..Default::default()
        };
        assert!(f.service.update_rule(rule.id, "acme", &bad, None).unwrap_err().is_validation());

        let missing_category = RuleUpdate {
            category_id: Some(404),
            ..Default::default()
        };
        assert!(f
            .service
            .update_rule(rule.id, "acme", &missing_category, None)
            .unwrap_err()
            .is_validation());

        let stored = f.service.get_rule(rule.id, "acme").unwrap();
        assert_eq!(stored.pattern, "coffee");
        assert_eq!(stored.priority, 250);
    }

    #[test]
    fn test_archive_unarchive() {
        let f = fixture();
        let rule = keyword(&f, "coffee");

        let archived = f.service.archive_rule(rule.id, "acme", None).unwrap();
        assert!(!archived.is_active);
        assert!(f.repo.fetch_active("acme", None).unwrap().is_empty());

        let restored = f.service.unarchive_rule(rule.id, "acme", None).unwrap();
        assert!(restored.is_active);
        assert_eq!(f.repo.fetch_active("acme", None).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_guard() {
        let f = fixture();

        let system = f
            .service
            .create_rule(NewRule::new("acme", "sys", RuleType::Keyword, "sys", f.dining.id).system())
            .unwrap();
        assert!(f.service.delete_rule(system.id, "acme", None).unwrap_err().is_validation());

        let strong = keyword(&f, "strong");
        f.repo
            .add_rule(
                f.service
                    .get_rule(strong.id, "acme")
                    .unwrap()
                    .with_stats(RuleStats::restore(12, 11, None, None)),
            )
            .unwrap();
        assert!(f.service.delete_rule(strong.id, "acme", None).unwrap_err().is_validation());

        let weak = keyword(&f, "weak");
        let deleted = f.service.delete_rule(weak.id, "acme", Some("bob")).unwrap();
        assert!(deleted.is_deleted());
        assert!(matches!(
            f.service.get_rule(weak.id, "acme"),
            Err(Error::NotFound(_))
        ));
        assert_eq!(f.service.list_rules("acme").unwrap().len(), 2);
    }

    #[test]
    fn test_rule_uses_configured_sample() {
        let f = fixture();
        let rule = keyword(&f, "coffee");
        for day in 1..=3 {
            let mut tx = Transaction::new(
                0,
                "acme",
                1,
                Decimal::new(500, 2),
                "coffee",
                NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            );
            if day == 1 {
                tx.categorize("Dining", None, None, None);
            }
            f.repo.add_transaction(tx).unwrap();
        }

        let result = f.service.test_rule(rule.id, "acme", None).unwrap();
        assert_eq!(result.total_tested, 3);
        assert_eq!(result.matches, 3);
        assert_eq!(result.successes, 1);
        assert_eq!(result.false_positives, 2);

        let explicit: Vec<Transaction> = Vec::new();
        let result = f.service.test_rule(rule.id, "acme", Some(&explicit)).unwrap();
        assert_eq!(result.total_tested, 0);

        // Testing never moves counters
        assert_eq!(f.service.get_rule(rule.id, "acme").unwrap().match_count(), 0);
    }

    #[test]
    fn test_reset_statistics() {
        let f = fixture();
        let rule = keyword(&f, "coffee");
        f.repo.record_match(rule.id, "acme", true, chrono::Utc::now()).unwrap();

        let reset = f.service.reset_statistics(rule.id, "acme").unwrap();
        assert_eq!(reset.stats(), &RuleStats::default());
        assert_eq!(
            f.service.get_rule(rule.id, "acme").unwrap().stats(),
            &RuleStats::default()
        );
    }

    #[test]
    fn test_rule_stats_summary() {
        let f = fixture();
        let mut ids = Vec::new();
        for (i, successes) in [3u64, 9, 9, 1, 0, 5].iter().enumerate() {
            let rule = keyword(&f, &format!("p{}", i));
            let stored = f.service.get_rule(rule.id, "acme").unwrap();
            let matches = if i == 4 { 6 } else { *successes };
            f.repo
                .add_rule(stored.with_stats(RuleStats::restore(matches, *successes, None, None)))
                .unwrap();
            ids.push(rule.id);
        }
        f.service.archive_rule(ids[3], "acme", None).unwrap();
        f.service
            .create_rule(NewRule::new("acme", "re", RuleType::Regex, "^A", f.dining.id).system())
            .unwrap();

        let summary = f.service.rule_stats("acme").unwrap();
        assert_eq!(summary.total_rules, 7);
        assert_eq!(summary.active_rules, 6);
        assert_eq!(summary.inactive_rules, 1);
        assert_eq!(summary.system_rules, 1);
        assert_eq!(summary.user_rules, 6);
        assert_eq!(summary.rules_by_type.get("keyword"), Some(&5));
        assert_eq!(summary.rules_by_type.get("regex"), Some(&1));
        assert_eq!(summary.rules_by_type.get("amount"), Some(&0));
        assert_eq!(summary.rules_by_type.len(), RuleType::ALL.len());

        let top: Vec<i64> = summary.top_rules.iter().map(|r| r.id).collect();
        assert_eq!(top.len(), 5);
        assert_eq!(&top[..4], &[ids[1], ids[2], ids[5], ids[0]]);

        let low: Vec<i64> = summary.low_performing_rules.iter().map(|r| r.id).collect();
        assert_eq!(low, vec![ids[4]]);
    }
}
