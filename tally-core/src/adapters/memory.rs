//! In-memory repository
//!
//! Implements every repository port over ordered maps. Used by library users
//! without a database and by the service tests. Transaction persistence can
//! be made to fail for chosen ids.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::domain::result::{Error, Result};
use crate::domain::{Category, DateRange, Rule, RuleType, TenantId, Transaction};
use crate::ports::{CategoryRepository, RuleRepository, TransactionRepository};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::database("In-memory store mutex poisoned"))
}

/// Repository backed by process memory
#[derive(Debug)]
pub struct InMemoryRepository {
    rules: Mutex<BTreeMap<i64, Rule>>,
    transactions: Mutex<BTreeMap<i64, Transaction>>,
    categories: Mutex<BTreeMap<i64, Category>>,
    failing_transactions: Mutex<HashSet<i64>>,
    next_id: AtomicI64,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self {
            rules: Mutex::new(BTreeMap::new()),
            transactions: Mutex::new(BTreeMap::new()),
            categories: Mutex::new(BTreeMap::new()),
            failing_transactions: Mutex::new(HashSet::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn assign_id(&self, id: i64) -> i64 {
        if id > 0 {
            self.next_id.fetch_max(id + 1, Ordering::SeqCst);
            id
        } else {
            self.next_id.fetch_add(1, Ordering::SeqCst)
        }
    }

    /// Store a category, assigning an id when it has none
    pub fn add_category(&self, mut category: Category) -> Result<Category> {
        category.id = self.assign_id(category.id);
        lock(&self.categories)?.insert(category.id, category.clone());
        Ok(category)
    }

    /// Store a transaction, assigning an id when it has none
    pub fn add_transaction(&self, mut tx: Transaction) -> Result<Transaction> {
        tx.id = self.assign_id(tx.id);
        lock(&self.transactions)?.insert(tx.id, tx.clone());
        Ok(tx)
    }

    /// Store a rule as-is, counters included, assigning an id when it has none
    pub fn add_rule(&self, mut rule: Rule) -> Result<Rule> {
        rule.id = self.assign_id(rule.id);
        lock(&self.rules)?.insert(rule.id, rule.clone());
        Ok(rule)
    }

    /// Make every later `persist` of this transaction fail
    pub fn fail_persist_for(&self, transaction_id: i64) -> Result<()> {
        lock(&self.failing_transactions)?.insert(transaction_id);
        Ok(())
    }

    fn check_injected_failure(&self, transaction_id: i64) -> Result<()> {
        if lock(&self.failing_transactions)?.contains(&transaction_id) {
            return Err(Error::database(format!(
                "Injected failure persisting transaction {}",
                transaction_id
            )));
        }
        Ok(())
    }

    /// Stored state of a rule, deleted or not
    pub fn rule(&self, rule_id: i64) -> Result<Option<Rule>> {
        Ok(lock(&self.rules)?.get(&rule_id).cloned())
    }

    /// Stored state of a transaction, deleted or not
    pub fn transaction(&self, transaction_id: i64) -> Result<Option<Transaction>> {
        Ok(lock(&self.transactions)?.get(&transaction_id).cloned())
    }

    fn sorted_rules<F>(&self, filter: F) -> Result<Vec<Rule>>
    where
        F: Fn(&Rule) -> bool,
    {
        let mut rules: Vec<Rule> = lock(&self.rules)?
            .values()
            .filter(|r| filter(r))
            .cloned()
            .collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        Ok(rules)
    }

    fn update_rule<F>(&self, rule_id: i64, tenant: &TenantId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Rule),
    {
        let mut rules = lock(&self.rules)?;
        match rules.get_mut(&rule_id) {
            Some(rule) if rule.tenant_id == tenant => {
                f(rule);
                Ok(())
            }
            _ => Err(Error::not_found(format!("Rule {}", rule_id))),
        }
    }
}

impl RuleRepository for InMemoryRepository {
    fn fetch_active(&self, tenant: &TenantId, rule_type: Option<RuleType>) -> Result<Vec<Rule>> {
        self.sorted_rules(|r| {
            r.tenant_id == tenant
                && !r.is_deleted()
                && r.is_active
                && rule_type.map_or(true, |t| r.rule_type == t)
        })
    }

    fn get(&self, rule_id: i64, tenant: &TenantId) -> Result<Option<Rule>> {
        Ok(lock(&self.rules)?
            .get(&rule_id)
            .filter(|r| r.tenant_id == tenant && !r.is_deleted())
            .cloned())
    }

    fn list(&self, tenant: &TenantId) -> Result<Vec<Rule>> {
        self.sorted_rules(|r| r.tenant_id == tenant && !r.is_deleted())
    }

    fn insert(&self, rule: &Rule) -> Result<Rule> {
        let mut stored = rule.clone();
        stored.reset_statistics();
        stored.id = self.assign_id(0);
        lock(&self.rules)?.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn persist(&self, rule: &Rule) -> Result<()> {
        let incoming = rule.clone();
        self.update_rule(rule.id, &rule.tenant_id, move |stored| {
            let stats = stored.stats().clone();
            *stored = incoming.with_stats(stats);
        })
    }

    fn record_match(
        &self,
        rule_id: i64,
        tenant: &TenantId,
        success: bool,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.update_rule(rule_id, tenant, |rule| rule.record_match(success, at))
    }

    fn reset_stats(&self, rule_id: i64, tenant: &TenantId) -> Result<()> {
        self.update_rule(rule_id, tenant, |rule| rule.reset_statistics())
    }
}

impl TransactionRepository for InMemoryRepository {
    fn fetch_by_ids(&self, ids: &[i64], tenant: &TenantId) -> Result<Vec<Transaction>> {
        let wanted: HashSet<i64> = ids.iter().copied().collect();
        Ok(lock(&self.transactions)?
            .values()
            .filter(|t| wanted.contains(&t.id) && t.tenant_id == tenant && t.deleted_at.is_none())
            .cloned()
            .collect())
    }

    fn fetch_by_account(
        &self,
        account_id: i64,
        tenant: &TenantId,
        range: Option<DateRange>,
    ) -> Result<Vec<Transaction>> {
        let range = range.unwrap_or_default();
        let mut txs: Vec<Transaction> = lock(&self.transactions)?
            .values()
            .filter(|t| {
                t.account_id == account_id
                    && t.tenant_id == tenant
                    && t.deleted_at.is_none()
                    && range.contains(t.transaction_date)
            })
            .cloned()
            .collect();
        txs.sort_by(|a, b| a.transaction_date.cmp(&b.transaction_date).then(a.id.cmp(&b.id)));
        Ok(txs)
    }

    fn fetch_sample(&self, tenant: &TenantId, limit: usize) -> Result<Vec<Transaction>> {
        Ok(lock(&self.transactions)?
            .values()
            .filter(|t| t.tenant_id == tenant && t.deleted_at.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    fn persist(&self, tx: &Transaction) -> Result<()> {
        self.check_injected_failure(tx.id)?;
        let mut txs = lock(&self.transactions)?;
        let stored = stored_transaction(&mut txs, tx)?;
        *stored = tx.clone();
        Ok(())
    }

    fn apply_categorization(&self, tx: &Transaction, rule_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.check_injected_failure(tx.id)?;
        // Rules before transactions, held together
        let mut rules = lock(&self.rules)?;
        let mut txs = lock(&self.transactions)?;
        let rule = match rules.get_mut(&rule_id) {
            Some(rule) if rule.tenant_id == tx.tenant_id => rule,
            _ => return Err(Error::not_found(format!("Rule {}", rule_id))),
        };
        let stored = stored_transaction(&mut txs, tx)?;
        *stored = tx.clone();
        rule.record_match(true, at);
        Ok(())
    }
}

fn stored_transaction<'a>(
    txs: &'a mut BTreeMap<i64, Transaction>,
    tx: &Transaction,
) -> Result<&'a mut Transaction> {
    match txs.get_mut(&tx.id) {
        Some(stored) if stored.tenant_id == tx.tenant_id => Ok(stored),
        _ => Err(Error::not_found(format!("Transaction {}", tx.id))),
    }
}

impl CategoryRepository for InMemoryRepository {
    fn get(&self, category_id: i64, tenant: &TenantId) -> Result<Option<Category>> {
        Ok(lock(&self.categories)?
            .get(&category_id)
            .filter(|c| c.tenant_id == tenant && c.deleted_at.is_none())
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CategoryRef, RuleStats};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    #[test]
    fn test_insert_starts_counters_at_zero() {
        let repo = InMemoryRepository::new();
        let rule = Rule::new(0, "acme", "r", RuleType::Keyword, "x", CategoryRef::new(1, "A"))
            .with_stats(RuleStats::restore(7, 7, None, None));
        let stored = repo.insert(&rule).unwrap();
        assert_eq!(stored.match_count(), 0);
        assert!(stored.id > 0);
    }

    #[test]
    fn test_persist_keeps_counters() {
        let repo = InMemoryRepository::new();
        let rule = repo
            .add_rule(
                Rule::new(0, "acme", "r", RuleType::Keyword, "x", CategoryRef::new(1, "A"))
                    .with_stats(RuleStats::restore(3, 2, None, None)),
            )
            .unwrap();

        let mut edited = rule.clone().with_stats(RuleStats::default());
        edited.priority = 7;
        RuleRepository::persist(&repo, &edited).unwrap();

        let stored = repo.rule(rule.id).unwrap().unwrap();
        assert_eq!(stored.priority, 7);
        assert_eq!(stored.match_count(), 3);
    }

    #[test]
    fn test_tenant_isolation() {
        let repo = InMemoryRepository::new();
        let tx = repo
            .add_transaction(Transaction::new(
                0,
                "acme",
                1,
                Decimal::ONE,
                "x",
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            ))
            .unwrap();
        assert_eq!(repo.fetch_by_ids(&[tx.id], "acme").unwrap().len(), 1);
        assert!(repo.fetch_by_ids(&[tx.id], "other").unwrap().is_empty());
        assert!(repo.record_match(99, "acme", true, Utc::now()).is_err());
    }

    #[test]
    fn test_injected_failure() {
        let repo = InMemoryRepository::new();
        let tx = repo
            .add_transaction(Transaction::new(
                0,
                "acme",
                1,
                Decimal::ONE,
                "x",
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            ))
            .unwrap();
        repo.fail_persist_for(tx.id).unwrap();
        assert!(TransactionRepository::persist(&repo, &tx).is_err());
    }
}
