//! Repository ports - storage abstraction for rules, transactions and categories
//!
//! Every call is scoped to a tenant. Implementations must never return rows
//! belonging to another tenant or rows that are soft-deleted.

use chrono::{DateTime, Utc};

use crate::domain::result::Result;
use crate::domain::{Category, DateRange, Rule, RuleType, TenantId, Transaction};

/// Rule storage
pub trait RuleRepository: Send + Sync {
    /// Active, non-deleted rules of the tenant, optionally of one type
    ///
    /// Ordered by descending priority, ties broken by ascending id.
    fn fetch_active(&self, tenant: &TenantId, rule_type: Option<RuleType>) -> Result<Vec<Rule>>;

    /// Fetch one non-deleted rule
    fn get(&self, rule_id: i64, tenant: &TenantId) -> Result<Option<Rule>>;

    /// All non-deleted rules of the tenant, in the same order as `fetch_active`
    fn list(&self, tenant: &TenantId) -> Result<Vec<Rule>>;

    /// Store a new rule and return it with its assigned id
    ///
    /// The incoming `id` is ignored.
    fn insert(&self, rule: &Rule) -> Result<Rule>;

    /// Save authoring, control and lifecycle fields
    ///
    /// Counters are left alone; they only move through `record_match` and
    /// `reset_stats`.
    fn persist(&self, rule: &Rule) -> Result<()>;

    /// Atomically count one application of a rule
    fn record_match(
        &self,
        rule_id: i64,
        tenant: &TenantId,
        success: bool,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Zero a rule's counters and timestamps
    fn reset_stats(&self, rule_id: i64, tenant: &TenantId) -> Result<()>;
}

/// Transaction storage
pub trait TransactionRepository: Send + Sync {
    /// Non-deleted transactions of the tenant among `ids`, ordered by id
    fn fetch_by_ids(&self, ids: &[i64], tenant: &TenantId) -> Result<Vec<Transaction>>;

    /// Non-deleted transactions of an account, optionally restricted to an
    /// inclusive date range, ordered by date then id
    fn fetch_by_account(
        &self,
        account_id: i64,
        tenant: &TenantId,
        range: Option<DateRange>,
    ) -> Result<Vec<Transaction>>;

    /// First `limit` non-deleted transactions of the tenant, ordered by id
    fn fetch_sample(&self, tenant: &TenantId, limit: usize) -> Result<Vec<Transaction>>;

    /// Save the categorization fields of a transaction
    fn persist(&self, tx: &Transaction) -> Result<()>;

    /// Save a rule-driven categorization and count one successful match of
    /// `rule_id` as a single unit
    ///
    /// Either the transaction and the rule counters both change or neither
    /// does.
    fn apply_categorization(&self, tx: &Transaction, rule_id: i64, at: DateTime<Utc>) -> Result<()>;
}

/// Category lookup
pub trait CategoryRepository: Send + Sync {
    /// Non-deleted category of the tenant
    fn get(&self, category_id: i64, tenant: &TenantId) -> Result<Option<Category>>;

    fn exists(&self, category_id: i64, tenant: &TenantId) -> Result<bool> {
        Ok(self.get(category_id, tenant)?.is_some())
    }
}
