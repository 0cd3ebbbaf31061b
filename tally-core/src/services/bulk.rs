//! Bulk categorization across a transaction set

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::domain::result::Result;
use crate::domain::{DateRange, Matcher, TenantId, Transaction};
use crate::ports::{RuleRepository, TransactionRepository};
use crate::services::categorization::CategorizationEngine;

/// Which transactions a bulk run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionSelection {
    /// Explicit ids; unknown, foreign and deleted ids are ignored
    Ids(Vec<i64>),
    /// All transactions of an account, optionally within an inclusive date range
    Account {
        account_id: i64,
        range: Option<DateRange>,
    },
}

/// Cancellation and deadline for a bulk run
///
/// Both are checked between transactions, never in the middle of one.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Request cancellation; clones share the flag
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn should_stop(&self) -> bool {
        self.is_cancelled() || self.deadline.map_or(false, |d| Instant::now() >= d)
    }
}

/// Counts from a bulk run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResult {
    /// Transactions a rule was applied to
    pub categorized: usize,
    /// Transactions no rule applied to, or whose processing failed
    pub failed: usize,
    /// Size of the resolved transaction set
    pub total: usize,
    /// Transactions not reached because the run was stopped
    pub skipped: usize,
    /// The run stopped early on cancellation or deadline
    pub cancelled: bool,
}

/// Applies the categorization engine to a set of transactions
///
/// Rules are selected once per run. Each transaction is processed
/// independently: a failure on one is logged and counted, and the run goes
/// on. Errors resolving the transaction set or selecting rules abort the run.
#[derive(Clone)]
pub struct BulkCategorizer {
    engine: CategorizationEngine,
    transactions: Arc<dyn TransactionRepository>,
}

impl BulkCategorizer {
    pub fn new(rules: Arc<dyn RuleRepository>, transactions: Arc<dyn TransactionRepository>) -> Self {
        Self {
            engine: CategorizationEngine::new(rules, Arc::clone(&transactions)),
            transactions,
        }
    }

    pub fn categorize_many(&self, selection: &TransactionSelection, tenant: &TenantId) -> Result<BulkResult> {
        self.categorize_many_with(selection, tenant, &RunControl::default())
    }

    pub fn categorize_many_with(
        &self,
        selection: &TransactionSelection,
        tenant: &TenantId,
        control: &RunControl,
    ) -> Result<BulkResult> {
        let started = Instant::now();
        let mut transactions = self.resolve(selection, tenant)?;
        if transactions.is_empty() {
            return Ok(BulkResult::default());
        }

        let mut rules = self.engine.selector().active_rules(tenant, None)?;
        let matcher = Matcher::new();
        let mut result = BulkResult {
            total: transactions.len(),
            ..Default::default()
        };

        for (index, tx) in transactions.iter_mut().enumerate() {
            if control.should_stop() {
                result.cancelled = true;
                result.skipped = result.total - index;
                tracing::warn!(
                    tenant_id = tenant,
                    processed = index,
                    skipped = result.skipped,
                    "Bulk categorization stopped early"
                );
                break;
            }

            match self.engine.categorize_with_rules(tx, &mut rules, &matcher) {
                Ok(outcome) if outcome.applied => result.categorized += 1,
                Ok(_) => result.failed += 1,
                Err(e) => {
                    tracing::error!(
                        transaction_id = tx.id,
                        error = %e,
                        "Failed to categorize transaction in bulk"
                    );
                    result.failed += 1;
                }
            }
        }

        tracing::info!(
            tenant_id = tenant,
            total = result.total,
            categorized = result.categorized,
            failed = result.failed,
            skipped = result.skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Bulk categorization finished"
        );
        Ok(result)
    }

    fn resolve(&self, selection: &TransactionSelection, tenant: &TenantId) -> Result<Vec<Transaction>> {
        match selection {
            TransactionSelection::Ids(ids) => self.transactions.fetch_by_ids(ids, tenant),
            TransactionSelection::Account { account_id, range } => {
                self.transactions.fetch_by_account(*account_id, tenant, *range)
            }
        }
    }
}
