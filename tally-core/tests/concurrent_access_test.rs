//! Concurrent categorization tests
//!
//! Several workers categorize disjoint transaction sets that all hit the
//! same rule. Counter increments happen in storage, so none may be lost.
//!
//! Run with: cargo test --test concurrent_access_test -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use tally_core::adapters::duckdb::DuckDbRepository;
use tally_core::adapters::memory::InMemoryRepository;
use tally_core::domain::{Category, CategoryRef, Rule, RuleType, Transaction};
use tally_core::ports::{RuleRepository, TransactionRepository};
use tally_core::services::{BulkCategorizer, TransactionSelection};

/// Number of concurrent workers
const THREAD_COUNT: usize = 6;

/// Transactions per worker
const TRANSACTIONS_PER_THREAD: usize = 20;

const TENANT: &str = "acme";

fn transaction(i: usize) -> Transaction {
    Transaction::new(
        0,
        TENANT,
        1,
        Decimal::new(1000 + i as i64, 2),
        format!("COFFEE SHOP #{}", i),
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
    )
}

/// Run one bulk categorizer per thread, each on its own slice of ids
fn run_workers(
    rules: Arc<dyn RuleRepository>,
    transactions: Arc<dyn TransactionRepository>,
    ids: Vec<i64>,
) -> usize {
    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let categorized = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = ids
        .chunks(TRANSACTIONS_PER_THREAD)
        .map(|chunk| {
            let barrier = Arc::clone(&barrier);
            let categorized = Arc::clone(&categorized);
            let bulk = BulkCategorizer::new(Arc::clone(&rules), Arc::clone(&transactions));
            let chunk = chunk.to_vec();

            thread::spawn(move || {
                barrier.wait();
                let result = bulk
                    .categorize_many(&TransactionSelection::Ids(chunk), TENANT)
                    .expect("bulk run failed");
                assert_eq!(result.failed, 0);
                categorized.fetch_add(result.categorized, Ordering::SeqCst);
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker panicked");
    }
    categorized.load(Ordering::SeqCst)
}

#[test]
fn test_concurrent_workers_share_rule_counters_duckdb() {
    let temp_dir = TempDir::new().unwrap();
    let repo = Arc::new(DuckDbRepository::new(&temp_dir.path().join("concurrent.duckdb")).unwrap());
    repo.ensure_schema().unwrap();

    let category = repo
        .insert_category(&Category::new(0, TENANT, "Dining", "expense"))
        .unwrap();
    let rule = repo
        .insert(&Rule::new(0, TENANT, "Coffee", RuleType::Keyword, "coffee", category.reference()))
        .unwrap();

    let ids: Vec<i64> = (0..THREAD_COUNT * TRANSACTIONS_PER_THREAD)
        .map(|i| repo.insert_transaction(&transaction(i)).unwrap().id)
        .collect();

    let categorized = run_workers(repo.clone(), repo.clone(), ids.clone());
    let total = THREAD_COUNT * TRANSACTIONS_PER_THREAD;
    assert_eq!(categorized, total);

    let stored = RuleRepository::get(repo.as_ref(), rule.id, TENANT).unwrap().unwrap();
    assert_eq!(stored.match_count(), total as u64);
    assert_eq!(stored.success_count(), total as u64);

    let transactions = repo.fetch_by_ids(&ids, TENANT).unwrap();
    assert!(transactions
        .iter()
        .all(|t| t.categorization_rule_id == Some(rule.id)));
}

#[test]
fn test_concurrent_workers_share_rule_counters_in_memory() {
    let repo = Arc::new(InMemoryRepository::new());
    let rule = repo
        .add_rule(Rule::new(0, TENANT, "Coffee", RuleType::Keyword, "coffee", CategoryRef::new(1, "Dining")))
        .unwrap();
    let ids: Vec<i64> = (0..THREAD_COUNT * TRANSACTIONS_PER_THREAD)
        .map(|i| repo.add_transaction(transaction(i)).unwrap().id)
        .collect();

    let categorized = run_workers(repo.clone(), repo.clone(), ids);
    let total = THREAD_COUNT * TRANSACTIONS_PER_THREAD;
    assert_eq!(categorized, total);
    assert_eq!(repo.rule(rule.id).unwrap().unwrap().match_count(), total as u64);
}
