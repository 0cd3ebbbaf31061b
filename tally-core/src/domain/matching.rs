//! Rule matching and offline rule evaluation
//!
//! Matching never fails. A rule whose regex does not compile simply never
//! matches; the problem is reported once per pattern through `tracing`.

use std::collections::HashMap;
use std::sync::Mutex;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::rule::Rule;
use super::transaction::TransactionView;

type CacheKey = (String, bool);

/// Rule matcher with a compiled-pattern cache
///
/// One matcher is meant to live for a batch: each regex is compiled once and
/// each invalid pattern is reported once.
#[derive(Debug, Default)]
pub struct Matcher {
    compiled: Mutex<HashMap<CacheKey, Option<Regex>>>,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Does `rule` match `tx`?
    ///
    /// Amount bounds are checked first, then the field lookup, then the
    /// pattern search.
    pub fn matches<T: TransactionView + ?Sized>(&self, rule: &Rule, tx: &T) -> bool {
        let amount = tx.amount();
        if let Some(min) = rule.amount_min {
            if amount < min {
                return false;
            }
        }
        if let Some(max) = rule.amount_max {
            if amount > max {
                return false;
            }
        }

        let value = match tx.field_value(rule.field_to_match) {
            Some(v) if !v.is_empty() => v,
            _ => return false,
        };

        if rule.is_regex {
            self.regex_search(rule, &value)
        } else if rule.is_case_sensitive {
            value.contains(rule.pattern.as_str())
        } else {
            value.to_lowercase().contains(&rule.pattern.to_lowercase())
        }
    }

    /// Unanchored regex search
    ///
    /// Without case sensitivity both the pattern and the value are lowercased
    /// before the search, so uppercase escapes such as `\D` or `\S` fold to
    /// their lowercase counterparts.
    fn regex_search(&self, rule: &Rule, value: &str) -> bool {
        let (pattern, haystack) = if rule.is_case_sensitive {
            (rule.pattern.clone(), value.to_string())
        } else {
            (rule.pattern.to_lowercase(), value.to_lowercase())
        };
        let key = (pattern, rule.is_case_sensitive);
        let mut cache = match self.compiled.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = cache.entry(key).or_insert_with_key(|(pattern, _)| {
            match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(
                        rule_id = rule.id,
                        error = %e,
                        "Rule pattern is not a valid regex, rule will never match"
                    );
                    None
                }
            }
        });
        entry.as_ref().map_or(false, |re| re.is_match(&haystack))
    }
}

/// Match a single rule against a single transaction without a shared cache
pub fn matches<T: TransactionView + ?Sized>(rule: &Rule, tx: &T) -> bool {
    Matcher::new().matches(rule, tx)
}

/// Outcome of evaluating a rule against a sample of transactions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleTestResult {
    pub total_tested: usize,
    pub matches: usize,
    /// Matched and already carried the rule's category
    pub successes: usize,
    /// Matched but carried a different (or no) category
    pub false_positives: usize,
    /// Not matched but already carried the rule's category
    pub false_negatives: usize,
}

impl RuleTestResult {
    pub fn match_rate(&self) -> f64 {
        if self.total_tested == 0 {
            return 0.0;
        }
        self.matches as f64 / self.total_tested as f64
    }

    pub fn precision(&self) -> f64 {
        if self.matches == 0 {
            return 0.0;
        }
        self.successes as f64 / self.matches as f64
    }
}

/// Evaluate `rule` against `sample` without touching its counters
pub fn test_against_sample<T: TransactionView>(rule: &Rule, sample: &[T]) -> RuleTestResult {
    let matcher = Matcher::new();
    let target = rule.category.name.as_str();
    let mut result = RuleTestResult {
        total_tested: sample.len(),
        ..Default::default()
    };

    for tx in sample {
        let same_category = tx.current_category() == Some(target);
        if matcher.matches(rule, tx) {
            result.matches += 1;
            if same_category {
                result.successes += 1;
            } else {
                result.false_positives += 1;
            }
        } else if same_category {
            result.false_negatives += 1;
        }
    }

    result
}
