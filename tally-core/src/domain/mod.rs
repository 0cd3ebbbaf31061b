//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod category;
pub mod matching;
pub mod result;
mod rule;
pub mod tags;
mod transaction;

pub use category::{Category, CategoryRef};
pub use matching::{matches, test_against_sample, Matcher, RuleTestResult};
pub use rule::{
    validate_amount_range, validate_confidence, validate_pattern, MatchField, NewRule, Rule,
    RuleDefaults, RuleStats, RuleType, RuleUpdate, DEFAULT_CONFIDENCE,
    DEFAULT_MAX_MATCHES_PER_DAY, DEFAULT_PRIORITY,
};
pub use transaction::{DateRange, Transaction, TransactionView};

/// Tenant scope accepted by every repository and service call
pub type TenantId = str;
