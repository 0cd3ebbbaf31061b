//! Categorization rule domain entity
//!
//! A rule binds a pattern (plus optional amount bounds) on one transaction
//! field to a target category. Rules carry performance counters that only the
//! categorization workflow may move; see [`Rule::record_match`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::category::CategoryRef;
use super::result::{Error, Result};
use super::tags;

/// Default priority for new rules (higher is evaluated first)
pub const DEFAULT_PRIORITY: i32 = 100;

/// Default confidence recorded on transactions categorized by a rule
pub const DEFAULT_CONFIDENCE: Decimal = Decimal::from_parts(80, 0, 0, false, 2);

/// Default cap on applications, compared against the lifetime match count
pub const DEFAULT_MAX_MATCHES_PER_DAY: u32 = 1000;

/// Success rate at or above which a rule counts as high performing
const HIGH_PERFORMING_RATE: f64 = 0.8;
const HIGH_PERFORMING_MIN_MATCHES: u64 = 10;

/// Success rate below which a rule counts as low performing
const LOW_PERFORMING_RATE: f64 = 0.3;
const LOW_PERFORMING_MIN_MATCHES: u64 = 5;

/// Kind of rule, as chosen by the author
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Keyword,
    Regex,
    Amount,
    Merchant,
    Combined,
}

impl RuleType {
    pub const ALL: [RuleType; 5] = [
        RuleType::Keyword,
        RuleType::Regex,
        RuleType::Amount,
        RuleType::Merchant,
        RuleType::Combined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Keyword => "keyword",
            RuleType::Regex => "regex",
            RuleType::Amount => "amount",
            RuleType::Merchant => "merchant",
            RuleType::Combined => "combined",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RuleType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| {
                let valid: Vec<&str> = RuleType::ALL.iter().map(|t| t.as_str()).collect();
                Error::validation(format!(
                    "Invalid rule type '{}'. Must be one of: {}",
                    s,
                    valid.join(", ")
                ))
            })
    }
}

/// Transaction attribute a rule inspects
///
/// Closed set: unknown field names are rejected when a rule is built,
/// never at match time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    Description,
    OriginalDescription,
    MerchantName,
    MerchantCategoryCode,
    Amount,
    ReferenceNumber,
    PaymentMethod,
    TransactionType,
    Notes,
    Currency,
}

impl MatchField {
    pub const ALL: [MatchField; 10] = [
        MatchField::Description,
        MatchField::OriginalDescription,
        MatchField::MerchantName,
        MatchField::MerchantCategoryCode,
        MatchField::Amount,
        MatchField::ReferenceNumber,
        MatchField::PaymentMethod,
        MatchField::TransactionType,
        MatchField::Notes,
        MatchField::Currency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchField::Description => "description",
            MatchField::OriginalDescription => "original_description",
            MatchField::MerchantName => "merchant_name",
            MatchField::MerchantCategoryCode => "merchant_category_code",
            MatchField::Amount => "amount",
            MatchField::ReferenceNumber => "reference_number",
            MatchField::PaymentMethod => "payment_method",
            MatchField::TransactionType => "transaction_type",
            MatchField::Notes => "notes",
            MatchField::Currency => "currency",
        }
    }
}

impl Default for MatchField {
    fn default() -> Self {
        MatchField::Description
    }
}

impl fmt::Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_lowercase();
        // "merchant" is accepted as shorthand for merchant_name
        if name == "merchant" {
            return Ok(MatchField::MerchantName);
        }
        MatchField::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == name)
            .ok_or_else(|| {
                let valid: Vec<&str> = MatchField::ALL.iter().map(|f| f.as_str()).collect();
                Error::validation(format!(
                    "Unknown field to match '{}'. Must be one of: {}",
                    s,
                    valid.join(", ")
                ))
            })
    }
}

/// Performance counters of a rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleStats {
    match_count: u64,
    success_count: u64,
    last_matched_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
}

impl RuleStats {
    /// Rebuild counters read back from storage
    pub fn restore(
        match_count: u64,
        success_count: u64,
        last_matched_at: Option<DateTime<Utc>>,
        last_success_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            match_count,
            success_count,
            last_matched_at,
            last_success_at,
        }
    }

    pub fn match_count(&self) -> u64 {
        self.match_count
    }

    pub fn success_count(&self) -> u64 {
        self.success_count
    }

    pub fn last_matched_at(&self) -> Option<DateTime<Utc>> {
        self.last_matched_at
    }

    pub fn last_success_at(&self) -> Option<DateTime<Utc>> {
        self.last_success_at
    }

    /// success_count / match_count, 0.0 when the rule never matched
    pub fn success_rate(&self) -> f64 {
        if self.match_count == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.match_count as f64
    }

    fn record(&mut self, success: bool, at: DateTime<Utc>) {
        self.match_count += 1;
        self.last_matched_at = Some(at);
        if success {
            self.success_count += 1;
            self.last_success_at = Some(at);
        }
    }
}

/// A categorization rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub tenant_id: String,
    /// Owning user, `None` for tenant-wide rules
    pub user_id: Option<String>,
    pub name: String,
    pub description: Option<String>,

    // Matching configuration
    pub rule_type: RuleType,
    pub pattern: String,
    pub field_to_match: MatchField,
    pub is_case_sensitive: bool,
    pub is_regex: bool,
    /// Inclusive lower bound on the transaction amount
    pub amount_min: Option<Decimal>,
    /// Inclusive upper bound on the transaction amount
    pub amount_max: Option<Decimal>,

    // Action
    pub category: CategoryRef,
    pub subcategory: Option<String>,

    // Control
    pub priority: i32,
    pub is_active: bool,
    pub is_system: bool,
    /// Confidence (0.00 - 1.00) recorded on transactions this rule categorizes
    pub confidence_threshold: Decimal,
    pub max_matches_per_day: u32,

    stats: RuleStats,

    pub notes: Option<String>,
    pub tags: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    /// Soft delete timestamp
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Rule {
    /// Create a new rule with default control settings and zeroed counters
    pub fn new(
        id: i64,
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        rule_type: RuleType,
        pattern: impl Into<String>,
        category: CategoryRef,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            tenant_id: tenant_id.into(),
            user_id: None,
            name: name.into(),
            description: None,
            rule_type,
            pattern: pattern.into(),
            field_to_match: MatchField::Description,
            is_case_sensitive: false,
            is_regex: false,
            amount_min: None,
            amount_max: None,
            category,
            subcategory: None,
            priority: DEFAULT_PRIORITY,
            is_active: true,
            is_system: false,
            confidence_threshold: DEFAULT_CONFIDENCE,
            max_matches_per_day: DEFAULT_MAX_MATCHES_PER_DAY,
            stats: RuleStats::default(),
            notes: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            updated_by: None,
            deleted_at: None,
        }
    }

    /// Attach counters loaded from storage
    pub fn with_stats(mut self, stats: RuleStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &RuleStats {
        &self.stats
    }

    pub fn match_count(&self) -> u64 {
        self.stats.match_count
    }

    pub fn success_count(&self) -> u64 {
        self.stats.success_count
    }

    pub fn success_rate(&self) -> f64 {
        self.stats.success_rate()
    }

    pub fn is_high_performing(&self) -> bool {
        self.success_rate() >= HIGH_PERFORMING_RATE
            && self.stats.match_count >= HIGH_PERFORMING_MIN_MATCHES
    }

    pub fn is_low_performing(&self) -> bool {
        self.success_rate() < LOW_PERFORMING_RATE
            && self.stats.match_count >= LOW_PERFORMING_MIN_MATCHES
    }

    /// True once the match counter has reached `max_matches_per_day`
    ///
    /// Known issue: the cap is compared against the lifetime counter, so a
    /// rule that reached it once stays capped until its statistics are reset.
    pub fn is_capped(&self) -> bool {
        self.stats.match_count >= u64::from(self.max_matches_per_day)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Record one application of this rule
    ///
    /// Only the categorization workflow calls this; other code paths must not
    /// move the counters.
    pub(crate) fn record_match(&mut self, success: bool, at: DateTime<Utc>) {
        self.stats.record(success, at);
    }

    /// Zero all counters and timestamps
    pub(crate) fn reset_statistics(&mut self) {
        self.stats = RuleStats::default();
    }

    /// System rules and high performing rules are protected from deletion
    pub fn can_be_deleted(&self) -> bool {
        if self.is_system {
            return false;
        }
        if self.is_high_performing() {
            return false;
        }
        true
    }

    /// Deactivate the rule without deleting it
    pub fn archive(&mut self, archived_by: Option<&str>) {
        self.is_active = false;
        self.touch(archived_by);
    }

    /// Reactivate an archived rule
    pub fn unarchive(&mut self, unarchived_by: Option<&str>) {
        self.is_active = true;
        self.touch(unarchived_by);
    }

    /// Soft delete, refused for protected rules
    pub fn soft_delete(&mut self, deleted_by: Option<&str>) -> Result<()> {
        if !self.can_be_deleted() {
            return Err(Error::validation(
                "Rule cannot be deleted because it's high-performing or system-created",
            ));
        }
        let now = Utc::now();
        self.deleted_at = Some(now);
        self.touch(deleted_by);
        Ok(())
    }

    /// Update audit fields
    pub fn touch(&mut self, by: Option<&str>) {
        self.updated_at = Utc::now();
        if let Some(user) = by {
            self.updated_by = Some(user.to_string());
        }
    }

    pub fn add_tag(&mut self, tag: &str) -> bool {
        tags::add_tag(&mut self.tags, tag)
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        tags::remove_tag(&mut self.tags, tag)
    }

    /// Check every authoring invariant of the rule
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("Rule name must not be empty"));
        }
        validate_pattern(&self.pattern, self.is_regex)?;
        validate_amount_range(self.amount_min, self.amount_max)?;
        validate_confidence(self.confidence_threshold)?;
        Ok(())
    }
}

/// A pattern must be non-empty, and must compile when used as a regex
pub fn validate_pattern(pattern: &str, is_regex: bool) -> Result<()> {
    if pattern.is_empty() {
        return Err(Error::validation("Pattern must not be empty"));
    }
    if is_regex {
        RegexBuilder::new(pattern)
            .build()
            .map_err(|e| Error::validation(format!("Invalid regex pattern: {}", e)))?;
    }
    Ok(())
}

/// Decimal places kept by storage for amounts and confidences
pub const STORED_SCALE: u32 = 2;

fn check_scale(value: Decimal, what: &str) -> Result<()> {
    if value.normalize().scale() > STORED_SCALE {
        return Err(Error::validation(format!(
            "{} {} has more than {} decimal places",
            what, value, STORED_SCALE
        )));
    }
    Ok(())
}

/// Both bounds set implies min <= max; each bound has at most two decimals
pub fn validate_amount_range(min: Option<Decimal>, max: Option<Decimal>) -> Result<()> {
    if let Some(min) = min {
        check_scale(min, "Minimum amount")?;
    }
    if let Some(max) = max {
        check_scale(max, "Maximum amount")?;
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(Error::validation(format!(
                "Invalid amount range: minimum {} is greater than maximum {}",
                min, max
            )));
        }
    }
    Ok(())
}

/// Confidence must lie in [0, 1] with at most two decimals
pub fn validate_confidence(confidence: Decimal) -> Result<()> {
    if confidence < Decimal::ZERO || confidence > Decimal::ONE {
        return Err(Error::validation(format!(
            "Confidence threshold {} must be between 0 and 1",
            confidence
        )));
    }
    check_scale(confidence, "Confidence threshold")
}

/// Everything needed to create a rule
///
/// Control settings left as `None` are filled from configuration defaults
/// when the rule is created.
#[derive(Debug, Clone)]
pub struct NewRule {
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub rule_type: RuleType,
    pub pattern: String,
    pub field_to_match: MatchField,
    pub is_case_sensitive: bool,
    pub is_regex: bool,
    pub amount_min: Option<Decimal>,
    pub amount_max: Option<Decimal>,
    pub category_id: i64,
    pub subcategory: Option<String>,
    pub priority: Option<i32>,
    pub is_system: bool,
    pub confidence_threshold: Option<Decimal>,
    pub max_matches_per_day: Option<u32>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
}

impl NewRule {
    pub fn new(
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        rule_type: RuleType,
        pattern: impl Into<String>,
        category_id: i64,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: None,
            name: name.into(),
            description: None,
            rule_type,
            pattern: pattern.into(),
            field_to_match: MatchField::Description,
            is_case_sensitive: false,
            // Regex rules default to regex matching
            is_regex: rule_type == RuleType::Regex,
            amount_min: None,
            amount_max: None,
            category_id,
            subcategory: None,
            priority: None,
            is_system: false,
            confidence_threshold: None,
            max_matches_per_day: None,
            notes: None,
            tags: Vec::new(),
        }
    }

    pub fn owned_by(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn field(mut self, field: MatchField) -> Self {
        self.field_to_match = field;
        self
    }

    pub fn regex(mut self, is_regex: bool) -> Self {
        self.is_regex = is_regex;
        self
    }

    pub fn case_sensitive(mut self, is_case_sensitive: bool) -> Self {
        self.is_case_sensitive = is_case_sensitive;
        self
    }

    pub fn amount_range(mut self, min: Option<Decimal>, max: Option<Decimal>) -> Self {
        self.amount_min = min;
        self.amount_max = max;
        self
    }

    pub fn subcategory(mut self, subcategory: impl Into<String>) -> Self {
        self.subcategory = Some(subcategory.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn confidence(mut self, confidence: Decimal) -> Self {
        self.confidence_threshold = Some(confidence);
        self
    }

    pub fn max_matches_per_day(mut self, max: u32) -> Self {
        self.max_matches_per_day = Some(max);
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }

    pub fn tags(mut self, tags: &[String]) -> Self {
        self.tags = tags::normalize_tags(tags);
        self
    }

    /// Build the rule for the resolved category, taking unset control
    /// settings from the given defaults
    pub fn into_rule(self, category: CategoryRef, defaults: &RuleDefaults) -> Rule {
        let mut rule = Rule::new(0, self.tenant_id, self.name, self.rule_type, self.pattern, category);
        rule.user_id = self.user_id;
        rule.description = self.description;
        rule.field_to_match = self.field_to_match;
        rule.is_case_sensitive = self.is_case_sensitive;
        rule.is_regex = self.is_regex;
        rule.amount_min = self.amount_min;
        rule.amount_max = self.amount_max;
        rule.subcategory = self.subcategory;
        rule.priority = self.priority.unwrap_or(defaults.priority);
        rule.is_system = self.is_system;
        rule.confidence_threshold = self.confidence_threshold.unwrap_or(defaults.confidence);
        rule.max_matches_per_day = self
            .max_matches_per_day
            .unwrap_or(defaults.max_matches_per_day);
        rule.notes = self.notes;
        rule.tags = self.tags;
        rule
    }
}

/// Control settings applied to new rules that don't specify them
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDefaults {
    pub priority: i32,
    pub confidence: Decimal,
    pub max_matches_per_day: u32,
}

impl Default for RuleDefaults {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            confidence: DEFAULT_CONFIDENCE,
            max_matches_per_day: DEFAULT_MAX_MATCHES_PER_DAY,
        }
    }
}

/// Partial update of a rule's authoring fields
///
/// Counters are deliberately absent.
#[derive(Debug, Clone, Default)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub rule_type: Option<RuleType>,
    pub pattern: Option<String>,
    pub field_to_match: Option<MatchField>,
    pub is_case_sensitive: Option<bool>,
    pub is_regex: Option<bool>,
    pub amount_min: Option<Option<Decimal>>,
    pub amount_max: Option<Option<Decimal>>,
    pub category_id: Option<i64>,
    pub subcategory: Option<Option<String>>,
    pub priority: Option<i32>,
    pub confidence_threshold: Option<Decimal>,
    pub max_matches_per_day: Option<u32>,
    pub notes: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

impl RuleUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.rule_type.is_none()
            && self.pattern.is_none()
            && self.field_to_match.is_none()
            && self.is_case_sensitive.is_none()
            && self.is_regex.is_none()
            && self.amount_min.is_none()
            && self.amount_max.is_none()
            && self.category_id.is_none()
            && self.subcategory.is_none()
            && self.priority.is_none()
            && self.confidence_threshold.is_none()
            && self.max_matches_per_day.is_none()
            && self.notes.is_none()
            && self.tags.is_none()
    }

    /// Apply every field except the category, which the caller resolves
    pub fn apply(&self, rule: &mut Rule) {
        if let Some(name) = &self.name {
            rule.name = name.clone();
        }
        if let Some(description) = &self.description {
            rule.description = description.clone();
        }
        if let Some(rule_type) = self.rule_type {
            rule.rule_type = rule_type;
        }
        if let Some(pattern) = &self.pattern {
            rule.pattern = pattern.clone();
        }
        if let Some(field) = self.field_to_match {
            rule.field_to_match = field;
        }
        if let Some(cs) = self.is_case_sensitive {
            rule.is_case_sensitive = cs;
        }
        if let Some(is_regex) = self.is_regex {
            rule.is_regex = is_regex;
        }
        if let Some(min) = self.amount_min {
            rule.amount_min = min;
        }
        if let Some(max) = self.amount_max {
            rule.amount_max = max;
        }
        if let Some(subcategory) = &self.subcategory {
            rule.subcategory = subcategory.clone();
        }
        if let Some(priority) = self.priority {
            rule.priority = priority;
        }
        if let Some(confidence) = self.confidence_threshold {
            rule.confidence_threshold = confidence;
        }
        if let Some(max) = self.max_matches_per_day {
            rule.max_matches_per_day = max;
        }
        if let Some(notes) = &self.notes {
            rule.notes = notes.clone();
        }
        if let Some(tags) = &self.tags {
            rule.tags = tags::normalize_tags(tags);
        }
    }
}
