//! Transaction domain entity
//!
//! Transactions are owned by the ingest side of the system. The categorization
//! core reads the matchable attributes and writes the categorization outcome
//! through [`Transaction::categorize`].

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::rule::MatchField;
use super::tags;

/// Read access the matcher needs from a transaction
pub trait TransactionView {
    fn amount(&self) -> Decimal;

    /// Textual value of a field, `None` when the field is absent or empty
    fn field_value(&self, field: MatchField) -> Option<String>;

    fn current_category(&self) -> Option<&str>;
}

/// Inclusive date range on `transaction_date`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

/// A financial transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub account_id: i64,

    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub original_description: Option<String>,
    /// debit, credit, transfer, fee, interest, dividend, other
    pub transaction_type: String,
    pub transaction_date: NaiveDate,

    pub merchant_name: Option<String>,
    pub merchant_category_code: Option<String>,
    pub payment_method: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,

    // Categorization outcome
    pub transaction_category: Option<String>,
    pub transaction_subcategory: Option<String>,
    pub is_auto_categorized: bool,
    pub categorization_confidence: Option<Decimal>,
    pub categorization_rule_id: Option<i64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Create a new uncategorized debit with required fields
    pub fn new(
        id: i64,
        tenant_id: impl Into<String>,
        account_id: i64,
        amount: Decimal,
        description: impl Into<String>,
        transaction_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            tenant_id: tenant_id.into(),
            user_id: None,
            account_id,
            amount,
            currency: "USD".to_string(),
            description: description.into(),
            original_description: None,
            transaction_type: "debit".to_string(),
            transaction_date,
            merchant_name: None,
            merchant_category_code: None,
            payment_method: None,
            reference_number: None,
            notes: None,
            tags: Vec::new(),
            transaction_category: None,
            transaction_subcategory: None,
            is_auto_categorized: false,
            categorization_confidence: None,
            categorization_rule_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Record a categorization outcome
    ///
    /// The transaction counts as auto-categorized exactly when a rule id is
    /// given. Confidence and rule id are only overwritten when provided.
    pub fn categorize(
        &mut self,
        category: &str,
        subcategory: Option<&str>,
        confidence: Option<Decimal>,
        rule_id: Option<i64>,
    ) {
        self.transaction_category = Some(category.to_string());
        self.transaction_subcategory = subcategory.map(str::to_string);
        self.is_auto_categorized = rule_id.is_some();
        if let Some(confidence) = confidence {
            self.categorization_confidence = Some(confidence);
        }
        if let Some(rule_id) = rule_id {
            self.categorization_rule_id = Some(rule_id);
        }
        self.updated_at = Utc::now();
    }

    pub fn is_categorized(&self) -> bool {
        self.transaction_category.is_some()
    }

    pub fn add_tag(&mut self, tag: &str) -> bool {
        tags::add_tag(&mut self.tags, tag)
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        tags::remove_tag(&mut self.tags, tag)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

impl TransactionView for Transaction {
    fn amount(&self) -> Decimal {
        self.amount
    }

    fn field_value(&self, field: MatchField) -> Option<String> {
        match field {
            MatchField::Description => Some(self.description.clone()).filter(|v| !v.is_empty()),
            MatchField::OriginalDescription => non_empty(&self.original_description),
            MatchField::MerchantName => non_empty(&self.merchant_name),
            MatchField::MerchantCategoryCode => non_empty(&self.merchant_category_code),
            // A zero amount counts as empty
            MatchField::Amount if self.amount.is_zero() => None,
            MatchField::Amount => Some(self.amount.to_string()),
            MatchField::ReferenceNumber => non_empty(&self.reference_number),
            MatchField::PaymentMethod => non_empty(&self.payment_method),
            MatchField::TransactionType => {
                Some(self.transaction_type.clone()).filter(|v| !v.is_empty())
            }
            MatchField::Notes => non_empty(&self.notes),
            MatchField::Currency => Some(self.currency.clone()).filter(|v| !v.is_empty()),
        }
    }

    fn current_category(&self) -> Option<&str> {
        self.transaction_category.as_deref()
    }
}
