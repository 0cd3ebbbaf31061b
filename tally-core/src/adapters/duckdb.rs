//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use duckdb::types::Type;
use duckdb::{params, params_from_iter, Connection, Row};
use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::tags::{tags_from_storage, tags_to_storage};
use crate::domain::{
    Category, CategoryRef, DateRange, MatchField, Rule, RuleStats, RuleType, TenantId,
    Transaction,
};
use crate::ports::{CategoryRepository, RuleRepository, TransactionRepository};
use crate::services::MigrationService;

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

const RULE_COLUMNS: &str = "r.rule_id, r.tenant_id, r.user_id, r.name, r.description,
       r.rule_type, r.pattern, r.field_to_match, r.is_case_sensitive, r.is_regex,
       r.amount_min::VARCHAR, r.amount_max::VARCHAR, r.category_id, c.name, r.subcategory,
       r.priority, r.is_active, r.is_system, r.confidence_threshold::VARCHAR, r.max_matches_per_day,
       r.match_count, r.success_count, r.last_matched_at::VARCHAR, r.last_success_at::VARCHAR,
       r.notes, r.tags, r.created_at::VARCHAR, r.updated_at::VARCHAR, r.updated_by, r.deleted_at::VARCHAR
  FROM sys_categorization_rules r
  JOIN sys_categories c ON c.category_id = r.category_id";

const TRANSACTION_COLUMNS: &str = "transaction_id, tenant_id, user_id, account_id, amount::VARCHAR,
       currency, description, original_description, transaction_type, transaction_date::VARCHAR,
       merchant_name, merchant_category_code, payment_method, reference_number, notes, tags,
       transaction_category, transaction_subcategory, is_auto_categorized,
       categorization_confidence::VARCHAR, categorization_rule_id,
       created_at::VARCHAR, updated_at::VARCHAR, deleted_at::VARCHAR
  FROM sys_transactions";

const CATEGORY_COLUMNS: &str = "category_id, tenant_id, name, display_name, slug, parent_id,
       category_type, is_active, is_system, created_at::VARCHAR, deleted_at::VARCHAR
  FROM sys_categories";

/// DuckDB repository implementation
///
/// Implements every repository port over a single connection. All access is
/// serialized through the connection mutex, and counter updates are single
/// `UPDATE ... SET match_count = match_count + 1` statements.
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) a database file
    ///
    /// Includes retry logic with exponential backoff for file locking errors,
    /// which can occur when another process holds the file briefly.
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max_retries = MAX_RETRIES,
                            error = %err_msg,
                            "Database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }

        Err(match last_error {
            Some(e) => e.into(),
            None => anyhow::anyhow!("Failed to open database after {} retries", MAX_RETRIES),
        })
    }

    /// Open a private in-memory database
    pub fn in_memory() -> anyhow::Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    /// Attempt to open a database connection (called by new() with retry logic)
    fn try_open_connection(db_path: &Path) -> duckdb::Result<Connection> {
        // Extension autoloading stays off; everything needed is statically linked
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Connection::open_with_flags(db_path, config)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::database("Database connection mutex poisoned"))
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> anyhow::Result<crate::services::MigrationResult> {
        let conn = self.conn()?;
        let migration_service = MigrationService::new(&conn);
        migration_service.run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> anyhow::Result<()> {
        let result = self.run_migrations()?;
        if !result.applied.is_empty() {
            tracing::debug!(applied = ?result.applied, "Applied database migrations");
        }
        Ok(())
    }

    // === Category operations ===

    /// Store a new category and return it with its assigned id
    pub fn insert_category(&self, category: &Category) -> Result<Category> {
        let conn = self.conn()?;
        let id: i64 = conn.query_row(
            "INSERT INTO sys_categories (tenant_id, name, display_name, slug, parent_id,
                                         category_type, is_active, is_system, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))
             RETURNING category_id",
            params![
                category.tenant_id,
                category.name,
                category.display_name,
                category.slug,
                category.parent_id,
                category.category_type,
                category.is_active,
                category.is_system,
                format_timestamp(category.created_at),
            ],
            |row| row.get(0),
        )?;
        let mut stored = category.clone();
        stored.id = id;
        Ok(stored)
    }

    /// All non-deleted categories of a tenant, ordered by name
    pub fn list_categories(&self, tenant: &TenantId) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} WHERE tenant_id = ? AND deleted_at IS NULL ORDER BY name, category_id",
            CATEGORY_COLUMNS
        ))?;
        let categories = stmt
            .query_map([tenant], row_to_category)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(categories)
    }

    // === Transaction operations ===

    /// Store a new transaction and return it with its assigned id
    pub fn insert_transaction(&self, tx: &Transaction) -> Result<Transaction> {
        let conn = self.conn()?;
        let id: i64 = conn.query_row(
            "INSERT INTO sys_transactions (tenant_id, user_id, account_id, amount, currency,
                                           description, original_description, transaction_type,
                                           transaction_date, merchant_name, merchant_category_code,
                                           payment_method, reference_number, notes, tags,
                                           transaction_category, transaction_subcategory,
                                           is_auto_categorized, categorization_confidence,
                                           categorization_rule_id, created_at, updated_at)
             VALUES (?, ?, ?, CAST(? AS DECIMAL(18, 2)), ?, ?, ?, ?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?,
                     ?, ?, ?, CAST(? AS DECIMAL(3, 2)), ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))
             RETURNING transaction_id",
            params![
                tx.tenant_id,
                tx.user_id,
                tx.account_id,
                tx.amount.to_string(),
                tx.currency,
                tx.description,
                tx.original_description,
                tx.transaction_type,
                tx.transaction_date.to_string(),
                tx.merchant_name,
                tx.merchant_category_code,
                tx.payment_method,
                tx.reference_number,
                tx.notes,
                tags_to_storage(&tx.tags),
                tx.transaction_category,
                tx.transaction_subcategory,
                tx.is_auto_categorized,
                tx.categorization_confidence.map(|c| c.to_string()),
                tx.categorization_rule_id,
                format_timestamp(tx.created_at),
                format_timestamp(tx.updated_at),
            ],
            |row| row.get(0),
        )?;
        let mut stored = tx.clone();
        stored.id = id;
        Ok(stored)
    }

    /// Number of non-deleted transactions for a tenant
    pub fn count_transactions(&self, tenant: &TenantId) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sys_transactions WHERE tenant_id = ? AND deleted_at IS NULL",
            [tenant],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn query_rules(&self, sql: &str, params: &[&dyn duckdb::ToSql]) -> Result<Vec<Rule>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rules = stmt
            .query_map(params, row_to_rule)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rules)
    }

    fn query_transactions(
        &self,
        sql: &str,
        params: Vec<Box<dyn duckdb::ToSql>>,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let transactions = stmt
            .query_map(params_from_iter(params.iter()), row_to_transaction)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(transactions)
    }
}

impl RuleRepository for DuckDbRepository {
    fn fetch_active(&self, tenant: &TenantId, rule_type: Option<RuleType>) -> Result<Vec<Rule>> {
        match rule_type {
            Some(rule_type) => self.query_rules(
                &format!(
                    "SELECT {} WHERE r.tenant_id = ? AND r.deleted_at IS NULL AND r.is_active
                       AND r.rule_type = ?
                     ORDER BY r.priority DESC, r.rule_id ASC",
                    RULE_COLUMNS
                ),
                params![tenant, rule_type.as_str()],
            ),
            None => self.query_rules(
                &format!(
                    "SELECT {} WHERE r.tenant_id = ? AND r.deleted_at IS NULL AND r.is_active
                     ORDER BY r.priority DESC, r.rule_id ASC",
                    RULE_COLUMNS
                ),
                params![tenant],
            ),
        }
    }

    fn get(&self, rule_id: i64, tenant: &TenantId) -> Result<Option<Rule>> {
        let rules = self.query_rules(
            &format!(
                "SELECT {} WHERE r.rule_id = ? AND r.tenant_id = ? AND r.deleted_at IS NULL",
                RULE_COLUMNS
            ),
            params![rule_id, tenant],
        )?;
        Ok(rules.into_iter().next())
    }

    fn list(&self, tenant: &TenantId) -> Result<Vec<Rule>> {
        self.query_rules(
            &format!(
                "SELECT {} WHERE r.tenant_id = ? AND r.deleted_at IS NULL
                 ORDER BY r.priority DESC, r.rule_id ASC",
                RULE_COLUMNS
            ),
            params![tenant],
        )
    }

    fn insert(&self, rule: &Rule) -> Result<Rule> {
        let conn = self.conn()?;
        let id: i64 = conn.query_row(
            "INSERT INTO sys_categorization_rules (
                 tenant_id, user_id, name, description, rule_type, pattern, field_to_match,
                 is_case_sensitive, is_regex, amount_min, amount_max, category_id, subcategory,
                 priority, is_active, is_system, confidence_threshold, max_matches_per_day,
                 notes, tags, created_at, updated_at, updated_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS DECIMAL(18, 2)), CAST(? AS DECIMAL(18, 2)),
                     ?, ?, ?, ?, ?, CAST(? AS DECIMAL(3, 2)), ?, ?, ?,
                     CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), ?)
             RETURNING rule_id",
            params![
                rule.tenant_id,
                rule.user_id,
                rule.name,
                rule.description,
                rule.rule_type.as_str(),
                rule.pattern,
                rule.field_to_match.as_str(),
                rule.is_case_sensitive,
                rule.is_regex,
                rule.amount_min.map(|d| d.to_string()),
                rule.amount_max.map(|d| d.to_string()),
                rule.category.id,
                rule.subcategory,
                rule.priority,
                rule.is_active,
                rule.is_system,
                rule.confidence_threshold.to_string(),
                rule.max_matches_per_day,
                rule.notes,
                tags_to_storage(&rule.tags),
                format_timestamp(rule.created_at),
                format_timestamp(rule.updated_at),
                rule.updated_by,
            ],
            |row| row.get(0),
        )?;

        let mut stored = rule.clone().with_stats(RuleStats::default());
        stored.id = id;
        Ok(stored)
    }

    fn persist(&self, rule: &Rule) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE sys_categorization_rules SET
                 user_id = ?, name = ?, description = ?, rule_type = ?, pattern = ?,
                 field_to_match = ?, is_case_sensitive = ?, is_regex = ?,
                 amount_min = CAST(? AS DECIMAL(18, 2)), amount_max = CAST(? AS DECIMAL(18, 2)),
                 category_id = ?, subcategory = ?, priority = ?, is_active = ?, is_system = ?,
                 confidence_threshold = CAST(? AS DECIMAL(3, 2)), max_matches_per_day = ?,
                 notes = ?, tags = ?, updated_at = CAST(? AS TIMESTAMP), updated_by = ?,
                 deleted_at = CAST(? AS TIMESTAMP)
             WHERE rule_id = ? AND tenant_id = ?",
            params![
                rule.user_id,
                rule.name,
                rule.description,
                rule.rule_type.as_str(),
                rule.pattern,
                rule.field_to_match.as_str(),
                rule.is_case_sensitive,
                rule.is_regex,
                rule.amount_min.map(|d| d.to_string()),
                rule.amount_max.map(|d| d.to_string()),
                rule.category.id,
                rule.subcategory,
                rule.priority,
                rule.is_active,
                rule.is_system,
                rule.confidence_threshold.to_string(),
                rule.max_matches_per_day,
                rule.notes,
                tags_to_storage(&rule.tags),
                format_timestamp(rule.updated_at),
                rule.updated_by,
                rule.deleted_at.map(format_timestamp),
                rule.id,
                rule.tenant_id,
            ],
        )?;
        if updated == 0 {
            return Err(Error::not_found(format!("Rule {}", rule.id)));
        }
        Ok(())
    }

    fn record_match(
        &self,
        rule_id: i64,
        tenant: &TenantId,
        success: bool,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        increment_rule(&conn, rule_id, tenant, success, at)
    }

    fn reset_stats(&self, rule_id: i64, tenant: &TenantId) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE sys_categorization_rules SET
                 match_count = 0, success_count = 0,
                 last_matched_at = NULL, last_success_at = NULL
             WHERE rule_id = ? AND tenant_id = ?",
            params![rule_id, tenant],
        )?;
        if updated == 0 {
            return Err(Error::not_found(format!("Rule {}", rule_id)));
        }
        Ok(())
    }
}

impl TransactionRepository for DuckDbRepository {
    fn fetch_by_ids(&self, ids: &[i64], tenant: &TenantId) -> Result<Vec<Transaction>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} WHERE tenant_id = ? AND deleted_at IS NULL AND transaction_id IN ({})
             ORDER BY transaction_id",
            TRANSACTION_COLUMNS, placeholders
        );
        let mut params: Vec<Box<dyn duckdb::ToSql>> = vec![Box::new(tenant.to_string())];
        params.extend(ids.iter().map(|id| Box::new(*id) as Box<dyn duckdb::ToSql>));
        self.query_transactions(&sql, params)
    }

    fn fetch_by_account(
        &self,
        account_id: i64,
        tenant: &TenantId,
        range: Option<DateRange>,
    ) -> Result<Vec<Transaction>> {
        let mut sql = format!(
            "SELECT {} WHERE tenant_id = ? AND account_id = ? AND deleted_at IS NULL",
            TRANSACTION_COLUMNS
        );
        let mut params: Vec<Box<dyn duckdb::ToSql>> =
            vec![Box::new(tenant.to_string()), Box::new(account_id)];

        let range = range.unwrap_or_default();
        if let Some(start) = range.start {
            sql.push_str(" AND transaction_date >= CAST(? AS DATE)");
            params.push(Box::new(start.to_string()));
        }
        if let Some(end) = range.end {
            sql.push_str(" AND transaction_date <= CAST(? AS DATE)");
            params.push(Box::new(end.to_string()));
        }
        sql.push_str(" ORDER BY transaction_date, transaction_id");

        self.query_transactions(&sql, params)
    }

    fn fetch_sample(&self, tenant: &TenantId, limit: usize) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} WHERE tenant_id = ? AND deleted_at IS NULL ORDER BY transaction_id LIMIT ?",
            TRANSACTION_COLUMNS
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_transactions(&sql, vec![Box::new(tenant.to_string()), Box::new(limit)])
    }

    fn persist(&self, tx: &Transaction) -> Result<()> {
        let conn = self.conn()?;
        update_transaction(&conn, tx)
    }

    fn apply_categorization(&self, tx: &Transaction, rule_id: i64, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN TRANSACTION")?;
        let applied = update_transaction(&conn, tx)
            .and_then(|_| increment_rule(&conn, rule_id, &tx.tenant_id, true, at));
        match applied {
            Ok(()) => {
                conn.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }
}

impl CategoryRepository for DuckDbRepository {
    fn get(&self, category_id: i64, tenant: &TenantId) -> Result<Option<Category>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} WHERE category_id = ? AND tenant_id = ? AND deleted_at IS NULL",
            CATEGORY_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![category_id, tenant], row_to_category)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }
}

// Write helpers shared by single and combined writes

fn update_transaction(conn: &Connection, tx: &Transaction) -> Result<()> {
    let updated = conn.execute(
        "UPDATE sys_transactions SET
             transaction_category = ?, transaction_subcategory = ?,
             is_auto_categorized = ?, categorization_confidence = CAST(? AS DECIMAL(3, 2)),
             categorization_rule_id = ?, tags = ?, notes = ?,
             updated_at = CAST(? AS TIMESTAMP)
         WHERE transaction_id = ? AND tenant_id = ?",
        params![
            tx.transaction_category,
            tx.transaction_subcategory,
            tx.is_auto_categorized,
            tx.categorization_confidence.map(|c| c.to_string()),
            tx.categorization_rule_id,
            tags_to_storage(&tx.tags),
            tx.notes,
            format_timestamp(tx.updated_at),
            tx.id,
            tx.tenant_id,
        ],
    )?;
    if updated == 0 {
        return Err(Error::not_found(format!("Transaction {}", tx.id)));
    }
    Ok(())
}

fn increment_rule(
    conn: &Connection,
    rule_id: i64,
    tenant: &TenantId,
    success: bool,
    at: DateTime<Utc>,
) -> Result<()> {
    let at = format_timestamp(at);
    let updated = conn.execute(
        "UPDATE sys_categorization_rules SET
             match_count = match_count + 1,
             success_count = success_count + CASE WHEN ? THEN 1 ELSE 0 END,
             last_matched_at = CAST(? AS TIMESTAMP),
             last_success_at = CASE WHEN ? THEN CAST(? AS TIMESTAMP) ELSE last_success_at END
         WHERE rule_id = ? AND tenant_id = ?",
        params![success, at, success, at, rule_id, tenant],
    )?;
    if updated == 0 {
        return Err(Error::not_found(format!("Rule {}", rule_id)));
    }
    Ok(())
}

// Row mapping

fn row_to_rule(row: &Row) -> duckdb::Result<Rule> {
    let rule_type: String = row.get(5)?;
    let rule_type: RuleType = rule_type.parse().map_err(|e| conversion_error(5, e))?;
    let field: String = row.get(7)?;
    let field: MatchField = field.parse().map_err(|e| conversion_error(7, e))?;

    let stats = RuleStats::restore(
        to_count(row.get(20)?, 20)?,
        to_count(row.get(21)?, 21)?,
        opt_timestamp(row.get(22)?, 22)?,
        opt_timestamp(row.get(23)?, 23)?,
    );

    let mut rule = Rule::new(
        row.get(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, String>(3)?,
        rule_type,
        row.get::<_, String>(6)?,
        CategoryRef::new(row.get(12)?, row.get::<_, String>(13)?),
    )
    .with_stats(stats);

    rule.user_id = row.get(2)?;
    rule.description = row.get(4)?;
    rule.field_to_match = field;
    rule.is_case_sensitive = row.get(8)?;
    rule.is_regex = row.get(9)?;
    rule.amount_min = opt_decimal(row.get(10)?, 10)?;
    rule.amount_max = opt_decimal(row.get(11)?, 11)?;
    rule.subcategory = row.get(14)?;
    rule.priority = row.get(15)?;
    rule.is_active = row.get(16)?;
    rule.is_system = row.get(17)?;
    rule.confidence_threshold = parse_decimal(&row.get::<_, String>(18)?, 18)?;
    rule.max_matches_per_day =
        u32::try_from(row.get::<_, i64>(19)?).map_err(|e| conversion_error(19, e))?;
    rule.notes = row.get(24)?;
    rule.tags = tags_from_storage(row.get::<_, Option<String>>(25)?.as_deref());
    rule.created_at = parse_timestamp(&row.get::<_, String>(26)?, 26)?;
    rule.updated_at = parse_timestamp(&row.get::<_, String>(27)?, 27)?;
    rule.updated_by = row.get(28)?;
    rule.deleted_at = opt_timestamp(row.get(29)?, 29)?;
    Ok(rule)
}

fn row_to_transaction(row: &Row) -> duckdb::Result<Transaction> {
    let mut tx = Transaction::new(
        row.get(0)?,
        row.get::<_, String>(1)?,
        row.get(3)?,
        parse_decimal(&row.get::<_, String>(4)?, 4)?,
        row.get::<_, String>(6)?,
        parse_date(&row.get::<_, String>(9)?, 9)?,
    );
    tx.user_id = row.get(2)?;
    tx.currency = row.get(5)?;
    tx.original_description = row.get(7)?;
    tx.transaction_type = row.get(8)?;
    tx.merchant_name = row.get(10)?;
    tx.merchant_category_code = row.get(11)?;
    tx.payment_method = row.get(12)?;
    tx.reference_number = row.get(13)?;
    tx.notes = row.get(14)?;
    tx.tags = tags_from_storage(row.get::<_, Option<String>>(15)?.as_deref());
    tx.transaction_category = row.get(16)?;
    tx.transaction_subcategory = row.get(17)?;
    tx.is_auto_categorized = row.get(18)?;
    tx.categorization_confidence = opt_decimal(row.get(19)?, 19)?;
    tx.categorization_rule_id = row.get(20)?;
    tx.created_at = parse_timestamp(&row.get::<_, String>(21)?, 21)?;
    tx.updated_at = parse_timestamp(&row.get::<_, String>(22)?, 22)?;
    tx.deleted_at = opt_timestamp(row.get(23)?, 23)?;
    Ok(tx)
}

fn row_to_category(row: &Row) -> duckdb::Result<Category> {
    let mut category = Category::new(
        row.get(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, String>(2)?,
        row.get::<_, String>(6)?,
    );
    category.display_name = row.get(3)?;
    category.slug = row.get(4)?;
    category.parent_id = row.get(5)?;
    category.is_active = row.get(7)?;
    category.is_system = row.get(8)?;
    category.created_at = parse_timestamp(&row.get::<_, String>(9)?, 9)?;
    category.deleted_at = opt_timestamp(row.get(10)?, 10)?;
    Ok(category)
}

// Helper functions

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> duckdb::Error {
    duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_decimal(s: &str, idx: usize) -> duckdb::Result<Decimal> {
    Decimal::from_str_exact(s.trim()).map_err(|e| conversion_error(idx, e))
}

fn opt_decimal(s: Option<String>, idx: usize) -> duckdb::Result<Option<Decimal>> {
    s.map(|s| parse_decimal(&s, idx)).transpose()
}

fn to_count(v: i64, idx: usize) -> duckdb::Result<u64> {
    u64::try_from(v).map_err(|e| conversion_error(idx, e))
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

fn parse_timestamp(s: &str, idx: usize) -> duckdb::Result<DateTime<Utc>> {
    parse_naive_datetime(s)
        .map(|naive| naive.and_utc())
        .map_err(|e| conversion_error(idx, e))
}

fn opt_timestamp(s: Option<String>, idx: usize) -> duckdb::Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_timestamp(&s, idx)).transpose()
}

fn parse_naive_datetime(s: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
}

fn parse_date(s: &str, idx: usize) -> duckdb::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}
