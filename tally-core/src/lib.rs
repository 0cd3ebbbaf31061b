//! Tally Core - rule-based transaction categorization
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Rules, transactions, categories and the matcher
//! - **ports**: Repository traits for rules, transactions and categories
//! - **services**: Rule selection, categorization, bulk runs and rule management
//! - **adapters**: DuckDB and in-memory repositories, demo data

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use adapters::duckdb::DuckDbRepository;
use config::Config;
use services::{BulkCategorizer, CategorizationEngine, RuleService};

// Re-export commonly used types at crate root
pub use domain::result::Error;
pub use domain::{Category, NewRule, Rule, RuleType, RuleUpdate, Transaction};

/// Main context for Tally operations
///
/// Opens the database for the current mode, brings its schema up to date
/// and wires every service to the same repository.
pub struct TallyContext {
    pub config: Config,
    /// Tenant commands run against unless told otherwise
    pub tenant: String,
    pub repository: Arc<DuckDbRepository>,
    pub engine: CategorizationEngine,
    pub bulk: BulkCategorizer,
    pub rule_service: RuleService,
}

impl TallyContext {
    pub fn new(tally_dir: &Path) -> Result<Self> {
        let config = Config::load(tally_dir)?;
        std::fs::create_dir_all(tally_dir)?;

        let db_path = tally_dir.join(config.db_filename());
        let repository = Arc::new(DuckDbRepository::new(&db_path)?);
        repository.ensure_schema()?;
        tracing::debug!(db = %db_path.display(), demo_mode = config.demo_mode, "Opened database");

        Ok(Self::with_repository(config, repository))
    }

    /// Build a context over an already opened repository
    pub fn with_repository(config: Config, repository: Arc<DuckDbRepository>) -> Self {
        let engine = CategorizationEngine::new(repository.clone(), repository.clone());
        let bulk = BulkCategorizer::new(repository.clone(), repository.clone());
        let rule_service = RuleService::new(
            repository.clone(),
            repository.clone(),
            repository.clone(),
            config.rule_defaults.clone(),
            config.test_sample_size,
        );

        Self {
            tenant: config.default_tenant.clone(),
            config,
            repository,
            engine,
            bulk,
            rule_service,
        }
    }

    /// Use another tenant for subsequent commands
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = tenant.into();
        self
    }
}
