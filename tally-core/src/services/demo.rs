//! Demo service - manage demo mode
//!
//! Demo mode switches to a separate database seeded with categories, rules
//! and uncategorized transactions, so the engine can be tried without real data.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::adapters::demo::{generate_demo_categories, generate_demo_rules, generate_demo_transactions};
use crate::adapters::duckdb::DuckDbRepository;
use crate::config::Config;
use crate::ports::RuleRepository;

const DEMO_DB: &str = "demo.duckdb";

/// What was seeded into the demo database
#[derive(Debug, Clone, Default, Serialize)]
pub struct DemoSeed {
    pub tenant: String,
    pub categories: usize,
    pub rules: usize,
    pub transactions: usize,
}

/// Demo service for managing demo mode
pub struct DemoService {
    tally_dir: PathBuf,
}

impl DemoService {
    pub fn new(tally_dir: &Path) -> Self {
        Self {
            tally_dir: tally_dir.to_path_buf(),
        }
    }

    /// Check if demo mode is currently enabled
    pub fn is_enabled(&self) -> Result<bool> {
        let config = Config::load(&self.tally_dir)?;
        Ok(config.demo_mode)
    }

    /// Enable demo mode
    ///
    /// Any existing demo database is replaced by a freshly seeded one for the
    /// configured tenant.
    pub fn enable(&self) -> Result<DemoSeed> {
        self.remove_demo_db()?;

        let mut config = Config::read(&self.tally_dir).unwrap_or_default();
        config.enable_demo_mode();
        config.save(&self.tally_dir)?;

        let tenant = Config::load(&self.tally_dir)?.default_tenant;
        let repository = DuckDbRepository::new(&self.tally_dir.join(DEMO_DB))?;
        repository.ensure_schema()?;

        let mut seed = DemoSeed {
            tenant: tenant.clone(),
            ..Default::default()
        };

        let mut categories = Vec::new();
        for category in generate_demo_categories(&tenant) {
            categories.push(
                repository
                    .insert_category(&category)
                    .with_context(|| format!("Failed to seed category {}", category.name))?,
            );
        }
        seed.categories = categories.len();

        for rule in generate_demo_rules(&tenant, &categories) {
            repository
                .insert(&rule)
                .with_context(|| format!("Failed to seed rule {}", rule.name))?;
            seed.rules += 1;
        }

        for tx in generate_demo_transactions(&tenant) {
            repository.insert_transaction(&tx)?;
            seed.transactions += 1;
        }

        tracing::info!(
            tenant_id = %seed.tenant,
            categories = seed.categories,
            rules = seed.rules,
            transactions = seed.transactions,
            "Seeded demo database"
        );
        Ok(seed)
    }

    /// Disable demo mode, optionally deleting the demo database
    pub fn disable(&self, clean: bool) -> Result<()> {
        let mut config = Config::read(&self.tally_dir).unwrap_or_default();
        config.disable_demo_mode();
        config.save(&self.tally_dir)?;

        if clean {
            self.remove_demo_db()?;
        }
        Ok(())
    }

    fn remove_demo_db(&self) -> Result<()> {
        for name in [DEMO_DB, "demo.duckdb.wal"] {
            let path = self.tally_dir.join(name);
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::TransactionRepository;
    use tempfile::TempDir;

    #[test]
    fn test_enable_seeds_and_disable_cleans() {
        let dir = TempDir::new().unwrap();
        let service = DemoService::new(dir.path());

        let seed = service.enable().unwrap();
        assert!(seed.categories > 0);
        assert!(seed.rules > 0);
        assert!(seed.transactions > 0);
        assert!(Config::read(dir.path()).unwrap().demo_mode);
        assert!(dir.path().join(DEMO_DB).exists());

        {
            let repo = DuckDbRepository::new(&dir.path().join(DEMO_DB)).unwrap();
            assert_eq!(repo.fetch_active(&seed.tenant, None).unwrap().len(), seed.rules);
            let sample = repo.fetch_sample(&seed.tenant, 5).unwrap();
            assert_eq!(sample.len(), 5);
        }

        service.disable(true).unwrap();
        assert!(!Config::read(dir.path()).unwrap().demo_mode);
        assert!(!dir.path().join(DEMO_DB).exists());
    }
}
