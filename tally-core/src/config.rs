//! Configuration management
//!
//! Settings live in `settings.json` inside the tally directory:
//! ```json
//! {
//!   "app": { "demoMode": false, "defaultTenant": "default" },
//!   "categorization": {
//!     "defaultPriority": 100,
//!     "defaultConfidence": 0.8,
//!     "defaultMaxMatchesPerDay": 1000,
//!     "testSampleSize": 100
//!   }
//! }
//! ```
//! Keys the CLI doesn't manage are preserved on save.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{RuleDefaults, DEFAULT_MAX_MATCHES_PER_DAY, DEFAULT_PRIORITY};

/// Tenant used when none is configured
pub const DEFAULT_TENANT: &str = "default";

/// Transactions sampled by `rules test` when none are given
pub const DEFAULT_TEST_SAMPLE_SIZE: usize = 100;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
    #[serde(default)]
    categorization: CategorizationSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default)]
    demo_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_tenant: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategorizationSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_max_matches_per_day: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    test_sample_size: Option<usize>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Tally configuration (resolved view of settings)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub demo_mode: bool,
    pub default_tenant: String,
    pub rule_defaults: RuleDefaults,
    pub test_sample_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            demo_mode: false,
            default_tenant: DEFAULT_TENANT.to_string(),
            rule_defaults: RuleDefaults::default(),
            test_sample_size: DEFAULT_TEST_SAMPLE_SIZE,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "1" | "yes" | "TRUE" | "YES" => Some(true),
        "false" | "0" | "no" | "FALSE" | "NO" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load config from the tally directory
    ///
    /// Environment overrides:
    /// - `TALLY_DEMO_MODE` (for CI/testing)
    /// - `TALLY_TENANT`
    pub fn load(tally_dir: &Path) -> Result<Self> {
        let mut config = Self::read(tally_dir)?;

        if let Some(demo) = std::env::var("TALLY_DEMO_MODE")
            .ok()
            .as_deref()
            .and_then(parse_bool)
        {
            config.demo_mode = demo;
        }
        if let Ok(tenant) = std::env::var("TALLY_TENANT") {
            if !tenant.trim().is_empty() {
                config.default_tenant = tenant.trim().to_string();
            }
        }

        Ok(config)
    }

    /// Read settings.json without environment overrides
    pub(crate) fn read(tally_dir: &Path) -> Result<Self> {
        let raw = Self::read_raw(tally_dir)?;
        let defaults = RuleDefaults::default();
        let cat = &raw.categorization;

        let confidence = match cat.default_confidence {
            Some(value) => {
                let confidence = Decimal::try_from(value)
                    .with_context(|| format!("Invalid defaultConfidence {}", value))?
                    .round_dp(2);
                if confidence < Decimal::ZERO || confidence > Decimal::ONE {
                    bail!("defaultConfidence must be between 0 and 1, got {}", value);
                }
                confidence
            }
            None => defaults.confidence,
        };

        Ok(Self {
            demo_mode: raw.app.demo_mode,
            default_tenant: raw
                .app
                .default_tenant
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TENANT.to_string()),
            rule_defaults: RuleDefaults {
                priority: cat.default_priority.unwrap_or(DEFAULT_PRIORITY),
                confidence,
                max_matches_per_day: cat
                    .default_max_matches_per_day
                    .unwrap_or(DEFAULT_MAX_MATCHES_PER_DAY),
            },
            test_sample_size: cat.test_sample_size.unwrap_or(DEFAULT_TEST_SAMPLE_SIZE),
        })
    }

    fn read_raw(tally_dir: &Path) -> Result<SettingsFile> {
        let settings_path = tally_dir.join("settings.json");
        if !settings_path.exists() {
            return Ok(SettingsFile::default());
        }
        let content = std::fs::read_to_string(&settings_path)
            .with_context(|| format!("Failed to read {}", settings_path.display()))?;
        Ok(serde_json::from_str(&content).unwrap_or_default())
    }

    /// Save config to the tally directory
    /// Preserves other settings that the CLI doesn't manage
    pub fn save(&self, tally_dir: &Path) -> Result<()> {
        let mut settings = Self::read_raw(tally_dir)?;

        settings.app.demo_mode = self.demo_mode;
        settings.app.default_tenant = Some(self.default_tenant.clone());
        settings.categorization.default_priority = Some(self.rule_defaults.priority);
        settings.categorization.default_confidence =
            Some(self.rule_defaults.confidence.to_string().parse().unwrap_or(0.8));
        settings.categorization.default_max_matches_per_day =
            Some(self.rule_defaults.max_matches_per_day);
        settings.categorization.test_sample_size = Some(self.test_sample_size);

        std::fs::create_dir_all(tally_dir)?;
        let settings_path = tally_dir.join("settings.json");
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)
            .with_context(|| format!("Failed to write {}", settings_path.display()))?;
        Ok(())
    }

    /// Enable demo mode
    pub fn enable_demo_mode(&mut self) {
        self.demo_mode = true;
    }

    /// Disable demo mode
    pub fn disable_demo_mode(&mut self) {
        self.demo_mode = false;
    }

    /// Database file for the current mode
    pub fn db_filename(&self) -> &'static str {
        if self.demo_mode {
            "demo.duckdb"
        } else {
            "tally.duckdb"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::read(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.db_filename(), "tally.duckdb");
    }

    #[test]
    fn test_reads_categorization_settings() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{
                "app": {"demoMode": true, "defaultTenant": "acme", "theme": "dark"},
                "categorization": {"defaultPriority": 50, "defaultConfidence": 0.95, "testSampleSize": 25}
            }"#,
        )
        .unwrap();

        let config = Config::read(dir.path()).unwrap();
        assert!(config.demo_mode);
        assert_eq!(config.default_tenant, "acme");
        assert_eq!(config.rule_defaults.priority, 50);
        assert_eq!(config.rule_defaults.confidence, Decimal::new(95, 2));
        assert_eq!(config.rule_defaults.max_matches_per_day, 1000);
        assert_eq!(config.test_sample_size, 25);
        assert_eq!(config.db_filename(), "demo.duckdb");
    }

    #[test]
    fn test_rejects_confidence_out_of_range() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"categorization": {"defaultConfidence": 1.5}}"#,
        )
        .unwrap();
        assert!(Config::read(dir.path()).is_err());
    }

    #[test]
    fn test_save_preserves_unknown_keys() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"app": {"theme": "dark"}, "plugins": {"x": 1}}"#,
        )
        .unwrap();

        let mut config = Config::read(dir.path()).unwrap();
        config.enable_demo_mode();
        config.save(dir.path()).unwrap();

        let content = std::fs::read_to_string(dir.path().join("settings.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["app"]["demoMode"], true);
        assert_eq!(value["app"]["theme"], "dark");
        assert_eq!(value["plugins"]["x"], 1);

        let reloaded = Config::read(dir.path()).unwrap();
        assert!(reloaded.demo_mode);
        assert_eq!(reloaded.rule_defaults, RuleDefaults::default());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
