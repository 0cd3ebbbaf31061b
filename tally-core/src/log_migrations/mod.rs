//! Schema migrations for the event log database (`logs.duckdb`)
//!
//! Kept apart from the categorization schema so the log file can be
//! deleted at any time without touching rules or transactions.

/// `(file name, sql)` pairs, in application order
pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_event_log.sql", include_str!("001_event_log.sql")),
];
