//! Schema migrations for the categorization database
//!
//! SQL files are embedded with `include_str!` and applied by
//! `MigrationService` in name order, each one exactly once.

/// `(file name, sql)` pairs, in application order.
///
/// New migrations get the next `NNN_` prefix and are appended here.
pub const MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];
