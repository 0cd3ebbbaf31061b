//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod bulk;
mod categorization;
mod demo;
pub mod logging;
pub mod migration;
mod rules;
mod selector;

pub use bulk::{BulkCategorizer, BulkResult, RunControl, TransactionSelection};
pub use categorization::{CategorizationEngine, CategorizationOutcome};
pub use demo::{DemoSeed, DemoService};
pub use logging::{EntryPoint, EventCount, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use rules::{RuleService, RuleStatsSummary};
pub use selector::{sort_for_evaluation, RuleSelector};
