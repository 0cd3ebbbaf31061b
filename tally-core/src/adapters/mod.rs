//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for all repository ports
//! - In-memory maps for library use without a database
//! - Demo data generator for demo mode

pub mod demo;
pub mod duckdb;
pub mod memory;
