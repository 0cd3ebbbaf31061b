//! Result and error types for the core library

use thiserror::Error;

/// Core library error type
///
/// `Validation` covers everything rejected at rule create/update time.
/// Matching problems never surface here; they degrade to "no match".
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for errors raised by rule validation
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::validation("bad input");
        assert_eq!(err.to_string(), "Validation error: bad input");
        assert!(err.is_validation());

        let err = Error::not_found("Rule 7");
        assert_eq!(err.to_string(), "Not found: Rule 7");
        assert!(!err.is_validation());
    }

    #[test]
    fn test_from_duckdb_error() {
        let conn = duckdb::Connection::open_in_memory().unwrap();
        let db_err = conn.execute("SELECT * FROM missing_table", []).unwrap_err();
        let err: Error = db_err.into();
        assert!(matches!(err, Error::Database(_)));
        assert!(err.to_string().starts_with("Database error"));
    }
}
