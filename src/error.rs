//! Error types for the transactional request framework.
//!
//! This module defines all error types using `thiserror`. Every variant is
//! caught at the unit-of-work boundary and collapsed into a bare internal-error
//! response; the display text is only ever written to the server log.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "23505" for unique violation
        sql_state: Option<String>,
    },

    #[error("Cannot escape {kind}: {reason}")]
    Escape { kind: &'static str, reason: String },

    #[error("Not found: {resource} {id}")]
    NotFound { resource: String, id: String },

    #[error("Invalid identifier '{input}': {reason}")]
    Decode { input: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
        }
    }

    pub fn escape(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::Escape {
            kind,
            reason: reason.into(),
        }
    }

    /// Create a not found error for a handler-level lookup.
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create an opaque identifier decode error.
    pub fn decode(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// SQLSTATE reported by the server for statement failures.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Database { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Whether the failure happened while leasing a connection.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Convert sqlx errors to AppError.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => AppError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                AppError::database(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => AppError::database("No rows returned", None),
            sqlx::Error::PoolTimedOut => AppError::connection(
                "Timed out waiting for a pooled connection",
                "Increase max_connections or acquire_timeout",
            ),
            sqlx::Error::PoolClosed => {
                AppError::connection("Connection pool is closed", "Restart the server")
            }
            sqlx::Error::Io(io_err) => AppError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => AppError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => AppError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                AppError::database(format!("Column not found: {}", col), None)
            }
            sqlx::Error::ColumnDecode { index, source } => {
                AppError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => AppError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => AppError::internal("Database worker crashed"),
            _ => AppError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias used throughout the crate.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = AppError::connection("refused", "Is the server running?");
        assert_eq!(err.suggestion(), Some("Is the server running?"));
        assert_eq!(AppError::internal("x").suggestion(), None);
    }

    #[test]
    fn test_sql_state() {
        let err = AppError::database("duplicate key", Some("23505".to_string()));
        assert_eq!(err.sql_state(), Some("23505"));
        assert!(!err.is_connection());
    }

    #[test]
    fn test_not_found_display() {
        let err = AppError::not_found("generic", "abcd");
        assert_eq!(err.to_string(), "Not found: generic abcd");
    }

    #[test]
    fn test_pool_timeout_is_connection_error() {
        let err: AppError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_connection());
    }

    #[test]
    fn test_serde_error_converts() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: AppError = parse.into();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
