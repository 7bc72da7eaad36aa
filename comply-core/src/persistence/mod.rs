//! Persistence Port
//!
//! Generic query/mutation interface over the hosted relational backend.
//! Rows travel as JSON objects; the typed views on top of this port
//! (e.g. [`crate::templates::TemplateRepository`]) own the column names.
//!
//! Backends:
//! - [`MemoryPersistence`]: in-process tables (tests, demos)
//! - [`RestPersistence`]: PostgREST-style HTTP API of the hosted backend

mod memory;
mod rest;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ErrorCode;

pub use memory::MemoryPersistence;
pub use rest::RestPersistence;

/// Error type for persistence operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum PersistenceError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Row {id} not found in {table}")]
    NotFound { table: String, id: String },

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Malformed row: {0}")]
    Decode(String),
}

impl PersistenceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Connection(_) => ErrorCode::DatabaseConnectionFailed,
            Self::Timeout(_) => ErrorCode::DatabaseTimeout,
            Self::Constraint(_) => ErrorCode::DatabaseConstraintViolation,
            Self::RateLimited(_) => ErrorCode::RateLimitExceeded,
            Self::NotFound { .. } | Self::Query(_) | Self::Decode(_) => ErrorCode::DatabaseError,
        }
    }
}

/// Sort order for a select
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

/// Equality filter with optional ordering and limit
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub eq: Vec<(String, Value)>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.eq.push((column.into(), value.into()));
        self
    }

    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(OrderBy {
            column: column.into(),
            descending: true,
        });
        self
    }

    pub fn order_asc(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(OrderBy {
            column: column.into(),
            descending: false,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Does this row satisfy every equality condition?
    ///
    /// A missing column compares equal to `null`.
    pub fn matches(&self, row: &Value) -> bool {
        self.eq.iter().all(|(column, expected)| {
            row.get(column).unwrap_or(&Value::Null) == expected
        })
    }
}

/// Generic query/mutation interface of the hosted backend
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Fetch rows of `table` matching `filter`
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Value>, PersistenceError>;

    /// Insert a row, returning it as stored (with generated columns)
    async fn insert(&self, table: &str, row: Value) -> Result<Value, PersistenceError>;

    /// Merge `patch` into the row with primary key `id`
    async fn update(&self, table: &str, id: &str, patch: Value) -> Result<(), PersistenceError>;

    /// Delete the row with primary key `id`
    async fn delete(&self, table: &str, id: &str) -> Result<(), PersistenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches_missing_column_as_null() {
        let row = json!({"id": "a", "ativo": true});
        assert!(Filter::new().eq("ativo", true).matches(&row));
        assert!(Filter::new().eq("formulario", Value::Null).matches(&row));
        assert!(!Filter::new().eq("ativo", false).matches(&row));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            PersistenceError::Connection("refused".into()).code(),
            ErrorCode::DatabaseConnectionFailed
        );
        assert_eq!(
            PersistenceError::Decode("bad".into()).code(),
            ErrorCode::DatabaseError
        );
    }
}
