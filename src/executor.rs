//! Contract with the external SQL executor.
//!
//! The crate ships no executor; callers plug in their database driver.

use crate::ir::Literal;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Rows returned by an executor
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct ExecutionResult {
    /// Result column names, in select-list order
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub elapsed: Duration,
}

impl ExecutionResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column by name
    pub fn column_values(&self, name: &str) -> Option<Vec<&serde_json::Value>> {
        let i = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|r| r.get(i)).collect())
    }
}

/// Structured executor failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// The database rejected or failed the statement
    #[error("statement failed: {message}")]
    Statement { message: String, code: Option<String> },

    /// The executor could not reach its database
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// Parameter count or type did not match the statement
    #[error("parameter binding failed: {message}")]
    Binding { message: String },
}

impl ExecutionError {
    pub fn statement(message: impl Into<String>) -> Self {
        Self::Statement {
            message: message.into(),
            code: None,
        }
    }
}

/// SQL text plus bound parameters in, rows out
pub trait SqlExecutor {
    fn execute(&self, sql: &str, params: &[Literal]) -> Result<ExecutionResult, ExecutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_column_lookup() {
        let result = ExecutionResult {
            columns: vec!["customers.name".into(), "total_revenue".into()],
            rows: vec![vec![json!("Alice"), json!(37.0)], vec![json!("Bob"), json!(30.0)]],
            elapsed: Duration::from_millis(1),
        };
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.column_index("total_revenue"), Some(1));
        assert_eq!(result.column_values("customers.name").unwrap(), vec![&json!("Alice"), &json!("Bob")]);
        assert!(result.column_values("missing").is_none());
    }

    #[test]
    fn test_error_display() {
        let err = ExecutionError::statement("no such table: invoices");
        assert_eq!(err.to_string(), "statement failed: no such table: invoices");
    }
}
