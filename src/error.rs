/// Unified error type for the NL-to-SQL pipeline
/// Provides structured error handling with categories for different failure modes
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Input errors: no base table can be inferred (empty schema, no default table)
    #[error("No table error: {message}")]
    NoTable {
        message: String,
        context: Option<String>,
    },

    /// Input errors: schema text/JSON/CSV/DDL could not be turned into a schema model
    #[error("Malformed schema: {message}")]
    MalformedSchema {
        message: String,
        format: Option<String>,
        context: Option<String>,
    },

    /// Structural errors: a column reference names a table that is neither FROM nor joined
    #[error("Invalid reference: {message}")]
    InvalidReference {
        message: String,
        table: Option<String>,
        column: Option<String>,
    },

    /// Unsupported features: a construct has no rendering in the requested dialect,
    /// or an input format is delegated to an external collaborator
    #[error("Unsupported feature: {message}")]
    Unsupported {
        message: String,
        dialect: Option<String>,
        construct: Option<String>,
    },

    /// Configuration errors: unreadable or out-of-range settings
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// Internal errors: should never happen, indicates bug
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        context: Option<String>,
    },
}

impl EngineError {
    pub fn no_table(message: impl Into<String>) -> Self {
        Self::NoTable {
            message: message.into(),
            context: None,
        }
    }

    pub fn malformed_schema(message: impl Into<String>) -> Self {
        Self::MalformedSchema {
            message: message.into(),
            format: None,
            context: None,
        }
    }

    pub fn malformed_schema_in(message: impl Into<String>, format: impl Into<String>) -> Self {
        Self::MalformedSchema {
            message: message.into(),
            format: Some(format.into()),
            context: None,
        }
    }

    pub fn invalid_reference(
        message: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self::InvalidReference {
            message: message.into(),
            table: Some(table.into()),
            column: Some(column.into()),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
            dialect: None,
            construct: None,
        }
    }

    pub fn unsupported_in_dialect(
        construct: impl Into<String>,
        dialect: impl Into<String>,
    ) -> Self {
        let construct = construct.into();
        let dialect = dialect.into();
        Self::Unsupported {
            message: format!("{} has no rendering in the {} dialect", construct, dialect),
            dialect: Some(dialect),
            construct: Some(construct),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            context: None,
        }
    }

    /// Add context to an error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        match &mut self {
            Self::NoTable { context: ctx, .. } => *ctx = Some(context.into()),
            Self::MalformedSchema { context: ctx, .. } => *ctx = Some(context.into()),
            Self::Config { context: ctx, .. } => *ctx = Some(context.into()),
            Self::Internal { context: ctx, .. } => *ctx = Some(context.into()),
            _ => {}
        }
        self
    }

    /// True for the InputError family (bad text/schema supplied by the caller)
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::NoTable { .. } | Self::MalformedSchema { .. })
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal {
            message: format!("{:#}", err),
            context: None,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Config {
            message: err.to_string(),
            context: Some("io".to_string()),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::malformed_schema_in(err.to_string(), "json")
    }
}

impl From<csv::Error> for EngineError {
    fn from(err: csv::Error) -> Self {
        Self::malformed_schema_in(err.to_string(), "csv")
    }
}

impl From<sqlparser::parser::ParserError> for EngineError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        Self::malformed_schema_in(err.to_string(), "ddl")
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_context_sets_context() {
        let err = EngineError::no_table("schema has no tables").with_context("count orders");
        match err {
            EngineError::NoTable { context, .. } => assert_eq!(context.as_deref(), Some("count orders")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_in_dialect_message() {
        let err = EngineError::unsupported_in_dialect("ILIKE", "sqlite");
        assert!(err.to_string().contains("ILIKE"));
        assert!(err.to_string().contains("sqlite"));
        assert!(!err.is_input_error());
    }

    #[test]
    fn test_json_error_maps_to_malformed_schema() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: EngineError = parse_err.into();
        assert!(err.is_input_error());
    }
}
