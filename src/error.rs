//! Error types for quern.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Unknown backend requested in a connection config.
    #[error("unknown dialect: '{0}'. Expected: mysql or sqlite")]
    InvalidDialect(String),

    /// Table is not present in the live schema.
    #[error("table '{table}' not found{}", hint(.suggestion))]
    InvalidTable {
        table: String,
        suggestion: Option<String>,
    },

    /// Column is not present in the table (or the table itself is unknown).
    #[error("column '{column}' not found in table '{table}'{}", hint(.suggestion))]
    InvalidColumn {
        table: String,
        column: String,
        suggestion: Option<String>,
    },

    /// Operator outside the allow-listed set.
    #[error("invalid operator: '{0}'")]
    InvalidOperator(String),

    /// Join kind outside LEFT/RIGHT/INNER.
    #[error("invalid join kind: '{0}'")]
    InvalidJoinKind(String),

    /// Malformed qualified identifier (more than one separator).
    #[error("invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// Value shape unusable for the requested clause.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Column definition without a type.
    #[error("missing column type for '{0}'")]
    MissingColumnType(String),

    /// Column type the target backend cannot express.
    #[error("unsupported column type for '{column}': {reason}")]
    UnsupportedColumnType { column: String, reason: String },

    /// Connection configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Underlying driver failure, wrapped with the original message.
    #[error("driver error: {0}")]
    Driver(String),

    /// Row could not be decoded into the requested record type.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

fn hint(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(". Did you mean '{s}'?"),
        None => String::new(),
    }
}

/// Result type alias for quern operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggestion_in_message() {
        let err = Error::InvalidTable {
            table: "userz".into(),
            suggestion: Some("users".into()),
        };
        assert_eq!(
            err.to_string(),
            "table 'userz' not found. Did you mean 'users'?"
        );

        let err = Error::InvalidTable {
            table: "ghost".into(),
            suggestion: None,
        };
        assert_eq!(err.to_string(), "table 'ghost' not found");
    }

    #[test]
    fn test_operator_message() {
        let err = Error::InvalidOperator("maybe".into());
        assert_eq!(err.to_string(), "invalid operator: 'maybe'");
    }
}
