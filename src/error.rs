//! Error types for docsql.
//!
//! Every failure the front end or the engine can raise is a variant of
//! [`SqlError`]. Variants are grouped into the categories of [`ErrorKind`] so a
//! host can report them without matching on every case.

use serde::Serialize;
use thiserror::Error;

use crate::storage::StorageError;

/// Coarse error category, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Lexical,
    Syntax,
    UnsupportedCommand,
    Schema,
    Plan,
    Semantic,
    Limit,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Lexical => "LexicalError",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::UnsupportedCommand => "UnsupportedCommandError",
            ErrorKind::Schema => "SchemaError",
            ErrorKind::Plan => "PlanError",
            ErrorKind::Semantic => "SemanticError",
            ErrorKind::Limit => "LimitError",
            ErrorKind::Storage => "StorageError",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SqlError {
    // Lexical errors
    #[error("Unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },

    #[error("Unterminated string starting at position {position}")]
    UnterminatedString { position: usize },

    // Syntax errors
    #[error("Syntax error at position {position}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        position: usize,
    },

    #[error("Empty query")]
    EmptyQuery,

    // Unsupported commands
    #[error("Write operations are not supported: {0}")]
    WriteNotSupported(String),

    #[error("Unsupported command: {0} (only SELECT queries are supported)")]
    UnsupportedCommand(String),

    // Schema errors
    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    #[error("Index '{index}' does not exist on table '{table}'")]
    IndexNotFound { table: String, index: String },

    // Plan errors
    #[error("Index '{index}' requires condition on prefix column '{column}'")]
    MissingPrefixCondition { index: String, column: String },

    #[error("Index '{index}': range condition on '{column}' is only allowed on the last constrained index column")]
    RangeNotLast { index: String, column: String },

    // Semantic errors
    #[error("Column '{0}' must appear in GROUP BY or aggregate function")]
    NotGrouped(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Function {name} expects {expected}, got {found} argument(s)")]
    ArityMismatch {
        name: String,
        expected: String,
        found: usize,
    },

    #[error("Semantic error: {0}")]
    Semantic(String),

    // Limit errors
    #[error("Query on table '{table}' requires a LIMIT clause (maximum LIMIT is {max_limit})")]
    LimitRequired { table: String, max_limit: usize },

    #[error("LIMIT {limit} exceeds maximum allowed LIMIT of {max_limit}")]
    LimitExceeded { limit: usize, max_limit: usize },

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for docsql operations
pub type SqlResult<T> = Result<T, SqlError>;

impl SqlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SqlError::UnexpectedCharacter { .. } | SqlError::UnterminatedString { .. } => {
                ErrorKind::Lexical
            }
            SqlError::UnexpectedToken { .. } | SqlError::EmptyQuery => ErrorKind::Syntax,
            SqlError::WriteNotSupported(_) | SqlError::UnsupportedCommand(_) => {
                ErrorKind::UnsupportedCommand
            }
            SqlError::TableNotFound(_) | SqlError::IndexNotFound { .. } => ErrorKind::Schema,
            SqlError::MissingPrefixCondition { .. } | SqlError::RangeNotLast { .. } => {
                ErrorKind::Plan
            }
            SqlError::NotGrouped(_)
            | SqlError::UnknownFunction(_)
            | SqlError::ArityMismatch { .. }
            | SqlError::Semantic(_) => ErrorKind::Semantic,
            SqlError::LimitRequired { .. } | SqlError::LimitExceeded { .. } => ErrorKind::Limit,
            SqlError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn semantic(message: impl Into<String>) -> Self {
        SqlError::Semantic(message.into())
    }
}

/// Adapter failures are relabeled so a table that vanished between planning
/// and reading reports the same shape as one that never existed.
impl From<StorageError> for SqlError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TableNotFound(table) => SqlError::TableNotFound(table),
            StorageError::IndexNotFound { table, index } => SqlError::IndexNotFound { table, index },
            StorageError::Backend(message) => SqlError::Storage(message),
        }
    }
}

impl serde::Serialize for SqlError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
