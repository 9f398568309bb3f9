//! Error types for addon-store

use std::path::PathBuf;

/// Errors raised by the store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("table '{0}' does not exist")]
    UnknownTable(String),

    #[error("table '{0}' already exists")]
    TableExists(String),

    #[error("column '{table}.{column}' does not exist")]
    UnknownColumn { table: String, column: String },

    #[error("column '{table}.{column}' already exists")]
    ColumnExists { table: String, column: String },

    #[error("row {id} of table '{table}' does not exist")]
    RowNotFound { table: String, id: i64 },

    /// A value does not fit its column's type.
    #[error("value {value} does not fit column '{table}.{column}' of type {expected}")]
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        value: String,
    },

    #[error("null value in column '{table}.{column}' violates not-null constraint")]
    NotNullViolation { table: String, column: String },

    #[error("duplicate key in table '{table}' violates unique constraint '{constraint}'")]
    UniqueViolation { table: String, constraint: String },

    #[error("row in table '{table}' violates check constraint '{constraint}'")]
    CheckViolation { table: String, constraint: String },

    #[error("foreign key '{table}.{column}' violation: {detail}")]
    ForeignKeyViolation {
        table: String,
        column: String,
        detail: String,
    },

    #[error("a transaction is already open")]
    NestedTransaction,

    #[error("no transaction is open")]
    NoTransaction,

    #[error("unsupported database URL '{0}'")]
    UnsupportedUrl(String),

    /// The store document exists but cannot be decoded.
    #[error("corrupt store document {}: {message}", path.display())]
    Corrupt { path: PathBuf, message: String },

    #[error(transparent)]
    Fs(#[from] addon_fs::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
