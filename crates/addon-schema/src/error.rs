//! Error types for addon-schema

/// Errors raised while diffing or applying a schema.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `NOT NULL` cannot be added: rows hold nulls and no default exists.
    #[error("column '{table}.{column}' has null values and no default to back-fill")]
    NullValuesPresent { table: String, column: String },

    /// The change would lose data and needs an explicit migration.
    #[error("column '{table}.{column}' needs a migration: {reason}")]
    MigrationRequired {
        table: String,
        column: String,
        reason: String,
    },

    /// A field default that does not fit its column.
    #[error("default {value} does not fit column '{table}.{column}'")]
    InvalidDefault {
        table: String,
        column: String,
        value: String,
    },

    #[error(transparent)]
    Store(#[from] addon_store::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
