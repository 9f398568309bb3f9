//! Error types for addon-data

use std::path::PathBuf;

/// Errors raised while loading data.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("data file {} of package '{package}': {message}", path.display())]
    DataFile {
        package: String,
        path: PathBuf,
        message: String,
    },

    #[error("record '{record}': unknown model '{model}'")]
    UnknownModel { record: String, model: String },

    #[error("record '{record}': model '{model}' is abstract and has no rows")]
    AbstractModel { record: String, model: String },

    #[error("record '{record}': model '{model}' has no field '{field}'")]
    UnknownField {
        model: String,
        field: String,
        record: String,
    },

    #[error("record '{record}': field '{model}.{field}' cannot be written")]
    NotWritable {
        model: String,
        field: String,
        record: String,
    },

    #[error("record '{record}': unresolved reference '{reference}'")]
    UnresolvedReference { record: String, reference: String },

    #[error("record '{record}': value {value} does not fit field '{model}.{field}'")]
    TypeMismatch {
        model: String,
        field: String,
        record: String,
        value: String,
    },

    #[error("record '{record}': required field '{model}.{field}' is missing")]
    RequiredFieldMissing {
        model: String,
        field: String,
        record: String,
    },

    #[error("record '{record}': {message}")]
    ConstraintViolation { record: String, message: String },

    /// An external id already names a record of another model.
    #[error("external id '{record}' points to a '{existing}' record, not '{model}'")]
    ExternalIdConflict {
        record: String,
        model: String,
        existing: String,
    },

    #[error(transparent)]
    Model(#[from] addon_model::Error),

    #[error(transparent)]
    Store(#[from] addon_store::Error),

    #[error(transparent)]
    Package(#[from] addon_packages::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
