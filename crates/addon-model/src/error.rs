//! Error types for addon-model

use std::path::PathBuf;

/// Errors raised while collecting contributions, composing models or
/// dispatching methods.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A model file could not be read or parsed.
    #[error("invalid model file {} in package '{package}': {message}", path.display())]
    ModelFile {
        package: String,
        path: PathBuf,
        message: String,
    },

    /// A contribution is ill-formed on its own.
    #[error("invalid contribution to '{model}' in package '{package}': {reason}")]
    InvalidContribution {
        package: String,
        model: String,
        reason: String,
    },

    /// Several contributions declare the same model as new.
    #[error("model '{model}' is declared new by several packages: {}", packages.join(", "))]
    DuplicateNewContribution { model: String, packages: Vec<String> },

    /// A package extends a model that nothing declares.
    #[error("package '{package}' extends unknown model '{model}'")]
    UnknownModel { model: String, package: String },

    /// A package extends a model seeded outside its dependency closure.
    #[error(
        "package '{package}' extends model '{model}' declared by '{seeded_by}', which it does not depend on"
    )]
    ExtendWithoutDependency {
        model: String,
        package: String,
        seeded_by: String,
    },

    /// A contribution changes the semantic type of an existing field.
    #[error(
        "package '{package}' changes the type of field '{model}.{field}' from {existing} to {declared}"
    )]
    FieldTypeConflict {
        model: String,
        field: String,
        package: String,
        existing: String,
        declared: String,
    },

    /// A contribution overrides or removes a field that does not exist.
    #[error("package '{package}' overrides unknown field '{model}.{field}'")]
    UnknownField {
        model: String,
        field: String,
        package: String,
    },

    /// A derived field depends on a path that does not resolve.
    #[error("derived field '{model}.{field}' depends on unresolved path '{path}'")]
    UnresolvedDependency {
        model: String,
        field: String,
        path: String,
    },

    /// A relational field points at a model that does not exist.
    #[error("field '{model}.{field}' refers to unknown model '{comodel}'")]
    UnknownComodel {
        model: String,
        field: String,
        comodel: String,
    },

    /// A mixin is not an abstract model.
    #[error("model '{model}' uses '{mixin}' as a mixin, but it is not abstract")]
    InvalidMixin { model: String, mixin: String },

    /// Models inherit from each other through mixins, renames or
    /// delegation.
    #[error("model inheritance cycle: {}", chain.join(" -> "))]
    InheritanceCycle { chain: Vec<String> },

    /// A constraint or relational option cannot hold.
    #[error("invalid constraint '{name}' on model '{model}': {reason}")]
    InvalidConstraint {
        model: String,
        name: String,
        reason: String,
    },

    /// The model has no method of that name.
    #[error("model '{model}' has no method '{method}'")]
    UnknownMethod { model: String, method: String },

    /// The implementation symbol is missing from the method table.
    #[error("method '{model}.{method}' is implemented by '{symbol}', which is not registered")]
    MethodNotFound {
        model: String,
        method: String,
        symbol: String,
    },

    /// `super` was called from the bottom of a method chain.
    #[error("method '{model}.{method}' has no super implementation")]
    NoSuperMethod { model: String, method: String },

    /// A method implementation reported a failure.
    #[error("method '{model}.{method}' failed: {message}")]
    MethodFailed {
        model: String,
        method: String,
        message: String,
    },

    /// Model lookup on a registry failed.
    #[error("model '{0}' is not in the registry")]
    ModelNotFound(String),

    /// Package-level failure while locating model files.
    #[error(transparent)]
    Package(#[from] addon_packages::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
