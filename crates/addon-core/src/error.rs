//! Error types for addon-core

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Result type for addon-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad class of a failure, deciding how far it propagates and which
/// exit code the CLI reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed manifest, missing key, unknown dependency.
    Validation,
    /// Dependency cycle, conflicting `new` contributions, bad auto-install.
    Topology,
    /// Registry composition failed.
    Composition,
    /// DDL failure or constraint violation during schema sync.
    Schema,
    /// Data file could not be applied.
    Data,
    /// A lifecycle hook failed.
    Hook,
}

impl ErrorKind {
    /// Process exit code for this kind.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Validation | Self::Composition => 1,
            Self::Topology => 2,
            Self::Schema | Self::Data => 3,
            Self::Hook => 4,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Validation => "validation",
            Self::Topology => "topology",
            Self::Composition => "composition",
            Self::Schema => "schema",
            Self::Data => "data",
            Self::Hook => "hook",
        })
    }
}

/// Errors that can occur while loading packages
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration file
    #[error("invalid configuration {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    /// The operation needs an installed package
    #[error("package '{0}' is not installed")]
    NotInstalled(String),

    /// `base` is required by every other package
    #[error("package 'base' cannot be uninstalled")]
    BaseRequired,

    /// Schema sync of one package failed
    #[error("schema sync of package '{package}' failed: {source}")]
    Schema {
        package: String,
        #[source]
        source: addon_schema::Error,
    },

    /// Data loading of one package failed
    #[error("data of package '{package}' failed to load: {source}")]
    Data {
        package: String,
        #[source]
        source: addon_data::Error,
    },

    /// A hook exited non-zero or returned an error
    #[error("{phase} hook '{hook}' of package '{package}' failed: {message}")]
    HookFailed {
        package: String,
        phase: String,
        hook: String,
        message: String,
    },

    /// A hook name that is neither `sh:` nor registered
    #[error("{phase} hook '{hook}' of package '{package}' is not registered")]
    UnknownHook {
        package: String,
        phase: String,
        hook: String,
    },

    /// The run was cancelled between packages
    #[error("load cancelled")]
    Cancelled,

    // Transparent wrappers for underlying crate errors
    #[error(transparent)]
    Package(#[from] addon_packages::Error),

    #[error(transparent)]
    Model(#[from] addon_model::Error),

    #[error(transparent)]
    Store(#[from] addon_store::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } | Self::NotInstalled(_) | Self::BaseRequired | Self::Io(_) => {
                ErrorKind::Validation
            }
            Self::Cancelled => ErrorKind::Validation,
            Self::Schema { .. } | Self::Store(_) => ErrorKind::Schema,
            Self::Data { .. } => ErrorKind::Data,
            Self::HookFailed { .. } | Self::UnknownHook { .. } => ErrorKind::Hook,
            Self::Package(e) => package_kind(e),
            Self::Model(e) => model_kind(e),
        }
    }

    /// Package(s) the failure is attributed to, when known.
    pub fn package(&self) -> Option<&str> {
        match self {
            Self::NotInstalled(package) => Some(package),
            Self::Schema { package, .. }
            | Self::Data { package, .. }
            | Self::HookFailed { package, .. }
            | Self::UnknownHook { package, .. } => Some(package),
            _ => None,
        }
    }
}

fn package_kind(error: &addon_packages::Error) -> ErrorKind {
    use addon_packages::Error as E;
    match error {
        E::DependencyCycle { .. } | E::InvalidAutoInstall { .. } => ErrorKind::Topology,
        _ => ErrorKind::Validation,
    }
}

fn model_kind(error: &addon_model::Error) -> ErrorKind {
    use addon_model::Error as E;
    match error {
        E::DuplicateNewContribution { .. } => ErrorKind::Topology,
        E::ModelFile { .. } => ErrorKind::Validation,
        E::Package(e) => package_kind(e),
        _ => ErrorKind::Composition,
    }
}
