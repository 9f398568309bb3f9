//! Error types for addon-cli

use addon_core::ErrorKind;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that can occur in CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Error from addon-core
    #[error(transparent)]
    Core(#[from] addon_core::Error),

    /// A run stopped at a package; the report has already been printed
    #[error("{package}: {message}")]
    Run {
        package: String,
        kind: ErrorKind,
        message: String,
    },

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// User-facing error with a message
    #[error("{message}")]
    User { message: String },
}

impl CliError {
    /// Create a new user error with the given message
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }

    /// The failure class, when the error has one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Core(e) => Some(e.kind()),
            Self::Run { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Process exit code: the kind's code, 1 for anything unclassified.
    pub fn exit_code(&self) -> i32 {
        self.kind().map_or(1, ErrorKind::exit_code)
    }
}
