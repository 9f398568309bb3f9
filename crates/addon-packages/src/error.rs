use std::path::PathBuf;

/// Errors raised while reading manifests or ordering packages.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The manifest file is not valid TOML or has ill-typed values.
    #[error("malformed manifest for package '{package}': {message}")]
    MalformedManifest { package: String, message: String },

    /// A required manifest key is absent.
    #[error("manifest for package '{package}' is missing required key '{key}'")]
    MissingRequiredKey { package: String, key: &'static str },

    /// Manifest file not found at the expected path.
    #[error("manifest not found: {0}")]
    ManifestNotFound(PathBuf),

    /// Invalid technical package name.
    #[error("invalid package name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Unparsable version string.
    #[error("invalid version '{version}' for package '{package}'")]
    InvalidVersion { package: String, version: String },

    /// Manifest parsed but is semantically invalid.
    #[error("invalid manifest for package '{package}': {reason}")]
    InvalidManifest { package: String, reason: String },

    /// A package depends on a package that was not discovered.
    #[error("package '{package}' depends on unknown package '{dependency}'")]
    UnknownDependency { package: String, dependency: String },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle: {}", chain.join(" -> "))]
    DependencyCycle { chain: Vec<String> },

    /// An `auto_install` list names a package outside of `depends`.
    #[error("package '{package}' auto-installs on '{trigger}', which is not one of its dependencies")]
    InvalidAutoInstall { package: String, trigger: String },

    /// A package was requested by name but is not known.
    #[error("unknown package: {0}")]
    UnknownPackage(String),

    /// The package is marked `installable = false`.
    #[error("package '{0}' is not installable")]
    NotInstallable(String),

    /// Two packages scheduled together exclude each other.
    #[error("packages '{package}' and '{excluded}' are incompatible")]
    Excluded { package: String, excluded: String },

    /// An external dependency is not available on this host.
    #[error("package '{package}' requires {kind} dependency '{name}', which is not available")]
    ExternalDependency {
        package: String,
        kind: &'static str,
        name: String,
    },

    /// An asset declaration is invalid.
    #[error("invalid asset declaration in package '{package}' for bundle '{bundle}': {reason}")]
    InvalidAsset {
        package: String,
        bundle: String,
        reason: String,
    },

    /// Bundles include each other.
    #[error("asset bundle include cycle: {}", chain.join(" -> "))]
    AssetCycle { chain: Vec<String> },

    /// Filesystem error from addon-fs.
    #[error(transparent)]
    Fs(#[from] addon_fs::Error),

    /// I/O error while scanning addons paths.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
