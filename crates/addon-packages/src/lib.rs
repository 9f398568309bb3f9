//! Package manifests, discovery and dependency ordering.
//!
//! This crate reads `__manifest__.toml` files, discovers packages along an
//! addons path, and orders them: load order, install/uninstall closures,
//! auto-install expansion and asset bundles.

pub mod assets;
pub mod discovery;
pub mod error;
pub mod external;
pub mod graph;
pub mod manifest;
pub mod version;

/// The canonical manifest filename at the root of every package directory.
pub const MANIFEST_FILENAME: &str = "__manifest__.toml";

/// The implicit package every other package depends on.
pub const BASE_PACKAGE: &str = "base";

pub use assets::{AssetBundles, AssetOp};
pub use discovery::{Package, PackageSet, discover};
pub use error::{Error, Result};
pub use graph::{DependencyGraph, InstallPlan};
pub use manifest::{AssetEntry, AutoInstall, ExternalDependencies, Manifest};
pub use version::PackageVersion;
