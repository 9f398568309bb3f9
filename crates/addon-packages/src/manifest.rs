//! Manifest parsing for `__manifest__.toml` files.
//!
//! A manifest declares a package's metadata, dependencies, ordered data
//! and demo files, static asset bundles and lifecycle hooks. The package's
//! technical name is its directory name; `name` is the human-readable
//! title and the only required key.
//!
//! # Example TOML
//!
//! ```toml
//! name = "Sales"
//! version = "17.0.1.2"
//! depends = ["account", "product"]
//! data = ["security/access.toml", "data/sale_data.toml"]
//! demo = ["demo/sale_demo.toml"]
//! application = true
//! auto_install = false
//! license = "LGPL-3"
//! post_init_hook = "sale.post_init"
//!
//! [assets]
//! "web.assets_backend" = ["static/src/sale.js", ["remove", "web/static/old.js"]]
//!
//! [external_dependencies]
//! bin = ["wkhtmltopdf"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::version::PackageVersion;

/// `auto_install` is either a flag or the subset of dependencies that
/// triggers installation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AutoInstall {
    Flag(bool),
    Packages(Vec<String>),
}

impl Default for AutoInstall {
    fn default() -> Self {
        Self::Flag(false)
    }
}

impl AutoInstall {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Flag(false))
    }
}

/// One item of an asset bundle declaration: a path, or a directive such
/// as `["remove", "web/static/old.js"]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AssetEntry {
    Path(String),
    Directive(Vec<String>),
}

/// Requirements on the host outside of the package ecosystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExternalDependencies {
    /// Python modules that must be importable.
    #[serde(default)]
    pub python: Vec<String>,
    /// Executables that must be on `PATH`.
    #[serde(default)]
    pub bin: Vec<String>,
}

impl ExternalDependencies {
    pub fn is_empty(&self) -> bool {
        self.python.is_empty() && self.bin.is_empty()
    }
}

fn default_true() -> bool {
    true
}

fn default_sequence() -> i64 {
    100
}

/// Complete package manifest.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Manifest {
    /// Human-readable package title.
    pub name: String,
    #[serde(default)]
    pub version: PackageVersion,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default = "default_sequence")]
    pub sequence: i64,
    /// Technical names of the packages this one builds on.
    #[serde(default)]
    pub depends: Vec<String>,
    /// Packages that may not be installed alongside this one.
    #[serde(default)]
    pub excludes: Vec<String>,
    /// Data files, applied in order on install and upgrade.
    #[serde(default)]
    pub data: Vec<String>,
    /// Demo files, applied in order only in demo mode.
    #[serde(default)]
    pub demo: Vec<String>,
    /// Explicit ordered list of model files; defaults to `models/*`.
    #[serde(default)]
    pub models: Option<Vec<String>>,
    #[serde(default)]
    pub assets: BTreeMap<String, Vec<AssetEntry>>,
    #[serde(default)]
    pub application: bool,
    #[serde(default)]
    pub auto_install: AutoInstall,
    #[serde(default = "default_true")]
    pub installable: bool,
    #[serde(default)]
    pub pre_init_hook: Option<String>,
    #[serde(default)]
    pub post_init_hook: Option<String>,
    #[serde(default)]
    pub uninstall_hook: Option<String>,
    #[serde(default)]
    pub post_load: Option<String>,
    #[serde(default)]
    pub external_dependencies: ExternalDependencies,
    /// Keys this loader does not recognize, kept for introspection.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, toml::Value>,
}

impl Manifest {
    /// Parse the manifest of package `package` from TOML content.
    ///
    /// Unknown keys are logged as warnings, not rejected, so manifests
    /// written for newer loaders still parse.
    pub fn parse(package: &str, content: &str) -> Result<Self> {
        let table: toml::Table = content.parse().map_err(|e: toml::de::Error| {
            Error::MalformedManifest {
                package: package.to_string(),
                message: e.message().to_string(),
            }
        })?;

        if !table.contains_key("name") {
            return Err(Error::MissingRequiredKey {
                package: package.to_string(),
                key: "name",
            });
        }

        let manifest: Self =
            toml::Value::Table(table)
                .try_into()
                .map_err(|e: toml::de::Error| Error::MalformedManifest {
                    package: package.to_string(),
                    message: e.message().to_string(),
                })?;

        for key in manifest.unknown.keys() {
            tracing::warn!(package, key = key.as_str(), "unknown manifest key ignored");
        }

        manifest.validate(package)?;
        Ok(manifest)
    }

    /// Read and parse the manifest at `path` for package `package`.
    pub fn from_path(package: &str, path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ManifestNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(package, &content)
    }

    /// Serialize the manifest back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::InvalidManifest {
            package: self.name.clone(),
            reason: e.to_string(),
        })
    }

    /// Manifest of the implicit `base` package when none exists on disk.
    pub fn builtin_base() -> Self {
        Self {
            name: "Base".to_string(),
            version: PackageVersion::initial(),
            summary: Some("The kernel every package depends on".to_string()),
            description: None,
            author: None,
            website: None,
            category: Some("Hidden".to_string()),
            license: Some("LGPL-3".to_string()),
            sequence: 0,
            depends: Vec::new(),
            excludes: Vec::new(),
            data: Vec::new(),
            demo: Vec::new(),
            models: Some(Vec::new()),
            assets: BTreeMap::new(),
            application: false,
            auto_install: AutoInstall::Flag(false),
            installable: true,
            pre_init_hook: None,
            post_init_hook: None,
            uninstall_hook: None,
            post_load: None,
            external_dependencies: ExternalDependencies::default(),
            unknown: BTreeMap::new(),
        }
    }

    /// Names that trigger auto-installation, if enabled.
    pub fn auto_install_triggers(&self) -> Option<Vec<String>> {
        match &self.auto_install {
            AutoInstall::Flag(false) => None,
            AutoInstall::Flag(true) => Some(self.depends.clone()),
            AutoInstall::Packages(names) => Some(names.clone()),
        }
    }

    /// All declared hook names, with the phase each belongs to.
    pub fn hooks(&self) -> Vec<(&'static str, &str)> {
        [
            ("pre_init", self.pre_init_hook.as_deref()),
            ("post_init", self.post_init_hook.as_deref()),
            ("uninstall", self.uninstall_hook.as_deref()),
            ("post_load", self.post_load.as_deref()),
        ]
        .into_iter()
        .filter_map(|(phase, hook)| hook.map(|hook| (phase, hook)))
        .collect()
    }

    fn validate(&self, package: &str) -> Result<()> {
        validate_package_name(package)?;

        if self.name.trim().is_empty() {
            return Err(Error::InvalidManifest {
                package: package.to_string(),
                reason: "name must not be empty".to_string(),
            });
        }

        for dependency in &self.depends {
            validate_package_name(dependency)?;
        }

        if self.excludes.iter().any(|excluded| excluded == package) {
            return Err(Error::InvalidManifest {
                package: package.to_string(),
                reason: "a package cannot exclude itself".to_string(),
            });
        }

        if let AutoInstall::Packages(triggers) = &self.auto_install {
            for trigger in triggers {
                if !self.depends.contains(trigger) {
                    return Err(Error::InvalidAutoInstall {
                        package: package.to_string(),
                        trigger: trigger.clone(),
                    });
                }
            }
        }

        for path in self
            .data
            .iter()
            .chain(&self.demo)
            .chain(self.models.iter().flatten())
        {
            addon_fs::validate_relative(path)?;
        }

        for (phase, hook) in self.hooks() {
            if hook.trim().is_empty() {
                return Err(Error::InvalidManifest {
                    package: package.to_string(),
                    reason: format!("{phase} hook name is empty"),
                });
            }
        }

        Ok(())
    }
}

/// Technical package names are lowercase identifiers: `[a-z0-9_]+`.
pub fn validate_package_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName {
            name: name.to_string(),
            reason: "package name must not be empty".to_string(),
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(Error::InvalidName {
            name: name.to_string(),
            reason: "package name must contain only lowercase letters, digits, or underscores"
                .to_string(),
        });
    }
    Ok(())
}
