//! Installed-package bookkeeping.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a package in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageState {
    #[default]
    Uninstalled,
    ToInstall,
    Installed,
    ToUpgrade,
    ToRemove,
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninstalled => "uninstalled",
            Self::ToInstall => "to install",
            Self::Installed => "installed",
            Self::ToUpgrade => "to upgrade",
            Self::ToRemove => "to remove",
        })
    }
}

/// What the store remembers about one package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub state: PackageState,
    /// Installed version.
    pub version: Option<String>,
    /// Whether demo data was loaded.
    pub demo: bool,
    /// Models the package contributes to, and the models taking their
    /// fields through a mixin or a delegation.
    #[serde(default)]
    pub models: BTreeSet<String>,
    /// Tables the package created.
    #[serde(default)]
    pub tables: BTreeSet<String>,
    /// `(table, column)` pairs the package added to other tables.
    #[serde(default)]
    pub columns: BTreeSet<(String, String)>,
    /// Checksum of the package's data files at the last load.
    pub data_checksum: Option<String>,
    pub installed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PackageRecord {
    pub fn is_installed(&self) -> bool {
        matches!(self.state, PackageState::Installed | PackageState::ToUpgrade)
    }
}
