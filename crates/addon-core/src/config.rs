//! Loader configuration with layered resolution
//!
//! `LoaderConfig` is resolved from, later sources winning:
//! 1. Built-in defaults
//! 2. User config (`<config_dir>/addon-loader/config.toml`)
//! 3. Project config (`addon-loader.toml` in the working directory)
//! 4. Environment (`ADDON_PATH`, `ADDON_DATABASE_URL`, `ADDON_DEMO`,
//!    `ADDON_LANG`, `ADDON_LOG`)
//! 5. Command-line flags, applied by the caller with [`LoaderConfig::apply`]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// File name of the project config layer.
pub const PROJECT_CONFIG: &str = "addon-loader.toml";

const APP_DIR: &str = "addon-loader";

/// The effective loader configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Directories searched for packages, first match wins.
    pub addons_path: Vec<PathBuf>,
    /// Store location: `memory:`, `file://<path>` or a bare path.
    pub database_url: String,
    /// Load demo data on install.
    pub demo: bool,
    /// Language plain translatable strings are stored under.
    pub lang: String,
    /// Default log filter.
    pub log: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            addons_path: vec![PathBuf::from("addons")],
            database_url: "addon-db.json".to_string(),
            demo: false,
            lang: "en_US".to_string(),
            log: "info".to_string(),
        }
    }
}

/// One configuration layer; every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub addons_path: Option<Vec<PathBuf>>,
    pub database_url: Option<String>,
    pub demo: Option<bool>,
    pub lang: Option<String>,
    pub log: Option<String>,
}

impl ConfigLayer {
    /// Parse a layer file. Relative `addons_path` entries are taken
    /// relative to the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut layer: Self = toml::from_str(&content).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if let (Some(dirs), Some(base)) = (layer.addons_path.as_mut(), path.parent()) {
            for dir in dirs.iter_mut().filter(|d| d.is_relative()) {
                *dir = base.join(&*dir);
            }
        }
        Ok(layer)
    }

    /// The layer described by environment variables.
    pub fn from_env(vars: &HashMap<String, String>) -> Self {
        let value = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            addons_path: value("ADDON_PATH").map(|p| std::env::split_paths(&p).collect()),
            database_url: value("ADDON_DATABASE_URL"),
            demo: value("ADDON_DEMO").map(|v| parse_flag(&v)),
            lang: value("ADDON_LANG"),
            log: value("ADDON_LOG"),
        }
    }
}

/// `1`, `true` and `yes` (any case) enable a flag.
pub fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

impl LoaderConfig {
    /// Overlay `layer` on top of this configuration.
    pub fn apply(&mut self, layer: ConfigLayer) {
        if let Some(addons_path) = layer.addons_path {
            self.addons_path = addons_path;
        }
        if let Some(database_url) = layer.database_url {
            self.database_url = database_url;
        }
        if let Some(demo) = layer.demo {
            self.demo = demo;
        }
        if let Some(lang) = layer.lang {
            self.lang = lang;
        }
        if let Some(log) = layer.log {
            self.log = log;
        }
    }
}

/// Resolves [`LoaderConfig`] from files and environment.
pub struct ConfigResolver {
    /// Directory holding the project config layer
    root: PathBuf,
    /// Override for the user config directory (used for testing)
    user_config_dir_override: Option<PathBuf>,
    /// Override for the process environment (used for testing)
    env_override: Option<HashMap<String, String>>,
}

impl ConfigResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            user_config_dir_override: None,
            env_override: None,
        }
    }

    /// Use `dir` instead of the platform config directory.
    pub fn with_user_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_config_dir_override = Some(dir.into());
        self
    }

    /// Use `vars` instead of the process environment.
    pub fn with_env(mut self, vars: HashMap<String, String>) -> Self {
        self.env_override = Some(vars);
        self
    }

    fn user_config_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.user_config_dir_override {
            return Some(dir.clone());
        }
        dirs::config_dir().map(|d| d.join(APP_DIR))
    }

    /// Resolve every layer. Missing files are skipped; invalid ones fail.
    pub fn resolve(&self) -> Result<LoaderConfig> {
        let mut config = LoaderConfig::default();

        if let Some(dir) = self.user_config_dir() {
            let path = dir.join("config.toml");
            if path.is_file() {
                tracing::debug!(?path, "loading user config");
                config.apply(ConfigLayer::load(&path)?);
            }
        }

        let project = self.root.join(PROJECT_CONFIG);
        if project.is_file() {
            tracing::debug!(path = ?project, "loading project config");
            config.apply(ConfigLayer::load(&project)?);
        }

        let env = match &self.env_override {
            Some(vars) => ConfigLayer::from_env(vars),
            None => ConfigLayer::from_env(&std::env::vars().collect()),
        };
        config.apply(env);

        Ok(config)
    }
}
