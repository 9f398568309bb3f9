//! Package discovery along an ordered addons path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::manifest::{Manifest, validate_package_name};
use crate::{BASE_PACKAGE, MANIFEST_FILENAME};

const MODEL_DIR: &str = "models";
const MODEL_EXTENSIONS: &[&str] = &["toml", "json", "yaml", "yml"];

/// A discovered package: a directory with a manifest.
#[derive(Debug, Clone)]
pub struct Package {
    /// Technical name (the directory name).
    pub name: String,
    /// Package root, `None` for the built-in `base` package.
    pub root: Option<PathBuf>,
    pub manifest: Manifest,
}

impl Package {
    /// Load the package rooted at `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidName {
                name: dir.display().to_string(),
                reason: "directory name is not valid UTF-8".to_string(),
            })?
            .to_string();
        validate_package_name(&name)?;
        let manifest = Manifest::from_path(&name, &dir.join(MANIFEST_FILENAME))?;
        Ok(Self {
            name,
            root: Some(dir.to_path_buf()),
            manifest,
        })
    }

    /// The implicit `base` package used when none exists on disk.
    pub fn builtin_base() -> Self {
        Self {
            name: BASE_PACKAGE.to_string(),
            root: None,
            manifest: Manifest::builtin_base(),
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.root.is_none()
    }

    /// Declared dependencies plus the implicit dependency on `base`.
    pub fn depends(&self) -> Vec<String> {
        let mut depends = self.manifest.depends.clone();
        if self.name != BASE_PACKAGE && !depends.iter().any(|d| d == BASE_PACKAGE) {
            depends.insert(0, BASE_PACKAGE.to_string());
        }
        depends
    }

    /// Resolve a manifest-relative path inside the package.
    pub fn file(&self, relative: &str) -> Result<PathBuf> {
        let relative = addon_fs::validate_relative(relative)?;
        match &self.root {
            Some(root) => Ok(root.join(relative)),
            None => Err(Error::InvalidManifest {
                package: self.name.clone(),
                reason: format!("built-in package has no file '{relative}'"),
            }),
        }
    }

    /// Model files in application order.
    ///
    /// An explicit `models` list wins; otherwise every supported document
    /// under `models/` is used, sorted by file name.
    pub fn model_files(&self) -> Result<Vec<PathBuf>> {
        if let Some(models) = &self.manifest.models {
            return models.iter().map(|m| self.file(m)).collect();
        }
        let Some(root) = &self.root else {
            return Ok(Vec::new());
        };
        let dir = root.join(MODEL_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let supported = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| MODEL_EXTENSIONS.contains(&e));
            if path.is_file() && supported {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Translation files under `i18n/`, keyed by language code.
    pub fn translation_files(&self) -> Result<BTreeMap<String, PathBuf>> {
        let mut files = BTreeMap::new();
        let Some(root) = &self.root else {
            return Ok(files);
        };
        let dir = root.join("i18n");
        if !dir.is_dir() {
            return Ok(files);
        }
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            if let Some(lang) = path.file_stem().and_then(|s| s.to_str()) {
                files.insert(lang.to_string(), path.clone());
            }
        }
        Ok(files)
    }
}

/// Catalog of every package known to the loader, keyed by technical name.
#[derive(Debug, Clone, Default)]
pub struct PackageSet {
    packages: BTreeMap<String, Package>,
}

impl PackageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package. Returns `false` and leaves the set untouched when a
    /// package of that name is already present.
    pub fn insert(&mut self, package: Package) -> bool {
        if self.packages.contains_key(&package.name) {
            return false;
        }
        self.packages.insert(package.name.clone(), package);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    /// Look up a package, failing with `UnknownPackage`.
    pub fn require(&self, name: &str) -> Result<&Package> {
        self.get(name)
            .ok_or_else(|| Error::UnknownPackage(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Package names in alphabetical order.
    pub fn names(&self) -> Vec<&str> {
        self.packages.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Make sure the `base` package exists.
    pub fn ensure_base(&mut self) {
        if !self.contains(BASE_PACKAGE) {
            self.insert(Package::builtin_base());
        }
    }
}

/// Discover packages in each addons path, in order.
///
/// Each immediate subdirectory holding a `__manifest__.toml` is a package.
/// When a name appears in several paths the first one wins. The built-in
/// `base` package is added if no path provides one.
pub fn discover(addons_path: &[PathBuf]) -> Result<PackageSet> {
    let mut set = PackageSet::new();

    for root in addons_path {
        if !root.is_dir() {
            tracing::warn!(path = %root.display(), "addons path entry is not a directory");
            continue;
        }

        let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir() && path.join(MANIFEST_FILENAME).is_file())
            .collect();
        dirs.sort();

        for dir in dirs {
            let package = Package::load(&dir)?;
            let name = package.name.clone();
            if !set.insert(package) {
                tracing::warn!(
                    package = name.as_str(),
                    path = %dir.display(),
                    "package shadowed by an earlier addons path entry"
                );
                continue;
            }
            tracing::debug!(package = name.as_str(), path = %dir.display(), "discovered package");
        }
    }

    set.ensure_base();
    Ok(set)
}
