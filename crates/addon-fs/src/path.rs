//! Normalized path handling for package-relative files

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// A path normalized to use forward slashes internally.
///
/// Manifests name their data, demo and model files with forward slashes
/// regardless of platform; conversion to a native path happens only at
/// I/O boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedPath {
    inner: String,
}

impl NormalizedPath {
    /// Create a new NormalizedPath from any path-like input.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let normalized = path.as_ref().to_string_lossy().replace('\\', "/");
        Self { inner: normalized }
    }

    /// Get the internal normalized string representation.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Convert to a platform-native PathBuf for I/O operations.
    pub fn to_native(&self) -> PathBuf {
        PathBuf::from(&self.inner)
    }

    /// Get the file name component.
    pub fn file_name(&self) -> Option<&str> {
        self.inner
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
    }

    /// Get the extension if present.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name()?;
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }
}

/// Validate a path declared inside a package (data file, model file, asset).
///
/// The path must be relative and must not contain `..` components, so a
/// package can never reference files outside its own directory.
pub fn validate_relative(relative: &str) -> Result<&str> {
    let normalized = relative.replace('\\', "/");
    if normalized.is_empty() {
        return Err(Error::PathEscape {
            path: relative.to_string(),
            reason: "empty path",
        });
    }
    if normalized.starts_with('/') || Path::new(relative).has_root() {
        return Err(Error::PathEscape {
            path: relative.to_string(),
            reason: "absolute path",
        });
    }
    if normalized.split('/').any(|part| part == "..") {
        return Err(Error::PathEscape {
            path: relative.to_string(),
            reason: "parent directory component",
        });
    }
    Ok(relative)
}

impl AsRef<Path> for NormalizedPath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.inner)
    }
}

impl std::fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backslashes_are_normalized() {
        let path = NormalizedPath::new("sale\\data\\sale_data.toml");
        assert_eq!(path.as_str(), "sale/data/sale_data.toml");
        assert_eq!(path.extension(), Some("toml"));
        assert_eq!(path.file_name(), Some("sale_data.toml"));
    }

    #[test]
    fn dotfiles_have_no_extension() {
        assert_eq!(NormalizedPath::new("pkg/.hidden").extension(), None);
    }

    #[test]
    fn relative_paths_must_stay_inside_the_package() {
        assert_eq!(validate_relative("data/a.toml").unwrap(), "data/a.toml");
        assert!(validate_relative("../account/data.toml").is_err());
        assert!(validate_relative("data\\..\\..\\x.toml").is_err());
        assert!(validate_relative("/etc/passwd").is_err());
        assert!(validate_relative("").is_err());
    }
}
