//! Dotted numeric package versions.
//!
//! Package versions look like `17.0.1.2.0` or `1.0`. They are compared
//! component-wise, with missing trailing components treated as zero, so
//! `1.0` and `1.0.0` are equal.
//!
//! ```
//! use addon_packages::PackageVersion;
//!
//! let installed: PackageVersion = "17.0.1.0".parse().unwrap();
//! let on_disk: PackageVersion = "17.0.1.1".parse().unwrap();
//! assert!(on_disk > installed);
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A parsed package version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageVersion {
    parts: Vec<u64>,
}

/// Reason a version string failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVersionError(pub String);

impl fmt::Display for ParseVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid version '{}'", self.0)
    }
}

impl std::error::Error for ParseVersionError {}

impl PackageVersion {
    /// The version assumed when a manifest omits `version`.
    pub fn initial() -> Self {
        Self { parts: vec![1, 0] }
    }

    pub fn parts(&self) -> &[u64] {
        &self.parts
    }

    fn trimmed(&self) -> &[u64] {
        let len = self
            .parts
            .iter()
            .rposition(|&part| part != 0)
            .map_or(0, |idx| idx + 1);
        &self.parts[..len]
    }
}

impl Default for PackageVersion {
    fn default() -> Self {
        Self::initial()
    }
}

impl FromStr for PackageVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseVersionError(s.to_string()));
        }
        let parts = trimmed
            .split('.')
            .map(|part| part.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ParseVersionError(s.to_string()))?;
        Ok(Self { parts })
    }
}

impl TryFrom<String> for PackageVersion {
    type Error = ParseVersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PackageVersion> for String {
    fn from(version: PackageVersion) -> Self {
        version.to_string()
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.parts.iter().map(u64::to_string).collect();
        f.write_str(&rendered.join("."))
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.trimmed() == other.trimmed()
    }
}

impl Eq for PackageVersion {}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for idx in 0..len {
            let left = self.parts.get(idx).copied().unwrap_or(0);
            let right = other.parts.get(idx).copied().unwrap_or(0);
            match left.cmp(&right) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn v(s: &str) -> PackageVersion {
        s.parse().unwrap()
    }

    #[test]
    fn trailing_zeros_are_insignificant() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("17.0"), v("17"));
    }

    #[test]
    fn ordering_is_numeric_not_lexical() {
        assert!(v("17.0.10") > v("17.0.9"));
        assert!(v("2.0") > v("1.99.99"));
    }

    #[test]
    fn display_keeps_declared_form() {
        assert_eq!(v("17.0.1.2.0").to_string(), "17.0.1.2.0");
    }

    #[rstest]
    #[case("1.0-beta")]
    #[case("")]
    #[case("1..0")]
    fn rejects_non_numeric(#[case] input: &str) {
        assert!(input.parse::<PackageVersion>().is_err());
    }
}
