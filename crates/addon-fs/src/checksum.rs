//! SHA-256 checksum utilities
//!
//! Checksums use the canonical `sha256:<hex>` form. Packages record the
//! checksum of their data files so an upgrade can tell whether anything
//! changed on disk.

use sha2::{Digest, Sha256};

use crate::{Error, NormalizedPath, Result};

const PREFIX: &str = "sha256:";

/// Compute the checksum of string content.
pub fn content_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{}{:x}", PREFIX, hasher.finalize())
}

/// Compute one checksum over several files, in the given order.
///
/// Each file contributes its path and its bytes, so renaming a file
/// changes the checksum just like editing it does.
pub fn files_checksum(paths: &[NormalizedPath]) -> Result<String> {
    let mut hasher = Sha256::new();
    for path in paths {
        let bytes = std::fs::read(path.to_native()).map_err(|e| Error::io(path.to_native(), e))?;
        hasher.update(path.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(&bytes);
    }
    Ok(format!("{}{:x}", PREFIX, hasher.finalize()))
}
