//! Filesystem primitives for the addon loader
//!
//! Package directories, data files and the store document all go through
//! this crate: confined relative paths, atomic locked writes, and
//! format-agnostic (TOML / JSON / YAML) document loading.

pub mod checksum;
pub mod document;
pub mod error;
pub mod io;
pub mod path;

pub use document::{DocumentStore, Format};
pub use error::{Error, Result};
pub use path::{NormalizedPath, validate_relative};
