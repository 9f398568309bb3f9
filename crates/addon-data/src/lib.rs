//! Declarative data for the addon loader.
//!
//! Packages ship records as data files. [`DataLoader`] applies them to
//! the store under external ids, so that re-applying a file updates the
//! records it created instead of duplicating them, and keeps stored
//! computed fields current through [`Recomputer`].

pub mod compute;
pub mod error;
pub mod file;
pub mod i18n;
pub mod loader;

pub use compute::Recomputer;
pub use error::{Error, Result};
pub use file::{AccessSpec, DataFile, DeleteSpec, RecordSpec, ValueSpec};
pub use i18n::{Term, TranslationFile};
pub use loader::{DataLoader, LoadStats, remove_package_records, remove_record, remove_records};
