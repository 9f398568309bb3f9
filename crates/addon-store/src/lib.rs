//! Relational store for the addon loader.
//!
//! A small transactional table store: typed columns, not-null, unique,
//! check and foreign-key constraints with `on delete` actions, plus the
//! external-id table and per-package bookkeeping the loader relies on.
//! The whole state is one JSON document, saved atomically on commit.

pub mod database;
pub mod error;
pub mod external_id;
pub mod package;
pub mod table;

pub use database::{Database, Location, Savepoint};
pub use error::{Error, Result};
pub use external_id::{ExternalId, ExternalIdRecord, ExternalIds, Symbol};
pub use package::{PackageRecord, PackageState};
pub use table::{
    CheckConstraint, Column, ColumnType, ForeignKeyConstraint, ReferentialAction, Row, Table,
    UniqueConstraint,
};
