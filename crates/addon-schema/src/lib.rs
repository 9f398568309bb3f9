//! Schema synchronization for the addon loader.
//!
//! Compares the tables composed models ask for with the tables in the
//! store and produces a [`SchemaDiff`]: an ordered list of additive
//! [`SchemaOp`]s that can be applied to the store or rendered as
//! PostgreSQL DDL.
//!
//! - Decimal columns widen automatically; narrowing needs a migration.
//! - Selection columns gain choices automatically; losing one needs a
//!   migration.
//! - Foreign keys are emitted after every table and column, so cyclic
//!   references between models resolve.
//! - Columns and tables are dropped only through [`Synchronizer::drops`].

pub mod diff;
pub mod error;
pub mod plan;
pub mod sql;

pub use diff::{SchemaDiff, SchemaOp, Synchronizer};
pub use error::{Error, Result};
pub use plan::{RelationSpec, TableSpec, column_type};
