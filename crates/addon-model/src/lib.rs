//! Model composition for the addon loader.
//!
//! Packages contribute to logical models through model files. This crate
//! collects those contributions, composes them into one
//! [`ComposedModel`] per logical model, and publishes the resulting
//! [`Registry`] through a lock-free [`RegistryHandle`].
//!
//! # Modules
//!
//! - [`contribution`]: model-file format and the contribution collector
//! - [`field`]: field specs, merged fields and storage plans
//! - [`builder`]: linearization, merging and validation
//! - [`method`]: method tables and `super` dispatch
//! - [`registry`] / [`handle`]: the composed registry and its publication

pub mod base;
pub mod builder;
pub mod contribution;
pub mod error;
pub mod field;
pub mod handle;
pub mod method;
pub mod model;
pub mod registry;

pub use builder::RegistryBuilder;
pub use contribution::{Collector, Contribution, ContributionSet, ContributionSpec, Mode};
pub use error::{Error, Result};
pub use field::{Compute, Field, FieldSpec, FieldType, OnDelete, Storage, TypeKind};
pub use handle::{RegistryHandle, WriterGuard};
pub use method::{Invocation, MethodImpl, MethodTable};
pub use model::{ComposedModel, Constraint, ForeignKey, ModelState};
pub use registry::{Registry, Trigger};

use addon_packages::{DependencyGraph, PackageSet};

/// Collect the contributions of `packages` (in load order) and build
/// their registry.
pub fn build_registry(set: &PackageSet, packages: &[String]) -> Result<Registry> {
    let collector = Collector::new();
    let mut contributions = ContributionSet::new();
    for name in packages {
        let package = set.require(name)?;
        contributions.insert(name, collector.collect(package)?);
    }
    let graph = DependencyGraph::from_packages(set);
    RegistryBuilder::new(&contributions, &graph, packages)?.build()
}
