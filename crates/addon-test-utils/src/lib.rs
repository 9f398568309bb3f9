//! Shared test utilities for the addon loader workspace.
//!
//! Dev-dependency only, never published. It depends on no other workspace
//! crate so every crate can use it from its tests.
//!
//! # Modules
//!
//! - [`addons`]: [`TestAddons`](addons::TestAddons), a temporary addons
//!   path with package-writing helpers

pub mod addons;

pub use addons::TestAddons;
