//! Lifecycle orchestration for the addon loader
//!
//! This crate ties the lower layers together:
//!
//! - **Loader**: install, upgrade, uninstall and verify runs, one store
//!   transaction per package
//! - **Hooks**: `pre_init`, `post_init`, `uninstall` and `post_load`,
//!   as Rust callables or `sh:` commands
//! - **Configuration**: layered resolution of [`LoaderConfig`]
//! - **Errors**: every failure classified into an [`ErrorKind`]
//!
//! # Architecture
//!
//! ```text
//!                      addon-cli
//!                          |
//!                      addon-core
//!                          |
//!      +---------+---------+---------+---------+
//!      |         |         |         |         |
//! addon-data addon-schema addon-model addon-packages addon-store
//!                          |
//!                       addon-fs
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod hooks;
pub mod loader;
pub mod report;

pub use cancel::CancelToken;
pub use config::{ConfigLayer, ConfigResolver, LoaderConfig};
pub use error::{Error, ErrorKind, Result};
pub use hooks::{HookEnv, HookPhase, HookRunner, HookTable};
pub use loader::{Loader, PackageStatus};
pub use report::{LoadReport, Operation, PackageFailure, VerifyReport};
