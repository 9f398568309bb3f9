//! Command context
//!
//! Resolves the loader configuration for a command: config files and
//! environment first, then the global flags on top.

use std::path::Path;

use addon_core::{ConfigLayer, ConfigResolver, Loader, LoaderConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::GlobalArgs;
use crate::error::Result;

/// What every command runs with.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: LoaderConfig,
    pub json: bool,
}

impl Context {
    /// Resolve the configuration for a command run from `root`.
    pub fn resolve(root: &Path, args: &GlobalArgs) -> Result<Self> {
        Self::from_resolver(&ConfigResolver::new(root), args)
    }

    pub fn from_resolver(resolver: &ConfigResolver, args: &GlobalArgs) -> Result<Self> {
        let mut config = resolver.resolve()?;
        config.apply(flag_layer(args));
        Ok(Self {
            config,
            json: args.json,
        })
    }

    /// Discover packages and open the store.
    pub fn open_loader(&self) -> Result<Loader> {
        Ok(Loader::open(self.config.clone())?)
    }
}

/// The layer set by command-line flags. Absent flags leave the lower
/// layers alone.
pub fn flag_layer(args: &GlobalArgs) -> ConfigLayer {
    ConfigLayer {
        addons_path: (!args.addons_path.is_empty()).then(|| args.addons_path.clone()),
        database_url: args.database.clone(),
        demo: args.demo.then_some(true),
        lang: None,
        log: args.verbose.then(|| "debug".to_string()),
    }
}

/// Install the fmt subscriber on stderr, filtered by `directives`.
pub fn init_tracing(directives: &str, verbose: bool) {
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();
}
