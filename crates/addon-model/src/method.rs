//! Method dispatch.
//!
//! A composed model keeps, per method name, the chain of implementations
//! contributed by its packages, topmost first. Implementations are Rust
//! closures registered in a [`MethodTable`] under the symbol a model file
//! names. Calling a method runs the topmost implementation; it can call
//! [`Invocation::call_super`] to run the next one down.
//!
//! ```
//! use addon_model::MethodTable;
//! use serde_json::json;
//!
//! let mut table = MethodTable::new();
//! table.register("a.name_get", |_inv, args| Ok(json!(format!("{}", args["name"]))));
//! table.register("b.name_get", |inv, args| {
//!     let base = inv.call_super(args)?;
//!     Ok(json!(format!("[{}]", base.as_str().unwrap_or_default())))
//! });
//! assert!(table.contains("b.name_get"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::ComposedModel;

/// One link of a method chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodImpl {
    pub package: String,
    pub symbol: String,
}

/// Signature of a method implementation.
pub type MethodFn = Arc<dyn Fn(&mut Invocation<'_>, Value) -> Result<Value> + Send + Sync>;

/// Implementations by symbol.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: HashMap<String, MethodFn>,
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut symbols: Vec<&String> = self.methods.keys().collect();
        symbols.sort();
        f.debug_struct("MethodTable").field("symbols", &symbols).finish()
    }
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `implementation` under `symbol`, replacing any previous one.
    pub fn register<F>(&mut self, symbol: impl Into<String>, implementation: F)
    where
        F: Fn(&mut Invocation<'_>, Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods.insert(symbol.into(), Arc::new(implementation));
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.methods.contains_key(symbol)
    }

    pub fn get(&self, symbol: &str) -> Option<&MethodFn> {
        self.methods.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// The context of one implementation running within a method chain.
pub struct Invocation<'a> {
    model: &'a ComposedModel,
    method: &'a str,
    chain: &'a [MethodImpl],
    level: usize,
    table: &'a MethodTable,
}

impl<'a> Invocation<'a> {
    pub(crate) fn start(
        model: &'a ComposedModel,
        method: &'a str,
        chain: &'a [MethodImpl],
        table: &'a MethodTable,
        args: Value,
    ) -> Result<Value> {
        let mut invocation = Self {
            model,
            method,
            chain,
            level: 0,
            table,
        };
        invocation.run(args)
    }

    fn run(&mut self, args: Value) -> Result<Value> {
        let Some(link) = self.chain.get(self.level) else {
            return Err(Error::NoSuperMethod {
                model: self.model.name.clone(),
                method: self.method.to_string(),
            });
        };
        let implementation = self
            .table
            .get(&link.symbol)
            .ok_or_else(|| Error::MethodNotFound {
                model: self.model.name.clone(),
                method: self.method.to_string(),
                symbol: link.symbol.clone(),
            })?
            .clone();
        implementation(self, args)
    }

    /// Run the next implementation down the chain.
    pub fn call_super(&mut self, args: Value) -> Result<Value> {
        let mut next = Invocation {
            model: self.model,
            method: self.method,
            chain: self.chain,
            level: self.level + 1,
            table: self.table,
        };
        next.run(args)
    }

    /// Whether a `super` implementation exists.
    pub fn has_super(&self) -> bool {
        self.level + 1 < self.chain.len()
    }

    pub fn model(&self) -> &ComposedModel {
        self.model
    }

    pub fn method(&self) -> &str {
        self.method
    }

    /// The package whose implementation is running.
    pub fn package(&self) -> &str {
        self.chain
            .get(self.level)
            .map_or("", |link| link.package.as_str())
    }

    /// Build a `MethodFailed` error for the running method.
    pub fn fail(&self, message: impl Into<String>) -> Error {
        Error::MethodFailed {
            model: self.model.name.clone(),
            method: self.method.to_string(),
            message: message.into(),
        }
    }
}
