//! External identifiers: stable `(package, name)` handles on rows.
//!
//! Identifiers are interned: each distinct pair gets a [`Symbol`] once,
//! and lookups after that are a map hit on the symbol.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A `(package, name)` pair, written `package.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalId {
    pub package: String,
    pub name: String,
}

impl ExternalId {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
        }
    }

    /// Parse `reference`, qualifying a bare name with `package`.
    pub fn qualify(reference: &str, package: &str) -> Self {
        match reference.split_once('.') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {
                Self::new(owner, name)
            }
            _ => Self::new(package, reference),
        }
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.package, self.name)
    }
}

impl FromStr for ExternalId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((package, name)) if !package.is_empty() && !name.is_empty() => {
                Ok(Self::new(package, name))
            }
            _ => Err(format!("external id '{s}' is not of the form package.name")),
        }
    }
}

/// Interned handle of an [`ExternalId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

/// What an external id points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdRecord {
    pub model: String,
    pub res_id: i64,
    /// Re-applying data leaves the row alone.
    pub noupdate: bool,
}

#[derive(Serialize, Deserialize)]
struct Entry {
    package: String,
    name: String,
    #[serde(flatten)]
    record: ExternalIdRecord,
}

/// The external-id table.
#[derive(Debug, Clone, Default)]
pub struct ExternalIds {
    names: Vec<ExternalId>,
    symbols: HashMap<ExternalId, Symbol>,
    records: BTreeMap<Symbol, ExternalIdRecord>,
}

impl ExternalIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// The symbol of `id`, creating it on first sight.
    pub fn intern(&mut self, id: &ExternalId) -> Symbol {
        if let Some(symbol) = self.symbols.get(id) {
            return *symbol;
        }
        let symbol = Symbol(self.names.len() as u32);
        self.names.push(id.clone());
        self.symbols.insert(id.clone(), symbol);
        symbol
    }

    pub fn symbol(&self, id: &ExternalId) -> Option<Symbol> {
        self.symbols.get(id).copied()
    }

    pub fn name(&self, symbol: Symbol) -> Option<&ExternalId> {
        self.names.get(symbol.0 as usize)
    }

    pub fn get(&self, id: &ExternalId) -> Option<&ExternalIdRecord> {
        self.symbol(id).and_then(|s| self.records.get(&s))
    }

    pub fn get_symbol(&self, symbol: Symbol) -> Option<&ExternalIdRecord> {
        self.records.get(&symbol)
    }

    pub fn set(&mut self, id: &ExternalId, record: ExternalIdRecord) -> Symbol {
        let symbol = self.intern(id);
        self.records.insert(symbol, record);
        symbol
    }

    pub fn remove(&mut self, id: &ExternalId) -> Option<ExternalIdRecord> {
        let symbol = self.symbol(id)?;
        self.records.remove(&symbol)
    }

    /// Drop every id pointing at `(model, res_id)`.
    pub fn remove_record(&mut self, model: &str, res_id: i64) {
        self.records
            .retain(|_, r| !(r.model == model && r.res_id == res_id));
    }

    /// Ids owned by `package`, in name order.
    pub fn owned_by(&self, package: &str) -> Vec<(ExternalId, ExternalIdRecord)> {
        let mut owned: Vec<(ExternalId, ExternalIdRecord)> = self
            .records
            .iter()
            .filter_map(|(symbol, record)| {
                let id = self.name(*symbol)?;
                (id.package == package).then(|| (id.clone(), record.clone()))
            })
            .collect();
        owned.sort_by(|a, b| a.0.cmp(&b.0));
        owned
    }

    /// The ids pointing at `(model, res_id)`.
    pub fn ids_of(&self, model: &str, res_id: i64) -> Vec<&ExternalId> {
        self.records
            .iter()
            .filter(|(_, r)| r.model == model && r.res_id == res_id)
            .filter_map(|(symbol, _)| self.name(*symbol))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Serialize for ExternalIds {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut entries: Vec<Entry> = self
            .records
            .iter()
            .filter_map(|(symbol, record)| {
                let id = self.name(*symbol)?;
                Some(Entry {
                    package: id.package.clone(),
                    name: id.name.clone(),
                    record: record.clone(),
                })
            })
            .collect();
        entries.sort_by(|a, b| (&a.package, &a.name).cmp(&(&b.package, &b.name)));
        entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ExternalIds {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        let mut ids = Self::new();
        for entry in entries {
            ids.set(&ExternalId::new(entry.package, entry.name), entry.record);
        }
        Ok(ids)
    }
}
