//! Composed models: the merged result of every contribution to one
//! logical model.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contribution::Mode;
use crate::error::{Error, Result};
use crate::field::{Field, FieldType, OnDelete};
use crate::method::{Invocation, MethodImpl, MethodTable};

/// Build state of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    /// Only the seeding contribution has been applied.
    Seeded,
    /// At least one extension has been applied.
    Augmented,
    /// Validated; no more contributions will be applied.
    Finalized,
    /// Visible to readers of the published registry.
    Published,
}

/// A finalized table constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    Unique {
        name: String,
        fields: Vec<String>,
    },
    Check {
        name: String,
        field: String,
        min: Option<f64>,
        max: Option<f64>,
    },
}

impl Constraint {
    pub fn name(&self) -> &str {
        match self {
            Self::Unique { name, .. } | Self::Check { name, .. } => name,
        }
    }

    /// Whether `value` satisfies a check constraint. Unique constraints
    /// are checked against the table, not a single value.
    pub fn check_value(&self, value: &Value) -> bool {
        match self {
            Self::Check { min, max, .. } => match value.as_f64() {
                Some(number) => {
                    min.is_none_or(|min| number >= min) && max.is_none_or(|max| number <= max)
                }
                None => true,
            },
            Self::Unique { .. } => true,
        }
    }
}

/// A foreign key derived from a stored many2one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub field: String,
    pub comodel: String,
    pub on_delete: OnDelete,
}

/// One entry of a model's linearized contribution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionRef {
    pub package: String,
    pub mode: Mode,
}

/// The merged definition of one logical model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposedModel {
    pub name: String,
    pub description: Option<String>,
    /// Table name; `None` for abstract models.
    pub table: Option<String>,
    pub order: String,
    pub is_abstract: bool,
    pub fields: IndexMap<String, Field>,
    /// Contributions, topmost first.
    pub mro: Vec<ContributionRef>,
    /// Method chains, topmost implementation first.
    pub methods: BTreeMap<String, Vec<MethodImpl>>,
    pub constraints: Vec<Constraint>,
    /// Abstract models whose fields and methods this one takes.
    #[serde(default)]
    pub mixins: Vec<String>,
    /// Parent model -> many2one field holding the parent record.
    pub delegates: IndexMap<String, String>,
    /// The model this one was renamed from, if any.
    pub renamed_from: Option<String>,
    pub state: ModelState,
}

/// Default table name: dots become underscores.
pub fn table_name(model: &str) -> String {
    model.replace('.', "_")
}

impl ComposedModel {
    pub(crate) fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            table: Some(table_name(name)),
            order: "id".to_string(),
            is_abstract: false,
            fields: IndexMap::new(),
            mro: Vec::new(),
            methods: BTreeMap::new(),
            constraints: Vec::new(),
            mixins: Vec::new(),
            delegates: IndexMap::new(),
            renamed_from: None,
            state: ModelState::Seeded,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Fields with a column on the table, in declaration order.
    pub fn stored_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values().filter(|f| f.is_stored())
    }

    /// Packages that contribute to this model, bottom first.
    pub fn packages(&self) -> Vec<&str> {
        let mut packages: Vec<&str> = Vec::new();
        for contribution in self.mro.iter().rev() {
            if !packages.contains(&contribution.package.as_str()) {
                packages.push(&contribution.package);
            }
        }
        packages
    }

    /// The package holding the seeding contribution.
    pub fn seeded_by(&self) -> Option<&str> {
        self.mro
            .iter()
            .find(|c| c.mode.seeds())
            .map(|c| c.package.as_str())
    }

    pub fn foreign_keys(&self) -> Vec<ForeignKey> {
        self.stored_fields()
            .filter_map(|field| match (&field.ty, field.on_delete()) {
                (FieldType::Many2one { comodel, .. }, Some(on_delete)) => Some(ForeignKey {
                    field: field.name.clone(),
                    comodel: comodel.clone(),
                    on_delete,
                }),
                _ => None,
            })
            .collect()
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Call `method` with `args`, starting at the topmost implementation.
    pub fn call(&self, method: &str, table: &MethodTable, args: Value) -> Result<Value> {
        let chain = self
            .methods
            .get(method)
            .ok_or_else(|| Error::UnknownMethod {
                model: self.name.clone(),
                method: method.to_string(),
            })?;
        Invocation::start(self, method, chain, table, args)
    }
}
