//! The composed registry: every model of an installed package set.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::field::Field;
use crate::model::{ComposedModel, ModelState};

/// A stored computed field to recompute when a field it reads changes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Trigger {
    pub model: String,
    pub field: String,
}

/// An immutable set of composed models.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    models: BTreeMap<String, ComposedModel>,
    /// Packages the registry was built from, in load order.
    packages: Vec<String>,
    /// model -> field -> computed fields to invalidate.
    triggers: BTreeMap<String, BTreeMap<String, BTreeSet<Trigger>>>,
    fingerprint: String,
}

impl Registry {
    /// A registry with no packages, the state before the first build.
    pub fn empty() -> Self {
        Self::new(BTreeMap::new(), Vec::new(), BTreeMap::new())
    }

    pub(crate) fn new(
        models: BTreeMap<String, ComposedModel>,
        packages: Vec<String>,
        triggers: BTreeMap<String, BTreeMap<String, BTreeSet<Trigger>>>,
    ) -> Self {
        let mut registry = Self {
            models,
            packages,
            triggers,
            fingerprint: String::new(),
        };
        registry.fingerprint = registry.compute_fingerprint();
        registry
    }

    fn compute_fingerprint(&self) -> String {
        let payload = serde_json::json!({
            "packages": self.packages,
            "models": self.models,
            "triggers": self.triggers,
        });
        addon_fs::checksum::content_checksum(&payload.to_string())
    }

    /// SHA-256 over the composed models, stable across builds from the
    /// same inputs.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn get(&self, model: &str) -> Option<&ComposedModel> {
        self.models.get(model)
    }

    /// Look up a model, failing with `ModelNotFound`.
    pub fn model(&self, model: &str) -> Result<&ComposedModel> {
        self.get(model)
            .ok_or_else(|| Error::ModelNotFound(model.to_string()))
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    pub fn models(&self) -> impl Iterator<Item = &ComposedModel> {
        self.models.values()
    }

    pub fn model_names(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    pub fn contains_package(&self, package: &str) -> bool {
        self.packages.iter().any(|p| p == package)
    }

    /// Models `package` contributes to.
    pub fn models_of(&self, package: &str) -> Vec<&ComposedModel> {
        self.models
            .values()
            .filter(|m| m.mro.iter().any(|c| c.package == package))
            .collect()
    }

    /// Models whose definition changes when `package` is loaded: the
    /// ones it contributes to and every model taking their fields through
    /// a mixin or a delegation.
    pub fn models_affected_by(&self, package: &str) -> Vec<&ComposedModel> {
        let direct: Vec<&str> = self
            .models_of(package)
            .into_iter()
            .map(|m| m.name.as_str())
            .collect();
        self.descendants(direct)
            .into_iter()
            .filter_map(|name| self.models.get(name))
            .collect()
    }

    /// `names` plus every model using one of them as a mixin or
    /// delegating to one of them, transitively.
    pub fn descendants<'n, I>(&self, names: I) -> BTreeSet<&str>
    where
        I: IntoIterator<Item = &'n str>,
    {
        let mut found = BTreeSet::new();
        let mut pending: Vec<&str> = names
            .into_iter()
            .filter_map(|name| self.models.get_key_value(name))
            .map(|(name, _)| name.as_str())
            .collect();
        while let Some(name) = pending.pop() {
            if !found.insert(name) {
                continue;
            }
            pending.extend(
                self.models
                    .values()
                    .filter(|m| {
                        m.mixins.iter().any(|mixin| mixin == name) || m.delegates.contains_key(name)
                    })
                    .map(|m| m.name.as_str()),
            );
        }
        found
    }

    /// Stored computed fields that read `model.field`.
    pub fn triggers_for(&self, model: &str, field: &str) -> Vec<&Trigger> {
        self.triggers
            .get(model)
            .and_then(|fields| fields.get(field))
            .map(|set| set.iter().collect())
            .unwrap_or_default()
    }

    /// Follow a dotted field path from `model`, returning the field at
    /// each step.
    pub fn resolve_path(&self, model: &str, path: &str) -> Option<Vec<&Field>> {
        let mut current = self.get(model)?;
        let mut fields = Vec::new();
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let field = current.field(segment)?;
            fields.push(field);
            if segments.peek().is_some() {
                current = self.get(field.ty.comodel()?)?;
            }
        }
        Some(fields)
    }

    /// Mark every model visible to readers.
    pub(crate) fn mark_published(&mut self) {
        for model in self.models.values_mut() {
            model.state = ModelState::Published;
        }
    }
}
