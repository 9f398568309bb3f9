//! Contribution collector.
//!
//! Each package ships model files under `models/` (or the files listed in
//! its manifest's `models` key). A model file holds an ordered list of
//! contributions:
//!
//! ```toml
//! [[model]]
//! name = "sale.order"
//! mode = "extend"
//!
//! [model.fields.note]
//! type = "text"
//! ```
//!
//! The collector only records contributions; composing them into models
//! is the builder's job.

use std::collections::BTreeMap;
use std::path::Path;

use addon_fs::{DocumentStore, NormalizedPath};
use addon_packages::Package;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::field::FieldSpec;

/// How a contribution relates to its logical model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Create the model.
    New,
    /// Merge into an existing model.
    Extend,
    /// Create the model from a copy of another one.
    ExtendRename,
}

impl Mode {
    /// Whether this contribution seeds its model.
    pub fn seeds(self) -> bool {
        matches!(self, Self::New | Self::ExtendRename)
    }
}

/// A constraint declaration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintSpec {
    Unique {
        name: String,
        fields: Vec<String>,
    },
    Check {
        name: String,
        field: String,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
}

impl ConstraintSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::Unique { name, .. } | Self::Check { name, .. } => name,
        }
    }
}

/// One `[[model]]` entry of a model file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContributionSpec {
    pub name: String,
    pub mode: Mode,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(rename = "abstract", default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub mixins: Vec<String>,
    /// Parent model -> many2one field holding the parent record.
    #[serde(default)]
    pub delegates: IndexMap<String, String>,
    #[serde(default)]
    pub rename_from: Option<String>,
    #[serde(default)]
    pub fields: IndexMap<String, FieldSpec>,
    /// Method name -> implementation symbol.
    #[serde(default)]
    pub methods: IndexMap<String, String>,
    #[serde(default)]
    pub constraints: Vec<ConstraintSpec>,
}

#[derive(Debug, Deserialize)]
struct ModelFile {
    #[serde(default)]
    model: Vec<ContributionSpec>,
}

/// A contribution recorded against the package that declared it.
#[derive(Debug, Clone)]
pub struct Contribution {
    pub package: String,
    /// Position within the package: file order, then declaration order.
    pub sequence: usize,
    pub spec: ContributionSpec,
}

impl Contribution {
    pub fn model(&self) -> &str {
        &self.spec.name
    }

    pub fn mode(&self) -> Mode {
        self.spec.mode
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidContribution {
            package: self.package.clone(),
            model: self.spec.name.clone(),
            reason: reason.to_string(),
        };
        if self.spec.name.trim().is_empty() {
            return Err(invalid("model name must not be empty"));
        }
        match (self.spec.mode, &self.spec.rename_from) {
            (Mode::ExtendRename, None) => {
                return Err(invalid("extend-rename needs rename_from"));
            }
            (Mode::ExtendRename, Some(source)) if *source == self.spec.name => {
                return Err(invalid("a model cannot be renamed from itself"));
            }
            (Mode::New | Mode::Extend, Some(_)) => {
                return Err(invalid("rename_from is only valid with extend-rename"));
            }
            _ => {}
        }
        if self.spec.is_abstract && !self.spec.mode.seeds() {
            return Err(invalid("only the seeding contribution can mark a model abstract"));
        }
        if self.spec.mixins.iter().any(|m| *m == self.spec.name) {
            return Err(invalid("a model cannot be its own mixin"));
        }
        Ok(())
    }
}

/// Every contribution of a set of packages.
#[derive(Debug, Clone, Default)]
pub struct ContributionSet {
    by_package: BTreeMap<String, Vec<Contribution>>,
}

impl ContributionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the contributions of one package, replacing earlier ones.
    pub fn insert(&mut self, package: &str, contributions: Vec<Contribution>) {
        self.by_package.insert(package.to_string(), contributions);
    }

    pub fn remove(&mut self, package: &str) -> Option<Vec<Contribution>> {
        self.by_package.remove(package)
    }

    pub fn of_package(&self, package: &str) -> &[Contribution] {
        self.by_package.get(package).map_or(&[], Vec::as_slice)
    }

    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.by_package.keys().map(String::as_str)
    }

    /// All contributions to `model`, grouped by package in name order.
    pub fn for_model<'a>(&'a self, model: &'a str) -> impl Iterator<Item = &'a Contribution> {
        self.by_package
            .values()
            .flatten()
            .filter(move |c| c.model() == model)
    }

    /// Names of every model some contribution targets.
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .by_package
            .values()
            .flatten()
            .map(|c| c.spec.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Loads model files into contributions.
#[derive(Debug, Default)]
pub struct Collector {
    store: DocumentStore,
}

impl Collector {
    pub fn new() -> Self {
        Self {
            store: DocumentStore::new(),
        }
    }

    /// Collect every contribution of `package`, in application order.
    ///
    /// The built-in base contributions are prepended for the `base`
    /// package.
    pub fn collect(&self, package: &Package) -> Result<Vec<Contribution>> {
        let mut specs = Vec::new();
        if package.name == addon_packages::BASE_PACKAGE {
            specs.extend(crate::base::contributions()?);
        }
        for path in package.model_files()? {
            specs.extend(self.load_file(&package.name, &path)?);
        }

        let contributions: Vec<Contribution> = specs
            .into_iter()
            .enumerate()
            .map(|(sequence, spec)| Contribution {
                package: package.name.clone(),
                sequence,
                spec,
            })
            .collect();
        for contribution in &contributions {
            contribution.validate()?;
        }

        tracing::debug!(
            package = package.name.as_str(),
            count = contributions.len(),
            "collected model contributions"
        );
        Ok(contributions)
    }

    /// Collect every package of `packages` into a set.
    pub fn collect_all<'a, I>(&self, packages: I) -> Result<ContributionSet>
    where
        I: IntoIterator<Item = &'a Package>,
    {
        let mut set = ContributionSet::new();
        for package in packages {
            set.insert(&package.name, self.collect(package)?);
        }
        Ok(set)
    }

    fn load_file(&self, package: &str, path: &Path) -> Result<Vec<ContributionSpec>> {
        let file: ModelFile =
            self.store
                .load(&NormalizedPath::new(path))
                .map_err(|e| Error::ModelFile {
                    package: package.to_string(),
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
        Ok(file.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contribution(toml: &str) -> Contribution {
        let file: ModelFile = toml::from_str(toml).unwrap();
        Contribution {
            package: "a".to_string(),
            sequence: 0,
            spec: file.model.into_iter().next().unwrap(),
        }
    }

    #[test]
    fn parses_contribution() {
        let c = contribution(
            r#"
[[model]]
name = "sale.order"
mode = "new"
description = "Sales Order"
delegates = { "res.partner" = "partner_id" }

[model.fields.name]
type = "text"
required = true

[model.methods]
action_confirm = "sale.action_confirm"

[[model.constraints]]
kind = "unique"
name = "name_uniq"
fields = ["name"]
"#,
        );
        assert_eq!(c.mode(), Mode::New);
        assert_eq!(c.spec.fields.len(), 1);
        assert_eq!(c.spec.methods["action_confirm"], "sale.action_confirm");
        assert_eq!(c.spec.delegates["res.partner"], "partner_id");
        assert_eq!(c.spec.constraints[0].name(), "name_uniq");
        c.validate().unwrap();
    }

    #[test]
    fn extend_rename_needs_source() {
        let c = contribution("[[model]]\nname = \"copy\"\nmode = \"extend-rename\"");
        assert!(matches!(
            c.validate(),
            Err(Error::InvalidContribution { .. })
        ));
    }

    #[test]
    fn extend_cannot_be_abstract() {
        let c = contribution("[[model]]\nname = \"m\"\nmode = \"extend\"\nabstract = true");
        assert!(c.validate().is_err());
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(toml::from_str::<ModelFile>("[[model]]\nname = \"m\"\nmode = \"patch\"").is_err());
    }
}
