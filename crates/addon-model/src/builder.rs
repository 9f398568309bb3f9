//! Registry builder: composes every contribution of a package set into
//! one model per logical model name.
//!
//! Per model, contributions are linearized so that a contribution sits
//! above every contribution of the packages it depends on; among
//! contributions no remaining one depends on, the package that sorts
//! last goes on top. Fields merge base-first along that order, attribute
//! by attribute. Method chains are the same order, topmost first.
//!
//! Composition follows the dependency graph: a package can only extend
//! a model that its dependency closure (or itself, earlier) seeds.

use std::collections::{BTreeMap, BTreeSet};

use addon_packages::DependencyGraph;

use crate::contribution::{ConstraintSpec, Contribution, ContributionSet, Mode};
use crate::error::{Error, Result};
use crate::field::{Compute, Field, FieldType, OnDelete, Storage};
use crate::method::MethodImpl;
use crate::model::{ComposedModel, Constraint, ContributionRef, ModelState, table_name};
use crate::registry::{Registry, Trigger};

/// Builds a [`Registry`] from the contributions of an ordered package set.
#[derive(Debug)]
pub struct RegistryBuilder<'a> {
    contributions: &'a ContributionSet,
    /// Packages to compose, in load order.
    packages: Vec<String>,
    /// Package -> everything it transitively depends on.
    closures: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Default)]
struct BuildState {
    composed: BTreeMap<String, ComposedModel>,
    stack: Vec<String>,
}

impl<'a> RegistryBuilder<'a> {
    /// Prepare a build of `packages` (in load order) using `graph` for
    /// dependency closures.
    pub fn new(
        contributions: &'a ContributionSet,
        graph: &DependencyGraph,
        packages: &[String],
    ) -> Result<Self> {
        let mut closures = BTreeMap::new();
        for package in packages {
            let mut closure = graph.dependency_closure([package.as_str()])?;
            closure.remove(package);
            closures.insert(package.clone(), closure);
        }
        Ok(Self {
            contributions,
            packages: packages.to_vec(),
            closures,
        })
    }

    fn is_active(&self, package: &str) -> bool {
        self.closures.contains_key(package)
    }

    fn depends_on(&self, package: &str, other: &str) -> bool {
        self.closures
            .get(package)
            .is_some_and(|closure| closure.contains(other))
    }

    /// Whether contribution `upper` must sit above `lower`.
    fn above(&self, upper: &Contribution, lower: &Contribution) -> bool {
        if upper.package == lower.package {
            upper.sequence > lower.sequence
        } else {
            self.depends_on(&upper.package, &lower.package)
        }
    }

    /// Compose every model and validate the result.
    ///
    /// Any error aborts the whole build; nothing partial is returned.
    pub fn build(&self) -> Result<Registry> {
        let mut state = BuildState::default();

        let names: Vec<String> = self
            .contributions
            .model_names()
            .into_iter()
            .filter(|name| {
                self.contributions
                    .for_model(name)
                    .any(|c| self.is_active(&c.package))
            })
            .collect();

        for name in &names {
            self.compose_full(name, "", &mut state)?;
        }

        let mut models = state.composed;
        finalize_relations(&mut models)?;
        let triggers = resolve_dependencies(&models)?;
        validate_constraints(&models)?;
        self.warn_sibling_overrides(&models);

        for model in models.values_mut() {
            model.state = ModelState::Finalized;
        }

        tracing::debug!(
            models = models.len(),
            packages = self.packages.len(),
            "registry built"
        );
        Ok(Registry::new(models, self.packages.clone(), triggers))
    }

    /// The fully composed model `name`, built once and memoized.
    fn compose_full(
        &self,
        name: &str,
        requester: &str,
        state: &mut BuildState,
    ) -> Result<ComposedModel> {
        if let Some(model) = state.composed.get(name) {
            return Ok(model.clone());
        }
        let model = self.compose(name, None, requester, state)?;
        state.composed.insert(name.to_string(), model.clone());
        Ok(model)
    }

    /// Compose `name` from the contributions of `visible` packages (all
    /// active packages when `None`).
    fn compose(
        &self,
        name: &str,
        visible: Option<&BTreeSet<String>>,
        requester: &str,
        state: &mut BuildState,
    ) -> Result<ComposedModel> {
        if let Some(start) = state.stack.iter().position(|m| m == name) {
            let mut chain = state.stack[start..].to_vec();
            chain.push(name.to_string());
            return Err(Error::InheritanceCycle { chain });
        }

        let contributions: Vec<&Contribution> = self
            .contributions
            .for_model(name)
            .filter(|c| self.is_active(&c.package))
            .filter(|c| visible.is_none_or(|v| v.contains(&c.package)))
            .collect();

        let seed = self.find_seed(name, &contributions, requester)?;
        for contribution in &contributions {
            if contribution.mode() != Mode::Extend {
                continue;
            }
            if contribution.package == seed.package {
                if contribution.sequence < seed.sequence {
                    return Err(Error::UnknownModel {
                        model: name.to_string(),
                        package: contribution.package.clone(),
                    });
                }
            } else if !self.depends_on(&contribution.package, &seed.package) {
                return Err(Error::ExtendWithoutDependency {
                    model: name.to_string(),
                    package: contribution.package.clone(),
                    seeded_by: seed.package.clone(),
                });
            }
        }

        let mro = self.linearize(contributions);

        state.stack.push(name.to_string());
        let result = self.apply_all(name, &mro, seed, state);
        state.stack.pop();
        result
    }

    fn find_seed<'c>(
        &self,
        name: &str,
        contributions: &[&'c Contribution],
        requester: &str,
    ) -> Result<&'c Contribution> {
        let seeds: Vec<&Contribution> = contributions
            .iter()
            .copied()
            .filter(|c| c.mode().seeds())
            .collect();
        if seeds.is_empty() {
            return Err(Error::UnknownModel {
                model: name.to_string(),
                package: contributions
                    .first()
                    .map_or(requester.to_string(), |c| c.package.clone()),
            });
        }
        let root = seeds.iter().copied().find(|seed| {
            seeds.iter().all(|other| {
                std::ptr::eq(*other, *seed)
                    || (other.mode() == Mode::New && self.depends_on(&other.package, &seed.package))
            })
        });
        match root {
            Some(seed) => Ok(seed),
            None => {
                let mut packages: Vec<String> = seeds.iter().map(|c| c.package.clone()).collect();
                packages.sort();
                packages.dedup();
                Err(Error::DuplicateNewContribution {
                    model: name.to_string(),
                    packages,
                })
            }
        }
    }

    /// Order contributions topmost first.
    fn linearize<'c>(&self, mut remaining: Vec<&'c Contribution>) -> Vec<&'c Contribution> {
        let mut mro = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let top = (0..remaining.len())
                .filter(|&i| {
                    !remaining
                        .iter()
                        .enumerate()
                        .any(|(j, other)| j != i && self.above(other, remaining[i]))
                })
                .max_by(|&a, &b| {
                    let (a, b) = (remaining[a], remaining[b]);
                    a.package.cmp(&b.package).then(a.sequence.cmp(&b.sequence))
                })
                .unwrap_or(remaining.len() - 1);
            mro.push(remaining.remove(top));
        }
        mro
    }

    /// Apply contributions base-first onto a fresh model.
    fn apply_all(
        &self,
        name: &str,
        mro: &[&Contribution],
        seed: &Contribution,
        state: &mut BuildState,
    ) -> Result<ComposedModel> {
        let mut model = ComposedModel::empty(name);
        let mut delegating: Vec<(String, String, String)> = Vec::new();

        for contribution in mro.iter().rev() {
            let spec = &contribution.spec;
            if std::ptr::eq(*contribution, seed) {
                if let Some(source) = &spec.rename_from {
                    model = self.renamed_copy(name, source, contribution, state)?;
                }
                model.is_abstract = spec.is_abstract;
                model.table = if spec.is_abstract {
                    None
                } else {
                    Some(spec.table.clone().unwrap_or_else(|| table_name(name)))
                };
            } else if let Some(table) = &spec.table
                && !model.is_abstract
            {
                model.table = Some(table.clone());
            }

            for mixin in &spec.mixins {
                let mixin_model = self.compose_full(mixin, &contribution.package, state)?;
                if !mixin_model.is_abstract {
                    return Err(Error::InvalidMixin {
                        model: name.to_string(),
                        mixin: mixin.clone(),
                    });
                }
                apply_mixin(&mut model, &mixin_model)?;
            }

            apply_contribution(&mut model, contribution)?;

            for (parent, field) in &spec.delegates {
                delegating.push((parent.clone(), field.clone(), contribution.package.clone()));
            }
        }

        model.mro = mro
            .iter()
            .map(|c| ContributionRef {
                package: c.package.clone(),
                mode: effective_mode(c, seed),
            })
            .collect();
        model.state = if mro.len() > 1 {
            ModelState::Augmented
        } else {
            ModelState::Seeded
        };

        for (parent, field, package) in delegating {
            let parent_model = self.compose_full(&parent, &package, state)?;
            apply_delegation(&mut model, &parent_model, &field, &package)?;
        }

        Ok(model)
    }

    /// Seed a model from `source` as composed for the declaring package.
    fn renamed_copy(
        &self,
        name: &str,
        source: &str,
        contribution: &Contribution,
        state: &mut BuildState,
    ) -> Result<ComposedModel> {
        let mut visible = self
            .closures
            .get(&contribution.package)
            .cloned()
            .unwrap_or_default();
        visible.insert(contribution.package.clone());

        let source_model = self.compose(source, Some(&visible), &contribution.package, state)?;
        let mut model = ComposedModel::empty(name);
        model.description = source_model.description;
        model.order = source_model.order;
        model.methods = source_model.methods;
        model.constraints = source_model.constraints;
        model.renamed_from = Some(source.to_string());
        model.fields = source_model
            .fields
            .into_iter()
            .filter(|(_, field)| field.inherited_from.is_none())
            .map(|(field_name, mut field)| {
                field.defined_by = contribution.package.clone();
                field.modified_by.clear();
                (field_name, field)
            })
            .collect();
        Ok(model)
    }

    fn warn_sibling_overrides(&self, models: &BTreeMap<String, ComposedModel>) {
        for model in models.values() {
            for (method, chain) in &model.methods {
                let [first, second, ..] = chain.as_slice() else {
                    continue;
                };
                if first.package != second.package
                    && !self.depends_on(&first.package, &second.package)
                    && !self.depends_on(&second.package, &first.package)
                {
                    tracing::warn!(
                        model = model.name.as_str(),
                        method = method.as_str(),
                        winner = first.package.as_str(),
                        other = second.package.as_str(),
                        "ambiguous override between sibling packages; add an explicit dependency"
                    );
                }
            }
        }
    }
}

/// A `new` from a package depending on the seeding one merges like an
/// `extend`.
fn effective_mode(contribution: &Contribution, seed: &Contribution) -> Mode {
    if contribution.mode() == Mode::New && !std::ptr::eq(contribution, seed) {
        Mode::Extend
    } else {
        contribution.mode()
    }
}

fn apply_contribution(model: &mut ComposedModel, contribution: &Contribution) -> Result<()> {
    let spec = &contribution.spec;
    let package = contribution.package.as_str();

    if spec.description.is_some() {
        model.description.clone_from(&spec.description);
    }
    if let Some(order) = &spec.order {
        model.order.clone_from(order);
    }

    for (field_name, field_spec) in &spec.fields {
        if field_spec.removed {
            if model.fields.shift_remove(field_name).is_none() {
                return Err(Error::UnknownField {
                    model: model.name.clone(),
                    field: field_name.clone(),
                    package: package.to_string(),
                });
            }
            continue;
        }
        match model.fields.get_mut(field_name) {
            Some(field) => {
                field.inherited_from = None;
                field.apply(&model.name, field_spec, package)?;
            }
            None if field_spec.is_override() => {
                return Err(Error::UnknownField {
                    model: model.name.clone(),
                    field: field_name.clone(),
                    package: package.to_string(),
                });
            }
            None => {
                let field = Field::from_spec(&model.name, field_name, field_spec, package)?;
                model.fields.insert(field_name.clone(), field);
            }
        }
    }

    for (method, symbol) in &spec.methods {
        model.methods.entry(method.clone()).or_default().insert(
            0,
            MethodImpl {
                package: package.to_string(),
                symbol: symbol.clone(),
            },
        );
    }

    for constraint in &spec.constraints {
        let constraint = match constraint {
            ConstraintSpec::Unique { name, fields } => Constraint::Unique {
                name: name.clone(),
                fields: fields.clone(),
            },
            ConstraintSpec::Check {
                name,
                field,
                min,
                max,
            } => Constraint::Check {
                name: name.clone(),
                field: field.clone(),
                min: *min,
                max: *max,
            },
        };
        match model
            .constraints
            .iter_mut()
            .find(|c| c.name() == constraint.name())
        {
            Some(existing) => *existing = constraint,
            None => model.constraints.push(constraint),
        }
    }

    for (parent, field) in &spec.delegates {
        model.delegates.insert(parent.clone(), field.clone());
    }

    Ok(())
}

/// Mixin fields fill in what the model lacks; methods slot in beneath the
/// contribution that names the mixin.
fn apply_mixin(model: &mut ComposedModel, mixin: &ComposedModel) -> Result<()> {
    if !model.mixins.contains(&mixin.name) {
        model.mixins.push(mixin.name.clone());
    }
    for (name, field) in &mixin.fields {
        match model.fields.get(name) {
            Some(existing) if !existing.ty.same_type(&field.ty) => {
                return Err(Error::FieldTypeConflict {
                    model: model.name.clone(),
                    field: name.clone(),
                    package: field.defined_by.clone(),
                    existing: existing.ty.kind().to_string(),
                    declared: field.ty.kind().to_string(),
                });
            }
            Some(_) => {}
            None => {
                model.fields.insert(name.clone(), field.clone());
            }
        }
    }

    for (method, chain) in &mixin.methods {
        let target = model.methods.entry(method.clone()).or_default();
        let missing: Vec<MethodImpl> = chain
            .iter()
            .filter(|link| !target.contains(link))
            .cloned()
            .collect();
        for (offset, link) in missing.into_iter().enumerate() {
            target.insert(offset, link);
        }
    }

    for constraint in &mixin.constraints {
        if !model.constraints.iter().any(|c| c.name() == constraint.name()) {
            model.constraints.push(constraint.clone());
        }
    }
    Ok(())
}

/// Expose the parent's fields through the delegation field.
fn apply_delegation(
    model: &mut ComposedModel,
    parent: &ComposedModel,
    link: &str,
    package: &str,
) -> Result<()> {
    if parent.is_abstract {
        return Err(Error::InvalidContribution {
            package: package.to_string(),
            model: model.name.clone(),
            reason: format!("cannot delegate to abstract model '{}'", parent.name),
        });
    }

    if !model.fields.contains_key(link) {
        let mut field = Field {
            name: link.to_string(),
            ty: FieldType::Many2one {
                comodel: parent.name.clone(),
                on_delete: Some(OnDelete::Cascade),
            },
            string: parent.description.clone(),
            help: None,
            required: true,
            readonly: false,
            default: None,
            index: true,
            translate: false,
            groups: Vec::new(),
            store: None,
            compute: None,
            depends: Vec::new(),
            copy: None,
            defined_by: package.to_string(),
            modified_by: Vec::new(),
            inherited_from: None,
            storage: Storage::Column,
        };
        field.storage = field.plan_storage();
        model.fields.insert(link.to_string(), field);
    }

    for (name, parent_field) in &parent.fields {
        if model.fields.contains_key(name) {
            continue;
        }
        let mut field = parent_field.clone();
        field.compute = Some(Compute::Related(format!("{link}.{name}")));
        field.store = Some(false);
        field.required = false;
        field.default = None;
        field.depends = Vec::new();
        field.defined_by = package.to_string();
        field.modified_by = Vec::new();
        field.inherited_from = Some(parent.name.clone());
        field.storage = field.plan_storage();
        model.fields.insert(name.clone(), field);
    }
    Ok(())
}

/// Check comodels and one2many inverses; fill many2many defaults.
fn finalize_relations(models: &mut BTreeMap<String, ComposedModel>) -> Result<()> {
    let tables: BTreeMap<String, String> = models
        .values()
        .map(|m| {
            let table = m.table.clone().unwrap_or_else(|| table_name(&m.name));
            (m.name.clone(), table)
        })
        .collect();

    let inverses: BTreeMap<(String, String), Option<String>> = models
        .values()
        .flat_map(|m| {
            m.fields.values().map(move |f| {
                let target = match &f.ty {
                    FieldType::Many2one { comodel, .. } => Some(comodel.clone()),
                    _ => None,
                };
                ((m.name.clone(), f.name.clone()), target)
            })
        })
        .collect();

    for model in models.values_mut() {
        let model_table = tables
            .get(&model.name)
            .cloned()
            .unwrap_or_else(|| table_name(&model.name));
        for field in model.fields.values_mut() {
            let Some(comodel) = field.ty.comodel().map(str::to_string) else {
                continue;
            };
            if field.inherited_from.is_some() {
                continue;
            }
            let Some(comodel_table) = tables.get(&comodel) else {
                return Err(Error::UnknownComodel {
                    model: model.name.clone(),
                    field: field.name.clone(),
                    comodel,
                });
            };

            match &mut field.ty {
                FieldType::One2many { inverse, .. } => {
                    let target = inverses.get(&(comodel.clone(), inverse.clone()));
                    if target != Some(&Some(model.name.clone())) {
                        return Err(Error::InvalidConstraint {
                            model: model.name.clone(),
                            name: field.name.clone(),
                            reason: format!(
                                "inverse '{comodel}.{inverse}' is not a many2one to '{}'",
                                model.name
                            ),
                        });
                    }
                }
                FieldType::Many2many {
                    relation,
                    column1,
                    column2,
                    ..
                } => {
                    if relation.is_none() {
                        let (low, high) = if model_table <= *comodel_table {
                            (&model_table, comodel_table)
                        } else {
                            (comodel_table, &model_table)
                        };
                        *relation = Some(format!("{low}_{high}_rel"));
                    }
                    if column1.is_none() {
                        *column1 = Some(format!("{model_table}_id"));
                    }
                    if column2.is_none() {
                        *column2 = Some(format!("{comodel_table}_id"));
                    }
                    if column1 == column2 {
                        return Err(Error::InvalidConstraint {
                            model: model.name.clone(),
                            name: field.name.clone(),
                            reason: "self-referencing many2many needs explicit column1 and column2"
                                .to_string(),
                        });
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

type TriggerTable = BTreeMap<String, BTreeMap<String, BTreeSet<Trigger>>>;

/// Resolve every derived field's dependency paths and build the trigger
/// table for stored computed fields.
fn resolve_dependencies(models: &BTreeMap<String, ComposedModel>) -> Result<TriggerTable> {
    let mut triggers = TriggerTable::new();

    for model in models.values() {
        for field in model.fields.values() {
            for path in field.dependency_paths() {
                let unresolved = || Error::UnresolvedDependency {
                    model: model.name.clone(),
                    field: field.name.clone(),
                    path: path.clone(),
                };

                let mut current = model;
                let mut segments = path.split('.').peekable();
                while let Some(segment) = segments.next() {
                    let step = current.field(segment).ok_or_else(unresolved)?;
                    if field.storage == Storage::ComputedStored {
                        triggers
                            .entry(current.name.clone())
                            .or_default()
                            .entry(segment.to_string())
                            .or_default()
                            .insert(Trigger {
                                model: model.name.clone(),
                                field: field.name.clone(),
                            });
                    }
                    if segments.peek().is_some() {
                        let comodel = step.ty.comodel().ok_or_else(unresolved)?;
                        current = models.get(comodel).ok_or_else(unresolved)?;
                    }
                }
            }
        }
    }
    Ok(triggers)
}

fn validate_constraints(models: &BTreeMap<String, ComposedModel>) -> Result<()> {
    for model in models.values() {
        let invalid = |name: &str, reason: String| Error::InvalidConstraint {
            model: model.name.clone(),
            name: name.to_string(),
            reason,
        };

        for constraint in &model.constraints {
            match constraint {
                Constraint::Unique { name, fields } => {
                    if fields.is_empty() {
                        return Err(invalid(name, "unique constraint lists no fields".into()));
                    }
                    for field in fields {
                        match model.field(field) {
                            Some(f) if f.is_stored() => {}
                            Some(_) => {
                                return Err(invalid(name, format!("field '{field}' is not stored")));
                            }
                            None => {
                                return Err(invalid(name, format!("unknown field '{field}'")));
                            }
                        }
                    }
                }
                Constraint::Check {
                    name,
                    field,
                    min,
                    max,
                } => {
                    match model.field(field) {
                        Some(f) if f.is_stored() && f.ty.is_numeric() => {}
                        Some(_) => {
                            return Err(invalid(
                                name,
                                format!("field '{field}' is not a stored number"),
                            ));
                        }
                        None => return Err(invalid(name, format!("unknown field '{field}'"))),
                    }
                    if let (Some(min), Some(max)) = (min, max)
                        && min > max
                    {
                        return Err(invalid(name, format!("min {min} exceeds max {max}")));
                    }
                }
            }
        }

        for field in model.stored_fields() {
            if field.required && field.on_delete() == Some(OnDelete::SetNull) {
                return Err(invalid(
                    &field.name,
                    "a required many2one cannot use on_delete = set-null".into(),
                ));
            }
        }
    }
    Ok(())
}
