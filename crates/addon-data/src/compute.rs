//! Derived fields: evaluation, and upkeep of stored computed fields.
//!
//! Stored computed fields are recomputed for the records a load writes,
//! then every field the registry's trigger table lists as depending on
//! a written field is recomputed in turn, breadth first, for the records
//! whose dependency paths lead to the written ones.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use addon_model::field::Aggregate;
use addon_model::{
    ComposedModel, Compute, Field, FieldType, MethodTable, Registry, Storage, Trigger,
};
use addon_store::{Database, Row};
use serde_json::{Number, Value, json};

use crate::error::Result;

/// Evaluates derived fields against the store.
pub struct Recomputer<'a> {
    registry: &'a Registry,
    methods: Option<&'a MethodTable>,
}

impl<'a> Recomputer<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            methods: None,
        }
    }

    /// Use `methods` for `method:` compute recipes.
    pub fn with_methods(mut self, methods: &'a MethodTable) -> Self {
        self.methods = Some(methods);
        self
    }

    /// The value of derived `field` for record `id`, or `None` when the
    /// recipe cannot run here (a method with no implementation table).
    pub fn evaluate(
        &self,
        db: &Database,
        model: &ComposedModel,
        field: &Field,
        id: i64,
    ) -> Result<Option<Value>> {
        let Some(compute) = &field.compute else {
            return Ok(None);
        };
        let value = match compute {
            Compute::Related(path) => self
                .follow(db, model, &[id], path)?
                .into_iter()
                .next()
                .unwrap_or(Value::Null),
            Compute::Aggregate { op, path } => aggregate(*op, self.follow(db, model, &[id], path)?),
            Compute::Method(method) => {
                let Some(table) = self.methods.filter(|_| model.has_method(method)) else {
                    tracing::debug!(
                        model = model.name.as_str(),
                        field = field.name.as_str(),
                        method = method.as_str(),
                        "no implementation for compute method"
                    );
                    return Ok(None);
                };
                let record = match &model.table {
                    Some(t) => db.get(t, id).cloned().unwrap_or_default(),
                    None => Row::new(),
                };
                model.call(method, table, json!({ "id": id, "record": record }))?
            }
        };
        Ok(Some(value))
    }

    /// Recompute the stored computed fields of `ids` on `model`, then
    /// every field that depends on them or on `written`. Returns the
    /// number of values stored.
    pub fn recompute(
        &self,
        db: &mut Database,
        model: &str,
        ids: &BTreeSet<i64>,
        written: &BTreeSet<String>,
    ) -> Result<usize> {
        let composed = self.registry.model(model)?;
        let mut stored = 0;
        let own: Vec<&Field> = composed
            .fields
            .values()
            .filter(|f| f.storage == Storage::ComputedStored)
            .collect();
        for id in ids {
            for field in &own {
                stored += self.store(db, composed, field, *id)?;
            }
        }

        // (model, field, changed records); `None` when the changed
        // records are unknown.
        let mut queue: VecDeque<(String, String, Option<BTreeSet<i64>>)> = written
            .iter()
            .chain(own.iter().map(|f| &f.name))
            .map(|f| (model.to_string(), f.clone(), Some(ids.clone())))
            .collect();
        queue.extend(
            self.inverse_fields(model, written)
                .into_iter()
                .map(|(m, f)| (m, f, None)),
        );

        let mut done: BTreeMap<Trigger, BTreeSet<i64>> = BTreeMap::new();
        while let Some((changed_model, changed_field, changed)) = queue.pop_front() {
            for trigger in self.registry.triggers_for(&changed_model, &changed_field) {
                let target = self.registry.model(&trigger.model)?;
                let (Some(field), Some(table)) = (target.field(&trigger.field), &target.table)
                else {
                    continue;
                };
                let affected = match &changed {
                    Some(changed) => {
                        self.dependents(db, target, field, &changed_model, &changed_field, changed)?
                    }
                    None => None,
                };
                let candidates: Vec<i64> = match affected {
                    Some(ids) => ids.into_iter().collect(),
                    None => db.rows(table)?.keys().copied().collect(),
                };
                let seen = done.entry(trigger.clone()).or_default();
                let fresh: BTreeSet<i64> =
                    candidates.into_iter().filter(|id| seen.insert(*id)).collect();
                if fresh.is_empty() {
                    continue;
                }
                for id in &fresh {
                    stored += self.store(db, target, field, *id)?;
                }
                queue.push_back((trigger.model.clone(), trigger.field.clone(), Some(fresh)));
            }
        }

        if stored > 0 {
            tracing::debug!(model, stored, "recomputed stored fields");
        }
        Ok(stored)
    }

    /// Records of `target` whose `field` reads `changed_field` of the
    /// `changed` records of `changed_model`, found by walking each
    /// dependency path back to its root. `None` when a step cannot be
    /// walked back.
    fn dependents(
        &self,
        db: &Database,
        target: &ComposedModel,
        field: &Field,
        changed_model: &str,
        changed_field: &str,
        changed: &BTreeSet<i64>,
    ) -> Result<Option<BTreeSet<i64>>> {
        let mut affected = BTreeSet::new();
        for path in field.dependency_paths() {
            let mut steps: Vec<(&ComposedModel, &Field)> = Vec::new();
            let mut current = target;
            for segment in path.split('.') {
                let Some(step) = current.field(segment) else {
                    break;
                };
                steps.push((current, step));
                match step.ty.comodel().and_then(|c| self.registry.get(c)) {
                    Some(next) => current = next,
                    None => break,
                }
            }

            for (depth, (model, step)) in steps.iter().enumerate() {
                if model.name != changed_model || step.name != changed_field {
                    continue;
                }
                let mut ids = changed.clone();
                for (parent, link) in steps[..depth].iter().rev() {
                    match self.referrers(db, parent, link, &ids)? {
                        Some(found) => ids = found,
                        None => return Ok(None),
                    }
                }
                affected.extend(ids);
            }
        }
        Ok(Some(affected))
    }

    /// Records of `model` whose `link` reaches one of `ids`.
    fn referrers(
        &self,
        db: &Database,
        model: &ComposedModel,
        link: &Field,
        ids: &BTreeSet<i64>,
    ) -> Result<Option<BTreeSet<i64>>> {
        let Some(table) = model.table.as_deref() else {
            return Ok(None);
        };
        if link.inherited_from.is_some() {
            return Ok(None);
        }
        let mut found = BTreeSet::new();
        match (&link.ty, link.storage) {
            (FieldType::Many2one { .. }, Storage::Column | Storage::ComputedStored) => {
                for id in ids {
                    found.extend(db.search(table, &link.name, &json!(id))?);
                }
            }
            (FieldType::One2many { comodel, inverse }, _) => {
                let Some(child_table) = self.registry.get(comodel).and_then(|m| m.table.as_deref())
                else {
                    return Ok(None);
                };
                for id in ids {
                    let Some(row) = db.get(child_table, *id) else {
                        return Ok(None);
                    };
                    found.extend(row.get(inverse).and_then(Value::as_i64));
                }
            }
            (
                FieldType::Many2many {
                    relation: Some(relation),
                    column1: Some(column1),
                    column2: Some(column2),
                    ..
                },
                Storage::RelationTable,
            ) => {
                for id in ids {
                    for row_id in db.search(relation, column2, &json!(id))? {
                        found.extend(
                            db.get(relation, row_id)
                                .and_then(|r| r.get(column1))
                                .and_then(Value::as_i64),
                        );
                    }
                }
            }
            _ => return Ok(None),
        }
        Ok(Some(found))
    }

    /// One2many fields whose inverse is among the many2one fields
    /// `written` on `model`.
    fn inverse_fields(&self, model: &str, written: &BTreeSet<String>) -> Vec<(String, String)> {
        self.registry
            .models()
            .flat_map(|m| {
                m.fields.values().filter_map(move |f| match &f.ty {
                    FieldType::One2many { comodel, inverse }
                        if comodel == model && written.contains(inverse) =>
                    {
                        Some((m.name.clone(), f.name.clone()))
                    }
                    _ => None,
                })
            })
            .collect()
    }

    fn store(
        &self,
        db: &mut Database,
        model: &ComposedModel,
        field: &Field,
        id: i64,
    ) -> Result<usize> {
        let Some(table) = &model.table else {
            return Ok(0);
        };
        if !db.exists(table, id) {
            return Ok(0);
        }
        let Some(value) = self.evaluate(db, model, field, id)? else {
            return Ok(0);
        };
        let mut row = Row::new();
        row.insert(field.name.clone(), value);
        db.update(table, id, row)?;
        Ok(1)
    }

    /// Values reached from `ids` along a dotted `path`, fanning out over
    /// to-many steps. Nulls are dropped.
    fn follow(
        &self,
        db: &Database,
        model: &ComposedModel,
        ids: &[i64],
        path: &str,
    ) -> Result<Vec<Value>> {
        let mut current = model;
        let mut current_ids = ids.to_vec();
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let Some(field) = current.field(segment) else {
                return Ok(Vec::new());
            };
            let values = self.read(db, current, field, &current_ids)?;
            if segments.peek().is_none() {
                return Ok(values.into_iter().filter(|v| !v.is_null()).collect());
            }
            let Some(comodel) = field.ty.comodel().and_then(|c| self.registry.get(c)) else {
                return Ok(Vec::new());
            };
            current = comodel;
            current_ids = values.iter().filter_map(Value::as_i64).collect();
        }
        Ok(Vec::new())
    }

    /// Raw values of `field` for `ids`; relational fields yield ids.
    fn read(
        &self,
        db: &Database,
        model: &ComposedModel,
        field: &Field,
        ids: &[i64],
    ) -> Result<Vec<Value>> {
        if let Some(parent) = &field.inherited_from {
            let parent_model = self.registry.model(parent)?;
            let (Some(link), Some(parent_field)) =
                (model.delegates.get(parent), parent_model.field(&field.name))
            else {
                return Ok(Vec::new());
            };
            let Some(link_field) = model.field(link) else {
                return Ok(Vec::new());
            };
            let parent_ids: Vec<i64> = self
                .read(db, model, link_field, ids)?
                .iter()
                .filter_map(Value::as_i64)
                .collect();
            return self.read(db, parent_model, parent_field, &parent_ids);
        }

        let mut values = Vec::new();
        match (&field.ty, field.storage) {
            (FieldType::One2many { comodel, inverse }, _) => {
                let Some(table) = self.registry.get(comodel).and_then(|m| m.table.as_deref())
                else {
                    return Ok(values);
                };
                for id in ids {
                    for child in db.search(table, inverse, &json!(id))? {
                        values.push(json!(child));
                    }
                }
            }
            (
                FieldType::Many2many {
                    relation: Some(relation),
                    column1: Some(column1),
                    column2: Some(column2),
                    ..
                },
                Storage::RelationTable,
            ) => {
                for id in ids {
                    for link in db.search(relation, column1, &json!(id))? {
                        if let Some(target) = db.get(relation, link).and_then(|r| r.get(column2)) {
                            values.push(target.clone());
                        }
                    }
                }
            }
            (_, Storage::Column | Storage::ComputedStored) => {
                let Some(table) = model.table.as_deref() else {
                    return Ok(values);
                };
                for id in ids {
                    let value = db
                        .get(table, *id)
                        .and_then(|row| row.get(&field.name))
                        .cloned()
                        .unwrap_or(Value::Null);
                    values.push(value);
                }
            }
            (_, Storage::ComputedOnRead) => {
                for id in ids {
                    if let Some(value) = self.evaluate(db, model, field, *id)? {
                        values.push(value);
                    }
                }
            }
            _ => {}
        }
        Ok(values)
    }
}

/// Fold values with `op`. Integers stay integers; anything else sums as
/// floating point.
fn aggregate(op: Aggregate, values: Vec<Value>) -> Value {
    if op == Aggregate::Count {
        return json!(values.len());
    }
    let numbers: Vec<&Number> = values
        .iter()
        .filter_map(|v| match v {
            Value::Number(n) => Some(n),
            _ => None,
        })
        .collect();
    if let Some(ints) = numbers.iter().map(|n| n.as_i64()).collect::<Option<Vec<i64>>>() {
        let folded = match op {
            Aggregate::Sum => ints
                .iter()
                .try_fold(0i64, |total, v| total.checked_add(*v))
                .map(|total| json!(total)),
            Aggregate::Min => Some(ints.iter().min().map_or(Value::Null, |v| json!(v))),
            Aggregate::Max => Some(ints.iter().max().map_or(Value::Null, |v| json!(v))),
            Aggregate::Count => Some(json!(ints.len())),
        };
        // An integer sum that overflows falls through to floating point.
        if let Some(value) = folded {
            return value;
        }
    }
    let floats: Vec<f64> = numbers.iter().filter_map(|n| n.as_f64()).collect();
    let folded = match op {
        Aggregate::Sum => Some(floats.iter().sum::<f64>()),
        Aggregate::Min => floats.iter().copied().reduce(f64::min),
        Aggregate::Max => floats.iter().copied().reduce(f64::max),
        Aggregate::Count => Some(floats.len() as f64),
    };
    folded
        .and_then(Number::from_f64)
        .map_or(Value::Null, Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Aggregate::Sum, vec![json!(1), json!(2)], json!(3))]
    #[case(Aggregate::Sum, vec![json!(1.5), json!(2)], json!(3.5))]
    #[case(Aggregate::Sum, vec![], json!(0))]
    #[case(Aggregate::Count, vec![json!(7), json!(8)], json!(2))]
    #[case(Aggregate::Min, vec![json!(4), json!(2)], json!(2))]
    #[case(Aggregate::Max, vec![], Value::Null)]
    #[case(Aggregate::Sum, vec![json!(i64::MAX), json!(1)], json!(i64::MAX as f64 + 1.0))]
    fn aggregates(#[case] op: Aggregate, #[case] values: Vec<Value>, #[case] expected: Value) {
        assert_eq!(aggregate(op, values), expected);
    }
}
