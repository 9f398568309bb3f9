//! Applying data files to the store.
//!
//! A file is applied in two passes. The first resolves every record's
//! external id to a primary key, reserving keys for new records; the
//! second writes values, so references may point forward within the
//! file. Re-applying a file updates the rows its ids already name.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use addon_model::model::table_name;
use addon_model::{ComposedModel, Field, FieldType, MethodTable, Registry, Storage};
use addon_packages::Package;
use addon_schema::column_type;
use addon_store::{Database, ExternalId, ExternalIdRecord, Row};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::compute::Recomputer;
use crate::error::{Error, Result};
use crate::file::{DataFile, DeleteSpec, RecordSpec, ValueSpec};

/// Counters for one loader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub translated: usize,
}

enum Plan {
    Create(i64),
    Update(i64),
    Skip,
}

/// Many2many targets to store in a relation table.
struct Links {
    relation: String,
    column1: String,
    column2: String,
    targets: Vec<i64>,
}

/// One2many targets whose inverse should point at the record.
struct Inverse {
    table: String,
    inverse: String,
    targets: Vec<i64>,
}

enum Converted {
    Column(Value),
    Links(Links),
    Inverse(Inverse),
}

#[derive(Default)]
struct Prepared {
    values: Row,
    /// Values of delegated fields, by parent model.
    parents: BTreeMap<String, Row>,
    links: Vec<Links>,
    inverses: Vec<Inverse>,
}

/// model -> (record ids, fields written)
type Touched = BTreeMap<String, (BTreeSet<i64>, BTreeSet<String>)>;

/// Loads the data of one package.
pub struct DataLoader<'a> {
    registry: &'a Registry,
    package: String,
    lang: String,
    methods: Option<&'a MethodTable>,
    seen: BTreeSet<ExternalId>,
    stats: LoadStats,
}

impl<'a> DataLoader<'a> {
    pub fn new(registry: &'a Registry, package: &str) -> Self {
        Self {
            registry,
            package: package.to_string(),
            lang: "en_US".to_string(),
            methods: None,
            seen: BTreeSet::new(),
            stats: LoadStats::default(),
        }
    }

    /// Language plain strings of translatable fields are stored under.
    pub fn with_lang(mut self, lang: &str) -> Self {
        self.lang = lang.to_string();
        self
    }

    pub fn with_methods(mut self, methods: &'a MethodTable) -> Self {
        self.methods = Some(methods);
        self
    }

    pub fn stats(&self) -> LoadStats {
        self.stats
    }

    /// External ids written or skipped so far.
    pub fn seen(&self) -> &BTreeSet<ExternalId> {
        &self.seen
    }

    /// Apply the package-relative data files `files`, in order.
    pub fn load_files(&mut self, db: &mut Database, package: &Package, files: &[String]) -> Result<()> {
        for relative in files {
            let path = package.file(relative)?;
            self.load_file(db, &path)?;
        }
        Ok(())
    }

    pub fn load_file(&mut self, db: &mut Database, path: &Path) -> Result<()> {
        let file = DataFile::load(&self.package, path)?;
        tracing::debug!(
            package = self.package.as_str(),
            path = %path.display(),
            records = file.record.len() + file.access.len(),
            "applying data file"
        );
        self.apply(db, &file)
    }

    /// Apply a parsed data file.
    pub fn apply(&mut self, db: &mut Database, file: &DataFile) -> Result<()> {
        let records = file.records();

        let mut plans = Vec::with_capacity(records.len());
        let mut planned: HashMap<ExternalId, i64> = HashMap::new();
        for spec in &records {
            let xid = ExternalId::qualify(&spec.id, &self.package);
            let plan = match planned.get(&xid) {
                Some(&res_id) => Plan::Update(res_id),
                None => self.plan(db, spec, &xid)?,
            };
            if let Plan::Create(res_id) | Plan::Update(res_id) = &plan {
                planned.insert(xid.clone(), *res_id);
            }
            plans.push((xid, plan));
        }

        let mut touched = Touched::new();
        for (spec, (xid, plan)) in records.iter().zip(plans) {
            match plan {
                Plan::Skip => self.stats.skipped += 1,
                Plan::Create(res_id) => {
                    self.write(db, spec, &xid, res_id, true, &mut touched)?;
                    self.stats.created += 1;
                }
                Plan::Update(res_id) => {
                    self.write(db, spec, &xid, res_id, false, &mut touched)?;
                    db.external_ids_mut().set(
                        &xid,
                        ExternalIdRecord {
                            model: spec.model.clone(),
                            res_id,
                            noupdate: spec.noupdate,
                        },
                    );
                    self.stats.updated += 1;
                }
            }
            self.seen.insert(xid);
        }

        let recomputer = self.recomputer();
        for (model, (ids, fields)) in &touched {
            recomputer.recompute(db, model, ids, fields)?;
        }

        for spec in &file.delete {
            self.delete(db, spec)?;
        }
        Ok(())
    }

    fn recomputer(&self) -> Recomputer<'a> {
        let recomputer = Recomputer::new(self.registry);
        match self.methods {
            Some(methods) => recomputer.with_methods(methods),
            None => recomputer,
        }
    }

    fn model(&self, spec: &RecordSpec) -> Result<(&'a ComposedModel, &'a str)> {
        let model = self
            .registry
            .get(&spec.model)
            .ok_or_else(|| Error::UnknownModel {
                record: spec.id.clone(),
                model: spec.model.clone(),
            })?;
        let table = model.table.as_deref().ok_or_else(|| Error::AbstractModel {
            record: spec.id.clone(),
            model: spec.model.clone(),
        })?;
        Ok((model, table))
    }

    /// Pass one: find or reserve the record's primary key.
    fn plan(&self, db: &mut Database, spec: &RecordSpec, xid: &ExternalId) -> Result<Plan> {
        let (_, table) = self.model(spec)?;
        if let Some(existing) = db.external_ids().get(xid).cloned() {
            if existing.model != spec.model {
                return Err(Error::ExternalIdConflict {
                    record: xid.to_string(),
                    model: spec.model.clone(),
                    existing: existing.model,
                });
            }
            if existing.noupdate {
                return Ok(Plan::Skip);
            }
            if db.exists(table, existing.res_id) {
                return Ok(Plan::Update(existing.res_id));
            }
        }
        let res_id = db.reserve_id(table)?;
        db.external_ids_mut().set(
            xid,
            ExternalIdRecord {
                model: spec.model.clone(),
                res_id,
                noupdate: spec.noupdate,
            },
        );
        Ok(Plan::Create(res_id))
    }

    /// Pass two: write one record.
    fn write(
        &mut self,
        db: &mut Database,
        spec: &RecordSpec,
        xid: &ExternalId,
        res_id: i64,
        create: bool,
        touched: &mut Touched,
    ) -> Result<()> {
        let (model, table) = self.model(spec)?;
        let record = xid.to_string();
        let current = if create {
            None
        } else {
            db.get(table, res_id).cloned()
        };
        let mut prepared = self.prepare(db, model, spec, &record, current.as_ref())?;
        let written: BTreeSet<String> = prepared.values.keys().cloned().collect();

        if create {
            for (parent, link) in &model.delegates {
                let values = prepared.parents.remove(parent).unwrap_or_default();
                if let Some(parent_id) = prepared.values.get(link).and_then(Value::as_i64) {
                    self.update_parent(db, parent, parent_id, values, &record, touched)?;
                    continue;
                }
                let parent_model = self.registry.model(parent)?;
                let Some(parent_table) = parent_model.table.as_deref() else {
                    continue;
                };
                let mut values = values;
                self.fill_defaults(parent_model, &mut values);
                check_required(parent_model, &values, &record)?;
                let fields: BTreeSet<String> = values.keys().cloned().collect();
                let parent_id = db
                    .insert(parent_table, values)
                    .map_err(|e| self.store_error(e, &record))?;
                touch(touched, parent, parent_id, fields);
                prepared.values.insert(link.clone(), json!(parent_id));
            }
            self.fill_defaults(model, &mut prepared.values);
            check_required(model, &prepared.values, &record)?;
            db.insert_with_id(table, res_id, prepared.values)
                .map_err(|e| self.store_error(e, &record))?;
        } else {
            let links: Vec<(String, i64)> = model
                .delegates
                .iter()
                .filter_map(|(parent, link)| {
                    let parent_id = current.as_ref()?.get(link)?.as_i64()?;
                    Some((parent.clone(), parent_id))
                })
                .collect();
            for (parent, parent_id) in links {
                if let Some(values) = prepared.parents.remove(&parent) {
                    self.update_parent(db, &parent, parent_id, values, &record, touched)?;
                }
            }
            if !prepared.values.is_empty() {
                db.update(table, res_id, prepared.values)
                    .map_err(|e| self.store_error(e, &record))?;
            }
        }

        for links in prepared.links {
            set_links(db, res_id, &links).map_err(|e| self.store_error(e, &record))?;
        }
        for inverse in prepared.inverses {
            for target in &inverse.targets {
                let mut row = Row::new();
                row.insert(inverse.inverse.clone(), json!(res_id));
                db.update(&inverse.table, *target, row)
                    .map_err(|e| self.store_error(e, &record))?;
            }
        }

        touch(touched, &model.name, res_id, written);
        Ok(())
    }

    fn update_parent(
        &self,
        db: &mut Database,
        parent: &str,
        parent_id: i64,
        values: Row,
        record: &str,
        touched: &mut Touched,
    ) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let parent_model = self.registry.model(parent)?;
        let Some(parent_table) = parent_model.table.as_deref() else {
            return Ok(());
        };
        let fields: BTreeSet<String> = values.keys().cloned().collect();
        db.update(parent_table, parent_id, values)
            .map_err(|e| self.store_error(e, record))?;
        touch(touched, parent, parent_id, fields);
        Ok(())
    }

    fn prepare(
        &self,
        db: &Database,
        model: &ComposedModel,
        spec: &RecordSpec,
        record: &str,
        current: Option<&Row>,
    ) -> Result<Prepared> {
        let mut prepared = Prepared::default();
        for (name, value) in &spec.values {
            let field = model.field(name).ok_or_else(|| Error::UnknownField {
                model: model.name.clone(),
                field: name.clone(),
                record: record.to_string(),
            })?;

            if let Some(parent) = &field.inherited_from {
                let parent_model = self.registry.model(parent)?;
                let parent_field = parent_model.field(name).ok_or_else(|| Error::UnknownField {
                    model: parent.clone(),
                    field: name.clone(),
                    record: record.to_string(),
                })?;
                let parent_current = model
                    .delegates
                    .get(parent)
                    .and_then(|link| current?.get(link)?.as_i64())
                    .and_then(|id| db.get(parent_model.table.as_deref()?, id));
                match self.convert(db, parent_model, parent_field, value, record, parent_current)? {
                    Converted::Column(v) => {
                        prepared
                            .parents
                            .entry(parent.clone())
                            .or_default()
                            .insert(name.clone(), v);
                    }
                    Converted::Links(_) | Converted::Inverse(_) => {
                        return Err(not_writable(model, name, record));
                    }
                }
                continue;
            }

            match self.convert(db, model, field, value, record, current)? {
                Converted::Column(v) => {
                    prepared.values.insert(name.clone(), v);
                }
                Converted::Links(links) => prepared.links.push(links),
                Converted::Inverse(inverse) => prepared.inverses.push(inverse),
            }
        }
        Ok(prepared)
    }

    fn convert(
        &self,
        db: &Database,
        model: &ComposedModel,
        field: &Field,
        value: &ValueSpec,
        record: &str,
        current: Option<&Row>,
    ) -> Result<Converted> {
        let mismatch = |value: String| Error::TypeMismatch {
            model: model.name.clone(),
            field: field.name.clone(),
            record: record.to_string(),
            value,
        };
        if field.is_computed() {
            return Err(not_writable(model, &field.name, record));
        }

        let targets = |refs: &[String], comodel: &str| -> Result<Vec<i64>> {
            refs.iter()
                .map(|r| self.resolve(db, r, comodel, record))
                .collect()
        };

        match (value, &field.ty) {
            (ValueSpec::Ref(reference), FieldType::Many2one { comodel, .. }) => Ok(
                Converted::Column(json!(self.resolve(db, &reference.target, comodel, record)?)),
            ),
            (ValueSpec::Refs(refs), FieldType::Many2many { comodel, .. }) => {
                self.links(model, field, targets(&refs.refs, comodel)?, record)
            }
            (ValueSpec::Refs(refs), FieldType::One2many { comodel, inverse }) => {
                self.inverse(model, field, comodel, inverse, targets(&refs.refs, comodel)?, record)
            }
            (ValueSpec::Literal(Value::Array(items)), FieldType::Many2many { .. })
            | (ValueSpec::Literal(Value::Array(items)), FieldType::One2many { .. }) => {
                let ids = items
                    .iter()
                    .map(|v| v.as_i64().ok_or_else(|| mismatch(v.to_string())))
                    .collect::<Result<Vec<i64>>>()?;
                match &field.ty {
                    FieldType::One2many { comodel, inverse } => {
                        self.inverse(model, field, comodel, inverse, ids, record)
                    }
                    _ => self.links(model, field, ids, record),
                }
            }
            (ValueSpec::Ref(_) | ValueSpec::Refs(_), _) => Err(mismatch(
                serde_json::to_string(value).unwrap_or_default(),
            )),
            (ValueSpec::Literal(literal), _) => {
                if !field.storage.has_column() {
                    return Err(not_writable(model, &field.name, record));
                }
                if field.translate {
                    return self
                        .translated(literal, current.and_then(|row| row.get(&field.name)))
                        .map(Converted::Column)
                        .ok_or_else(|| mismatch(literal.to_string()));
                }
                let ty = column_type(field).ok_or_else(|| not_writable(model, &field.name, record))?;
                ty.coerce(literal.clone())
                    .map(Converted::Column)
                    .map_err(|v| mismatch(v.to_string()))
            }
        }
    }

    /// Merge a literal into a translated value: a string sets the
    /// loader's language, an object sets each language it names.
    fn translated(&self, literal: &Value, current: Option<&Value>) -> Option<Value> {
        let mut map = current
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        match literal {
            Value::Null => return Some(Value::Null),
            Value::String(text) => {
                map.insert(self.lang.clone(), Value::String(text.clone()));
            }
            Value::Object(terms) if terms.values().all(Value::is_string) => {
                map.extend(terms.clone());
            }
            _ => return None,
        }
        Some(Value::Object(map))
    }

    fn links(&self, model: &ComposedModel, field: &Field, targets: Vec<i64>, record: &str) -> Result<Converted> {
        match &field.ty {
            FieldType::Many2many {
                relation: Some(relation),
                column1: Some(column1),
                column2: Some(column2),
                ..
            } if field.storage == Storage::RelationTable => Ok(Converted::Links(Links {
                relation: relation.clone(),
                column1: column1.clone(),
                column2: column2.clone(),
                targets,
            })),
            _ => Err(not_writable(model, &field.name, record)),
        }
    }

    fn inverse(
        &self,
        model: &ComposedModel,
        field: &Field,
        comodel: &str,
        inverse: &str,
        targets: Vec<i64>,
        record: &str,
    ) -> Result<Converted> {
        let table = self
            .registry
            .get(comodel)
            .and_then(|m| m.table.clone())
            .ok_or_else(|| not_writable(model, &field.name, record))?;
        Ok(Converted::Inverse(Inverse {
            table,
            inverse: inverse.to_string(),
            targets,
        }))
    }

    /// The primary key `reference` names, which must be a `comodel` record.
    fn resolve(&self, db: &Database, reference: &str, comodel: &str, record: &str) -> Result<i64> {
        let xid = ExternalId::qualify(reference, &self.package);
        let target = db
            .external_ids()
            .get(&xid)
            .ok_or_else(|| Error::UnresolvedReference {
                record: record.to_string(),
                reference: xid.to_string(),
            })?;
        if target.model != comodel {
            return Err(Error::ExternalIdConflict {
                record: xid.to_string(),
                model: comodel.to_string(),
                existing: target.model.clone(),
            });
        }
        Ok(target.res_id)
    }

    /// Defaults the store cannot apply itself: translated text.
    fn fill_defaults(&self, model: &ComposedModel, values: &mut Row) {
        for field in model.stored_fields() {
            if field.inherited_from.is_some() || !field.translate || values.contains_key(&field.name) {
                continue;
            }
            if let Some(Value::String(text)) = &field.default {
                let mut map = Map::new();
                map.insert(self.lang.clone(), Value::String(text.clone()));
                values.insert(field.name.clone(), Value::Object(map));
            }
        }
    }

    fn delete(&mut self, db: &mut Database, spec: &DeleteSpec) -> Result<()> {
        let xid = ExternalId::qualify(&spec.id, &self.package);
        if remove_record(db, self.registry, &xid)? {
            self.stats.deleted += 1;
        } else {
            tracing::debug!(record = %xid, "nothing to delete");
        }
        Ok(())
    }

    /// Delete the package's records that this load did not see and that
    /// are not `noupdate`. Used after an upgrade re-applied every file.
    pub fn remove_obsolete(&mut self, db: &mut Database) -> Result<Vec<ExternalId>> {
        let obsolete: Vec<ExternalId> = db
            .external_ids()
            .owned_by(&self.package)
            .into_iter()
            .filter(|(xid, record)| !record.noupdate && !self.seen.contains(xid))
            .map(|(xid, _)| xid)
            .collect();
        let removed = remove_records(db, self.registry, &obsolete)?;
        self.stats.deleted += removed.len();
        for xid in &removed {
            tracing::info!(package = self.package.as_str(), record = %xid, "removed obsolete record");
        }
        Ok(removed)
    }

    /// Overlay the package's `i18n/<lang>.toml` terms.
    pub fn load_translations(&mut self, db: &mut Database, package: &Package) -> Result<usize> {
        let mut applied = 0;
        for (lang, path) in package.translation_files()? {
            let file = crate::i18n::TranslationFile::load(&self.package, &path)?;
            for term in &file.term {
                let xid = ExternalId::qualify(&term.record, &self.package);
                self.translate(db, &xid, &term.field, &lang, &term.value)?;
                applied += 1;
            }
        }
        self.stats.translated += applied;
        Ok(applied)
    }

    fn translate(&self, db: &mut Database, xid: &ExternalId, field: &str, lang: &str, text: &str) -> Result<()> {
        let record = xid.to_string();
        let target = db
            .external_ids()
            .get(xid)
            .cloned()
            .ok_or_else(|| Error::UnresolvedReference {
                record: record.clone(),
                reference: record.clone(),
            })?;
        let model = self.registry.model(&target.model)?;
        let composed = model.field(field).ok_or_else(|| Error::UnknownField {
            model: model.name.clone(),
            field: field.to_string(),
            record: record.clone(),
        })?;
        let (table, res_id) = match &composed.inherited_from {
            Some(parent) => {
                let parent_model = self.registry.model(parent)?;
                let link = model.delegates.get(parent);
                let parent_id = model
                    .table
                    .as_deref()
                    .and_then(|t| db.get(t, target.res_id))
                    .and_then(|row| row.get(link?)?.as_i64());
                match (parent_model.table.as_deref(), parent_id) {
                    (Some(table), Some(id)) => (table.to_string(), id),
                    _ => return Err(not_writable(model, field, &record)),
                }
            }
            None => match model.table.as_deref() {
                Some(table) => (table.to_string(), target.res_id),
                None => return Err(not_writable(model, field, &record)),
            },
        };
        if !composed.translate {
            return Err(not_writable(model, field, &record));
        }

        let mut map = db
            .get(&table, res_id)
            .and_then(|row| row.get(field))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        map.insert(lang.to_string(), Value::String(text.to_string()));
        let mut row = Row::new();
        row.insert(field.to_string(), Value::Object(map));
        db.update(&table, res_id, row)
            .map_err(|e| self.store_error(e, &record))?;
        Ok(())
    }

    fn store_error(&self, error: addon_store::Error, record: &str) -> Error {
        store_error(self.registry, error, record)
    }
}

fn not_writable(model: &ComposedModel, field: &str, record: &str) -> Error {
    Error::NotWritable {
        model: model.name.clone(),
        field: field.to_string(),
        record: record.to_string(),
    }
}

fn touch(touched: &mut Touched, model: &str, id: i64, fields: BTreeSet<String>) {
    let entry = touched.entry(model.to_string()).or_default();
    entry.0.insert(id);
    entry.1.extend(fields);
}

/// Fail with `RequiredFieldMissing` for the first required column field
/// with neither a value nor a default.
fn check_required(model: &ComposedModel, values: &Row, record: &str) -> Result<()> {
    let missing = model.stored_fields().find(|field| {
        field.required
            && field.storage == Storage::Column
            && field.inherited_from.is_none()
            && field.default.is_none()
            && values.get(&field.name).is_none_or(Value::is_null)
    });
    match missing {
        Some(field) => Err(Error::RequiredFieldMissing {
            model: model.name.clone(),
            field: field.name.clone(),
            record: record.to_string(),
        }),
        None => Ok(()),
    }
}

/// Make the relation rows of `res_id` match `links.targets`.
fn set_links(db: &mut Database, res_id: i64, links: &Links) -> addon_store::Result<()> {
    let mut existing: BTreeMap<i64, i64> = BTreeMap::new();
    for row_id in db.search(&links.relation, &links.column1, &json!(res_id))? {
        if let Some(target) = db
            .get(&links.relation, row_id)
            .and_then(|row| row.get(&links.column2))
            .and_then(Value::as_i64)
        {
            existing.insert(target, row_id);
        }
    }
    for (target, row_id) in &existing {
        if !links.targets.contains(target) {
            db.delete(&links.relation, *row_id)?;
        }
    }
    for target in &links.targets {
        if !existing.contains_key(target) {
            let mut row = Row::new();
            row.insert(links.column1.clone(), json!(res_id));
            row.insert(links.column2.clone(), json!(target));
            db.insert(&links.relation, row)?;
        }
    }
    Ok(())
}

fn model_for_table(registry: &Registry, table: &str) -> Option<String> {
    registry
        .models()
        .find(|m| m.table.as_deref() == Some(table))
        .map(|m| m.name.clone())
}

fn store_error(registry: &Registry, error: addon_store::Error, record: &str) -> Error {
    use addon_store::Error as Store;
    match error {
        Store::NotNullViolation { table, column } => Error::RequiredFieldMissing {
            model: model_for_table(registry, &table).unwrap_or(table),
            field: column,
            record: record.to_string(),
        },
        Store::TypeMismatch {
            table,
            column,
            value,
            ..
        } => Error::TypeMismatch {
            model: model_for_table(registry, &table).unwrap_or(table),
            field: column,
            record: record.to_string(),
            value,
        },
        e @ (Store::UniqueViolation { .. }
        | Store::CheckViolation { .. }
        | Store::ForeignKeyViolation { .. }) => Error::ConstraintViolation {
            record: record.to_string(),
            message: e.to_string(),
        },
        other => Error::Store(other),
    }
}

/// Delete the row `xid` names, with everything its deletion cascades
/// to, and drop their external ids. Returns whether a record existed.
pub fn remove_record(db: &mut Database, registry: &Registry, xid: &ExternalId) -> Result<bool> {
    let Some(target) = db.external_ids().get(xid).cloned() else {
        return Ok(false);
    };
    let table = registry
        .get(&target.model)
        .and_then(|m| m.table.clone())
        .unwrap_or_else(|| table_name(&target.model));
    if db.exists(&table, target.res_id) {
        let removed = db
            .delete(&table, target.res_id)
            .map_err(|e| store_error(registry, e, &xid.to_string()))?;
        for (removed_table, id) in removed {
            let model = model_for_table(registry, &removed_table).unwrap_or(removed_table);
            db.external_ids_mut().remove_record(&model, id);
        }
    }
    db.external_ids_mut().remove(xid);
    Ok(true)
}

/// Delete the records `xids` name. Records still referenced by other
/// records are retried after the rest, so order within `xids` does not
/// matter. Returns the ids actually removed.
pub fn remove_records(
    db: &mut Database,
    registry: &Registry,
    xids: &[ExternalId],
) -> Result<Vec<ExternalId>> {
    let mut pending: Vec<ExternalId> = xids.to_vec();
    let mut removed = Vec::new();
    loop {
        let mut blocked = Vec::new();
        let mut last_error = None;
        let before = removed.len();
        for xid in pending {
            match remove_record(db, registry, &xid) {
                Ok(true) => removed.push(xid),
                Ok(false) => {}
                Err(e @ Error::ConstraintViolation { .. }) => {
                    last_error = Some(e);
                    blocked.push(xid);
                }
                Err(e) => return Err(e),
            }
        }
        match last_error {
            None => return Ok(removed),
            Some(e) if removed.len() == before => return Err(e),
            Some(_) => pending = blocked,
        }
    }
}

/// Delete every record owned by `package`.
pub fn remove_package_records(
    db: &mut Database,
    registry: &Registry,
    package: &str,
) -> Result<Vec<ExternalId>> {
    let owned: Vec<ExternalId> = db
        .external_ids()
        .owned_by(package)
        .into_iter()
        .map(|(xid, _)| xid)
        .collect();
    remove_records(db, registry, &owned)
}
