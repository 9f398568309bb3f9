//! The database: tables, external ids and package records, persisted as
//! one JSON document.
//!
//! A database is opened from a URL: `memory:` keeps everything in
//! process, `file:///path/db.json` (or a bare path) loads the document
//! under a shared lock and saves it atomically under an exclusive lock.
//!
//! Transactions snapshot the whole state on [`begin`](Database::begin);
//! [`rollback`](Database::rollback) restores it. Foreign keys are checked
//! at commit while a transaction is open, so rows may reference ids that
//! are only reserved so far.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use addon_fs::NormalizedPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::external_id::ExternalIds;
use crate::package::PackageRecord;
use crate::table::{
    CheckConstraint, Column, ColumnType, ForeignKeyConstraint, ReferentialAction, Row, Table,
    UniqueConstraint,
};

const FORMAT_VERSION: &str = "1";

/// Where the database document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Memory,
    File(PathBuf),
}

impl Location {
    /// Parse a database URL: `memory:`, `file://<path>` or a plain path.
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() || url == "memory:" || url == "memory://" {
            return Ok(Self::Memory);
        }
        if let Some(path) = url.strip_prefix("file://") {
            if path.is_empty() {
                return Err(Error::UnsupportedUrl(url.to_string()));
            }
            return Ok(Self::File(PathBuf::from(path)));
        }
        if url.contains("://") {
            return Err(Error::UnsupportedUrl(url.to_string()));
        }
        Ok(Self::File(PathBuf::from(url)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Document {
    version: String,
    #[serde(default)]
    tables: BTreeMap<String, Table>,
    #[serde(default)]
    external_ids: ExternalIds,
    #[serde(default)]
    packages: BTreeMap<String, PackageRecord>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            tables: BTreeMap::new(),
            external_ids: ExternalIds::new(),
            packages: BTreeMap::new(),
        }
    }
}

/// A copy of the database state to return to within a transaction.
#[derive(Debug, Clone)]
pub struct Savepoint(Document);

/// The relational store.
#[derive(Debug)]
pub struct Database {
    location: Location,
    doc: Document,
    snapshot: Option<Document>,
}

impl Database {
    /// An empty in-memory database.
    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            doc: Document::default(),
            snapshot: None,
        }
    }

    /// Open the database at `url`, loading the document if it exists.
    pub fn open(url: &str) -> Result<Self> {
        let location = Location::parse(url)?;
        let doc = match &location {
            Location::Memory => Document::default(),
            Location::File(path) => {
                match addon_fs::io::read_locked(&NormalizedPath::new(path))? {
                    Some(content) if !content.trim().is_empty() => serde_json::from_str(&content)
                        .map_err(|e| Error::Corrupt {
                            path: path.clone(),
                            message: e.to_string(),
                        })?,
                    _ => Document::default(),
                }
            }
        };
        tracing::debug!(?location, tables = doc.tables.len(), "opened database");
        Ok(Self {
            location,
            doc,
            snapshot: None,
        })
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Write the document to its file. A no-op for in-memory databases.
    pub fn save(&self) -> Result<()> {
        let Location::File(path) = &self.location else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(&self.doc).map_err(|e| Error::Corrupt {
            path: path.clone(),
            message: e.to_string(),
        })?;
        addon_fs::io::write_atomic(&NormalizedPath::new(path), content.as_bytes())?;
        Ok(())
    }

    // Transactions

    pub fn begin(&mut self) -> Result<()> {
        if self.snapshot.is_some() {
            return Err(Error::NestedTransaction);
        }
        self.snapshot = Some(self.doc.clone());
        Ok(())
    }

    /// Check deferred constraints, end the transaction and persist. A
    /// failed check rolls the transaction back.
    pub fn commit(&mut self) -> Result<()> {
        if self.snapshot.is_none() {
            return Err(Error::NoTransaction);
        }
        if let Err(err) = self.check_foreign_keys() {
            self.rollback()?;
            return Err(err);
        }
        self.snapshot = None;
        self.save()
    }

    pub fn rollback(&mut self) -> Result<()> {
        let snapshot = self.snapshot.take().ok_or(Error::NoTransaction)?;
        self.doc = snapshot;
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Mark the current state so part of a transaction can be undone.
    pub fn savepoint(&self) -> Result<Savepoint> {
        if self.snapshot.is_none() {
            return Err(Error::NoTransaction);
        }
        Ok(Savepoint(self.doc.clone()))
    }

    /// Undo everything since `savepoint`.
    pub fn rollback_to(&mut self, savepoint: Savepoint) {
        self.doc = savepoint.0;
    }

    // Schema

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.doc
            .tables
            .get(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.doc
            .tables
            .get_mut(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.doc.tables.contains_key(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.doc.tables.values()
    }

    pub fn create_table(&mut self, name: &str) -> Result<()> {
        if self.has_table(name) {
            return Err(Error::TableExists(name.to_string()));
        }
        self.doc.tables.insert(name.to_string(), Table::new(name));
        Ok(())
    }

    /// Drop a table and every foreign key pointing at it.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        self.doc
            .tables
            .remove(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))?;
        for table in self.doc.tables.values_mut() {
            table.foreign_keys.retain(|fk| fk.references != name);
        }
        Ok(())
    }

    /// Add a column; existing rows get the column default (or null).
    pub fn add_column(&mut self, table: &str, column: Column) -> Result<()> {
        let t = self.table_mut(table)?;
        if t.has_column(&column.name) {
            return Err(Error::ColumnExists {
                table: table.to_string(),
                column: column.name,
            });
        }
        let fill = column.default.clone().unwrap_or(Value::Null);
        if column.not_null && fill.is_null() && !t.is_empty() {
            return Err(Error::NotNullViolation {
                table: table.to_string(),
                column: column.name,
            });
        }
        for row in t.rows.values_mut() {
            row.insert(column.name.clone(), fill.clone());
        }
        t.columns.insert(column.name.clone(), column);
        Ok(())
    }

    /// Drop a column with its constraints and indexes.
    pub fn drop_column(&mut self, table: &str, column: &str) -> Result<()> {
        let t = self.table_mut(table)?;
        if t.columns.shift_remove(column).is_none() {
            return Err(unknown_column(table, column));
        }
        for row in t.rows.values_mut() {
            row.remove(column);
        }
        t.indexes.retain(|_, cols| !cols.iter().any(|c| c == column));
        t.uniques.retain(|u| !u.columns.iter().any(|c| c == column));
        t.checks.retain(|c| c.column != column);
        t.foreign_keys.retain(|fk| fk.column != column);
        Ok(())
    }

    /// Set or clear `NOT NULL`; setting it fails while null rows exist.
    pub fn set_not_null(&mut self, table: &str, column: &str, not_null: bool) -> Result<()> {
        let t = self.table_mut(table)?;
        if not_null && t.has_nulls(column) {
            return Err(Error::NotNullViolation {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
        t.columns
            .get_mut(column)
            .ok_or_else(|| unknown_column(table, column))?
            .not_null = not_null;
        Ok(())
    }

    pub fn set_default(&mut self, table: &str, column: &str, default: Option<Value>) -> Result<()> {
        self.table_mut(table)?
            .columns
            .get_mut(column)
            .ok_or_else(|| unknown_column(table, column))?
            .default = default;
        Ok(())
    }

    /// Replace null values of `column` with `value`. Returns the number of
    /// rows changed.
    pub fn fill_nulls(&mut self, table: &str, column: &str, value: &Value) -> Result<usize> {
        let t = self.table_mut(table)?;
        let ty = t
            .column(column)
            .ok_or_else(|| unknown_column(table, column))?
            .ty
            .clone();
        let value = ty
            .coerce(value.clone())
            .map_err(|v| type_mismatch(table, column, &ty, &v))?;
        let mut changed = 0;
        for row in t.rows.values_mut() {
            let slot = row.entry(column.to_string()).or_insert(Value::Null);
            if slot.is_null() {
                *slot = value.clone();
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Change a column's type, re-checking every stored value.
    pub fn alter_column_type(&mut self, table: &str, column: &str, ty: ColumnType) -> Result<()> {
        let t = self.table_mut(table)?;
        if !t.has_column(column) {
            return Err(unknown_column(table, column));
        }
        for row in t.rows.values_mut() {
            if let Some(value) = row.get_mut(column) {
                *value = ty
                    .coerce(value.take())
                    .map_err(|v| type_mismatch(table, column, &ty, &v))?;
            }
        }
        if let Some(col) = t.columns.get_mut(column) {
            col.ty = ty;
        }
        Ok(())
    }

    pub fn create_index(&mut self, table: &str, name: &str, columns: Vec<String>) -> Result<()> {
        let t = self.table_mut(table)?;
        if let Some(missing) = columns.iter().find(|c| !t.has_column(c)) {
            return Err(unknown_column(table, missing));
        }
        t.indexes.insert(name.to_string(), columns);
        Ok(())
    }

    /// Add a unique constraint, failing if current rows violate it.
    pub fn add_unique(&mut self, table: &str, unique: UniqueConstraint) -> Result<()> {
        let t = self.table_mut(table)?;
        if let Some(missing) = unique.columns.iter().find(|c| !t.has_column(c)) {
            return Err(unknown_column(table, missing));
        }
        let mut seen = BTreeSet::new();
        for row in t.rows.values() {
            if let Some(key) = unique_key(row, &unique.columns)
                && !seen.insert(key)
            {
                return Err(Error::UniqueViolation {
                    table: table.to_string(),
                    constraint: unique.name,
                });
            }
        }
        t.uniques.retain(|u| u.name != unique.name);
        t.uniques.push(unique);
        Ok(())
    }

    /// Add a check constraint, failing if current rows violate it.
    pub fn add_check(&mut self, table: &str, check: CheckConstraint) -> Result<()> {
        let t = self.table_mut(table)?;
        if !t.has_column(&check.column) {
            return Err(unknown_column(table, &check.column));
        }
        if t
            .rows
            .values()
            .any(|row| !check.accepts(row.get(&check.column).unwrap_or(&Value::Null)))
        {
            return Err(Error::CheckViolation {
                table: table.to_string(),
                constraint: check.name,
            });
        }
        t.checks.retain(|c| c.name != check.name);
        t.checks.push(check);
        Ok(())
    }

    /// Add a foreign key. Current values are checked immediately.
    pub fn add_foreign_key(&mut self, table: &str, fk: ForeignKeyConstraint) -> Result<()> {
        self.table(&fk.references)?;
        let t = self.table(table)?;
        if !t.has_column(&fk.column) {
            return Err(unknown_column(table, &fk.column));
        }
        self.check_foreign_key(t, &fk)?;
        let t = self.table_mut(table)?;
        t.foreign_keys.retain(|f| f.name != fk.name);
        t.foreign_keys.push(fk);
        Ok(())
    }

    /// Drop a named index or constraint. Returns whether one was found.
    pub fn drop_constraint(&mut self, table: &str, name: &str) -> Result<bool> {
        let t = self.table_mut(table)?;
        let before = t.indexes.len() + t.uniques.len() + t.checks.len() + t.foreign_keys.len();
        t.indexes.remove(name);
        t.uniques.retain(|u| u.name != name);
        t.checks.retain(|c| c.name != name);
        t.foreign_keys.retain(|f| f.name != name);
        let after = t.indexes.len() + t.uniques.len() + t.checks.len() + t.foreign_keys.len();
        Ok(after < before)
    }

    // Rows

    pub fn get(&self, table: &str, id: i64) -> Option<&Row> {
        self.doc.tables.get(table)?.rows.get(&id)
    }

    pub fn exists(&self, table: &str, id: i64) -> bool {
        self.get(table, id).is_some()
    }

    pub fn rows(&self, table: &str) -> Result<&BTreeMap<i64, Row>> {
        Ok(&self.table(table)?.rows)
    }

    /// Ids of rows whose `column` equals `value`.
    pub fn search(&self, table: &str, column: &str, value: &Value) -> Result<Vec<i64>> {
        Ok(self.table(table)?.find(column, value))
    }

    /// Allocate a primary key without inserting a row.
    pub fn reserve_id(&mut self, table: &str) -> Result<i64> {
        let t = self.table_mut(table)?;
        let id = t.next_id;
        t.next_id += 1;
        Ok(id)
    }

    /// Insert a row under a fresh id, applying column defaults.
    pub fn insert(&mut self, table: &str, row: Row) -> Result<i64> {
        let id = self.reserve_id(table)?;
        self.insert_with_id(table, id, row)?;
        Ok(id)
    }

    /// Insert a row under an id obtained from [`reserve_id`](Self::reserve_id).
    pub fn insert_with_id(&mut self, table: &str, id: i64, row: Row) -> Result<()> {
        let t = self.table(table)?;
        if t.rows.contains_key(&id) {
            return Err(Error::UniqueViolation {
                table: table.to_string(),
                constraint: format!("{table}_pkey"),
            });
        }
        let mut merged = Row::new();
        for column in t.columns.values() {
            merged.insert(
                column.name.clone(),
                column.default.clone().unwrap_or(Value::Null),
            );
        }
        let row = self.validate(t, id, merged, row)?;
        let t = self.table_mut(table)?;
        t.next_id = t.next_id.max(id + 1);
        t.rows.insert(id, row);
        Ok(())
    }

    /// Overwrite some columns of an existing row.
    pub fn update(&mut self, table: &str, id: i64, values: Row) -> Result<()> {
        let t = self.table(table)?;
        let current = t.rows.get(&id).cloned().ok_or_else(|| Error::RowNotFound {
            table: table.to_string(),
            id,
        })?;
        let row = self.validate(t, id, current, values)?;
        self.table_mut(table)?.rows.insert(id, row);
        Ok(())
    }

    /// Delete a row, applying the `on delete` action of every foreign key
    /// that references it. Returns every `(table, id)` removed, the
    /// requested row first.
    pub fn delete(&mut self, table: &str, id: i64) -> Result<Vec<(String, i64)>> {
        if !self.exists(table, id) {
            return Err(Error::RowNotFound {
                table: table.to_string(),
                id,
            });
        }

        let mut planned: Vec<(String, i64)> = Vec::new();
        let mut set_null: Vec<(String, i64, String)> = Vec::new();
        let mut pending = vec![(table.to_string(), id)];

        while let Some((target, target_id)) = pending.pop() {
            if planned.iter().any(|(t, i)| *t == target && *i == target_id) {
                continue;
            }
            planned.push((target.clone(), target_id));

            for (name, referrer) in &self.doc.tables {
                for fk in referrer.foreign_keys.iter().filter(|fk| fk.references == target) {
                    for referrer_id in referrer.find(&fk.column, &Value::from(target_id)) {
                        if planned.iter().any(|(t, i)| t == name && *i == referrer_id) {
                            continue;
                        }
                        match fk.on_delete {
                            ReferentialAction::Cascade => pending.push((name.clone(), referrer_id)),
                            ReferentialAction::SetNull => {
                                let not_null =
                                    referrer.column(&fk.column).is_some_and(|c| c.not_null);
                                if not_null {
                                    return Err(Error::NotNullViolation {
                                        table: name.clone(),
                                        column: fk.column.clone(),
                                    });
                                }
                                set_null.push((name.clone(), referrer_id, fk.column.clone()));
                            }
                            ReferentialAction::Restrict => {
                                return Err(Error::ForeignKeyViolation {
                                    table: name.clone(),
                                    column: fk.column.clone(),
                                    detail: format!(
                                        "row {referrer_id} still references {target} row {target_id}"
                                    ),
                                });
                            }
                        }
                    }
                }
            }
        }

        for (name, referrer_id, column) in set_null {
            if planned.iter().any(|(t, i)| *t == name && *i == referrer_id) {
                continue;
            }
            if let Some(row) = self
                .doc
                .tables
                .get_mut(&name)
                .and_then(|t| t.rows.get_mut(&referrer_id))
            {
                row.insert(column, Value::Null);
            }
        }
        for (name, row_id) in &planned {
            if let Some(t) = self.doc.tables.get_mut(name) {
                t.rows.remove(row_id);
            }
        }
        tracing::debug!(table, id, removed = planned.len(), "deleted row");
        Ok(planned)
    }

    /// Verify every foreign key of every table.
    pub fn check_foreign_keys(&self) -> Result<()> {
        for table in self.doc.tables.values() {
            for fk in &table.foreign_keys {
                self.check_foreign_key(table, fk)?;
            }
        }
        Ok(())
    }

    fn check_foreign_key(&self, table: &Table, fk: &ForeignKeyConstraint) -> Result<()> {
        for (id, row) in &table.rows {
            let value = row.get(&fk.column).unwrap_or(&Value::Null);
            if value.is_null() {
                continue;
            }
            let target = value.as_i64();
            if !target.is_some_and(|target| self.exists(&fk.references, target)) {
                return Err(Error::ForeignKeyViolation {
                    table: table.name.clone(),
                    column: fk.column.clone(),
                    detail: format!(
                        "row {id} references missing {} row {value}",
                        fk.references
                    ),
                });
            }
        }
        Ok(())
    }

    /// Overlay `values` on `base` and check types, nullability, checks,
    /// uniqueness, and (outside transactions) foreign keys.
    fn validate(&self, table: &Table, id: i64, mut base: Row, values: Row) -> Result<Row> {
        for (name, value) in values {
            let column = table
                .column(&name)
                .ok_or_else(|| unknown_column(&table.name, &name))?;
            let value = column
                .ty
                .coerce(value)
                .map_err(|v| type_mismatch(&table.name, &name, &column.ty, &v))?;
            base.insert(name, value);
        }

        for column in table.columns.values() {
            let value = base.get(&column.name).unwrap_or(&Value::Null);
            if column.not_null && value.is_null() {
                return Err(Error::NotNullViolation {
                    table: table.name.clone(),
                    column: column.name.clone(),
                });
            }
        }

        for check in &table.checks {
            if !check.accepts(base.get(&check.column).unwrap_or(&Value::Null)) {
                return Err(Error::CheckViolation {
                    table: table.name.clone(),
                    constraint: check.name.clone(),
                });
            }
        }

        for unique in &table.uniques {
            let Some(key) = unique_key(&base, &unique.columns) else {
                continue;
            };
            let clash = table
                .rows
                .iter()
                .any(|(other, row)| *other != id && unique_key(row, &unique.columns).as_ref() == Some(&key));
            if clash {
                return Err(Error::UniqueViolation {
                    table: table.name.clone(),
                    constraint: unique.name.clone(),
                });
            }
        }

        if !self.in_transaction() {
            for fk in &table.foreign_keys {
                let value = base.get(&fk.column).unwrap_or(&Value::Null);
                if let Some(target) = value.as_i64()
                    && !self.exists(&fk.references, target)
                {
                    return Err(Error::ForeignKeyViolation {
                        table: table.name.clone(),
                        column: fk.column.clone(),
                        detail: format!("{} row {target} does not exist", fk.references),
                    });
                }
            }
        }

        Ok(base)
    }

    // External ids and packages

    pub fn external_ids(&self) -> &ExternalIds {
        &self.doc.external_ids
    }

    pub fn external_ids_mut(&mut self) -> &mut ExternalIds {
        &mut self.doc.external_ids
    }

    pub fn package(&self, name: &str) -> Option<&PackageRecord> {
        self.doc.packages.get(name)
    }

    /// The record of `name`, created uninstalled if absent.
    pub fn package_mut(&mut self, name: &str) -> &mut PackageRecord {
        self.doc.packages.entry(name.to_string()).or_default()
    }

    pub fn packages(&self) -> impl Iterator<Item = (&str, &PackageRecord)> {
        self.doc.packages.iter().map(|(n, r)| (n.as_str(), r))
    }

    /// Names of installed packages.
    pub fn installed_packages(&self) -> BTreeSet<String> {
        self.doc
            .packages
            .iter()
            .filter(|(_, r)| r.is_installed())
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn remove_package(&mut self, name: &str) -> Option<PackageRecord> {
        self.doc.packages.remove(name)
    }
}

/// The values of `columns` in `row`, or `None` if any is null (nulls never
/// clash).
fn unique_key(row: &Row, columns: &[String]) -> Option<Vec<String>> {
    columns
        .iter()
        .map(|c| match row.get(c) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.to_string()),
        })
        .collect()
}

fn unknown_column(table: &str, column: &str) -> Error {
    Error::UnknownColumn {
        table: table.to_string(),
        column: column.to_string(),
    }
}

fn type_mismatch(table: &str, column: &str, ty: &ColumnType, value: &Value) -> Error {
    Error::TypeMismatch {
        table: table.to_string(),
        column: column.to_string(),
        expected: ty.to_string(),
        value: value.to_string(),
    }
}
