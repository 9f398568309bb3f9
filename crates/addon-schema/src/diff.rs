//! Diffing desired tables against the store, and applying the result.
//!
//! A diff only ever adds or widens. Dropping a column or table takes an
//! explicit call to [`Synchronizer::drops`].

use std::collections::BTreeSet;

use addon_model::Registry;
use addon_store::{
    CheckConstraint, Column, ColumnType, Database, ForeignKeyConstraint, ReferentialAction, Table,
    UniqueConstraint,
};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::plan::{RelationSpec, TableSpec, relation_tables};

/// One schema change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SchemaOp {
    CreateTable {
        table: String,
    },
    AddColumn {
        table: String,
        column: Column,
    },
    /// Back-fill nulls with `backfill`, then add `NOT NULL`.
    SetNotNull {
        table: String,
        column: String,
        backfill: Option<Value>,
    },
    DropNotNull {
        table: String,
        column: String,
    },
    SetDefault {
        table: String,
        column: String,
        default: Value,
    },
    DropDefault {
        table: String,
        column: String,
    },
    WidenNumeric {
        table: String,
        column: String,
        precision: u32,
        scale: u32,
    },
    WidenVarchar {
        table: String,
        column: String,
        size: Option<u32>,
    },
    ExtendChoices {
        table: String,
        column: String,
        choices: Vec<String>,
    },
    CreateIndex {
        table: String,
        name: String,
        columns: Vec<String>,
    },
    AddUnique {
        table: String,
        constraint: UniqueConstraint,
    },
    AddCheck {
        table: String,
        constraint: CheckConstraint,
    },
    AddForeignKey {
        table: String,
        constraint: ForeignKeyConstraint,
    },
    CreateRelationTable {
        relation: RelationSpec,
    },
    DropColumn {
        table: String,
        column: String,
    },
    DropTable {
        table: String,
    },
}

impl SchemaOp {
    /// The table the operation touches.
    pub fn table(&self) -> &str {
        match self {
            Self::CreateRelationTable { relation } => &relation.name,
            Self::CreateTable { table }
            | Self::AddColumn { table, .. }
            | Self::SetNotNull { table, .. }
            | Self::DropNotNull { table, .. }
            | Self::SetDefault { table, .. }
            | Self::DropDefault { table, .. }
            | Self::WidenNumeric { table, .. }
            | Self::WidenVarchar { table, .. }
            | Self::ExtendChoices { table, .. }
            | Self::CreateIndex { table, .. }
            | Self::AddUnique { table, .. }
            | Self::AddCheck { table, .. }
            | Self::AddForeignKey { table, .. }
            | Self::DropColumn { table, .. }
            | Self::DropTable { table } => table,
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::DropColumn { .. } | Self::DropTable { .. })
    }

    /// Apply the operation to the store.
    pub fn apply(&self, db: &mut Database) -> Result<()> {
        match self {
            Self::CreateTable { table } => db.create_table(table)?,
            Self::AddColumn { table, column } => db.add_column(table, column.clone())?,
            Self::SetNotNull {
                table,
                column,
                backfill,
            } => {
                if let Some(value) = backfill {
                    let filled = db.fill_nulls(table, column, value)?;
                    if filled > 0 {
                        tracing::debug!(table, column, filled, "back-filled nulls");
                    }
                }
                db.set_not_null(table, column, true)?;
            }
            Self::DropNotNull { table, column } => db.set_not_null(table, column, false)?,
            Self::SetDefault {
                table,
                column,
                default,
            } => db.set_default(table, column, Some(default.clone()))?,
            Self::DropDefault { table, column } => db.set_default(table, column, None)?,
            Self::WidenNumeric {
                table,
                column,
                precision,
                scale,
            } => db.alter_column_type(
                table,
                column,
                ColumnType::Numeric {
                    precision: *precision,
                    scale: *scale,
                },
            )?,
            Self::WidenVarchar {
                table,
                column,
                size,
            } => db.alter_column_type(table, column, ColumnType::Varchar { size: *size })?,
            Self::ExtendChoices {
                table,
                column,
                choices,
            } => db.alter_column_type(
                table,
                column,
                ColumnType::Selection {
                    choices: choices.clone(),
                },
            )?,
            Self::CreateIndex {
                table,
                name,
                columns,
            } => db.create_index(table, name, columns.clone())?,
            Self::AddUnique { table, constraint } => db.add_unique(table, constraint.clone())?,
            Self::AddCheck { table, constraint } => db.add_check(table, constraint.clone())?,
            Self::AddForeignKey { table, constraint } => {
                db.add_foreign_key(table, constraint.clone())?
            }
            Self::CreateRelationTable { relation } => create_relation_table(db, relation)?,
            Self::DropColumn { table, column } => db.drop_column(table, column)?,
            Self::DropTable { table } => db.drop_table(table)?,
        }
        Ok(())
    }
}

fn create_relation_table(db: &mut Database, relation: &RelationSpec) -> Result<()> {
    let name = &relation.name;
    db.create_table(name)?;
    for (column, target) in [
        (&relation.column1, &relation.table1),
        (&relation.column2, &relation.table2),
    ] {
        let mut col = Column::new(column.as_str(), ColumnType::Integer);
        col.not_null = true;
        db.add_column(name, col)?;
        db.add_foreign_key(
            name,
            ForeignKeyConstraint {
                name: crate::plan::foreign_key_name(name, column),
                column: column.clone(),
                references: target.clone(),
                on_delete: ReferentialAction::Cascade,
            },
        )?;
    }
    db.add_unique(
        name,
        UniqueConstraint {
            name: relation.unique_name(),
            columns: vec![relation.column1.clone(), relation.column2.clone()],
        },
    )?;
    Ok(())
}

/// An ordered list of schema operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaDiff {
    pub ops: Vec<SchemaOp>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchemaOp> {
        self.ops.iter()
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = SchemaOp>) {
        self.ops.extend(ops);
    }

    /// Apply every operation in order.
    pub fn apply(&self, db: &mut Database) -> Result<()> {
        for op in &self.ops {
            op.apply(db)?;
        }
        if !self.ops.is_empty() {
            tracing::debug!(ops = self.ops.len(), "applied schema diff");
        }
        Ok(())
    }

    /// Tables the diff creates, relation tables included.
    pub fn created_tables(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                SchemaOp::CreateTable { table } => Some(table.as_str()),
                SchemaOp::CreateRelationTable { relation } => Some(relation.name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// `(table, column)` pairs the diff adds to tables it does not create.
    pub fn added_columns(&self) -> Vec<(&str, &str)> {
        let created = self.created_tables();
        self.ops
            .iter()
            .filter_map(|op| match op {
                SchemaOp::AddColumn { table, column } if !created.contains(&table.as_str()) => {
                    Some((table.as_str(), column.name.as_str()))
                }
                _ => None,
            })
            .collect()
    }

    /// PostgreSQL statements for every operation.
    pub fn to_sql(&self) -> Vec<String> {
        self.ops.iter().map(SchemaOp::to_sql).collect()
    }
}

/// Computes schema diffs for a registry.
pub struct Synchronizer<'a> {
    registry: &'a Registry,
}

impl<'a> Synchronizer<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Diff every model of the registry.
    pub fn diff_all(&self, db: &Database) -> Result<SchemaDiff> {
        let names: Vec<&str> = self.registry.model_names();
        self.diff(db, names)
    }

    /// Diff the tables of `models` against `db`. Foreign keys come last so
    /// that mutually referencing tables all exist first.
    pub fn diff<'m, I>(&self, db: &Database, models: I) -> Result<SchemaDiff>
    where
        I: IntoIterator<Item = &'m str>,
    {
        let mut ops = Vec::new();
        let mut relations = Vec::new();
        let mut foreign_keys = Vec::new();
        let mut seen_relations = BTreeSet::new();

        for name in models {
            let Some(model) = self.registry.get(name) else {
                continue;
            };
            let Some(spec) = TableSpec::from_model(model, self.registry)? else {
                continue;
            };
            match db.table(&spec.name) {
                Ok(table) => alter_table(&spec, table, &mut ops, &mut foreign_keys)?,
                Err(_) => create_table(&spec, &mut ops, &mut foreign_keys),
            }
            for relation in relation_tables(model, self.registry) {
                if !db.has_table(&relation.name) && seen_relations.insert(relation.name.clone()) {
                    relations.push(SchemaOp::CreateRelationTable { relation });
                }
            }
        }

        ops.extend(relations);
        ops.extend(foreign_keys);
        Ok(SchemaDiff { ops })
    }

    /// Tables and `(table, column)` pairs the registry needs.
    fn wanted(&self) -> (BTreeSet<String>, BTreeSet<(String, String)>) {
        let mut tables = BTreeSet::new();
        let mut columns = BTreeSet::new();
        for model in self.registry.models() {
            let Some(table) = model.table.as_deref() else {
                continue;
            };
            tables.insert(table.to_string());
            for field in model.stored_fields() {
                columns.insert((table.to_string(), field.name.clone()));
            }
            for relation in relation_tables(model, self.registry) {
                tables.insert(relation.name);
            }
        }
        (tables, columns)
    }

    /// Drops for `tables` and `columns` the registry no longer needs.
    /// Callers pass the tables and columns a package added, and only when
    /// the operator asked for drops.
    pub fn drops(
        &self,
        db: &Database,
        tables: &BTreeSet<String>,
        columns: &BTreeSet<(String, String)>,
    ) -> Vec<SchemaOp> {
        let (wanted_tables, wanted_columns) = self.wanted();

        let mut ops = Vec::new();
        for (table, column) in columns {
            let present = db.table(table).is_ok_and(|t| t.has_column(column));
            if present
                && wanted_tables.contains(table)
                && !wanted_columns.contains(&(table.clone(), column.clone()))
            {
                ops.push(SchemaOp::DropColumn {
                    table: table.clone(),
                    column: column.clone(),
                });
            }
        }
        for table in tables {
            if db.has_table(table) && !wanted_tables.contains(table) {
                ops.push(SchemaOp::DropTable {
                    table: table.clone(),
                });
            }
        }
        ops
    }

    /// Relax `NOT NULL` on kept `columns` the registry no longer needs, so
    /// rows can still be inserted without them.
    pub fn relax(&self, db: &Database, columns: &BTreeSet<(String, String)>) -> Vec<SchemaOp> {
        let (_, wanted_columns) = self.wanted();
        columns
            .iter()
            .filter(|pair| !wanted_columns.contains(*pair))
            .filter(|(table, column)| {
                db.table(table)
                    .ok()
                    .and_then(|t| t.column(column))
                    .is_some_and(|c| c.not_null)
            })
            .map(|(table, column)| SchemaOp::DropNotNull {
                table: table.clone(),
                column: column.clone(),
            })
            .collect()
    }
}

fn create_table(spec: &TableSpec, ops: &mut Vec<SchemaOp>, foreign_keys: &mut Vec<SchemaOp>) {
    ops.push(SchemaOp::CreateTable {
        table: spec.name.clone(),
    });
    for column in &spec.columns {
        ops.push(SchemaOp::AddColumn {
            table: spec.name.clone(),
            column: column.clone(),
        });
    }
    constraint_ops(spec, None, ops, foreign_keys);
}

fn alter_table(
    spec: &TableSpec,
    table: &Table,
    ops: &mut Vec<SchemaOp>,
    foreign_keys: &mut Vec<SchemaOp>,
) -> Result<()> {
    for desired in &spec.columns {
        match table.column(&desired.name) {
            None => add_column(spec, table, desired, ops)?,
            Some(current) => alter_column(spec, table, current, desired, ops)?,
        }
    }
    constraint_ops(spec, Some(table), ops, foreign_keys);
    Ok(())
}

fn add_column(
    spec: &TableSpec,
    table: &Table,
    desired: &Column,
    ops: &mut Vec<SchemaOp>,
) -> Result<()> {
    let mut nullable = desired.clone();
    nullable.not_null = false;
    ops.push(SchemaOp::AddColumn {
        table: spec.name.clone(),
        column: nullable,
    });
    if desired.not_null {
        let backfill = if table.is_empty() {
            None
        } else {
            Some(required_default(spec, desired)?)
        };
        ops.push(SchemaOp::SetNotNull {
            table: spec.name.clone(),
            column: desired.name.clone(),
            backfill,
        });
    }
    Ok(())
}

fn alter_column(
    spec: &TableSpec,
    table: &Table,
    current: &Column,
    desired: &Column,
    ops: &mut Vec<SchemaOp>,
) -> Result<()> {
    if let Some(op) = type_change(&spec.name, current, &desired.ty)? {
        ops.push(op);
    }

    if current.default != desired.default {
        ops.push(match &desired.default {
            Some(default) => SchemaOp::SetDefault {
                table: spec.name.clone(),
                column: desired.name.clone(),
                default: default.clone(),
            },
            None => SchemaOp::DropDefault {
                table: spec.name.clone(),
                column: desired.name.clone(),
            },
        });
    }

    match (current.not_null, desired.not_null) {
        (false, true) => {
            let backfill = if table.has_nulls(&desired.name) {
                Some(required_default(spec, desired)?)
            } else {
                None
            };
            ops.push(SchemaOp::SetNotNull {
                table: spec.name.clone(),
                column: desired.name.clone(),
                backfill,
            });
        }
        (true, false) => ops.push(SchemaOp::DropNotNull {
            table: spec.name.clone(),
            column: desired.name.clone(),
        }),
        _ => {}
    }
    Ok(())
}

fn required_default(spec: &TableSpec, column: &Column) -> Result<Value> {
    column
        .default
        .clone()
        .ok_or_else(|| Error::NullValuesPresent {
            table: spec.name.clone(),
            column: column.name.clone(),
        })
}

/// The widening operation from `current` to `desired`, or
/// `MigrationRequired` when the change could lose data.
fn type_change(table: &str, current: &Column, desired: &ColumnType) -> Result<Option<SchemaOp>> {
    if current.ty == *desired {
        return Ok(None);
    }
    let column = current.name.clone();
    let migration = |reason: String| Error::MigrationRequired {
        table: table.to_string(),
        column: current.name.clone(),
        reason,
    };
    let op = match (&current.ty, desired) {
        (
            ColumnType::Numeric { precision, scale },
            ColumnType::Numeric {
                precision: to_precision,
                scale: to_scale,
            },
        ) => {
            if to_precision < precision || to_scale < scale {
                return Err(migration(format!(
                    "narrowing numeric({precision},{scale}) to numeric({to_precision},{to_scale})"
                )));
            }
            SchemaOp::WidenNumeric {
                table: table.to_string(),
                column,
                precision: *to_precision,
                scale: *to_scale,
            }
        }
        (ColumnType::Selection { choices }, ColumnType::Selection { choices: to }) => {
            let removed: Vec<&str> = choices
                .iter()
                .filter(|c| !to.contains(c))
                .map(String::as_str)
                .collect();
            if !removed.is_empty() {
                return Err(migration(format!(
                    "removing choices {}",
                    removed.join(", ")
                )));
            }
            SchemaOp::ExtendChoices {
                table: table.to_string(),
                column,
                choices: to.clone(),
            }
        }
        (ColumnType::Varchar { size }, ColumnType::Varchar { size: to }) => {
            let widens = match (size, to) {
                (_, None) => true,
                (Some(size), Some(to)) => to >= size,
                (None, Some(_)) => false,
            };
            if !widens {
                return Err(migration(format!("shrinking {} to {desired}", current.ty)));
            }
            SchemaOp::WidenVarchar {
                table: table.to_string(),
                column,
                size: *to,
            }
        }
        _ => {
            return Err(migration(format!(
                "type changes from {} to {desired}",
                current.ty
            )));
        }
    };
    Ok(Some(op))
}

fn constraint_ops(
    spec: &TableSpec,
    table: Option<&Table>,
    ops: &mut Vec<SchemaOp>,
    foreign_keys: &mut Vec<SchemaOp>,
) {
    for (name, columns) in &spec.indexes {
        if table.is_none_or(|t| t.indexes.get(name) != Some(columns)) {
            ops.push(SchemaOp::CreateIndex {
                table: spec.name.clone(),
                name: name.clone(),
                columns: columns.clone(),
            });
        }
    }
    for unique in &spec.uniques {
        if table.is_none_or(|t| !t.uniques.contains(unique)) {
            ops.push(SchemaOp::AddUnique {
                table: spec.name.clone(),
                constraint: unique.clone(),
            });
        }
    }
    for check in &spec.checks {
        if table.is_none_or(|t| !t.checks.contains(check)) {
            ops.push(SchemaOp::AddCheck {
                table: spec.name.clone(),
                constraint: check.clone(),
            });
        }
    }
    for fk in &spec.foreign_keys {
        if table.is_none_or(|t| !t.foreign_keys.contains(fk)) {
            foreign_keys.push(SchemaOp::AddForeignKey {
                table: spec.name.clone(),
                constraint: fk.clone(),
            });
        }
    }
}
