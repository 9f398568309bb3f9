//! The schema a composed model asks for: one table per concrete model,
//! plus the relation tables of its many2many fields.

use addon_model::{ComposedModel, Constraint, Field, FieldType, OnDelete, Registry, Storage};
use addon_store::{
    CheckConstraint, Column, ColumnType, ForeignKeyConstraint, ReferentialAction,
    UniqueConstraint,
};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Desired shape of a model's table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSpec {
    pub name: String,
    pub model: String,
    pub columns: Vec<Column>,
    /// `(index name, columns)`.
    pub indexes: Vec<(String, Vec<String>)>,
    pub uniques: Vec<UniqueConstraint>,
    pub checks: Vec<CheckConstraint>,
    pub foreign_keys: Vec<ForeignKeyConstraint>,
}

/// Desired shape of a many2many relation table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationSpec {
    pub name: String,
    pub column1: String,
    pub table1: String,
    pub column2: String,
    pub table2: String,
}

impl RelationSpec {
    pub fn unique_name(&self) -> String {
        format!("{}_{}_{}_key", self.name, self.column1, self.column2)
    }
}

pub fn index_name(table: &str, column: &str) -> String {
    format!("{table}_{column}_index")
}

pub fn foreign_key_name(table: &str, column: &str) -> String {
    format!("{table}_{column}_fkey")
}

pub fn choice_constraint_name(table: &str, column: &str) -> String {
    format!("{table}_{column}_choice")
}

pub fn referential_action(on_delete: OnDelete) -> ReferentialAction {
    match on_delete {
        OnDelete::Restrict => ReferentialAction::Restrict,
        OnDelete::Cascade => ReferentialAction::Cascade,
        OnDelete::SetNull => ReferentialAction::SetNull,
    }
}

/// Column type of a field, or `None` for fields without a column.
pub fn column_type(field: &Field) -> Option<ColumnType> {
    if !field.storage.has_column() {
        return None;
    }
    let ty = match &field.ty {
        FieldType::Text { .. } | FieldType::Html if field.translate => ColumnType::Translated,
        FieldType::Text { size } => ColumnType::Varchar { size: *size },
        FieldType::Html => ColumnType::Text,
        FieldType::Integer | FieldType::Many2one { .. } => ColumnType::Integer,
        FieldType::Decimal { precision, scale } => ColumnType::Numeric {
            precision: *precision,
            scale: *scale,
        },
        FieldType::Float => ColumnType::Float,
        FieldType::Boolean => ColumnType::Boolean,
        FieldType::Date => ColumnType::Date,
        FieldType::Datetime => ColumnType::Timestamp,
        FieldType::Binary => ColumnType::Bytea,
        FieldType::Selection { choices } => ColumnType::Selection {
            choices: choices.clone(),
        },
        FieldType::One2many { .. } | FieldType::Many2many { .. } => return None,
    };
    Some(ty)
}

/// The column of a stored field. Defaults of translated fields stay with
/// the data loader, since their column holds per-language text.
pub fn column(table: &str, field: &Field) -> Result<Option<Column>> {
    let Some(ty) = column_type(field) else {
        return Ok(None);
    };
    let default = match (&field.default, &ty) {
        (None, _) | (Some(Value::Null), _) | (Some(_), ColumnType::Translated) => None,
        (Some(value), _) => Some(ty.coerce(value.clone()).map_err(|value| {
            Error::InvalidDefault {
                table: table.to_string(),
                column: field.name.clone(),
                value: value.to_string(),
            }
        })?),
    };
    // Stored computed fields are filled after insert, so they stay nullable.
    let not_null = field.required && field.storage == Storage::Column;
    let mut column = Column::new(&field.name, ty);
    column.not_null = not_null;
    column.default = default;
    Ok(Some(column))
}

impl TableSpec {
    /// The table of `model`, or `None` for abstract models.
    pub fn from_model(model: &ComposedModel, registry: &Registry) -> Result<Option<Self>> {
        let Some(table) = model.table.clone() else {
            return Ok(None);
        };

        let mut spec = Self {
            name: table.clone(),
            model: model.name.clone(),
            columns: Vec::new(),
            indexes: Vec::new(),
            uniques: Vec::new(),
            checks: Vec::new(),
            foreign_keys: Vec::new(),
        };

        for field in model.stored_fields() {
            let Some(column) = column(&table, field)? else {
                continue;
            };
            if field.index {
                spec.indexes
                    .push((index_name(&table, &field.name), vec![field.name.clone()]));
            }
            spec.columns.push(column);
        }

        for fk in model.foreign_keys() {
            let Some(target) = registry.get(&fk.comodel).and_then(|m| m.table.clone()) else {
                continue;
            };
            spec.foreign_keys.push(ForeignKeyConstraint {
                name: foreign_key_name(&table, &fk.field),
                column: fk.field,
                references: target,
                on_delete: referential_action(fk.on_delete),
            });
        }

        for constraint in &model.constraints {
            match constraint {
                Constraint::Unique { name, fields } => spec.uniques.push(UniqueConstraint {
                    name: format!("{table}_{name}"),
                    columns: fields.clone(),
                }),
                Constraint::Check {
                    name,
                    field,
                    min,
                    max,
                } => spec.checks.push(CheckConstraint {
                    name: format!("{table}_{name}"),
                    column: field.clone(),
                    min: *min,
                    max: *max,
                }),
            }
        }

        Ok(Some(spec))
    }
}

/// Relation tables of the model's own stored many2many fields.
pub fn relation_tables(model: &ComposedModel, registry: &Registry) -> Vec<RelationSpec> {
    let Some(table1) = model.table.as_deref() else {
        return Vec::new();
    };
    model
        .fields
        .values()
        .filter(|f| f.storage == Storage::RelationTable && f.inherited_from.is_none())
        .filter_map(|field| match &field.ty {
            FieldType::Many2many {
                comodel,
                relation: Some(relation),
                column1: Some(column1),
                column2: Some(column2),
            } => {
                let table2 = registry.get(comodel)?.table.clone()?;
                Some(RelationSpec {
                    name: relation.clone(),
                    column1: column1.clone(),
                    table1: table1.to_string(),
                    column2: column2.clone(),
                    table2,
                })
            }
            _ => None,
        })
        .collect()
}
