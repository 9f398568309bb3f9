//! Tables, columns and constraints.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// A row's column values; the `id` is the key the row is stored under.
pub type Row = Map<String, Value>;

/// Column types of the relational store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnType {
    Boolean,
    Integer,
    Numeric { precision: u32, scale: u32 },
    Float,
    Varchar { size: Option<u32> },
    Text,
    /// Text keyed by language code.
    Translated,
    /// Text restricted to a set of choices.
    Selection { choices: Vec<String> },
    Date,
    Timestamp,
    /// Base64-encoded bytes.
    Bytea,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => f.write_str("boolean"),
            Self::Integer => f.write_str("integer"),
            Self::Numeric { precision, scale } => write!(f, "numeric({precision},{scale})"),
            Self::Float => f.write_str("double precision"),
            Self::Varchar { size: Some(size) } => write!(f, "varchar({size})"),
            Self::Varchar { size: None } => f.write_str("varchar"),
            Self::Text => f.write_str("text"),
            Self::Translated => f.write_str("jsonb"),
            Self::Selection { .. } => f.write_str("varchar"),
            Self::Date => f.write_str("date"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::Bytea => f.write_str("bytea"),
        }
    }
}

impl ColumnType {
    /// Check and normalize a value for this column. Null is always
    /// accepted here; nullability is checked separately.
    pub fn coerce(&self, value: Value) -> std::result::Result<Value, Value> {
        if value.is_null() {
            return Ok(value);
        }
        match self {
            Self::Boolean if value.is_boolean() => Ok(value),
            Self::Integer if value.is_i64() || value.is_u64() => Ok(value),
            Self::Numeric { scale, .. } => match value.as_f64() {
                Some(number) => Ok(round_to_scale(number, *scale).ok_or(value)?),
                None => Err(value),
            },
            Self::Float if value.is_number() => Ok(value),
            Self::Varchar { size } => match value.as_str() {
                Some(text) if size.is_none_or(|s| text.chars().count() <= s as usize) => Ok(value),
                _ => Err(value),
            },
            Self::Text | Self::Bytea if value.is_string() => Ok(value),
            Self::Translated => match &value {
                Value::Object(map) if map.values().all(Value::is_string) => Ok(value),
                _ => Err(value),
            },
            Self::Selection { choices } => match value.as_str() {
                Some(choice) if choices.iter().any(|c| c == choice) => Ok(value),
                _ => Err(value),
            },
            Self::Date => match value.as_str() {
                Some(text) if NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok() => Ok(value),
                _ => Err(value),
            },
            Self::Timestamp => match value.as_str() {
                Some(text)
                    if NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").is_ok()
                        || DateTime::parse_from_rfc3339(text).is_ok() =>
                {
                    Ok(value)
                }
                _ => Err(value),
            },
            _ => Err(value),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Numeric { .. } | Self::Float)
    }
}

/// Round to `scale` decimal places, as a JSON number.
pub fn round_to_scale(number: f64, scale: u32) -> Option<Value> {
    let factor = 10f64.powi(scale as i32);
    let rounded = (number * factor).round() / factor;
    Number::from_f64(rounded).map(Value::Number)
}

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferentialAction {
    Restrict,
    Cascade,
    SetNull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub not_null: bool,
    pub default: Option<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            not_null: false,
            default: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckConstraint {
    pub name: String,
    pub column: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl CheckConstraint {
    pub fn accepts(&self, value: &Value) -> bool {
        match value.as_f64() {
            Some(number) => {
                self.min.is_none_or(|min| number >= min) && self.max.is_none_or(|max| number <= max)
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyConstraint {
    pub name: String,
    pub column: String,
    pub references: String,
    pub on_delete: ReferentialAction,
}

/// A table with its schema and rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: IndexMap<String, Column>,
    /// Index name -> indexed columns.
    #[serde(default)]
    pub indexes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub uniques: Vec<UniqueConstraint>,
    #[serde(default)]
    pub checks: Vec<CheckConstraint>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyConstraint>,
    #[serde(default)]
    pub rows: BTreeMap<i64, Row>,
    #[serde(default = "first_id")]
    pub next_id: i64,
}

fn first_id() -> i64 {
    1
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_id: first_id(),
            ..Self::default()
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether any row holds null (or nothing) in `column`.
    pub fn has_nulls(&self, column: &str) -> bool {
        self.rows
            .values()
            .any(|row| row.get(column).is_none_or(Value::is_null))
    }

    /// Ids of rows whose `column` equals `value`.
    pub fn find(&self, column: &str, value: &Value) -> Vec<i64> {
        self.rows
            .iter()
            .filter(|(_, row)| row.get(column) == Some(value))
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(ColumnType::Boolean, json!(true), true)]
    #[case(ColumnType::Boolean, json!("yes"), false)]
    #[case(ColumnType::Integer, json!(3), true)]
    #[case(ColumnType::Integer, json!(3.5), false)]
    #[case(ColumnType::Varchar { size: Some(3) }, json!("abcd"), false)]
    #[case(ColumnType::Translated, json!({"en_US": "Hi"}), true)]
    #[case(ColumnType::Selection { choices: vec!["draft".into()] }, json!("done"), false)]
    #[case(ColumnType::Date, json!("2024-02-29"), true)]
    #[case(ColumnType::Date, json!("2023-02-29"), false)]
    #[case(ColumnType::Timestamp, json!("2024-01-01 10:00:00"), true)]
    #[case(ColumnType::Float, Value::Null, true)]
    fn coerce_accepts(#[case] ty: ColumnType, #[case] value: Value, #[case] ok: bool) {
        assert_eq!(ty.coerce(value).is_ok(), ok);
    }

    #[test]
    fn numeric_rounds_to_scale() {
        let ty = ColumnType::Numeric {
            precision: 10,
            scale: 2,
        };
        assert_eq!(ty.coerce(json!(1.23456)).unwrap(), json!(1.23));
        assert_eq!(ty.coerce(json!(7)).unwrap(), json!(7.0));
    }

    #[test]
    fn check_constraint_bounds() {
        let check = CheckConstraint {
            name: "qty_range".into(),
            column: "qty".into(),
            min: Some(0.0),
            max: Some(10.0),
        };
        assert!(check.accepts(&json!(10)));
        assert!(!check.accepts(&json!(11)));
    }
}
