//! PostgreSQL rendering of schema operations.

use addon_store::{Column, ColumnType, ReferentialAction};
use serde_json::Value;

use crate::diff::SchemaOp;
use crate::plan::{RelationSpec, choice_constraint_name};

/// Double-quoted identifier.
pub fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQL literal for a JSON value.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        other => format!("{}::jsonb", quote(&other.to_string())),
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn action(on_delete: ReferentialAction) -> &'static str {
    match on_delete {
        ReferentialAction::Restrict => "RESTRICT",
        ReferentialAction::Cascade => "CASCADE",
        ReferentialAction::SetNull => "SET NULL",
    }
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn choice_check(table: &str, column: &str, choices: &[String]) -> String {
    let list = choices
        .iter()
        .map(|c| quote(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CONSTRAINT {} CHECK ({} IN ({list}))",
        ident(&choice_constraint_name(table, column)),
        ident(column)
    )
}

fn column_definition(table: &str, column: &Column) -> String {
    let mut sql = format!("{} {}", ident(&column.name), column.ty);
    if column.not_null {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&literal(default));
    }
    if let ColumnType::Selection { choices } = &column.ty {
        sql.push(' ');
        sql.push_str(&choice_check(table, &column.name, choices));
    }
    sql
}

fn relation_table(relation: &RelationSpec) -> String {
    let reference = |column: &str, table: &str| {
        format!(
            "{} integer NOT NULL REFERENCES {} (\"id\") ON DELETE CASCADE",
            ident(column),
            ident(table)
        )
    };
    format!(
        "CREATE TABLE {} ({}, {}, CONSTRAINT {} UNIQUE ({}, {}))",
        ident(&relation.name),
        reference(&relation.column1, &relation.table1),
        reference(&relation.column2, &relation.table2),
        ident(&relation.unique_name()),
        ident(&relation.column1),
        ident(&relation.column2)
    )
}

impl SchemaOp {
    /// The operation as one PostgreSQL statement (two for back-fills).
    pub fn to_sql(&self) -> String {
        let alter = |table: &str, column: &str| {
            format!("ALTER TABLE {} ALTER COLUMN {}", ident(table), ident(column))
        };
        match self {
            Self::CreateTable { table } => format!(
                "CREATE TABLE {} (\"id\" SERIAL NOT NULL, PRIMARY KEY (\"id\"))",
                ident(table)
            ),
            Self::AddColumn { table, column } => format!(
                "ALTER TABLE {} ADD COLUMN {}",
                ident(table),
                column_definition(table, column)
            ),
            Self::SetNotNull {
                table,
                column,
                backfill,
            } => {
                let set = format!("{} SET NOT NULL", alter(table, column));
                match backfill {
                    Some(value) => format!(
                        "UPDATE {} SET {} = {} WHERE {} IS NULL; {set}",
                        ident(table),
                        ident(column),
                        literal(value),
                        ident(column)
                    ),
                    None => set,
                }
            }
            Self::DropNotNull { table, column } => {
                format!("{} DROP NOT NULL", alter(table, column))
            }
            Self::SetDefault {
                table,
                column,
                default,
            } => format!("{} SET DEFAULT {}", alter(table, column), literal(default)),
            Self::DropDefault { table, column } => {
                format!("{} DROP DEFAULT", alter(table, column))
            }
            Self::WidenNumeric {
                table,
                column,
                precision,
                scale,
            } => format!(
                "{} TYPE numeric({precision},{scale})",
                alter(table, column)
            ),
            Self::WidenVarchar {
                table,
                column,
                size,
            } => format!(
                "{} TYPE {}",
                alter(table, column),
                ColumnType::Varchar { size: *size }
            ),
            Self::ExtendChoices {
                table,
                column,
                choices,
            } => format!(
                "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}, ADD {}",
                ident(table),
                ident(&choice_constraint_name(table, column)),
                choice_check(table, column, choices)
            ),
            Self::CreateIndex {
                table,
                name,
                columns,
            } => format!(
                "CREATE INDEX {} ON {} ({})",
                ident(name),
                ident(table),
                column_list(columns)
            ),
            Self::AddUnique { table, constraint } => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
                ident(table),
                ident(&constraint.name),
                column_list(&constraint.columns)
            ),
            Self::AddCheck { table, constraint } => {
                let column = ident(&constraint.column);
                let mut bounds = Vec::new();
                if let Some(min) = constraint.min {
                    bounds.push(format!("{column} >= {min}"));
                }
                if let Some(max) = constraint.max {
                    bounds.push(format!("{column} <= {max}"));
                }
                let condition = if bounds.is_empty() {
                    "true".to_string()
                } else {
                    bounds.join(" AND ")
                };
                format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({condition})",
                    ident(table),
                    ident(&constraint.name)
                )
            }
            Self::AddForeignKey { table, constraint } => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} (\"id\") ON DELETE {}",
                ident(table),
                ident(&constraint.name),
                ident(&constraint.column),
                ident(&constraint.references),
                action(constraint.on_delete)
            ),
            Self::CreateRelationTable { relation } => relation_table(relation),
            Self::DropColumn { table, column } => format!(
                "ALTER TABLE {} DROP COLUMN {}",
                ident(table),
                ident(column)
            ),
            Self::DropTable { table } => format!("DROP TABLE {} CASCADE", ident(table)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use addon_store::ForeignKeyConstraint;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn renders_literals() {
        assert_eq!(literal(&json!(null)), "NULL");
        assert_eq!(literal(&json!(1)), "1");
        assert_eq!(literal(&json!("it's")), "'it''s'");
        assert_eq!(literal(&json!({"en_US": "x"})), "'{\"en_US\":\"x\"}'::jsonb");
    }

    #[test]
    fn renders_add_column_with_default() {
        let mut column = Column::new("qty", ColumnType::Integer);
        column.default = Some(json!(1));
        let op = SchemaOp::AddColumn {
            table: "thing".into(),
            column,
        };
        assert_eq!(
            op.to_sql(),
            "ALTER TABLE \"thing\" ADD COLUMN \"qty\" integer DEFAULT 1"
        );
    }

    #[test]
    fn renders_backfill_before_not_null() {
        let op = SchemaOp::SetNotNull {
            table: "thing".into(),
            column: "qty".into(),
            backfill: Some(json!(0)),
        };
        assert_eq!(
            op.to_sql(),
            "UPDATE \"thing\" SET \"qty\" = 0 WHERE \"qty\" IS NULL; \
             ALTER TABLE \"thing\" ALTER COLUMN \"qty\" SET NOT NULL"
        );
    }

    #[test]
    fn renders_foreign_key() {
        let op = SchemaOp::AddForeignKey {
            table: "sale_order".into(),
            constraint: ForeignKeyConstraint {
                name: "sale_order_partner_id_fkey".into(),
                column: "partner_id".into(),
                references: "res_partner".into(),
                on_delete: ReferentialAction::SetNull,
            },
        };
        assert_eq!(
            op.to_sql(),
            "ALTER TABLE \"sale_order\" ADD CONSTRAINT \"sale_order_partner_id_fkey\" \
             FOREIGN KEY (\"partner_id\") REFERENCES \"res_partner\" (\"id\") ON DELETE SET NULL"
        );
    }
}
