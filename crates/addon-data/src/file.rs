//! The data-file format.
//!
//! ```toml
//! [[record]]
//! id = "first_record"
//! model = "thing"
//! [record.values]
//! name = "x"
//! partner_id = { ref = "base.partner_root" }
//! tag_ids = { refs = ["tag_a", "tag_b"] }
//!
//! [[access]]
//! id = "access_thing_user"
//! model = "thing"
//! group = "base.group_user"
//! read = true
//!
//! [[delete]]
//! id = "obsolete_record"
//! ```
//!
//! The same structure may be written as JSON or YAML.

use std::path::Path;

use addon_fs::{DocumentStore, NormalizedPath};
use addon_model::base::ACCESS_MODEL;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DataFile {
    #[serde(default)]
    pub record: Vec<RecordSpec>,
    #[serde(default)]
    pub access: Vec<AccessSpec>,
    #[serde(default)]
    pub delete: Vec<DeleteSpec>,
}

impl DataFile {
    pub fn load(package: &str, path: &Path) -> Result<Self> {
        DocumentStore::new()
            .load(&NormalizedPath::new(path))
            .map_err(|e| Error::DataFile {
                package: package.to_string(),
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    /// Records followed by access rules, in file order.
    pub fn records(&self) -> Vec<RecordSpec> {
        let mut records = self.record.clone();
        records.extend(self.access.iter().map(AccessSpec::to_record));
        records
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_empty() && self.access.is_empty() && self.delete.is_empty()
    }
}

/// One record, keyed by external id.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RecordSpec {
    pub id: String,
    pub model: String,
    /// Leave the row alone once it exists.
    #[serde(default)]
    pub noupdate: bool,
    #[serde(default)]
    pub values: IndexMap<String, ValueSpec>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Reference {
    #[serde(rename = "ref")]
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct References {
    pub refs: Vec<String>,
}

/// A field value: a literal, or references to other records.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ValueSpec {
    Ref(Reference),
    Refs(References),
    Literal(Value),
}

impl ValueSpec {
    pub fn reference(target: impl Into<String>) -> Self {
        Self::Ref(Reference {
            target: target.into(),
        })
    }
}

impl From<Value> for ValueSpec {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

/// A row of the access-rule table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AccessSpec {
    pub id: String,
    pub model: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub delete: bool,
}

impl AccessSpec {
    /// The `ir.model.access` record this rule stands for.
    pub fn to_record(&self) -> RecordSpec {
        let mut values = IndexMap::new();
        let name = self.name.clone().unwrap_or_else(|| self.id.clone());
        values.insert("name".to_string(), ValueSpec::Literal(Value::String(name)));
        values.insert(
            "model".to_string(),
            ValueSpec::Literal(Value::String(self.model.clone())),
        );
        if let Some(group) = &self.group {
            values.insert("group_id".to_string(), ValueSpec::reference(group.as_str()));
        }
        for (field, allowed) in [
            ("perm_read", self.read),
            ("perm_write", self.write),
            ("perm_create", self.create),
            ("perm_unlink", self.delete),
        ] {
            values.insert(field.to_string(), ValueSpec::Literal(Value::Bool(allowed)));
        }
        RecordSpec {
            id: self.id.clone(),
            model: ACCESS_MODEL.to_string(),
            noupdate: false,
            values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteSpec {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_values() {
        let file: DataFile = toml::from_str(
            r#"
[[record]]
id = "r"
model = "thing"
[record.values]
name = "x"
partner_id = { ref = "base.partner_root" }
tag_ids = { refs = ["a", "b"] }
label = { en_US = "Hello" }
"#,
        )
        .unwrap();
        let values = &file.record[0].values;
        assert_eq!(values["name"], ValueSpec::Literal(json!("x")));
        assert_eq!(values["partner_id"], ValueSpec::reference("base.partner_root"));
        assert!(matches!(&values["tag_ids"], ValueSpec::Refs(r) if r.refs.len() == 2));
        assert_eq!(values["label"], ValueSpec::Literal(json!({"en_US": "Hello"})));
    }

    #[test]
    fn access_rules_become_records() {
        let file: DataFile = toml::from_str(
            r#"
[[access]]
id = "access_thing"
model = "thing"
group = "base.group_user"
read = true
"#,
        )
        .unwrap();
        let records = file.records();
        assert_eq!(records[0].model, ACCESS_MODEL);
        assert_eq!(records[0].values["perm_read"], ValueSpec::Literal(json!(true)));
        assert_eq!(records[0].values["perm_unlink"], ValueSpec::Literal(json!(false)));
        assert_eq!(
            records[0].values["group_id"],
            ValueSpec::reference("base.group_user")
        );
    }

    #[test]
    fn rejects_unknown_sections() {
        assert!(toml::from_str::<DataFile>("[[records]]\nid = \"x\"").is_err());
    }
}
