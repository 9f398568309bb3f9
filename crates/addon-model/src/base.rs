//! Models seeded by the built-in `base` package.

use addon_fs::{DocumentStore, Format, NormalizedPath};

use crate::contribution::ContributionSpec;
use crate::error::{Error, Result};

/// Access rules: which group may read, write, create or delete a model.
pub const ACCESS_MODEL: &str = "ir.model.access";

/// User groups referenced by access rules and field `groups`.
pub const GROUPS_MODEL: &str = "res.groups";

const BASE_MODELS: &str = r#"
[[model]]
name = "res.groups"
mode = "new"
description = "Access Groups"
order = "name"

[model.fields.name]
type = "text"
string = "Name"
required = true
translate = true

[model.fields.comment]
type = "text"
string = "Comment"

[[model]]
name = "ir.model.access"
mode = "new"
description = "Model Access"
order = "model, group_id, name, id"

[model.fields.name]
type = "text"
string = "Name"
required = true

[model.fields.model]
type = "text"
string = "Model"
required = true
index = true

[model.fields.group_id]
type = "many2one"
string = "Group"
comodel = "res.groups"
on_delete = "cascade"
index = true

[model.fields.perm_read]
type = "boolean"
string = "Read Access"
default = false

[model.fields.perm_write]
type = "boolean"
string = "Write Access"
default = false

[model.fields.perm_create]
type = "boolean"
string = "Create Access"
default = false

[model.fields.perm_unlink]
type = "boolean"
string = "Delete Access"
default = false
"#;

#[derive(serde::Deserialize)]
struct BaseFile {
    model: Vec<ContributionSpec>,
}

/// Contributions of the built-in `base` package.
pub fn contributions() -> Result<Vec<ContributionSpec>> {
    let origin = NormalizedPath::new("base/models/builtin.toml");
    let file: BaseFile = DocumentStore::new()
        .parse(Format::Toml, BASE_MODELS, &origin)
        .map_err(|e| Error::ModelFile {
            package: addon_packages::BASE_PACKAGE.to_string(),
            path: origin.to_native(),
            message: e.to_string(),
        })?;
    Ok(file.model)
}
