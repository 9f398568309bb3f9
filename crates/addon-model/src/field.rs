//! Fields: declared specs from model files and the effective, merged
//! definitions on a composed model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// The `type` key of a field declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Text,
    Html,
    Integer,
    Decimal,
    Float,
    Boolean,
    Date,
    Datetime,
    Binary,
    Selection,
    Many2one,
    One2many,
    Many2many,
}

impl TypeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Html => "html",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::Binary => "binary",
            Self::Selection => "selection",
            Self::Many2one => "many2one",
            Self::One2many => "one2many",
            Self::Many2many => "many2many",
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens to referrers when a referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnDelete {
    Restrict,
    Cascade,
    SetNull,
}

impl OnDelete {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
        }
    }
}

/// Semantic type of an effective field, with its type parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldType {
    Text {
        size: Option<u32>,
    },
    Html,
    Integer,
    Decimal {
        precision: u32,
        scale: u32,
    },
    Float,
    Boolean,
    Date,
    Datetime,
    Binary,
    Selection {
        choices: Vec<String>,
    },
    Many2one {
        comodel: String,
        on_delete: Option<OnDelete>,
    },
    One2many {
        comodel: String,
        inverse: String,
    },
    Many2many {
        comodel: String,
        relation: Option<String>,
        column1: Option<String>,
        column2: Option<String>,
    },
}

/// Default `digits` of a decimal field.
pub const DEFAULT_DIGITS: (u32, u32) = (16, 2);

impl FieldType {
    pub fn kind(&self) -> TypeKind {
        match self {
            Self::Text { .. } => TypeKind::Text,
            Self::Html => TypeKind::Html,
            Self::Integer => TypeKind::Integer,
            Self::Decimal { .. } => TypeKind::Decimal,
            Self::Float => TypeKind::Float,
            Self::Boolean => TypeKind::Boolean,
            Self::Date => TypeKind::Date,
            Self::Datetime => TypeKind::Datetime,
            Self::Binary => TypeKind::Binary,
            Self::Selection { .. } => TypeKind::Selection,
            Self::Many2one { .. } => TypeKind::Many2one,
            Self::One2many { .. } => TypeKind::One2many,
            Self::Many2many { .. } => TypeKind::Many2many,
        }
    }

    /// The target model of a relational field.
    pub fn comodel(&self) -> Option<&str> {
        match self {
            Self::Many2one { comodel, .. }
            | Self::One2many { comodel, .. }
            | Self::Many2many { comodel, .. } => Some(comodel),
            _ => None,
        }
    }

    pub fn is_relational(&self) -> bool {
        self.comodel().is_some()
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Decimal { .. } | Self::Float
        )
    }

    /// Type identity used for conflict detection: kind plus comodel.
    /// Precision, size and choices may change between contributions.
    pub fn same_type(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.comodel() == other.comodel()
    }

    fn describe(&self) -> String {
        match self.comodel() {
            Some(comodel) => format!("{}({comodel})", self.kind()),
            None => self.kind().to_string(),
        }
    }
}

/// Aggregation applied by a derived field over a relational path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Sum,
    Count,
    Min,
    Max,
}

/// How a derived field obtains its value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Compute {
    /// `sum(path)`, `count(path)`, `min(path)`, `max(path)`
    Aggregate { op: Aggregate, path: String },
    /// `related(path)`
    Related(String),
    /// `method:<symbol>`
    Method(String),
}

impl Compute {
    /// The field path the recipe reads, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Aggregate { path, .. } | Self::Related(path) => Some(path),
            Self::Method(_) => None,
        }
    }
}

impl FromStr for Compute {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(symbol) = s.strip_prefix("method:") {
            if symbol.is_empty() {
                return Err("method recipe needs a symbol".to_string());
            }
            return Ok(Self::Method(symbol.to_string()));
        }
        let (func, rest) = s
            .split_once('(')
            .ok_or_else(|| format!("unrecognized compute recipe '{s}'"))?;
        let path = rest
            .strip_suffix(')')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| format!("malformed compute recipe '{s}'"))?
            .to_string();
        let op = match func.trim() {
            "sum" => Aggregate::Sum,
            "count" => Aggregate::Count,
            "min" => Aggregate::Min,
            "max" => Aggregate::Max,
            "related" => return Ok(Self::Related(path)),
            other => return Err(format!("unknown compute function '{other}'")),
        };
        Ok(Self::Aggregate { op, path })
    }
}

impl fmt::Display for Compute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggregate { op, path } => {
                let name = match op {
                    Aggregate::Sum => "sum",
                    Aggregate::Count => "count",
                    Aggregate::Min => "min",
                    Aggregate::Max => "max",
                };
                write!(f, "{name}({path})")
            }
            Self::Related(path) => write!(f, "related({path})"),
            Self::Method(symbol) => write!(f, "method:{symbol}"),
        }
    }
}

/// Where a field's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Storage {
    /// A column on the model's table.
    #[default]
    Column,
    /// Derived on every read, never stored.
    ComputedOnRead,
    /// Derived and materialized in a column, recomputed on invalidation.
    ComputedStored,
    /// Rows of a many2many relation table.
    RelationTable,
    /// Read through the inverse many2one of the comodel.
    Virtual,
}

impl Storage {
    /// Whether the field owns a column on the model's table.
    pub fn has_column(self) -> bool {
        matches!(self, Self::Column | Self::ComputedStored)
    }
}

/// A field declaration as written in a model file.
///
/// Every attribute is optional: a spec without `type` overrides an
/// existing field, replacing only the attributes it names.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    #[serde(rename = "type", default)]
    pub kind: Option<TypeKind>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub digits: Option<(u32, u32)>,
    #[serde(default)]
    pub choices: Option<Vec<String>>,
    #[serde(default)]
    pub comodel: Option<String>,
    #[serde(default)]
    pub on_delete: Option<OnDelete>,
    #[serde(default)]
    pub inverse: Option<String>,
    #[serde(default)]
    pub relation: Option<String>,
    #[serde(default)]
    pub column1: Option<String>,
    #[serde(default)]
    pub column2: Option<String>,
    #[serde(default)]
    pub string: Option<String>,
    #[serde(default)]
    pub help: Option<String>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub readonly: Option<bool>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub index: Option<bool>,
    #[serde(default)]
    pub translate: Option<bool>,
    #[serde(default)]
    pub groups: Option<Vec<String>>,
    #[serde(default)]
    pub store: Option<bool>,
    #[serde(default)]
    pub compute: Option<String>,
    #[serde(default)]
    pub depends: Option<Vec<String>>,
    #[serde(default)]
    pub copy: Option<bool>,
    /// Delete the field from the model.
    #[serde(default)]
    pub removed: bool,
}

impl FieldSpec {
    /// Whether this spec overrides an existing field rather than
    /// declaring one.
    pub fn is_override(&self) -> bool {
        self.kind.is_none()
    }
}

/// The effective definition of a field on a composed model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    pub string: Option<String>,
    pub help: Option<String>,
    pub required: bool,
    pub readonly: bool,
    pub default: Option<Value>,
    pub index: bool,
    pub translate: bool,
    pub groups: Vec<String>,
    /// Declared storage flag; `None` means the type's default.
    pub store: Option<bool>,
    pub compute: Option<Compute>,
    pub depends: Vec<String>,
    pub copy: Option<bool>,
    /// Package that introduced the field.
    pub defined_by: String,
    /// Later packages that changed it, in application order.
    pub modified_by: Vec<String>,
    /// Parent model when the field is exposed through delegation.
    pub inherited_from: Option<String>,
    pub storage: Storage,
}

impl Field {
    /// Build a field from a declaring spec (one with a `type`).
    pub fn from_spec(model: &str, name: &str, spec: &FieldSpec, package: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidContribution {
            package: package.to_string(),
            model: model.to_string(),
            reason: format!("field '{name}': {reason}"),
        };
        let kind = spec
            .kind
            .ok_or_else(|| invalid("missing type".to_string()))?;
        let ty = build_type(kind, spec, None).map_err(invalid)?;
        let compute = spec
            .compute
            .as_deref()
            .map(str::parse::<Compute>)
            .transpose()
            .map_err(invalid)?;

        let mut field = Self {
            name: name.to_string(),
            ty,
            string: spec.string.clone(),
            help: spec.help.clone(),
            required: spec.required.unwrap_or(false),
            readonly: spec.readonly.unwrap_or(false),
            default: spec.default.clone(),
            index: spec.index.unwrap_or(false),
            translate: spec.translate.unwrap_or(false),
            groups: spec.groups.clone().unwrap_or_default(),
            store: spec.store,
            compute,
            depends: spec.depends.clone().unwrap_or_default(),
            copy: spec.copy,
            defined_by: package.to_string(),
            modified_by: Vec::new(),
            inherited_from: None,
            storage: Storage::Column,
        };
        field.storage = field.plan_storage();
        Ok(field)
    }

    /// Apply a later contribution's spec attribute by attribute.
    ///
    /// Attributes absent from `spec` keep their current value. A spec
    /// that names a different semantic type fails with
    /// `FieldTypeConflict`.
    pub fn apply(&mut self, model: &str, spec: &FieldSpec, package: &str) -> Result<()> {
        let invalid = |reason: String| Error::InvalidContribution {
            package: package.to_string(),
            model: model.to_string(),
            reason: format!("field '{}': {reason}", self.name),
        };

        let kind = spec.kind.unwrap_or_else(|| self.ty.kind());
        let ty = build_type(kind, spec, Some(&self.ty)).map_err(invalid)?;
        if !ty.same_type(&self.ty) {
            return Err(Error::FieldTypeConflict {
                model: model.to_string(),
                field: self.name.clone(),
                package: package.to_string(),
                existing: self.ty.describe(),
                declared: ty.describe(),
            });
        }
        self.ty = ty;

        if let Some(recipe) = &spec.compute {
            self.compute = Some(recipe.parse().map_err(invalid)?);
        }
        merge(&mut self.string, &spec.string);
        merge(&mut self.help, &spec.help);
        merge(&mut self.default, &spec.default);
        merge(&mut self.copy, &spec.copy);
        if let Some(required) = spec.required {
            self.required = required;
        }
        if let Some(readonly) = spec.readonly {
            self.readonly = readonly;
        }
        if let Some(index) = spec.index {
            self.index = index;
        }
        if let Some(translate) = spec.translate {
            self.translate = translate;
        }
        if let Some(groups) = &spec.groups {
            self.groups = groups.clone();
        }
        if let Some(depends) = &spec.depends {
            self.depends = depends.clone();
        }
        if spec.store.is_some() {
            self.store = spec.store;
        }

        if self.defined_by != package && !self.modified_by.iter().any(|p| p == package) {
            self.modified_by.push(package.to_string());
        }
        self.storage = self.plan_storage();
        Ok(())
    }

    pub fn label(&self) -> &str {
        self.string.as_deref().unwrap_or(&self.name)
    }

    pub fn is_computed(&self) -> bool {
        self.compute.is_some()
    }

    /// Whether the field has a column on the model's table.
    pub fn is_stored(&self) -> bool {
        self.storage.has_column()
    }

    /// The effective on-delete policy of a many2one: explicit, or
    /// `restrict` for required fields and `set-null` otherwise.
    pub fn on_delete(&self) -> Option<OnDelete> {
        match &self.ty {
            FieldType::Many2one { on_delete, .. } => Some(on_delete.unwrap_or(if self.required {
                OnDelete::Restrict
            } else {
                OnDelete::SetNull
            })),
            _ => None,
        }
    }

    /// Declared dependencies plus the path read by the compute recipe.
    pub fn dependency_paths(&self) -> Vec<String> {
        let mut paths = self.depends.clone();
        if let Some(path) = self.compute.as_ref().and_then(Compute::path)
            && !paths.iter().any(|p| p == path)
        {
            paths.push(path.to_string());
        }
        paths
    }

    /// Storage plan from type, compute recipe and `store` flag.
    pub fn plan_storage(&self) -> Storage {
        match (&self.ty, &self.compute) {
            (FieldType::One2many { .. }, _) => Storage::Virtual,
            (FieldType::Many2many { .. }, None) => Storage::RelationTable,
            (FieldType::Many2many { .. }, Some(_)) => {
                if self.store == Some(true) {
                    Storage::RelationTable
                } else {
                    Storage::ComputedOnRead
                }
            }
            (_, None) => {
                if self.store == Some(false) {
                    Storage::ComputedOnRead
                } else {
                    Storage::Column
                }
            }
            (_, Some(_)) => {
                if self.store == Some(true) {
                    Storage::ComputedStored
                } else {
                    Storage::ComputedOnRead
                }
            }
        }
    }
}

fn merge<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        slot.clone_from(value);
    }
}

/// Build a field type from `kind` and the `FieldSpec` type parameters, taking
/// unspecified parameters from `prior` when it has the same kind.
fn build_type(
    kind: TypeKind,
    spec: &FieldSpec,
    prior: Option<&FieldType>,
) -> std::result::Result<FieldType, String> {
    let prior = prior.filter(|p| p.kind() == kind);
    let prior_comodel = prior.and_then(FieldType::comodel).map(str::to_string);
    let comodel = || {
        spec.comodel
            .clone()
            .or_else(|| prior_comodel.clone())
            .ok_or_else(|| format!("{kind} field needs a comodel"))
    };

    Ok(match kind {
        TypeKind::Text => FieldType::Text {
            size: spec.size.or(match prior {
                Some(FieldType::Text { size }) => *size,
                _ => None,
            }),
        },
        TypeKind::Html => FieldType::Html,
        TypeKind::Integer => FieldType::Integer,
        TypeKind::Decimal => {
            let (precision, scale) = spec.digits.unwrap_or(match prior {
                Some(FieldType::Decimal { precision, scale }) => (*precision, *scale),
                _ => DEFAULT_DIGITS,
            });
            if scale > precision {
                return Err(format!("scale {scale} exceeds precision {precision}"));
            }
            FieldType::Decimal { precision, scale }
        }
        TypeKind::Float => FieldType::Float,
        TypeKind::Boolean => FieldType::Boolean,
        TypeKind::Date => FieldType::Date,
        TypeKind::Datetime => FieldType::Datetime,
        TypeKind::Binary => FieldType::Binary,
        TypeKind::Selection => {
            let choices = match (&spec.choices, prior) {
                (Some(choices), _) => choices.clone(),
                (None, Some(FieldType::Selection { choices })) => choices.clone(),
                (None, _) => return Err("selection field needs choices".to_string()),
            };
            if choices.is_empty() {
                return Err("selection field needs at least one choice".to_string());
            }
            FieldType::Selection { choices }
        }
        TypeKind::Many2one => FieldType::Many2one {
            comodel: comodel()?,
            on_delete: spec.on_delete.or(match prior {
                Some(FieldType::Many2one { on_delete, .. }) => *on_delete,
                _ => None,
            }),
        },
        TypeKind::One2many => FieldType::One2many {
            comodel: comodel()?,
            inverse: match (&spec.inverse, prior) {
                (Some(inverse), _) => inverse.clone(),
                (None, Some(FieldType::One2many { inverse, .. })) => inverse.clone(),
                (None, _) => return Err("one2many field needs an inverse".to_string()),
            },
        },
        TypeKind::Many2many => {
            let (relation, column1, column2) = match prior {
                Some(FieldType::Many2many {
                    relation,
                    column1,
                    column2,
                    ..
                }) => (relation.clone(), column1.clone(), column2.clone()),
                _ => (None, None, None),
            };
            FieldType::Many2many {
                comodel: comodel()?,
                relation: spec.relation.clone().or(relation),
                column1: spec.column1.clone().or(column1),
                column2: spec.column2.clone().or(column2),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn spec(toml: &str) -> FieldSpec {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn parses_compute_recipes() {
        assert_eq!(
            "sum(lines.amount)".parse::<Compute>().unwrap(),
            Compute::Aggregate {
                op: Aggregate::Sum,
                path: "lines.amount".into()
            }
        );
        assert_eq!(
            "related(partner_id.name)".parse::<Compute>().unwrap(),
            Compute::Related("partner_id.name".into())
        );
        assert_eq!(
            "method:sale.compute_total".parse::<Compute>().unwrap(),
            Compute::Method("sale.compute_total".into())
        );
    }

    #[rstest]
    #[case("median(lines.amount)")]
    #[case("sum()")]
    #[case("related()")]
    fn rejects_bad_compute_recipes(#[case] recipe: &str) {
        assert!(recipe.parse::<Compute>().is_err());
    }

    #[test]
    fn override_changes_only_named_attributes() {
        let mut field = Field::from_spec(
            "thing",
            "name",
            &spec("type = \"text\"\nhelp = \"The name\"\ndefault = \"x\""),
            "a",
        )
        .unwrap();
        field.apply("thing", &spec("required = true"), "b").unwrap();

        assert!(field.required);
        assert_eq!(field.help.as_deref(), Some("The name"));
        assert_eq!(field.default, Some(Value::from("x")));
        assert_eq!(field.modified_by, vec!["b"]);
    }

    #[test]
    fn type_change_is_a_conflict() {
        let mut field =
            Field::from_spec("thing", "qty", &spec("type = \"integer\""), "a").unwrap();
        let err = field
            .apply("thing", &spec("type = \"text\""), "b")
            .unwrap_err();
        assert!(matches!(err, Error::FieldTypeConflict { .. }));
    }

    #[test]
    fn comodel_change_is_a_conflict() {
        let mut field = Field::from_spec(
            "thing",
            "partner_id",
            &spec("type = \"many2one\"\ncomodel = \"res.partner\""),
            "a",
        )
        .unwrap();
        let err = field
            .apply("thing", &spec("comodel = \"res.users\""), "b")
            .unwrap_err();
        assert!(matches!(err, Error::FieldTypeConflict { .. }));
    }

    #[test]
    fn decimal_digits_can_change() {
        let mut field = Field::from_spec(
            "thing",
            "price",
            &spec("type = \"decimal\"\ndigits = [10, 2]"),
            "a",
        )
        .unwrap();
        field
            .apply("thing", &spec("digits = [10, 4]"), "b")
            .unwrap();
        assert_eq!(
            field.ty,
            FieldType::Decimal {
                precision: 10,
                scale: 4
            }
        );
    }

    #[test]
    fn storage_plan() {
        let plain = Field::from_spec("m", "f", &spec("type = \"integer\""), "a").unwrap();
        assert_eq!(plain.storage, Storage::Column);

        let on_read = Field::from_spec(
            "m",
            "f",
            &spec("type = \"integer\"\ncompute = \"count(lines)\""),
            "a",
        )
        .unwrap();
        assert_eq!(on_read.storage, Storage::ComputedOnRead);

        let stored = Field::from_spec(
            "m",
            "f",
            &spec("type = \"integer\"\ncompute = \"count(lines)\"\nstore = true"),
            "a",
        )
        .unwrap();
        assert_eq!(stored.storage, Storage::ComputedStored);

        let lines = Field::from_spec(
            "m",
            "lines",
            &spec("type = \"one2many\"\ncomodel = \"m.line\"\ninverse = \"m_id\""),
            "a",
        )
        .unwrap();
        assert_eq!(lines.storage, Storage::Virtual);

        let tags = Field::from_spec(
            "m",
            "tags",
            &spec("type = \"many2many\"\ncomodel = \"m.tag\""),
            "a",
        )
        .unwrap();
        assert_eq!(tags.storage, Storage::RelationTable);
    }

    #[test]
    fn default_on_delete_follows_required() {
        let optional = Field::from_spec(
            "m",
            "p",
            &spec("type = \"many2one\"\ncomodel = \"res.partner\""),
            "a",
        )
        .unwrap();
        assert_eq!(optional.on_delete(), Some(OnDelete::SetNull));

        let required = Field::from_spec(
            "m",
            "p",
            &spec("type = \"many2one\"\ncomodel = \"res.partner\"\nrequired = true"),
            "a",
        )
        .unwrap();
        assert_eq!(required.on_delete(), Some(OnDelete::Restrict));
    }

    #[test]
    fn selection_needs_choices() {
        let err = Field::from_spec("m", "state", &spec("type = \"selection\""), "a").unwrap_err();
        assert!(matches!(err, Error::InvalidContribution { .. }));
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        assert!(toml::from_str::<FieldSpec>("type = \"text\"\nrequird = true").is_err());
    }
}
