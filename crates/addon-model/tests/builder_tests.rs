//! Registry composition over packages written to disk.

use addon_model::{
    Error, FieldType, MethodTable, Mode, ModelState, Registry, RegistryHandle, Storage,
    build_registry,
};
use addon_packages::{DependencyGraph, discover};
use addon_test_utils::TestAddons;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn build(addons: &TestAddons) -> Result<Registry, Error> {
    let set = discover(&[addons.addons_path()]).unwrap();
    let order = DependencyGraph::from_packages(&set).load_order().unwrap();
    build_registry(&set, &order)
}

const THING: &str = r#"
[[model]]
name = "thing"
mode = "new"

[model.fields.name]
type = "text"
required = true
"#;

#[test]
fn extension_adds_fields() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model("a", "thing.toml", THING);
    addons.package("b", &["a"]);
    addons.model(
        "b",
        "thing.toml",
        r#"
[[model]]
name = "thing"
mode = "extend"

[model.fields.qty]
type = "integer"
default = 1
"#,
    );

    let registry = build(&addons).unwrap();
    let thing = registry.model("thing").unwrap();
    assert_eq!(
        thing.fields.keys().collect::<Vec<_>>(),
        vec!["name", "qty"]
    );
    assert_eq!(thing.field("qty").unwrap().default, Some(json!(1)));
    assert_eq!(thing.packages(), vec!["a", "b"]);
    assert_eq!(thing.state, ModelState::Finalized);
    assert_eq!(thing.table.as_deref(), Some("thing"));
}

#[test]
fn sibling_new_contributions_conflict() {
    let addons = TestAddons::new();
    for name in ["a", "b"] {
        addons.package(name, &[]);
        addons.model(name, "widget.toml", "[[model]]\nname = \"widget\"\nmode = \"new\"");
    }

    match build(&addons).unwrap_err() {
        Error::DuplicateNewContribution { model, packages } => {
            assert_eq!(model, "widget");
            assert_eq!(packages, vec!["a", "b"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn dependent_new_merges_as_extension() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model("a", "thing.toml", THING);
    addons.package("b", &["a"]);
    addons.model(
        "b",
        "thing.toml",
        "[[model]]\nname = \"thing\"\nmode = \"new\"\n[model.fields.qty]\ntype = \"integer\"",
    );

    let registry = build(&addons).unwrap();
    let thing = registry.model("thing").unwrap();
    assert_eq!(thing.fields.keys().collect::<Vec<_>>(), vec!["name", "qty"]);
    assert_eq!(thing.seeded_by(), Some("a"));
    assert_eq!(
        thing.mro.iter().map(|c| c.mode).collect::<Vec<_>>(),
        vec![Mode::Extend, Mode::New]
    );
}

#[test]
fn decimal_override_widens_scale() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model(
        "a",
        "m.toml",
        "[[model]]\nname = \"product\"\nmode = \"new\"\n[model.fields.price]\ntype = \"decimal\"\ndigits = [10, 2]",
    );
    addons.package("b", &["a"]);
    addons.model(
        "b",
        "m.toml",
        "[[model]]\nname = \"product\"\nmode = \"extend\"\n[model.fields.price]\ndigits = [10, 4]",
    );

    let registry = build(&addons).unwrap();
    assert_eq!(
        registry.model("product").unwrap().field("price").unwrap().ty,
        FieldType::Decimal {
            precision: 10,
            scale: 4
        }
    );
}

const ORDER_WITH_TOTAL: &str = r#"
[[model]]
name = "order"
mode = "new"

[model.fields.lines]
type = "one2many"
comodel = "order.line"
inverse = "order_id"

[model.fields.total]
type = "decimal"
compute = "sum(lines.amount)"
store = true

[[model]]
name = "order.line"
mode = "new"

[model.fields.order_id]
type = "many2one"
comodel = "order"
on_delete = "cascade"

[model.fields.amount]
type = "decimal"
"#;

#[test]
fn removing_a_dependency_of_a_derived_field_fails() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model("a", "order.toml", ORDER_WITH_TOTAL);
    addons.package("b", &["a"]);
    addons.model(
        "b",
        "order.toml",
        "[[model]]\nname = \"order\"\nmode = \"extend\"\n[model.fields.lines]\nremoved = true",
    );

    match build(&addons).unwrap_err() {
        Error::UnresolvedDependency { model, field, path } => {
            assert_eq!((model.as_str(), field.as_str()), ("order", "total"));
            assert!(path.starts_with("lines"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn stored_compute_registers_triggers() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model("a", "order.toml", ORDER_WITH_TOTAL);

    let registry = build(&addons).unwrap();
    let total = registry.model("order").unwrap().field("total").unwrap();
    assert_eq!(total.storage, Storage::ComputedStored);

    let triggers = registry.triggers_for("order.line", "amount");
    assert_eq!(triggers.len(), 1);
    assert_eq!(
        (triggers[0].model.as_str(), triggers[0].field.as_str()),
        ("order", "total")
    );
    assert_eq!(registry.triggers_for("order", "lines").len(), 1);
}

#[test]
fn extending_without_dependency_is_rejected() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model("a", "thing.toml", THING);
    addons.package("c", &[]);
    addons.model("c", "thing.toml", "[[model]]\nname = \"thing\"\nmode = \"extend\"");

    assert!(matches!(
        build(&addons).unwrap_err(),
        Error::ExtendWithoutDependency { ref package, ref seeded_by, .. }
            if package == "c" && seeded_by == "a"
    ));
}

#[test]
fn extending_unknown_model_is_rejected() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model("a", "ghost.toml", "[[model]]\nname = \"ghost\"\nmode = \"extend\"");

    assert!(matches!(
        build(&addons).unwrap_err(),
        Error::UnknownModel { ref model, .. } if model == "ghost"
    ));
}

#[test]
fn overriding_unknown_field_is_rejected() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model("a", "thing.toml", THING);
    addons.package("b", &["a"]);
    addons.model(
        "b",
        "thing.toml",
        "[[model]]\nname = \"thing\"\nmode = \"extend\"\n[model.fields.color]\nrequired = true",
    );

    assert!(matches!(
        build(&addons).unwrap_err(),
        Error::UnknownField { ref field, .. } if field == "color"
    ));
}

#[test]
fn changing_a_field_type_is_rejected() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model("a", "thing.toml", THING);
    addons.package("b", &["a"]);
    addons.model(
        "b",
        "thing.toml",
        "[[model]]\nname = \"thing\"\nmode = \"extend\"\n[model.fields.name]\ntype = \"integer\"",
    );

    assert!(matches!(
        build(&addons).unwrap_err(),
        Error::FieldTypeConflict { ref field, .. } if field == "name"
    ));
}

fn sibling_overrides() -> TestAddons {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model(
        "a",
        "thing.toml",
        &format!("{THING}\n[model.methods]\nlabel = \"a.label\""),
    );
    for sibling in ["b", "c"] {
        addons.package(sibling, &["a"]);
        addons.model(
            sibling,
            "thing.toml",
            &format!(
                "[[model]]\nname = \"thing\"\nmode = \"extend\"\n[model.methods]\nlabel = \"{sibling}.label\""
            ),
        );
    }
    addons
}

#[test]
fn alphabetically_last_sibling_wins_and_super_chains() {
    let registry = build(&sibling_overrides()).unwrap();
    let thing = registry.model("thing").unwrap();

    let chain: Vec<&str> = thing.methods["label"]
        .iter()
        .map(|m| m.symbol.as_str())
        .collect();
    assert_eq!(chain, vec!["c.label", "b.label", "a.label"]);

    let mut table = MethodTable::new();
    table.register("a.label", |_, _| Ok(json!("a")));
    for sibling in ["b", "c"] {
        table.register(format!("{sibling}.label"), move |inv, args| {
            let below = inv.call_super(args)?;
            Ok(json!(format!("{sibling}>{}", below.as_str().unwrap_or_default())))
        });
    }
    assert_eq!(
        thing.call("label", &table, Value::Null).unwrap(),
        json!("c>b>a")
    );
}

#[test]
fn missing_symbol_fails_at_call_time() {
    let registry = build(&sibling_overrides()).unwrap();
    let err = registry
        .model("thing")
        .unwrap()
        .call("label", &MethodTable::new(), Value::Null)
        .unwrap_err();
    assert!(matches!(err, Error::MethodNotFound { ref symbol, .. } if symbol == "c.label"));
}

#[test]
fn extend_rename_copies_visible_definition() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model("a", "thing.toml", THING);
    addons.package("b", &["a"]);
    addons.model(
        "b",
        "copy.toml",
        r#"
[[model]]
name = "thing.archive"
mode = "extend-rename"
rename_from = "thing"

[model.fields.archived_on]
type = "date"
"#,
    );

    let registry = build(&addons).unwrap();
    let archive = registry.model("thing.archive").unwrap();
    assert_eq!(archive.renamed_from.as_deref(), Some("thing"));
    assert!(archive.has_field("name"));
    assert!(archive.has_field("archived_on"));
    assert_eq!(archive.field("name").unwrap().defined_by, "b");
    assert_eq!(archive.table.as_deref(), Some("thing_archive"));
    assert!(!registry.model("thing").unwrap().has_field("archived_on"));
}

#[test]
fn abstract_mixins_contribute_fields() {
    let addons = TestAddons::new();
    addons.package("mail", &[]);
    addons.model(
        "mail",
        "thread.toml",
        r#"
[[model]]
name = "mail.thread"
mode = "new"
abstract = true

[model.fields.message_count]
type = "integer"
"#,
    );
    addons.package("a", &["mail"]);
    addons.model(
        "a",
        "thing.toml",
        &THING.replace("mode = \"new\"", "mode = \"new\"\nmixins = [\"mail.thread\"]"),
    );

    let registry = build(&addons).unwrap();
    assert!(registry.model("thing").unwrap().has_field("message_count"));
    assert!(registry.model("mail.thread").unwrap().table.is_none());
}

#[test]
fn descendants_follow_mixins_and_delegations() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model(
        "a",
        "models.toml",
        r#"
[[model]]
name = "mail.thread"
mode = "new"
abstract = true

[[model]]
name = "partner"
mode = "new"
mixins = ["mail.thread"]

[[model]]
name = "user"
mode = "new"
delegates = { "partner" = "partner_id" }

[[model]]
name = "unrelated"
mode = "new"
"#,
    );
    addons.package("b", &["a"]);
    addons.model(
        "b",
        "thread.toml",
        "[[model]]\nname = \"mail.thread\"\nmode = \"extend\"\n[model.fields.follower_count]\ntype = \"integer\"",
    );

    let registry = build(&addons).unwrap();
    assert_eq!(registry.model("partner").unwrap().mixins, vec!["mail.thread"]);
    assert!(registry.model("partner").unwrap().has_field("follower_count"));
    assert_eq!(
        registry.descendants(["mail.thread"]).into_iter().collect::<Vec<_>>(),
        vec!["mail.thread", "partner", "user"]
    );
    let affected: Vec<&str> = registry
        .models_affected_by("b")
        .into_iter()
        .map(|m| m.name.as_str())
        .collect();
    assert_eq!(affected, vec!["mail.thread", "partner", "user"]);
    assert_eq!(registry.models_of("b").len(), 1);
}

#[test]
fn concrete_model_cannot_be_a_mixin() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model("a", "thing.toml", THING);
    addons.model(
        "a",
        "zz_other.toml",
        "[[model]]\nname = \"other\"\nmode = \"new\"\nmixins = [\"thing\"]",
    );

    assert!(matches!(build(&addons).unwrap_err(), Error::InvalidMixin { .. }));
}

#[test]
fn delegation_exposes_parent_fields() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model(
        "a",
        "models.toml",
        r#"
[[model]]
name = "partner"
mode = "new"

[model.fields.name]
type = "text"
required = true

[[model]]
name = "user"
mode = "new"
delegates = { "partner" = "partner_id" }

[model.fields.login]
type = "text"
"#,
    );

    let registry = build(&addons).unwrap();
    let user = registry.model("user").unwrap();
    let link = user.field("partner_id").unwrap();
    assert!(link.required);
    assert!(link.is_stored());
    let name = user.field("name").unwrap();
    assert_eq!(name.inherited_from.as_deref(), Some("partner"));
    assert!(!name.is_stored());
}

#[test]
fn required_set_null_is_invalid() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model(
        "a",
        "models.toml",
        r#"
[[model]]
name = "partner"
mode = "new"

[[model]]
name = "order"
mode = "new"

[model.fields.partner_id]
type = "many2one"
comodel = "partner"
required = true
on_delete = "set-null"
"#,
    );

    assert!(matches!(
        build(&addons).unwrap_err(),
        Error::InvalidConstraint { .. }
    ));
}

#[test]
fn unknown_comodel_is_rejected() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model(
        "a",
        "models.toml",
        "[[model]]\nname = \"order\"\nmode = \"new\"\n[model.fields.partner_id]\ntype = \"many2one\"\ncomodel = \"partner\"",
    );

    assert!(matches!(
        build(&addons).unwrap_err(),
        Error::UnknownComodel { ref comodel, .. } if comodel == "partner"
    ));
}

#[test]
fn base_models_are_always_present() {
    let addons = TestAddons::new();
    let registry = build(&addons).unwrap();
    assert!(registry.contains("ir.model.access"));
    assert!(registry.contains("res.groups"));
}

#[test]
fn builds_are_deterministic() {
    let addons = sibling_overrides();
    let first = build(&addons).unwrap();
    let second = build(&addons).unwrap();
    assert_eq!(first.fingerprint(), second.fingerprint());
    assert!(first.fingerprint().starts_with("sha256:"));
}

#[test]
fn publishing_marks_models_published() {
    let addons = sibling_overrides();
    let handle = RegistryHandle::new();
    let published = handle
        .rebuild(|_| build(&addons))
        .unwrap();
    assert_eq!(
        published.model("thing").unwrap().state,
        ModelState::Published
    );
    assert_eq!(handle.load().fingerprint(), published.fingerprint());
}
