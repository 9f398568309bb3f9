//! End-to-end scenarios
//!
//! Each test drives the loader against a real addons path and a file
//! store, the way the `addon` binary does.

use addon_core::{Error, ErrorKind, Loader, LoaderConfig};
use addon_model::build_registry;
use addon_packages::{DependencyGraph, discover};
use addon_store::{ColumnType, Database, ExternalId, PackageState, Row};
use addon_test_utils::TestAddons;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

// =============================================================================
// Test Infrastructure
// =============================================================================

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn config(addons: &TestAddons) -> LoaderConfig {
    LoaderConfig {
        addons_path: vec![addons.addons_path()],
        database_url: addons.database_url(),
        ..LoaderConfig::default()
    }
}

/// A loader over the packages currently on disk and the file store.
fn open(addons: &TestAddons) -> Loader {
    Loader::open(config(addons)).unwrap()
}

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => panic!("row literal must be an object"),
    }
}

fn state(db: &Database, package: &str) -> PackageState {
    db.package(package).map(|r| r.state).unwrap_or_default()
}

const THING: &str = r#"
[[model]]
name = "thing"
mode = "new"

[model.fields.name]
type = "text"
required = true
"#;

const THING_QTY: &str = r#"
[[model]]
name = "thing"
mode = "extend"

[model.fields.qty]
type = "integer"
default = 1
"#;

// =============================================================================
// Scenario 1: an extension adds a defaulted field
// =============================================================================

#[test]
fn scenario_extension_adds_defaulted_field() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model("a", "thing.toml", THING);
    addons.package("b", &["a"]);
    addons.model("b", "thing.toml", THING_QTY);

    let mut loader = open(&addons);
    let report = loader.install(&names(&["b"])).unwrap();
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.installed, names(&["base", "a", "b"]));

    let registry = loader.registry();
    let thing = registry.model("thing").unwrap();
    assert!(thing.has_field("name"));
    assert!(thing.has_field("qty"));
    assert_eq!(thing.field("qty").unwrap().defined_by, "b");

    let mut db = loader.into_database();
    let id = db.insert("thing", row(json!({"name": "x"}))).unwrap();
    assert_eq!(db.get("thing", id).unwrap()["qty"], json!(1));
}

// =============================================================================
// Scenario 2: two unrelated packages create the same model
// =============================================================================

#[test]
fn scenario_duplicate_new_contribution() {
    let addons = TestAddons::new();
    for name in ["a", "b"] {
        addons.package(name, &[]);
        addons.model(name, "widget.toml", "[[model]]\nname = \"widget\"\nmode = \"new\"\n");
    }

    let mut loader = open(&addons);
    let err = loader.install(&names(&["a", "b"])).unwrap_err();
    match &err {
        Error::Model(addon_model::Error::DuplicateNewContribution { model, packages }) => {
            assert_eq!(model, "widget");
            assert_eq!(packages, &names(&["a", "b"]));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::Topology);
    assert!(loader.db().installed_packages().is_empty());
    assert!(!addons.database_path().exists());
}

// =============================================================================
// Scenario 3: an override widens a decimal column
// =============================================================================

#[test]
fn scenario_decimal_override_widens_column() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model(
        "a",
        "product.toml",
        "[[model]]\nname = \"product\"\nmode = \"new\"\n[model.fields.price]\ntype = \"decimal\"\ndigits = [10, 2]\n",
    );

    let mut loader = open(&addons);
    assert!(loader.install(&names(&["a"])).unwrap().is_success());
    let mut db = loader.into_database();
    let id = db.insert("product", row(json!({"price": 1.23}))).unwrap();
    db.save().unwrap();

    addons.package("b", &["a"]);
    addons.model(
        "b",
        "product.toml",
        "[[model]]\nname = \"product\"\nmode = \"extend\"\n[model.fields.price]\ndigits = [10, 4]\n",
    );

    let mut loader = open(&addons);
    let report = loader.install(&names(&["b"])).unwrap();
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.schema_ops, 1);

    let db = loader.db();
    assert_eq!(db.get("product", id).unwrap()["price"], json!(1.23));
    assert_eq!(
        db.table("product").unwrap().column("price").unwrap().ty,
        ColumnType::Numeric {
            precision: 10,
            scale: 4
        }
    );
}

// =============================================================================
// Scenario 4: removing a field a computed field reads
// =============================================================================

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
fn scenario_removed_dependency_of_computed_field() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model("a", "order.toml", ORDER_WITH_TOTAL);

    let mut loader = open(&addons);
    assert!(loader.install(&names(&["a"])).unwrap().is_success());
    let before = loader.registry().fingerprint().to_string();

    addons.package("b", &["a"]);
    addons.model(
        "b",
        "order.toml",
        "[[model]]\nname = \"order\"\nmode = \"extend\"\n[model.fields.lines]\nremoved = true\n",
    );

    let mut loader = open(&addons);
    loader.boot().unwrap();
    let err = loader.install(&names(&["b"])).unwrap_err();
    match &err {
        Error::Model(addon_model::Error::UnresolvedDependency { model, field, path }) => {
            assert_eq!((model.as_str(), field.as_str()), ("order", "total"));
            assert!(path.starts_with("lines"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::Composition);
    assert_eq!(state(loader.db(), "a"), PackageState::Installed);
    assert_eq!(state(loader.db(), "b"), PackageState::Uninstalled);
    assert_eq!(loader.registry().fingerprint(), before);
}

// =============================================================================
// Scenario 5: a dependency cycle
// =============================================================================

#[test]
fn scenario_dependency_cycle() {
    let addons = TestAddons::new();
    addons.package("a", &["b"]);
    addons.package("b", &["a"]);

    let mut loader = open(&addons);
    let err = loader.install(&names(&["a"])).unwrap_err();
    match &err {
        Error::Package(addon_packages::Error::DependencyCycle { chain }) => {
            assert_eq!(chain, &names(&["a", "b", "a"]));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::Topology);
    assert!(loader.db().installed_packages().is_empty());
}

// =============================================================================
// Scenario 6: uninstall removes owned records and keeps columns
// =============================================================================

fn record_package(addons: &TestAddons) {
    addons.package_with("a", &[], "data = [\"data/things.toml\"]");
    addons.model("a", "thing.toml", THING);
    addons.file(
        "a",
        "data/things.toml",
        "[[record]]\nid = \"first_record\"\nmodel = \"thing\"\n[record.values]\nname = \"first\"\n",
    );
}

#[test]
fn scenario_uninstall_keeps_columns_without_drop() {
    let addons = TestAddons::new();
    record_package(&addons);
    let first = ExternalId::new("a", "first_record");

    let mut loader = open(&addons);
    assert!(loader.install(&names(&["a"])).unwrap().is_success());
    let res_id = loader.db().external_ids().get(&first).unwrap().res_id;
    assert!(loader.db().exists("thing", res_id));

    let mut loader = open(&addons);
    let report = loader.uninstall(&names(&["a"]), false).unwrap();
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.removed, names(&["a"]));

    let db = loader.db();
    assert!(db.external_ids().get(&first).is_none());
    assert!(!db.exists("thing", res_id));
    assert!(db.table("thing").unwrap().has_column("name"));
    assert_eq!(state(db, "a"), PackageState::Uninstalled);
}

#[test]
fn scenario_uninstall_with_drop_removes_columns() {
    let addons = TestAddons::new();
    record_package(&addons);

    let mut loader = open(&addons);
    assert!(loader.install(&names(&["a"])).unwrap().is_success());
    let report = loader.uninstall(&names(&["a"]), true).unwrap();
    assert!(report.is_success(), "{report:?}");
    assert!(!loader.db().has_table("thing"));
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn rebuilding_an_unchanged_set_is_deterministic() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model("a", "thing.toml", THING);
    addons.package("b", &["a"]);
    addons.model("b", "thing.toml", THING_QTY);
    addons.package("c", &["a"]);

    let set = discover(&[addons.addons_path()]).unwrap();
    let order = DependencyGraph::from_packages(&set).load_order().unwrap();
    let first = build_registry(&set, &order).unwrap();
    let second = build_registry(&discover(&[addons.addons_path()]).unwrap(), &order).unwrap();
    assert_eq!(first.fingerprint(), second.fingerprint());

    let mut loader = open(&addons);
    let report = loader.install(&names(&["b", "c"])).unwrap();
    assert_eq!(report.fingerprint.as_deref(), Some(first.fingerprint()));
}

#[test]
fn install_then_uninstall_with_drop_restores_the_schema() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.package("b", &["a"]);
    addons.model("b", "thing.toml", THING);

    let mut loader = open(&addons);
    assert!(loader.install(&names(&["a"])).unwrap().is_success());
    let tables_before: Vec<String> = loader.db().tables().map(|t| t.name.clone()).collect();

    assert!(loader.install(&names(&["b"])).unwrap().is_success());
    assert!(loader.db().has_table("thing"));

    assert!(loader.uninstall(&names(&["b"]), true).unwrap().is_success());
    let tables_after: Vec<String> = loader.db().tables().map(|t| t.name.clone()).collect();
    assert_eq!(tables_before, tables_after);
}

#[test]
fn reinstall_after_uninstall_reuses_kept_columns() {
    let addons = TestAddons::new();
    record_package(&addons);

    let mut loader = open(&addons);
    assert!(loader.install(&names(&["a"])).unwrap().is_success());
    assert!(loader.uninstall(&names(&["a"]), false).unwrap().is_success());

    let mut loader = open(&addons);
    let report = loader.install(&names(&["a"])).unwrap();
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.data.created, 1);
    assert_eq!(loader.db().rows("thing").unwrap().len(), 1);
    assert_eq!(state(loader.db(), "a"), PackageState::Installed);
}
