//! Install, upgrade, uninstall and verify runs against temp addons paths.

use addon_core::{
    CancelToken, ErrorKind, HookTable, LoadReport, Loader, LoaderConfig, Operation,
};
use addon_packages::discover;
use addon_store::{Database, ExternalId, PackageState, Row};
use addon_test_utils::TestAddons;
use pretty_assertions::assert_eq;
use serde_json::json;

const THING: &str = r#"
[[model]]
name = "thing"
mode = "new"

[model.fields.name]
type = "text"
required = true
"#;

const THING_DATA: &str = r#"
[[record]]
id = "first_record"
model = "thing"
[record.values]
name = "first"
"#;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn config(addons: &TestAddons, url: &str) -> LoaderConfig {
    LoaderConfig {
        addons_path: vec![addons.addons_path()],
        database_url: url.to_string(),
        ..LoaderConfig::default()
    }
}

fn loader(addons: &TestAddons) -> Loader {
    Loader::open(config(addons, "memory:")).unwrap()
}

fn thing_package(addons: &TestAddons) {
    addons.package_with("a", &[], "data = [\"data/things.toml\"]");
    addons.model("a", "thing.toml", THING);
    addons.file("a", "data/things.toml", THING_DATA);
}

fn state(loader: &Loader, package: &str) -> PackageState {
    loader
        .db()
        .package(package)
        .map(|r| r.state)
        .unwrap_or_default()
}

#[test]
fn install_runs_base_first_and_publishes() {
    let addons = TestAddons::new();
    thing_package(&addons);
    let mut loader = loader(&addons);

    let report = loader.install(&names(&["a"])).unwrap();
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.operation, Operation::Install);
    assert_eq!(report.installed, names(&["base", "a"]));
    assert_eq!(report.data.created, 1);
    assert_eq!(state(&loader, "a"), PackageState::Installed);
    assert_eq!(loader.db().rows("thing").unwrap().len(), 1);

    let registry = loader.registry();
    assert!(registry.contains("thing"));
    assert_eq!(report.fingerprint.as_deref(), Some(registry.fingerprint()));
}

#[test]
fn installing_again_is_a_no_op() {
    let addons = TestAddons::new();
    thing_package(&addons);
    let mut loader = loader(&addons);
    loader.install(&names(&["a"])).unwrap();
    let report = loader.install(&names(&["a"])).unwrap();
    assert!(report.installed.is_empty());
    assert_eq!(loader.db().rows("thing").unwrap().len(), 1);
}

#[test]
fn data_failure_rolls_back_only_that_package() {
    let addons = TestAddons::new();
    thing_package(&addons);
    addons.package_with("b", &["a"], "data = [\"data/bad.toml\"]");
    addons.file(
        "b",
        "data/bad.toml",
        "[[record]]\nid = \"x\"\nmodel = \"thing\"\n[record.values]\nname = \"x\"\ncolour = \"red\"\n",
    );
    addons.package("c", &["b"]);
    let mut loader = loader(&addons);

    let report = loader.install(&names(&["c"])).unwrap();
    assert!(!report.is_success());
    assert_eq!(report.installed, names(&["base", "a"]));
    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.package, "b");
    assert_eq!(failure.kind, ErrorKind::Data);
    assert_eq!(report.skipped, names(&["c"]));
    assert_eq!(state(&loader, "a"), PackageState::Installed);
    assert_eq!(state(&loader, "b"), PackageState::Uninstalled);
    assert!(loader.db().external_ids().get(&ExternalId::new("b", "x")).is_none());
}

#[test]
fn composition_errors_change_nothing() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model("a", "widget.toml", "[[model]]\nname = \"widget\"\nmode = \"new\"\n");
    addons.package("b", &[]);
    addons.model("b", "widget.toml", "[[model]]\nname = \"widget\"\nmode = \"new\"\n");
    let mut loader = loader(&addons);

    let err = loader.install(&names(&["a", "b"])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Topology);
    assert!(loader.db().installed_packages().is_empty());
    assert!(loader.registry().is_empty());
}

#[test]
fn unknown_dependency_is_a_validation_error() {
    let addons = TestAddons::new();
    addons.package("a", &["missing"]);
    let mut loader = loader(&addons);
    let err = loader.install(&names(&["a"])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(loader.db().installed_packages().is_empty());
}

#[cfg(unix)]
#[test]
fn failing_shell_hook_is_a_hook_failure() {
    let addons = TestAddons::new();
    addons.package_with("a", &[], "pre_init_hook = \"sh:exit 7\"");
    let mut loader = loader(&addons);
    let report = loader.install(&names(&["a"])).unwrap();
    let failure = report.failure.unwrap();
    assert_eq!(failure.package, "a");
    assert_eq!(failure.kind, ErrorKind::Hook);
    assert_eq!(report.installed, names(&["base"]));
}

#[test]
fn post_init_hook_writes_through_the_store() {
    let addons = TestAddons::new();
    addons.package_with("a", &[], "post_init_hook = \"a.seed\"");
    addons.model("a", "thing.toml", THING);
    let mut hooks = HookTable::new();
    hooks.register("a.seed", |env| {
        let db = env.db.as_mut().ok_or("no store")?;
        let mut row = Row::new();
        row.insert("name".into(), json!("seeded"));
        db.insert("thing", row).map(|_| ()).map_err(|e| e.to_string())
    });
    let mut loader = loader(&addons).with_hooks(hooks);

    assert!(loader.install(&names(&["a"])).unwrap().is_success());
    assert_eq!(loader.db().rows("thing").unwrap().len(), 1);
}

#[test]
fn demo_failures_are_warnings() {
    let addons = TestAddons::new();
    addons.package_with(
        "a",
        &[],
        "data = [\"data/things.toml\"]\ndemo = [\"demo/bad.toml\"]",
    );
    addons.model("a", "thing.toml", THING);
    addons.file("a", "data/things.toml", THING_DATA);
    addons.file(
        "a",
        "demo/bad.toml",
        "[[record]]\nid = \"demo\"\nmodel = \"thing\"\n[record.values]\nname = \"demo\"\n\n[[record]]\nid = \"broken\"\nmodel = \"nope\"\n",
    );
    let config = LoaderConfig {
        demo: true,
        ..config(&addons, "memory:")
    };
    let mut loader = Loader::open(config).unwrap();

    let report = loader.install(&names(&["a"])).unwrap();
    assert!(report.is_success());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(loader.db().rows("thing").unwrap().len(), 1);
    assert!(!loader.db().package("a").unwrap().demo);
}

#[test]
fn upgrade_applies_new_fields_and_removes_obsolete_records() {
    let addons = TestAddons::new();
    thing_package(&addons);
    addons.file(
        "a",
        "data/things.toml",
        &format!("{THING_DATA}\n[[record]]\nid = \"second_record\"\nmodel = \"thing\"\n[record.values]\nname = \"second\"\n"),
    );
    let mut loader = loader(&addons);
    loader.install(&names(&["a"])).unwrap();

    addons.package_with("a", &[], "version = \"1.1\"\ndata = [\"data/things.toml\"]");
    addons.model(
        "a",
        "thing.toml",
        &format!("{THING}\n[model.fields.qty]\ntype = \"integer\"\ndefault = 1\n"),
    );
    addons.file("a", "data/things.toml", THING_DATA);
    let packages = discover(&[addons.addons_path()]).unwrap();
    let db = loader.into_database();
    let mut loader = Loader::new(config(&addons, "memory:"), packages, db);

    let report = loader.upgrade(&[], false).unwrap();
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.upgraded, names(&["a"]));
    assert_eq!(report.data.deleted, 1);
    let rows = loader.db().rows("thing").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows.values().next().unwrap()["qty"], json!(1));
    assert_eq!(
        loader.db().package("a").unwrap().version.as_deref(),
        Some("1.1")
    );
}

#[test]
fn upgrade_of_unknown_or_uninstalled_package_fails() {
    let addons = TestAddons::new();
    thing_package(&addons);
    let mut loader = loader(&addons);
    let err = loader.upgrade(&names(&["a"]), false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn uninstall_includes_dependents_in_reverse_order() {
    let addons = TestAddons::new();
    thing_package(&addons);
    addons.package("b", &["a"]);
    addons.model(
        "b",
        "thing.toml",
        "[[model]]\nname = \"thing\"\nmode = \"extend\"\n\n[model.fields.qty]\ntype = \"integer\"\nrequired = true\ndefault = 1\n",
    );
    let mut loader = loader(&addons);
    loader.install(&names(&["b"])).unwrap();

    let report = loader.uninstall(&names(&["a"]), false).unwrap();
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.removed, names(&["b", "a"]));
    assert_eq!(loader.db().installed_packages().len(), 1);
    let table = loader.db().table("thing").unwrap();
    assert!(table.is_empty());
    assert!(!table.column("qty").unwrap().not_null);
    assert!(!loader.registry().contains("thing"));
}

const THREAD: &str = r#"
[[model]]
name = "mail.thread"
mode = "new"
abstract = true

[model.fields.subject]
type = "text"

[[model]]
name = "thing"
mode = "new"
mixins = ["mail.thread"]

[model.fields.name]
type = "text"
required = true
"#;

const FOLLOWERS: &str = r#"
[[model]]
name = "mail.thread"
mode = "extend"

[model.fields.follower_count]
type = "integer"
required = true
default = 0
"#;

const PARTNERS: &str = r#"
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
"#;

const STREET: &str = r#"
[[model]]
name = "partner"
mode = "extend"

[model.fields.street]
type = "text"
"#;

/// The same store over the packages now on disk.
fn reopen(loader: Loader, addons: &TestAddons) -> Loader {
    let packages = discover(&[addons.addons_path()]).unwrap();
    Loader::new(config(addons, "memory:"), packages, loader.into_database())
}

fn has_column(loader: &Loader, table: &str, column: &str) -> bool {
    loader.db().table(table).unwrap().has_column(column)
}

fn mixin_packages(addons: &TestAddons) {
    addons.package_with("a", &[], "data = [\"data/things.toml\"]");
    addons.model("a", "thing.toml", THREAD);
    addons.file("a", "data/things.toml", THING_DATA);
    addons.package("b", &["a"]);
    addons.model("b", "thread.toml", FOLLOWERS);
}

#[test]
fn mixin_extension_adds_columns_to_using_models() {
    let addons = TestAddons::new();
    mixin_packages(&addons);
    let mut loader = loader(&addons);
    assert!(loader.install(&names(&["a"])).unwrap().is_success());

    let report = loader.install(&names(&["b"])).unwrap();
    assert!(report.is_success(), "{report:?}");
    assert!(has_column(&loader, "thing", "follower_count"));
    let rows = loader.db().rows("thing").unwrap();
    assert_eq!(rows.values().next().unwrap()["follower_count"], json!(0));

    let record = loader.db().package("b").unwrap();
    assert!(record.models.contains("thing"));
    assert!(
        record
            .columns
            .contains(&("thing".to_string(), "follower_count".to_string()))
    );
    assert!(loader.verify(&[]).unwrap().statements.is_empty());
}

#[test]
fn mixin_extension_upgrade_reaches_using_models() {
    let addons = TestAddons::new();
    mixin_packages(&addons);
    let mut loader = loader(&addons);
    assert!(loader.install(&names(&["b"])).unwrap().is_success());

    addons.package_with("b", &["a"], "version = \"1.1\"");
    addons.model(
        "b",
        "thread.toml",
        &format!("{FOLLOWERS}\n[model.fields.priority]\ntype = \"integer\"\n"),
    );
    let mut loader = reopen(loader, &addons);
    let report = loader.upgrade(&names(&["b"]), false).unwrap();
    assert!(report.is_success(), "{report:?}");
    assert!(has_column(&loader, "thing", "priority"));
}

#[test]
fn mixin_extension_uninstall_relaxes_or_drops_columns() {
    let addons = TestAddons::new();
    mixin_packages(&addons);
    let mut loader = loader(&addons);
    assert!(loader.install(&names(&["b"])).unwrap().is_success());

    let report = loader.uninstall(&names(&["b"]), false).unwrap();
    assert!(report.is_success(), "{report:?}");
    let table = loader.db().table("thing").unwrap();
    assert!(!table.column("follower_count").unwrap().not_null);
    assert!(!loader.registry().model("thing").unwrap().has_field("follower_count"));

    let mut loader = self::loader(&addons);
    assert!(loader.install(&names(&["b"])).unwrap().is_success());
    assert!(loader.uninstall(&names(&["b"]), true).unwrap().is_success());
    assert!(!has_column(&loader, "thing", "follower_count"));
    assert!(has_column(&loader, "thing", "subject"));
}

#[test]
fn delegated_parent_extension_reaches_children() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.model("a", "partners.toml", PARTNERS);
    addons.package("b", &["a"]);
    addons.model("b", "partner.toml", STREET);
    let mut loader = loader(&addons);
    assert!(loader.install(&names(&["a"])).unwrap().is_success());

    assert!(loader.install(&names(&["b"])).unwrap().is_success());
    assert!(has_column(&loader, "partner", "street"));
    assert!(!has_column(&loader, "user", "street"));
    let registry = loader.registry();
    let street = registry.model("user").unwrap().field("street").unwrap();
    assert_eq!(street.inherited_from.as_deref(), Some("partner"));
    let record = loader.db().package("b").unwrap();
    assert!(record.models.contains("partner"));
    assert!(record.models.contains("user"));

    addons.package_with("b", &["a"], "version = \"1.1\"");
    addons.model(
        "b",
        "partner.toml",
        &format!("{STREET}\n[model.fields.city]\ntype = \"text\"\n"),
    );
    let mut loader = reopen(loader, &addons);
    assert!(loader.upgrade(&names(&["b"]), false).unwrap().is_success());
    assert!(has_column(&loader, "partner", "city"));
    assert!(loader.registry().model("user").unwrap().has_field("city"));

    assert!(loader.uninstall(&names(&["b"]), true).unwrap().is_success());
    assert!(!has_column(&loader, "partner", "street"));
    assert!(!has_column(&loader, "partner", "city"));
    assert!(!loader.registry().model("user").unwrap().has_field("street"));
}

#[test]
fn uninstall_with_drop_removes_added_tables() {
    let addons = TestAddons::new();
    thing_package(&addons);
    let mut loader = loader(&addons);
    loader.install(&names(&["a"])).unwrap();
    loader.uninstall(&names(&["a"]), true).unwrap();
    assert!(!loader.db().has_table("thing"));
    assert!(loader.db().package("a").unwrap().tables.is_empty());
}

#[test]
fn base_cannot_be_uninstalled() {
    let addons = TestAddons::new();
    let mut loader = loader(&addons);
    loader.install(&names(&["base"])).unwrap();
    let err = loader.uninstall(&names(&["base"]), false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn verify_is_a_dry_run() {
    let addons = TestAddons::new();
    thing_package(&addons);
    let loader = loader(&addons);
    let report = loader.verify(&names(&["a"])).unwrap();
    assert_eq!(report.to_install, names(&["base", "a"]));
    assert!(
        report
            .statements
            .iter()
            .any(|s| s.starts_with("CREATE TABLE \"thing\""))
    );
    assert!(!report.is_clean());
    assert_eq!(loader.db().tables().count(), 0);
}

#[test]
fn cancelled_run_keeps_prior_registry() {
    let addons = TestAddons::new();
    thing_package(&addons);
    let cancel = CancelToken::new();
    let mut loader = loader(&addons).with_cancel_token(cancel.clone());
    cancel.cancel();

    let report: LoadReport = loader.install(&names(&["a"])).unwrap();
    assert!(report.cancelled);
    assert_eq!(report.skipped, names(&["base", "a"]));
    assert!(loader.registry().is_empty());
    assert!(loader.db().installed_packages().is_empty());
}

#[test]
fn state_survives_reopening_a_file_store() {
    let addons = TestAddons::new();
    thing_package(&addons);
    let url = addons.database_url();
    {
        let mut loader = Loader::open(config(&addons, &url)).unwrap();
        loader.install(&names(&["a"])).unwrap();
    }
    let db = Database::open(&url).unwrap();
    assert!(db.installed_packages().contains("a"));

    let loader = Loader::open(config(&addons, &url)).unwrap();
    let registry = loader.boot().unwrap();
    assert!(registry.contains("thing"));
    assert_eq!(loader.installed().unwrap(), names(&["base", "a"]));
}
