//! Discovery over real directories.

use addon_packages::{BASE_PACKAGE, Error, discover};
use addon_test_utils::TestAddons;
use pretty_assertions::assert_eq;

#[test]
fn discovers_packages_and_synthesizes_base() {
    let addons = TestAddons::new();
    addons.package("sale", &["product"]);
    addons.package("product", &[]);
    std::fs::create_dir_all(addons.addons_path().join("not_a_package")).unwrap();

    let set = discover(&[addons.addons_path()]).unwrap();
    assert_eq!(set.names(), vec!["base", "product", "sale"]);
    assert!(set.get(BASE_PACKAGE).unwrap().is_builtin());
    assert_eq!(set.get("sale").unwrap().depends(), vec!["base", "product"]);
}

#[test]
fn first_addons_path_wins() {
    let addons = TestAddons::new();
    addons.package_with("sale", &[], "version = \"2.0\"");
    let extra = addons.extra_addons_path();
    std::fs::create_dir_all(extra.join("sale")).unwrap();
    std::fs::write(
        extra.join("sale/__manifest__.toml"),
        "name = \"Shadowed\"\nversion = \"9.0\"",
    )
    .unwrap();

    let set = discover(&[addons.addons_path(), extra]).unwrap();
    assert_eq!(set.get("sale").unwrap().manifest.version.to_string(), "2.0");
}

#[test]
fn model_files_default_to_sorted_models_dir() {
    let addons = TestAddons::new();
    addons.package("sale", &[]);
    addons.model("sale", "b_line.toml", "");
    addons.model("sale", "a_order.yaml", "");
    addons.model("sale", "notes.txt", "");

    let set = discover(&[addons.addons_path()]).unwrap();
    let files = set.get("sale").unwrap().model_files().unwrap();
    let names: Vec<String> = files
        .iter()
        .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a_order.yaml", "b_line.toml"]);
}

#[test]
fn explicit_models_list_keeps_declared_order() {
    let addons = TestAddons::new();
    addons.package_with("sale", &[], "models = [\"models/z.toml\", \"models/a.toml\"]");

    let set = discover(&[addons.addons_path()]).unwrap();
    let files = set.get("sale").unwrap().model_files().unwrap();
    assert!(files[0].ends_with("models/z.toml"));
    assert!(files[1].ends_with("models/a.toml"));
}

#[test]
fn malformed_manifest_aborts_discovery() {
    let addons = TestAddons::new();
    addons.manifest("broken", "name = [");
    assert!(matches!(
        discover(&[addons.addons_path()]),
        Err(Error::MalformedManifest { ref package, .. }) if package == "broken"
    ));
}

#[test]
fn translation_files_are_keyed_by_language() {
    let addons = TestAddons::new();
    addons.package("sale", &[]);
    addons.file("sale", "i18n/fr_FR.toml", "");
    addons.file("sale", "i18n/README.md", "");

    let set = discover(&[addons.addons_path()]).unwrap();
    let files = set.get("sale").unwrap().translation_files().unwrap();
    assert_eq!(files.keys().collect::<Vec<_>>(), vec!["fr_FR"]);
}
