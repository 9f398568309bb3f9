//! Install planning and load order properties.

use std::collections::BTreeSet;

use addon_packages::{DependencyGraph, Error, InstallPlan, discover};
use addon_test_utils::TestAddons;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn plan_installs_dependencies_first() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.package("b", &["a"]);
    let set = discover(&[addons.addons_path()]).unwrap();

    let plan = InstallPlan::resolve(&set, &BTreeSet::new(), &names(&["b"])).unwrap();
    assert_eq!(plan.to_install, vec!["base", "a", "b"]);
}

#[test]
fn plan_skips_installed_packages() {
    let addons = TestAddons::new();
    addons.package("a", &[]);
    addons.package("b", &["a"]);
    let set = discover(&[addons.addons_path()]).unwrap();

    let installed: BTreeSet<String> = names(&["base", "a"]).into_iter().collect();
    let plan = InstallPlan::resolve(&set, &installed, &names(&["b"])).unwrap();
    assert_eq!(plan.to_install, vec!["b"]);
    assert_eq!(plan.target, vec!["base", "a", "b"]);
}

#[test]
fn auto_install_bridge_follows_its_triggers() {
    let addons = TestAddons::new();
    addons.package("sale", &[]);
    addons.package("stock", &[]);
    addons.package_with("sale_stock", &["sale", "stock"], "auto_install = true");
    addons.package_with("sale_crm", &["sale", "crm"], "auto_install = [\"sale\"]");
    addons.package("crm", &[]);
    let set = discover(&[addons.addons_path()]).unwrap();

    let plan = InstallPlan::resolve(&set, &BTreeSet::new(), &names(&["sale"])).unwrap();
    assert_eq!(plan.to_install, vec!["base", "crm", "sale", "sale_crm"]);
    assert_eq!(plan.auto_installed, vec!["sale_crm"]);

    let plan = InstallPlan::resolve(&set, &BTreeSet::new(), &names(&["sale", "stock"])).unwrap();
    assert!(plan.to_install.contains(&"sale_stock".to_string()));
}

#[test]
fn cycle_aborts_the_plan() {
    let addons = TestAddons::new();
    addons.package("a", &["b"]);
    addons.package("b", &["a"]);
    let set = discover(&[addons.addons_path()]).unwrap();

    let err = InstallPlan::resolve(&set, &BTreeSet::new(), &names(&["a"])).unwrap_err();
    assert!(matches!(err, Error::DependencyCycle { ref chain } if chain == &["a", "b", "a"]));
}

#[test]
fn unknown_dependency_is_a_validation_error() {
    let addons = TestAddons::new();
    addons.package("sale", &["product"]);
    let set = discover(&[addons.addons_path()]).unwrap();

    let err = InstallPlan::resolve(&set, &BTreeSet::new(), &names(&["sale"])).unwrap_err();
    assert!(matches!(err, Error::UnknownDependency { ref dependency, .. } if dependency == "product"));
}

#[test]
fn excluded_packages_cannot_coexist() {
    let addons = TestAddons::new();
    addons.package_with("pos_a", &[], "excludes = [\"pos_b\"]");
    addons.package("pos_b", &[]);
    let set = discover(&[addons.addons_path()]).unwrap();

    let err =
        InstallPlan::resolve(&set, &BTreeSet::new(), &names(&["pos_a", "pos_b"])).unwrap_err();
    assert!(matches!(err, Error::Excluded { .. }));
}

#[test]
fn non_installable_package_is_refused() {
    let addons = TestAddons::new();
    addons.package_with("legacy", &[], "installable = false");
    let set = discover(&[addons.addons_path()]).unwrap();

    let err = InstallPlan::resolve(&set, &BTreeSet::new(), &names(&["legacy"])).unwrap_err();
    assert!(matches!(err, Error::NotInstallable(_)));
}

/// Random DAG: node `i` may only depend on nodes with a smaller index.
fn dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..12).prop_flat_map(|n| {
        (0..n)
            .map(|i| proptest::collection::vec(0..i.max(1), 0..=i.min(3)))
            .collect::<Vec<_>>()
    })
}

proptest! {
    #[test]
    fn load_order_puts_dependencies_first(deps in dag()) {
        let mut graph = DependencyGraph::new();
        for (i, targets) in deps.iter().enumerate() {
            let name = format!("p{i:02}");
            graph.add_node(&name);
            for &t in targets {
                if t < i {
                    graph.add_edge(&name, &format!("p{t:02}"));
                }
            }
        }

        let order = graph.load_order().unwrap();
        prop_assert_eq!(order.len(), deps.len());
        for (pos, name) in order.iter().enumerate() {
            for dep in graph.dependencies_of(name) {
                let dep_pos = order.iter().position(|n| n == dep).unwrap();
                prop_assert!(dep_pos < pos, "{} must load before {}", dep, name);
            }
        }
        prop_assert_eq!(graph.load_order().unwrap(), order);
    }
}
