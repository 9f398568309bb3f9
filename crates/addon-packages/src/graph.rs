//! Dependency graph over packages and the install plan derived from it.
//!
//! Edges point from dependent to dependency: if `sale` depends on
//! `product`, the edge is `sale -> product`. The load order puts every
//! package after all of its dependencies; peers are ordered by name.
//!
//! # Example
//!
//! ```
//! use addon_packages::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_edge("sale", "product");
//! graph.add_edge("product", "base");
//! graph.add_node("base");
//!
//! assert_eq!(graph.load_order().unwrap(), vec!["base", "product", "sale"]);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::discovery::PackageSet;
use crate::error::{Error, Result};

/// Directed graph of package dependencies.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Each key depends on every value.
    edges: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Gray,
    Black,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph over every package of `set`, including the implicit edge to
    /// `base`.
    pub fn from_packages(set: &PackageSet) -> Self {
        let mut graph = Self::new();
        for package in set.iter() {
            graph.add_node(&package.name);
            for dependency in package.depends() {
                graph.add_edge(&package.name, &dependency);
            }
        }
        graph
    }

    pub fn add_node(&mut self, name: &str) {
        self.edges.entry(name.to_string()).or_default();
    }

    /// Declare that `from` depends on `to`. Only `from` becomes a node;
    /// a dependency that is never added as a node is reported by
    /// [`validate`](Self::validate).
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Direct dependencies of `name`, sorted.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.edges
            .get(name)
            .map(|deps| deps.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Packages that directly depend on `name`, sorted.
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(name))
            .map(|(from, _)| from.as_str())
            .collect()
    }

    /// Fail on the first edge whose target is not a node.
    pub fn validate(&self) -> Result<()> {
        for (from, deps) in &self.edges {
            if let Some(missing) = deps.iter().find(|d| !self.edges.contains_key(*d)) {
                return Err(Error::UnknownDependency {
                    package: from.clone(),
                    dependency: missing.clone(),
                });
            }
        }
        Ok(())
    }

    /// Find a cycle with a depth-first search using gray/black marks.
    ///
    /// Roots and neighbors are visited in name order, so the reported
    /// chain is deterministic. The chain starts and ends with the same
    /// package: `[a, b, a]`, or `[a, a]` for a self-dependency.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
        let mut stack: Vec<&str> = Vec::new();

        for root in self.edges.keys() {
            if marks.contains_key(root.as_str()) {
                continue;
            }
            if let Some(chain) = self.visit(root, &mut marks, &mut stack) {
                return Some(chain);
            }
        }
        None
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        marks: &mut BTreeMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        marks.insert(node, Mark::Gray);
        stack.push(node);

        for next in self.edges.get(node).into_iter().flatten() {
            match marks.get(next.as_str()) {
                Some(Mark::Gray) => {
                    let start = stack.iter().position(|n| *n == next.as_str()).unwrap_or(0);
                    let mut chain: Vec<String> =
                        stack[start..].iter().map(|n| n.to_string()).collect();
                    chain.push(next.clone());
                    return Some(chain);
                }
                Some(Mark::Black) => {}
                None => {
                    if !self.edges.contains_key(next) {
                        continue;
                    }
                    if let Some(chain) = self.visit(next, marks, stack) {
                        return Some(chain);
                    }
                }
            }
        }

        stack.pop();
        marks.insert(node, Mark::Black);
        None
    }

    /// Topological load order: dependencies first, peers by name.
    ///
    /// Packages are sorted by `(depth, name)` where a package without
    /// dependencies has depth 0 and every other package sits one level
    /// above its deepest dependency.
    pub fn load_order(&self) -> Result<Vec<String>> {
        self.validate()?;
        if let Some(chain) = self.find_cycle() {
            return Err(Error::DependencyCycle { chain });
        }

        let mut depths: BTreeMap<&str, usize> = BTreeMap::new();
        for name in self.edges.keys() {
            self.depth(name, &mut depths);
        }

        let mut order: Vec<(usize, &str)> = depths.into_iter().map(|(n, d)| (d, n)).collect();
        order.sort();
        Ok(order.into_iter().map(|(_, n)| n.to_string()).collect())
    }

    fn depth<'a>(&'a self, name: &'a str, depths: &mut BTreeMap<&'a str, usize>) -> usize {
        if let Some(depth) = depths.get(name) {
            return *depth;
        }
        let depth = self
            .edges
            .get(name)
            .into_iter()
            .flatten()
            .map(|dep| self.depth(dep, depths) + 1)
            .max()
            .unwrap_or(0);
        depths.insert(name, depth);
        depth
    }

    /// `names` and everything they transitively depend on.
    pub fn dependency_closure<'a, I>(&self, names: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut closure = BTreeSet::new();
        let mut pending: Vec<String> = names.into_iter().map(str::to_string).collect();
        while let Some(name) = pending.pop() {
            if !closure.insert(name.clone()) {
                continue;
            }
            let deps = self
                .edges
                .get(&name)
                .ok_or_else(|| Error::UnknownPackage(name.clone()))?;
            for dep in deps {
                if !self.edges.contains_key(dep) {
                    return Err(Error::UnknownDependency {
                        package: name.clone(),
                        dependency: dep.clone(),
                    });
                }
                pending.push(dep.clone());
            }
        }
        Ok(closure)
    }

    /// `names` and everything that transitively depends on them.
    pub fn dependents_closure<'a, I>(&self, names: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut closure = BTreeSet::new();
        let mut pending: Vec<String> = names.into_iter().map(str::to_string).collect();
        while let Some(name) = pending.pop() {
            if !closure.insert(name.clone()) {
                continue;
            }
            pending.extend(self.dependents_of(&name).into_iter().map(str::to_string));
        }
        closure
    }

    /// The subgraph induced by `names`.
    pub fn subgraph(&self, names: &BTreeSet<String>) -> Self {
        let edges = self
            .edges
            .iter()
            .filter(|(name, _)| names.contains(*name))
            .map(|(name, deps)| (name.clone(), deps.clone()))
            .collect();
        Self { edges }
    }
}

/// Packages to process for an install request, in load order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallPlan {
    /// Packages to install, in load order.
    pub to_install: Vec<String>,
    /// Members of `to_install` pulled in by `auto_install`.
    pub auto_installed: Vec<String>,
    /// The full target set (already installed plus new), in load order.
    pub target: Vec<String>,
}

impl InstallPlan {
    /// Resolve which packages must be installed so that `requested` end
    /// up installed next to `installed`.
    ///
    /// Validation and topology are checked here, before anything touches
    /// the store: unknown packages and dependencies, non-installable
    /// packages, cycles, exclusions.
    pub fn resolve(
        set: &PackageSet,
        installed: &BTreeSet<String>,
        requested: &[String],
    ) -> Result<Self> {
        let graph = DependencyGraph::from_packages(set);

        for name in requested {
            let package = set.require(name)?;
            if !package.manifest.installable {
                return Err(Error::NotInstallable(name.clone()));
            }
        }

        let mut scheduled: BTreeSet<String> = installed.clone();
        scheduled.extend(
            graph.dependency_closure(installed.iter().chain(requested).map(String::as_str))?,
        );

        let mut auto_installed = Vec::new();
        loop {
            let mut added = false;
            for package in set.iter() {
                if scheduled.contains(&package.name) || !package.manifest.installable {
                    continue;
                }
                let Some(triggers) = package.manifest.auto_install_triggers() else {
                    continue;
                };
                if triggers.iter().all(|t| scheduled.contains(t)) {
                    tracing::debug!(package = package.name.as_str(), "auto-install triggered");
                    scheduled.extend(graph.dependency_closure([package.name.as_str()])?);
                    auto_installed.push(package.name.clone());
                    added = true;
                }
            }
            if !added {
                break;
            }
        }

        for name in &scheduled {
            let package = set.require(name)?;
            if !package.manifest.installable {
                return Err(Error::NotInstallable(name.clone()));
            }
            for excluded in &package.manifest.excludes {
                if scheduled.contains(excluded) {
                    return Err(Error::Excluded {
                        package: name.clone(),
                        excluded: excluded.clone(),
                    });
                }
            }
        }

        let target = graph.subgraph(&scheduled).load_order()?;
        let to_install: Vec<String> = target
            .iter()
            .filter(|name| !installed.contains(*name))
            .cloned()
            .collect();
        auto_installed.retain(|name| to_install.contains(name));

        Ok(Self {
            to_install,
            auto_installed,
            target,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.to_install.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (name, deps) in edges {
            graph.add_node(name);
            for dep in *deps {
                graph.add_edge(name, dep);
            }
        }
        graph
    }

    #[test]
    fn empty_graph() {
        let graph = DependencyGraph::new();
        assert_eq!(graph.node_count(), 0);
        assert!(graph.load_order().unwrap().is_empty());
    }

    #[test]
    fn diamond_orders_dependencies_first() {
        let graph = graph(&[
            ("base", &[]),
            ("left", &["base"]),
            ("right", &["base"]),
            ("top", &["left", "right"]),
        ]);
        assert_eq!(graph.load_order().unwrap(), vec!["base", "left", "right", "top"]);
    }

    #[test]
    fn peers_are_alphabetical() {
        let graph = graph(&[("zebra", &[]), ("alpha", &[]), ("mid", &[])]);
        assert_eq!(graph.load_order().unwrap(), vec!["alpha", "mid", "zebra"]);
    }

    #[test]
    fn two_cycle_reports_chain() {
        let graph = graph(&[("a", &["b"]), ("b", &["a"])]);
        let err = graph.load_order().unwrap_err();
        match err {
            Error::DependencyCycle { chain } => assert_eq!(chain, vec!["a", "b", "a"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle_of_one() {
        let graph = graph(&[("a", &["a"])]);
        assert_eq!(graph.find_cycle().unwrap(), vec!["a", "a"]);
    }

    #[test]
    fn unknown_dependency() {
        let graph = graph(&[("sale", &["product"])]);
        assert!(matches!(
            graph.load_order(),
            Err(Error::UnknownDependency { ref dependency, .. }) if dependency == "product"
        ));
    }

    #[test]
    fn dependents_closure_is_transitive() {
        let graph = graph(&[
            ("base", &[]),
            ("product", &["base"]),
            ("sale", &["product"]),
            ("crm", &["base"]),
        ]);
        let closure = graph.dependents_closure(["product"]);
        assert_eq!(
            closure.into_iter().collect::<Vec<_>>(),
            vec!["product".to_string(), "sale".to_string()]
        );
    }

    #[test]
    fn dependency_closure_is_transitive() {
        let graph = graph(&[("base", &[]), ("product", &["base"]), ("sale", &["product"])]);
        let closure = graph.dependency_closure(["sale"]).unwrap();
        assert_eq!(closure.len(), 3);
    }
}
