//! Static asset bundles.
//!
//! Packages declare, per named bundle, an ordered list of files and
//! directives. Bundles are assembled by applying every package's
//! declarations in load order. Serving the files is left to the host's
//! web layer; this module only computes the ordered file lists.

use std::collections::BTreeMap;

use crate::discovery::Package;
use crate::error::{Error, Result};
use crate::manifest::AssetEntry;

/// One operation on a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOp {
    /// Add a file at the end.
    Append(String),
    /// Add a file at the start.
    Prepend(String),
    /// Splice in the resolved content of another bundle.
    Include(String),
    /// Remove a file added earlier.
    Remove(String),
    /// Swap a file for another, keeping its position.
    Replace { target: String, path: String },
}

impl AssetOp {
    fn parse(package: &str, bundle: &str, entry: &AssetEntry) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidAsset {
            package: package.to_string(),
            bundle: bundle.to_string(),
            reason,
        };
        match entry {
            AssetEntry::Path(path) => Ok(Self::Append(path.clone())),
            AssetEntry::Directive(parts) => match parts.as_slice() {
                [op, arg] if op == "include" => Ok(Self::Include(arg.clone())),
                [op, arg] if op == "remove" => Ok(Self::Remove(arg.clone())),
                [op, arg] if op == "prepend" => Ok(Self::Prepend(arg.clone())),
                [op, target, path] if op == "replace" => Ok(Self::Replace {
                    target: target.clone(),
                    path: path.clone(),
                }),
                [op, ..] => Err(invalid(format!(
                    "unknown directive '{op}' or wrong number of arguments"
                ))),
                [] => Err(invalid("empty directive".to_string())),
            },
        }
    }
}

/// Every bundle's operations, in the order they apply.
#[derive(Debug, Clone, Default)]
pub struct AssetBundles {
    bundles: BTreeMap<String, Vec<(String, AssetOp)>>,
}

impl AssetBundles {
    /// Collect bundle declarations from packages given in load order.
    pub fn collect<'a, I>(packages: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Package>,
    {
        let mut bundles: BTreeMap<String, Vec<(String, AssetOp)>> = BTreeMap::new();
        for package in packages {
            for (bundle, entries) in &package.manifest.assets {
                let ops = bundles.entry(bundle.clone()).or_default();
                for entry in entries {
                    ops.push((package.name.clone(), AssetOp::parse(&package.name, bundle, entry)?));
                }
            }
        }
        Ok(Self { bundles })
    }

    pub fn names(&self) -> Vec<&str> {
        self.bundles.keys().map(String::as_str).collect()
    }

    /// Packages that contribute to `bundle`, in order, without repeats.
    pub fn contributors(&self, bundle: &str) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (package, _) in self.bundles.get(bundle).into_iter().flatten() {
            if !names.contains(&package.as_str()) {
                names.push(package);
            }
        }
        names
    }

    /// The ordered file list of `bundle`.
    pub fn resolve(&self, bundle: &str) -> Result<Vec<String>> {
        let mut stack = Vec::new();
        self.resolve_inner(bundle, &mut stack)
    }

    fn resolve_inner(&self, bundle: &str, stack: &mut Vec<String>) -> Result<Vec<String>> {
        if let Some(start) = stack.iter().position(|b| b == bundle) {
            let mut chain = stack[start..].to_vec();
            chain.push(bundle.to_string());
            return Err(Error::AssetCycle { chain });
        }
        stack.push(bundle.to_string());

        let mut files: Vec<String> = Vec::new();
        for (package, op) in self.bundles.get(bundle).into_iter().flatten() {
            match op {
                AssetOp::Append(path) => push_unique(&mut files, path),
                AssetOp::Prepend(path) => {
                    files.retain(|f| f != path);
                    files.insert(0, path.clone());
                }
                AssetOp::Include(other) => {
                    for path in self.resolve_inner(other, stack)? {
                        push_unique(&mut files, &path);
                    }
                }
                AssetOp::Remove(path) => {
                    let before = files.len();
                    files.retain(|f| f != path);
                    if files.len() == before {
                        tracing::warn!(
                            package = package.as_str(),
                            bundle,
                            path = path.as_str(),
                            "asset to remove is not in bundle"
                        );
                    }
                }
                AssetOp::Replace { target, path } => {
                    match files.iter().position(|f| f == target) {
                        Some(idx) => files[idx] = path.clone(),
                        None => {
                            return Err(Error::InvalidAsset {
                                package: package.clone(),
                                bundle: bundle.to_string(),
                                reason: format!("cannot replace missing asset '{target}'"),
                            });
                        }
                    }
                }
            }
        }

        stack.pop();
        Ok(files)
    }
}

fn push_unique(files: &mut Vec<String>, path: &str) {
    if !files.iter().any(|f| f == path) {
        files.push(path.to_string());
    }
}
