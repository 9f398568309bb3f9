//! Checks for `external_dependencies`: executables and Python modules the
//! host must provide.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::discovery::Package;
use crate::error::{Error, Result};

/// Locate an executable on `PATH`.
pub fn find_on_path(tool: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    let extensions: Vec<String> = if cfg!(windows) {
        std::env::var("PATHEXT")
            .unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string())
            .split(';')
            .map(|s| s.to_ascii_lowercase())
            .collect()
    } else {
        vec![String::new()]
    };

    for dir in std::env::split_paths(&path_var) {
        for ext in &extensions {
            let candidate = dir.join(format!("{tool}{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Whether `python3` can import `module`. `None` when no interpreter is
/// available to ask.
pub fn python_module_available(module: &str) -> Option<bool> {
    let python = find_on_path("python3")?;
    let status = Command::new(python)
        .arg("-c")
        .arg(format!("import {module}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .ok()?;
    Some(status.success())
}

/// Fail on the first external dependency of `package` that is missing.
pub fn check(package: &Package) -> Result<()> {
    let deps = &package.manifest.external_dependencies;

    for bin in &deps.bin {
        if find_on_path(bin).is_none() {
            return Err(Error::ExternalDependency {
                package: package.name.clone(),
                kind: "bin",
                name: bin.clone(),
            });
        }
    }

    for module in &deps.python {
        match python_module_available(module) {
            Some(true) => {}
            Some(false) => {
                return Err(Error::ExternalDependency {
                    package: package.name.clone(),
                    kind: "python",
                    name: module.clone(),
                });
            }
            None => tracing::warn!(
                package = package.name.as_str(),
                module = module.as_str(),
                "python3 not found, cannot check python dependency"
            ),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_fails() {
        let mut package = Package::builtin_base();
        package.manifest.external_dependencies.bin =
            vec!["definitely-not-a-real-binary-xyz".to_string()];
        assert!(matches!(
            check(&package),
            Err(Error::ExternalDependency { kind: "bin", .. })
        ));
    }

    #[test]
    fn no_external_dependencies_passes() {
        assert!(check(&Package::builtin_base()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn shell_is_on_path() {
        assert!(find_on_path("sh").is_some());
    }
}
