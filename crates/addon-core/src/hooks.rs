//! Package lifecycle hooks
//!
//! Manifests name hooks per phase (`pre_init_hook`, `post_init_hook`,
//! `uninstall_hook`, `post_load`). A name of the form `sh:<command>` runs
//! through the system shell in the package directory; any other name is
//! looked up in a [`HookTable`] of Rust callables supplied by the
//! embedding program.

use std::collections::HashMap;
use std::fmt;
use std::process::Command;
use std::sync::Arc;

use addon_model::Registry;
use addon_packages::Package;
use addon_store::Database;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Phases a package hook can run in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPhase {
    /// Before the package's schema sync, on install
    PreInit,
    /// After the package's data is loaded, on install
    PostInit,
    /// Before the package's records are removed
    Uninstall,
    /// After a run published its registry
    PostLoad,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PreInit => "pre_init",
            Self::PostInit => "post_init",
            Self::Uninstall => "uninstall",
            Self::PostLoad => "post_load",
        })
    }
}

impl HookPhase {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pre_init" => Some(Self::PreInit),
            "post_init" => Some(Self::PostInit),
            "uninstall" => Some(Self::Uninstall),
            "post_load" => Some(Self::PostLoad),
            _ => None,
        }
    }

    pub fn all_names() -> &'static [&'static str] {
        &["pre_init", "post_init", "uninstall", "post_load"]
    }

    /// The hook `package` declares for this phase.
    pub fn declared(self, package: &Package) -> Option<&str> {
        let manifest = &package.manifest;
        match self {
            Self::PreInit => manifest.pre_init_hook.as_deref(),
            Self::PostInit => manifest.post_init_hook.as_deref(),
            Self::Uninstall => manifest.uninstall_hook.as_deref(),
            Self::PostLoad => manifest.post_load.as_deref(),
        }
    }
}

/// What a hook sees: the registry, the store and the current package.
pub struct HookEnv<'a> {
    pub registry: &'a Registry,
    /// Mutable store access; `None` for `pre_init`, which may only inspect.
    pub db: Option<&'a mut Database>,
    pub package: &'a str,
    pub phase: HookPhase,
}

/// Signature of a Rust hook. An `Err` aborts the phase.
pub type HookFn = Arc<dyn Fn(&mut HookEnv<'_>) -> std::result::Result<(), String> + Send + Sync>;

/// Rust hooks by dotted name.
#[derive(Clone, Default)]
pub struct HookTable {
    hooks: HashMap<String, HookFn>,
}

impl fmt::Debug for HookTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.hooks.keys().collect();
        names.sort();
        f.debug_struct("HookTable").field("hooks", &names).finish()
    }
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, hook: F)
    where
        F: Fn(&mut HookEnv<'_>) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.hooks.insert(name.into(), Arc::new(hook));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }
}

/// Result of running a shell hook
#[derive(Debug)]
pub struct HookOutput {
    pub command: String,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Runs declared hooks.
#[derive(Debug, Clone)]
pub struct HookRunner<'a> {
    table: &'a HookTable,
    database_url: &'a str,
}

impl<'a> HookRunner<'a> {
    pub fn new(table: &'a HookTable, database_url: &'a str) -> Self {
        Self {
            table,
            database_url,
        }
    }

    /// Run the hook `package` declares for `env.phase`, if any.
    /// Returns whether a hook ran.
    pub fn run(&self, package: &Package, env: &mut HookEnv<'_>) -> Result<bool> {
        let Some(hook) = env.phase.declared(package) else {
            return Ok(false);
        };
        let phase = env.phase;
        tracing::info!(package = package.name.as_str(), %phase, hook, "running hook");
        let failed = |message: String| Error::HookFailed {
            package: package.name.clone(),
            phase: phase.to_string(),
            hook: hook.to_string(),
            message,
        };

        if let Some(command) = hook.strip_prefix("sh:") {
            let output = self.shell(package, phase, command.trim())?;
            if !output.success {
                let stderr = output.stderr.trim();
                let message = if stderr.is_empty() {
                    format!("exited with status {:?}", output.exit_code)
                } else {
                    format!("exited with status {:?}: {}", output.exit_code, stderr)
                };
                return Err(failed(message));
            }
            return Ok(true);
        }

        let Some(callable) = self.table.hooks.get(hook) else {
            return Err(Error::UnknownHook {
                package: package.name.clone(),
                phase: phase.to_string(),
                hook: hook.to_string(),
            });
        };
        callable(env).map_err(failed)?;
        Ok(true)
    }

    fn shell(&self, package: &Package, phase: HookPhase, command: &str) -> Result<HookOutput> {
        let mut process = shell_command(command);
        if let Some(root) = &package.root {
            process.current_dir(root);
        }
        let output = process
            .env("ADDON_PACKAGE", &package.name)
            .env("ADDON_PHASE", phase.to_string())
            .env("ADDON_DATABASE_URL", self.database_url)
            .output()?;

        let result = HookOutput {
            command: command.to_string(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        };
        tracing::debug!(
            command = result.command.as_str(),
            exit_code = ?result.exit_code,
            stdout = result.stdout.trim(),
            "shell hook finished"
        );
        Ok(result)
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut process = Command::new("sh");
    process.arg("-c").arg(command);
    process
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut process = Command::new("cmd");
    process.arg("/C").arg(command);
    process
}

#[cfg(test)]
mod tests {
    use super::*;
    use addon_packages::Package;
    use tempfile::TempDir;

    fn package(dir: &TempDir, hook: &str) -> Package {
        let mut package = Package::builtin_base();
        package.name = "a".to_string();
        package.root = Some(dir.path().to_path_buf());
        package.manifest.post_init_hook = Some(hook.to_string());
        package
    }

    fn run(table: &HookTable, package: &Package) -> Result<bool> {
        let registry = Registry::empty();
        let mut db = Database::in_memory();
        let mut env = HookEnv {
            registry: &registry,
            db: Some(&mut db),
            package: &package.name,
            phase: HookPhase::PostInit,
        };
        HookRunner::new(table, "memory:").run(package, &mut env)
    }

    #[test]
    fn phase_names_round_trip() {
        for name in HookPhase::all_names() {
            assert_eq!(HookPhase::parse(name).unwrap().to_string(), *name);
        }
        assert_eq!(HookPhase::parse("pre-init"), None);
    }

    #[test]
    fn no_declared_hook_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let mut package = package(&dir, "x");
        package.manifest.post_init_hook = None;
        assert!(!run(&HookTable::new(), &package).unwrap());
    }

    #[test]
    fn registered_hook_gets_the_store() {
        let dir = TempDir::new().unwrap();
        let mut table = HookTable::new();
        table.register("a.post_init", |env| {
            let db = env.db.as_mut().ok_or("no store")?;
            db.create_table("hooked").map_err(|e| e.to_string())
        });
        assert!(run(&table, &package(&dir, "a.post_init")).unwrap());
    }

    #[test]
    fn registered_hook_error_is_hook_failed() {
        let dir = TempDir::new().unwrap();
        let mut table = HookTable::new();
        table.register("a.post_init", |_| Err("boom".to_string()));
        let err = run(&table, &package(&dir, "a.post_init")).unwrap_err();
        assert!(matches!(err, Error::HookFailed { ref message, .. } if message == "boom"));
    }

    #[test]
    fn unregistered_hook_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = run(&HookTable::new(), &package(&dir, "a.missing")).unwrap_err();
        assert!(matches!(err, Error::UnknownHook { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn shell_hook_sees_package_environment() {
        let dir = TempDir::new().unwrap();
        let hook = "sh:test \"$ADDON_PACKAGE\" = a && test \"$ADDON_PHASE\" = post_init && touch ran";
        assert!(run(&HookTable::new(), &package(&dir, hook)).unwrap());
        assert!(dir.path().join("ran").exists());
    }

    #[cfg(unix)]
    #[test]
    fn failing_shell_hook_includes_stderr() {
        let dir = TempDir::new().unwrap();
        let err = run(&HookTable::new(), &package(&dir, "sh:echo nope >&2; exit 3")).unwrap_err();
        match err {
            Error::HookFailed { message, .. } => assert!(message.contains("nope"), "{message}"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
