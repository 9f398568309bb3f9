//! The lifecycle orchestrator.
//!
//! A [`Loader`] owns the package catalog and the store, and drives
//! install, upgrade and uninstall runs. Validation, topology and
//! composition are checked for the whole run before the store changes.
//! Each package then runs in its own transaction; a failing package is
//! rolled back and the packages queued behind it are skipped.

use std::collections::BTreeSet;
use std::sync::Arc;

use addon_data::{DataLoader, LoadStats, remove_package_records};
use addon_fs::NormalizedPath;
use addon_fs::checksum::files_checksum;
use addon_model::{MethodTable, Registry, RegistryHandle, build_registry};
use addon_packages::{
    BASE_PACKAGE, DependencyGraph, InstallPlan, Package, PackageSet, discover, external,
};
use addon_schema::{SchemaDiff, SchemaOp, Synchronizer};
use addon_store::{Database, PackageState};
use chrono::Utc;
use serde::Serialize;

use crate::cancel::CancelToken;
use crate::config::LoaderConfig;
use crate::error::{Error, Result};
use crate::hooks::{HookEnv, HookPhase, HookRunner, HookTable};
use crate::report::{LoadReport, Operation, VerifyReport};

/// What one package run changed, kept only if it commits.
#[derive(Debug, Default)]
struct PackageRun {
    ops: usize,
    stats: LoadStats,
    warnings: Vec<String>,
}

/// One row of `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageStatus {
    pub name: String,
    pub version: String,
    pub state: PackageState,
    /// Version recorded at the last install or upgrade.
    pub installed_version: Option<String>,
    pub summary: Option<String>,
    pub application: bool,
}

pub struct Loader {
    config: LoaderConfig,
    packages: PackageSet,
    db: Database,
    handle: Arc<RegistryHandle>,
    hooks: HookTable,
    methods: MethodTable,
    cancel: CancelToken,
}

impl Loader {
    /// Discover packages on the configured addons path and open the store.
    pub fn open(config: LoaderConfig) -> Result<Self> {
        let packages = discover(&config.addons_path)?;
        let db = Database::open(&config.database_url)?;
        Ok(Self::new(config, packages, db))
    }

    pub fn new(config: LoaderConfig, packages: PackageSet, db: Database) -> Self {
        Self {
            config,
            packages,
            db,
            handle: Arc::new(RegistryHandle::new()),
            hooks: HookTable::new(),
            methods: MethodTable::new(),
            cancel: CancelToken::new(),
        }
    }

    /// Publish through `handle` instead of a private one.
    pub fn with_handle(mut self, handle: Arc<RegistryHandle>) -> Self {
        self.handle = handle;
        self
    }

    pub fn with_hooks(mut self, hooks: HookTable) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_methods(mut self, methods: MethodTable) -> Self {
        self.methods = methods;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn packages(&self) -> &PackageSet {
        &self.packages
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn handle(&self) -> &Arc<RegistryHandle> {
        &self.handle
    }

    /// The published registry.
    pub fn registry(&self) -> Arc<Registry> {
        self.handle.load()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn into_database(self) -> Database {
        self.db
    }

    /// Load order of every known package.
    pub fn load_order(&self) -> Result<Vec<String>> {
        Ok(DependencyGraph::from_packages(&self.packages).load_order()?)
    }

    /// Installed packages still present on the addons path, in load order.
    pub fn installed(&self) -> Result<Vec<String>> {
        let mut present = BTreeSet::new();
        for name in self.db.installed_packages() {
            if self.packages.contains(&name) {
                present.insert(name);
            } else {
                tracing::warn!(package = name.as_str(), "installed package is missing from the addons path");
            }
        }
        Ok(DependencyGraph::from_packages(&self.packages)
            .subgraph(&present)
            .load_order()?)
    }

    /// Every known package with its state in the store.
    pub fn statuses(&self) -> Vec<PackageStatus> {
        self.packages
            .iter()
            .map(|package| {
                let record = self.db.package(&package.name);
                PackageStatus {
                    name: package.name.clone(),
                    version: package.manifest.version.to_string(),
                    state: record.map(|r| r.state).unwrap_or_default(),
                    installed_version: record.and_then(|r| r.version.clone()),
                    summary: package.manifest.summary.clone(),
                    application: package.manifest.application,
                }
            })
            .collect()
    }

    /// Rebuild the registry of the installed packages and publish it.
    pub fn boot(&self) -> Result<Arc<Registry>> {
        let guard = self.handle.write();
        let order = self.installed()?;
        let registry = build_registry(&self.packages, &order)?;
        Ok(guard.publish(registry))
    }

    /// Install `names` with their dependencies and auto-install packages.
    pub fn install(&mut self, names: &[String]) -> Result<LoadReport> {
        let installed: BTreeSet<String> = self.installed()?.into_iter().collect();
        let plan = InstallPlan::resolve(&self.packages, &installed, names)?;
        for name in &plan.to_install {
            external::check(self.packages.require(name)?)?;
        }

        let mut report = LoadReport::new(Operation::Install);
        report.auto_installed = plan.auto_installed.clone();
        if plan.is_empty() {
            tracing::info!("nothing to install");
            return Ok(report);
        }
        tracing::info!(packages = ?plan.to_install, "installing");
        self.run(&plan.target, &plan.to_install, &BTreeSet::new(), report)
    }

    /// Upgrade `names` (every installed package with `all`), plus every
    /// installed package whose manifest version changed. Dependencies new
    /// to the set are installed in the same run.
    pub fn upgrade(&mut self, names: &[String], all: bool) -> Result<LoadReport> {
        let order = self.installed()?;
        let installed: BTreeSet<String> = order.iter().cloned().collect();
        for name in names {
            self.packages.require(name)?;
            if !installed.contains(name) {
                return Err(Error::NotInstalled(name.clone()));
            }
        }

        let mut selected: BTreeSet<String> = names.iter().cloned().collect();
        for name in &order {
            let current = self.packages.require(name)?.manifest.version.to_string();
            let stored = self.db.package(name).and_then(|r| r.version.clone());
            if stored.as_deref() != Some(current.as_str()) {
                tracing::info!(package = name.as_str(), from = ?stored, to = current.as_str(), "version changed");
                selected.insert(name.clone());
            } else if all {
                selected.insert(name.clone());
            }
        }

        let plan = InstallPlan::resolve(&self.packages, &installed, &[])?;
        for name in &plan.to_install {
            external::check(self.packages.require(name)?)?;
        }

        let mut report = LoadReport::new(Operation::Upgrade);
        report.auto_installed = plan.auto_installed.clone();
        if selected.is_empty() && plan.is_empty() {
            tracing::info!("nothing to upgrade");
            return Ok(report);
        }
        tracing::info!(packages = ?selected, "upgrading");
        self.run(&plan.target, &plan.to_install, &selected, report)
    }

    fn run(
        &mut self,
        target: &[String],
        to_install: &[String],
        to_upgrade: &BTreeSet<String>,
        mut report: LoadReport,
    ) -> Result<LoadReport> {
        let handle = Arc::clone(&self.handle);
        let guard = handle.write();

        // The whole target must compose before anything is written.
        build_registry(&self.packages, target)?;

        let mut done: BTreeSet<String> = target
            .iter()
            .filter(|name| !to_install.contains(*name))
            .cloned()
            .collect();
        let queue: Vec<&String> = target
            .iter()
            .filter(|name| to_install.contains(*name) || to_upgrade.contains(*name))
            .collect();

        for (index, name) in queue.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(package = name.as_str(), "load cancelled");
                report.cancelled = true;
                report.skipped = queue[index..].iter().map(|n| n.to_string()).collect();
                return Ok(report);
            }

            let upgrade = !to_install.contains(*name);
            done.insert(name.to_string());
            let prefix: Vec<String> = target
                .iter()
                .filter(|n| done.contains(*n))
                .cloned()
                .collect();
            let result = match build_registry(&self.packages, &prefix) {
                Ok(registry) => self.load_package(name, &registry, upgrade),
                Err(error) => Err(error.into()),
            };

            match result {
                Ok(run) => {
                    report.schema_ops += run.ops;
                    report.data.add(run.stats);
                    for warning in run.warnings {
                        report.warn(warning);
                    }
                    if upgrade {
                        report.upgraded.push(name.to_string());
                    } else {
                        report.installed.push(name.to_string());
                    }
                }
                Err(error) => {
                    tracing::error!(package = name.as_str(), %error, "package rolled back");
                    report.fail(name, &error);
                    report.skipped = queue[index + 1..].iter().map(|n| n.to_string()).collect();
                    break;
                }
            }
        }

        let order = self.installed()?;
        let registry = guard.publish(build_registry(&self.packages, &order)?);
        report.fingerprint = Some(registry.fingerprint().to_string());

        let loaded: Vec<String> = report
            .installed
            .iter()
            .chain(&report.upgraded)
            .cloned()
            .collect();
        self.post_load(&registry, &loaded, &mut report)?;
        Ok(report)
    }

    fn post_load(&mut self, registry: &Registry, loaded: &[String], report: &mut LoadReport) -> Result<()> {
        let mut ran = false;
        for name in loaded {
            let package = self.packages.require(name)?;
            let mut env = HookEnv {
                registry,
                db: Some(&mut self.db),
                package: name,
                phase: HookPhase::PostLoad,
            };
            match HookRunner::new(&self.hooks, &self.config.database_url).run(package, &mut env) {
                Ok(hook_ran) => ran |= hook_ran,
                Err(error) => report.warn(error.to_string()),
            }
        }
        if ran {
            self.db.save()?;
        }
        Ok(())
    }

    fn load_package(&mut self, name: &str, registry: &Registry, upgrade: bool) -> Result<PackageRun> {
        self.db.begin()?;
        match self.load_package_phases(name, registry, upgrade) {
            Ok(run) => {
                self.db.commit().map_err(|e| Error::Data {
                    package: name.to_string(),
                    source: e.into(),
                })?;
                Ok(run)
            }
            Err(error) => {
                self.db.rollback()?;
                Err(error)
            }
        }
    }

    fn load_package_phases(&mut self, name: &str, registry: &Registry, upgrade: bool) -> Result<PackageRun> {
        let package = self.packages.require(name)?;
        let hooks = HookRunner::new(&self.hooks, &self.config.database_url);
        let schema_error = |source: addon_schema::Error| Error::Schema {
            package: name.to_string(),
            source,
        };
        let data_error = |source: addon_data::Error| Error::Data {
            package: name.to_string(),
            source,
        };
        let mut run = PackageRun::default();

        self.db.package_mut(name).state = if upgrade {
            PackageState::ToUpgrade
        } else {
            PackageState::ToInstall
        };

        if !upgrade {
            let mut env = HookEnv {
                registry,
                db: None,
                package: name,
                phase: HookPhase::PreInit,
            };
            hooks.run(package, &mut env)?;
        }

        let models: Vec<&str> = registry
            .models_affected_by(name)
            .into_iter()
            .map(|m| m.name.as_str())
            .collect();
        tracing::info!(package = name, models = models.len(), "syncing schema");
        let diff = Synchronizer::new(registry)
            .diff(&self.db, models.iter().copied())
            .map_err(schema_error)?;
        diff.apply(&mut self.db).map_err(schema_error)?;
        let record = self.db.package_mut(name);
        record
            .tables
            .extend(diff.created_tables().into_iter().map(str::to_string));
        record.columns.extend(
            diff.added_columns()
                .into_iter()
                .map(|(table, column)| (table.to_string(), column.to_string())),
        );
        run.ops = diff.len();

        tracing::info!(package = name, files = package.manifest.data.len(), "loading data");
        let mut loader = DataLoader::new(registry, name)
            .with_lang(&self.config.lang)
            .with_methods(&self.methods);
        loader
            .load_files(&mut self.db, package, &package.manifest.data)
            .map_err(data_error)?;

        if !upgrade {
            let mut env = HookEnv {
                registry,
                db: Some(&mut self.db),
                package: name,
                phase: HookPhase::PostInit,
            };
            hooks.run(package, &mut env)?;
        }

        let demo = if upgrade {
            self.db.package(name).is_some_and(|r| r.demo)
        } else {
            self.config.demo
        };
        let mut demo_loaded = false;
        if demo && !package.manifest.demo.is_empty() {
            tracing::info!(package = name, files = package.manifest.demo.len(), "loading demo data");
            let savepoint = self.db.savepoint()?;
            let result = loader
                .load_files(&mut self.db, package, &package.manifest.demo)
                .and_then(|()| self.db.check_foreign_keys().map_err(addon_data::Error::from));
            match result {
                Ok(()) => demo_loaded = true,
                Err(error) => {
                    self.db.rollback_to(savepoint);
                    run.warnings
                        .push(format!("demo data of package '{name}' was not loaded: {error}"));
                }
            }
        }

        loader
            .load_translations(&mut self.db, package)
            .map_err(data_error)?;
        if upgrade {
            loader.remove_obsolete(&mut self.db).map_err(data_error)?;
        }
        run.stats = loader.stats();

        let checksum = data_checksum(package)?;
        let now = Utc::now();
        let record = self.db.package_mut(name);
        record.state = PackageState::Installed;
        record.version = Some(package.manifest.version.to_string());
        record.models = models.iter().map(|m| m.to_string()).collect();
        record.demo |= demo_loaded;
        record.data_checksum = checksum;
        if !upgrade {
            record.installed_at = Some(now);
        }
        record.updated_at = Some(now);
        tracing::info!(package = name, upgrade, "package loaded");
        Ok(run)
    }

    /// Uninstall `names` and every installed package depending on them,
    /// in reverse load order. Tables and columns the packages added are
    /// dropped only with `drop`.
    pub fn uninstall(&mut self, names: &[String], drop: bool) -> Result<LoadReport> {
        let order = self.installed()?;
        for name in names {
            if name == BASE_PACKAGE {
                return Err(Error::BaseRequired);
            }
            self.packages.require(name)?;
            if !order.contains(name) {
                return Err(Error::NotInstalled(name.clone()));
            }
        }

        let closure = DependencyGraph::from_packages(&self.packages)
            .dependents_closure(names.iter().map(String::as_str));
        let mut removal: Vec<String> = order
            .iter()
            .filter(|name| closure.contains(*name))
            .cloned()
            .collect();
        removal.reverse();
        let mut kept: Vec<String> = order
            .iter()
            .filter(|name| !closure.contains(*name))
            .cloned()
            .collect();

        let handle = Arc::clone(&self.handle);
        let guard = handle.write();
        build_registry(&self.packages, &kept)?;
        tracing::info!(packages = ?removal, drop, "uninstalling");

        let mut report = LoadReport::new(Operation::Uninstall);
        let mut current = build_registry(&self.packages, &order)?;
        kept = order.clone();
        for (index, name) in removal.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(package = name.as_str(), "uninstall cancelled");
                report.cancelled = true;
                report.skipped = removal[index..].to_vec();
                return Ok(report);
            }

            kept.retain(|n| n != name);
            let result = match build_registry(&self.packages, &kept) {
                Ok(next) => self
                    .remove_package(name, &current, &next, drop)
                    .map(|run| (next, run)),
                Err(error) => Err(error.into()),
            };
            match result {
                Ok((next, run)) => {
                    report.schema_ops += run.ops;
                    report.data.add(run.stats);
                    for warning in run.warnings {
                        report.warn(warning);
                    }
                    report.removed.push(name.clone());
                    current = next;
                }
                Err(error) => {
                    tracing::error!(package = name.as_str(), %error, "uninstall rolled back");
                    report.fail(name, &error);
                    report.skipped = removal[index + 1..].to_vec();
                    break;
                }
            }
        }

        let order = self.installed()?;
        let registry = guard.publish(build_registry(&self.packages, &order)?);
        report.fingerprint = Some(registry.fingerprint().to_string());
        Ok(report)
    }

    fn remove_package(&mut self, name: &str, current: &Registry, next: &Registry, drop: bool) -> Result<PackageRun> {
        self.db.begin()?;
        match self.remove_package_phases(name, current, next, drop) {
            Ok(run) => {
                self.db.commit().map_err(|e| Error::Data {
                    package: name.to_string(),
                    source: e.into(),
                })?;
                Ok(run)
            }
            Err(error) => {
                self.db.rollback()?;
                Err(error)
            }
        }
    }

    fn remove_package_phases(
        &mut self,
        name: &str,
        current: &Registry,
        next: &Registry,
        drop: bool,
    ) -> Result<PackageRun> {
        let package = self.packages.require(name)?;
        let schema_error = |source: addon_schema::Error| Error::Schema {
            package: name.to_string(),
            source,
        };
        let mut run = PackageRun::default();
        self.db.package_mut(name).state = PackageState::ToRemove;

        let mut env = HookEnv {
            registry: current,
            db: Some(&mut self.db),
            package: name,
            phase: HookPhase::Uninstall,
        };
        HookRunner::new(&self.hooks, &self.config.database_url).run(package, &mut env)?;

        let removed = remove_package_records(&mut self.db, current, name).map_err(|source| {
            Error::Data {
                package: name.to_string(),
                source,
            }
        })?;
        run.stats.deleted = removed.len();
        tracing::info!(package = name, records = removed.len(), "removed package records");

        let record = self.db.package(name).cloned().unwrap_or_default();
        let mut models: BTreeSet<&str> = record.models.iter().map(String::as_str).collect();
        models.extend(current.models_affected_by(name).into_iter().map(|m| m.name.as_str()));
        let sync = Synchronizer::new(next);
        let mut diff = SchemaDiff::default();
        for model in models {
            match sync.diff(&self.db, [model]) {
                Ok(model_diff) => diff.extend(model_diff.ops),
                Err(addon_schema::Error::MigrationRequired { table, column, .. }) => {
                    run.warnings.push(format!(
                        "column '{table}.{column}' keeps the type package '{name}' gave it"
                    ));
                }
                Err(error) => return Err(schema_error(error)),
            }
        }
        diff.extend(sync.relax(&self.db, &record.columns));
        if drop {
            let drops = sync.drops(&self.db, &record.tables, &record.columns);
            for op in &drops {
                tracing::info!(package = name, op = %op.to_sql(), "dropping");
            }
            diff.extend(drops);
        }
        diff.apply(&mut self.db).map_err(schema_error)?;
        run.ops = diff.len();

        let record = self.db.package_mut(name);
        record.state = PackageState::Uninstalled;
        record.version = None;
        record.demo = false;
        record.models.clear();
        record.data_checksum = None;
        record.installed_at = None;
        record.updated_at = Some(Utc::now());
        if drop {
            record.tables.clear();
            record.columns.clear();
        }
        Ok(run)
    }

    /// Dry run: compose the installed set plus `names` and diff the
    /// schema, without touching the store.
    pub fn verify(&self, names: &[String]) -> Result<VerifyReport> {
        let installed: BTreeSet<String> = self.installed()?.into_iter().collect();
        let plan = InstallPlan::resolve(&self.packages, &installed, names)?;
        for name in &plan.to_install {
            external::check(self.packages.require(name)?)?;
        }
        let registry = build_registry(&self.packages, &plan.target)?;
        let sync = Synchronizer::new(&registry);

        let mut statements = Vec::new();
        for model in registry.model_names() {
            let diff = sync.diff(&self.db, [model]).map_err(|source| Error::Schema {
                package: registry
                    .get(model)
                    .and_then(|m| m.seeded_by())
                    .unwrap_or(BASE_PACKAGE)
                    .to_string(),
                source,
            })?;
            statements.extend(diff.to_sql());
        }

        let mut tables = BTreeSet::new();
        let mut columns = BTreeSet::new();
        for (_, record) in self.db.packages() {
            tables.extend(record.tables.iter().cloned());
            columns.extend(record.columns.iter().cloned());
        }
        let orphans = sync
            .drops(&self.db, &tables, &columns)
            .into_iter()
            .filter_map(|op| match op {
                SchemaOp::DropColumn { table, column } => Some(format!("{table}.{column}")),
                SchemaOp::DropTable { table } => Some(table),
                _ => None,
            })
            .collect();

        Ok(VerifyReport {
            load_order: plan.target,
            to_install: plan.to_install,
            models: registry.len(),
            fingerprint: registry.fingerprint().to_string(),
            statements,
            orphans,
        })
    }
}

/// Checksum over the package's data and demo files, if it has any.
fn data_checksum(package: &Package) -> Result<Option<String>> {
    let files = package
        .manifest
        .data
        .iter()
        .chain(&package.manifest.demo)
        .map(|relative| package.file(relative).map(NormalizedPath::new))
        .collect::<addon_packages::Result<Vec<_>>>()?;
    if files.is_empty() {
        return Ok(None);
    }
    let checksum = files_checksum(&files).map_err(addon_packages::Error::from)?;
    Ok(Some(checksum))
}
