//! Reports returned by loader operations

use addon_data::LoadStats;
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

/// Which operation produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Install,
    Upgrade,
    Uninstall,
}

/// The package whose transaction was rolled back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFailure {
    pub package: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Data-load counters summed over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTotals {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub translated: usize,
}

impl DataTotals {
    pub fn add(&mut self, stats: LoadStats) {
        self.created += stats.created;
        self.updated += stats.updated;
        self.skipped += stats.skipped;
        self.deleted += stats.deleted;
        self.translated += stats.translated;
    }
}

/// Outcome of an install, upgrade or uninstall run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub operation: Operation,
    /// Packages installed by this run, in load order
    pub installed: Vec<String>,
    /// Packages upgraded by this run, in load order
    pub upgraded: Vec<String>,
    /// Packages uninstalled by this run, in removal order
    pub removed: Vec<String>,
    /// Packages pulled in by `auto_install`
    pub auto_installed: Vec<String>,
    /// Packages queued behind a failure or a cancellation
    pub skipped: Vec<String>,
    /// Schema operations applied
    pub schema_ops: usize,
    pub data: DataTotals,
    pub warnings: Vec<String>,
    pub failure: Option<PackageFailure>,
    pub cancelled: bool,
    /// Fingerprint of the registry published at the end of the run
    pub fingerprint: Option<String>,
}

impl LoadReport {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            installed: Vec::new(),
            upgraded: Vec::new(),
            removed: Vec::new(),
            auto_installed: Vec::new(),
            skipped: Vec::new(),
            schema_ops: 0,
            data: DataTotals::default(),
            warnings: Vec::new(),
            failure: None,
            cancelled: false,
            fingerprint: None,
        }
    }

    /// Whether every queued package was processed.
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && !self.cancelled
    }

    /// Record `error` as the failure of `package`.
    pub fn fail(&mut self, package: &str, error: &Error) {
        self.failure = Some(PackageFailure {
            package: package.to_string(),
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.warnings.push(message);
    }
}

/// Outcome of a dry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Full target set in load order
    pub load_order: Vec<String>,
    /// Packages that are not installed yet
    pub to_install: Vec<String>,
    /// Models of the target registry
    pub models: usize,
    pub fingerprint: String,
    /// Pending schema changes, as SQL
    pub statements: Vec<String>,
    /// Columns and tables no model needs any more
    pub orphans: Vec<String>,
}

impl VerifyReport {
    /// Whether the store already matches the target registry.
    pub fn is_clean(&self) -> bool {
        self.to_install.is_empty() && self.statements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_marks_report_unsuccessful() {
        let mut report = LoadReport::new(Operation::Install);
        assert!(report.is_success());
        report.fail("b", &Error::NotInstalled("b".into()));
        assert!(!report.is_success());
        assert_eq!(report.failure.as_ref().unwrap().kind, ErrorKind::Validation);
    }

    #[test]
    fn totals_accumulate() {
        let mut totals = DataTotals::default();
        totals.add(LoadStats {
            created: 2,
            updated: 1,
            ..LoadStats::default()
        });
        totals.add(LoadStats {
            created: 1,
            ..LoadStats::default()
        });
        assert_eq!(totals.created, 3);
        assert_eq!(totals.updated, 1);
    }
}
