//! [`TestAddons`] builder for loader test scenarios.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary directory holding an addons path and a database file.
///
/// # Example
///
/// ```rust,no_run
/// use addon_test_utils::TestAddons;
///
/// let addons = TestAddons::new();
/// addons.package("a", &[]);
/// addons.model("a", "thing.toml", r#"
/// [[model]]
/// name = "thing"
/// mode = "new"
/// [model.fields.name]
/// type = "text"
/// required = true
/// "#);
/// addons.assert_file_exists("addons/a/__manifest__.toml");
/// ```
pub struct TestAddons {
    temp_dir: TempDir,
}

impl Default for TestAddons {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAddons {
    /// Create an empty addons path in a fresh temporary directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("addons")).unwrap();
        Self { temp_dir }
    }

    /// Root of the temporary directory.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// The addons path entry packages are written to.
    pub fn addons_path(&self) -> PathBuf {
        self.root().join("addons")
    }

    /// A second addons path entry, for shadowing tests.
    pub fn extra_addons_path(&self) -> PathBuf {
        let path = self.root().join("extra-addons");
        fs::create_dir_all(&path).unwrap();
        path
    }

    /// Path of the JSON database file (not created).
    pub fn database_path(&self) -> PathBuf {
        self.root().join("db.json")
    }

    /// `file://` URL of the database file.
    pub fn database_url(&self) -> String {
        format!("file://{}", self.database_path().display())
    }

    /// Directory of package `name`.
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.addons_path().join(name)
    }

    /// Write a package with a minimal manifest depending on `depends`.
    pub fn package(&self, name: &str, depends: &[&str]) -> PathBuf {
        self.package_with(name, depends, "")
    }

    /// Write a package whose manifest carries `extra` TOML after the
    /// generated `name`/`depends` keys.
    pub fn package_with(&self, name: &str, depends: &[&str], extra: &str) -> PathBuf {
        let depends = depends
            .iter()
            .map(|d| format!("\"{d}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let manifest = format!("name = \"{name}\"\ndepends = [{depends}]\n{extra}\n");
        self.manifest(name, &manifest)
    }

    /// Write the raw manifest of package `name`.
    pub fn manifest(&self, name: &str, content: &str) -> PathBuf {
        let dir = self.package_dir(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("__manifest__.toml"), content).unwrap();
        dir
    }

    /// Write `models/<file>` in package `name`.
    pub fn model(&self, name: &str, file: &str, content: &str) -> PathBuf {
        self.file(name, &format!("models/{file}"), content)
    }

    /// Write any file relative to package `name`.
    pub fn file(&self, name: &str, relative: &str, content: &str) -> PathBuf {
        let path = self.package_dir(name).join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    /// Delete a file relative to package `name`.
    pub fn remove_file(&self, name: &str, relative: &str) {
        fs::remove_file(self.package_dir(name).join(relative)).unwrap();
    }

    /// Assert that `path` (relative to the root) exists.
    ///
    /// # Panics
    /// Panics with a descriptive message if the path does not exist.
    pub fn assert_file_exists(&self, path: &str) {
        let full_path = self.root().join(path);
        assert!(
            full_path.exists(),
            "Expected file to exist: {}",
            full_path.display()
        );
    }

    /// Assert that the file at `path` (relative to the root) contains
    /// `content`.
    pub fn assert_file_contains(&self, path: &str, content: &str) {
        let full_path = self.root().join(path);
        let file_content = fs::read_to_string(&full_path)
            .unwrap_or_else(|_| panic!("Could not read file: {}", full_path.display()));
        assert!(
            file_content.contains(content),
            "File {} does not contain expected content.\nExpected: {}\nActual: {}",
            full_path.display(),
            content,
            file_content
        );
    }
}
