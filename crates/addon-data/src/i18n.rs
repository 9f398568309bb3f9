//! Translation files: `i18n/<lang>.toml` in a package.
//!
//! ```toml
//! [[term]]
//! record = "group_user"
//! field = "name"
//! value = "Utilisateur"
//! ```

use std::path::Path;

use addon_fs::{DocumentStore, NormalizedPath};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TranslationFile {
    #[serde(default)]
    pub term: Vec<Term>,
}

/// One translated value of a record's field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Term {
    /// External id of the record, qualified with the package when bare.
    pub record: String,
    pub field: String,
    pub value: String,
}

impl TranslationFile {
    pub fn load(package: &str, path: &Path) -> Result<Self> {
        DocumentStore::new()
            .load(&NormalizedPath::new(path))
            .map_err(|e| Error::DataFile {
                package: package.to_string(),
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_terms() {
        let file: TranslationFile = toml::from_str(
            r#"
[[term]]
record = "group_user"
field = "name"
value = "Utilisateur"
"#,
        )
        .unwrap();
        assert_eq!(file.term.len(), 1);
        assert_eq!(file.term[0].value, "Utilisateur");
    }

    #[test]
    fn rejects_unknown_keys() {
        let parsed = toml::from_str::<TranslationFile>("[[term]]\nrecord = \"a\"\nfield = \"b\"\nvalue = \"c\"\nlang = \"fr\"\n");
        assert!(parsed.is_err());
    }
}
