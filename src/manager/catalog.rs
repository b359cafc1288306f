//! Query and variables file catalogs.

use super::SessionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Suffix stripped from variables file stems: `login.vars.json` is `login`.
pub const VARS_SUFFIX: &str = ".vars";

/// A file found by a catalog glob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Path relative to the project root.
    pub file: String,
}

/// Files matched by a glob, addressable by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Every matched file, relative to the project root.
    pub files: Vec<String>,

    /// Entries by name. When two files share a name the later one wins.
    pub names: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    /// Looks up an entry by name.
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.names.get(name)
    }

    /// All names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.names.keys().cloned().collect()
    }
}

/// Builds a catalog from the files matching `pattern` under `root`.
///
/// # Arguments
///
/// * `root` - Project root the pattern is relative to
/// * `pattern` - Glob such as `queries/**/*.graphql`
/// * `strip_suffix` - Suffix removed from each file stem to form its name
///
/// # Errors
///
/// Returns `SessionError::Pattern` if the glob is malformed.
pub fn read_glob(
    root: &Path,
    pattern: &str,
    strip_suffix: Option<&str>,
) -> Result<Catalog, SessionError> {
    let full = root.join(pattern);
    let invalid = |reason: String| SessionError::Pattern {
        pattern: pattern.to_string(),
        reason,
    };
    let full = full
        .to_str()
        .ok_or_else(|| invalid("path is not valid UTF-8".to_string()))?;
    let paths = glob::glob(full).map_err(|e| invalid(e.to_string()))?;

    let mut catalog = Catalog::default();
    for path in paths.filter_map(Result::ok).filter(|p| p.is_file()) {
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let file = relative.to_string_lossy().into_owned();

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match strip_suffix {
            Some(suffix) => stem.strip_suffix(suffix).unwrap_or(&stem).to_string(),
            None => stem,
        };

        catalog.files.push(file.clone());
        catalog.names.insert(name, CatalogEntry { file });
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_read_glob_names_by_stem() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "queries/login.graphql");
        touch(dir.path(), "queries/devices/device.graphql");
        touch(dir.path(), "queries/notes.txt");

        let catalog = read_glob(dir.path(), "queries/**/*.graphql", None).unwrap();
        assert_eq!(catalog.files.len(), 2);
        assert_eq!(catalog.names(), vec!["device", "login"]);
        assert_eq!(catalog.get("login").unwrap().file, "queries/login.graphql");
        assert_eq!(
            catalog.get("device").unwrap().file,
            "queries/devices/device.graphql"
        );
    }

    #[test]
    fn test_read_glob_strips_vars_suffix() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "queries/login.vars.json");

        let catalog = read_glob(dir.path(), "queries/**/*.vars.json", Some(VARS_SUFFIX)).unwrap();
        assert_eq!(catalog.names(), vec!["login"]);
        assert_eq!(catalog.get("login").unwrap().file, "queries/login.vars.json");
    }

    #[test]
    fn test_read_glob_no_matches() {
        let dir = TempDir::new().unwrap();
        let catalog = read_glob(dir.path(), "queries/**/*.graphql", None).unwrap();
        assert!(catalog.files.is_empty());
        assert!(catalog.names.is_empty());
    }

    #[test]
    fn test_read_glob_invalid_pattern() {
        let dir = TempDir::new().unwrap();
        let result = read_glob(dir.path(), "queries/[.graphql", None);
        assert!(matches!(result, Err(SessionError::Pattern { .. })));
    }

    #[test]
    fn test_catalog_serialization() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "queries/a.graphql");
        let catalog = read_glob(dir.path(), "queries/*.graphql", None).unwrap();

        let value = serde_json::to_value(&catalog).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "files": ["queries/a.graphql"],
                "names": {"a": {"file": "queries/a.graphql"}}
            })
        );
    }
}
