use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The RDFTEXT_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/rdftext/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var("RDFTEXT_DATA_DIR") {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("rdftext")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_db(&self) -> PathBuf {
        self.root.join("config.redb")
    }

    /// Directory of the named index. Not created; the index creates it
    /// when first opened.
    pub fn index_dir(&self, name: &str) -> Result<PathBuf> {
        validate_index_name(name)?;
        Ok(self.root.join("indexes").join(name))
    }
}

/// Index names become directory names, so only ASCII letters, digits,
/// `_` and `-` are allowed.
pub fn validate_index_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(Error::Config(format!(
            "invalid index name '{name}': use letters, digits, '_' or '-'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_with_explicit_path() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();

        assert_eq!(dir.root(), tmp.path());
        assert_eq!(dir.config_db(), tmp.path().join("config.redb"));
    }

    #[test]
    fn resolve_creates_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("nested").join("data");
        DataDir::resolve(Some(&root)).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn index_dirs_live_under_indexes() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();
        let labels = dir.index_dir("labels").unwrap();
        assert_eq!(labels, tmp.path().join("indexes").join("labels"));
        assert!(!labels.exists());
    }

    #[test]
    fn index_names_cannot_escape_the_data_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();

        let bad = ["", ".", "..", "../../escaped", "a/b", "a\\b", "sp ace"];
        for name in bad {
            assert!(
                matches!(dir.index_dir(name), Err(Error::Config(_))),
                "{name:?} should be rejected"
            );
        }
        assert!(dir.index_dir("dbpedia_labels-2").is_ok());
    }
}
