//! Profiles map package names to levels.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a profile could not be loaded.
#[derive(Error, Debug)]
pub enum ProfileLoadError {
    #[error("profile {} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("profile {} could not be read: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("profile {} is malformed: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// `package name -> level name`, with an optional fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Level for packages without their own entry.
    #[serde(default)]
    pub default: Option<String>,

    /// Per-package levels.
    #[serde(default)]
    pub packages: BTreeMap<String, String>,
}

impl Profile {
    /// The profile used when none is given: every package at `default`.
    pub fn builtin() -> Self {
        Self {
            default: Some("default".to_string()),
            packages: BTreeMap::new(),
        }
    }

    /// Load a profile file.
    pub fn load(path: &Path) -> Result<Self, ProfileLoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ProfileLoadError::NotFound(path.to_path_buf())
            } else {
                ProfileLoadError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        toml::from_str(&content).map_err(|source| ProfileLoadError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Level for a package: its own entry, else the default.
    pub fn level_for(&self, package: &str) -> Option<&str> {
        self.packages
            .get(package)
            .or(self.default.as_ref())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for() {
        let profile: Profile = toml::from_str(
            r#"
default = "default"

[packages]
pkgA = "strict"
"#,
        )
        .unwrap();

        assert_eq!(profile.level_for("pkgA"), Some("strict"));
        assert_eq!(profile.level_for("other"), Some("default"));
    }

    #[test]
    fn test_no_default() {
        let profile: Profile = toml::from_str("[packages]\npkgA = \"strict\"\n").unwrap();
        assert_eq!(profile.level_for("pkgB"), None);
        assert_eq!(Profile::builtin().level_for("anything"), Some("default"));
    }

    #[test]
    fn test_load_errors_are_distinguishable() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("profile.toml");
        assert!(matches!(Profile::load(&missing), Err(ProfileLoadError::NotFound(_))));

        std::fs::write(&missing, "default = [").unwrap();
        assert!(matches!(Profile::load(&missing), Err(ProfileLoadError::Malformed { .. })));

        // a directory cannot be read as a file
        assert!(matches!(
            Profile::load(dir.path()),
            Err(ProfileLoadError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_load_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.toml");
        std::fs::write(&path, "default = \"security\"\n").unwrap();

        let profile = Profile::load(&path).unwrap();
        assert_eq!(profile.level_for("x"), Some("security"));
        assert!(profile.packages.is_empty());
    }
}
