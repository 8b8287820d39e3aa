//! Package overrides: which dependency names resolve to which local build or version.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::error::{EcosystemError, Result};

/// Which overrides are additionally pinned as direct dev dependencies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DevDependencyStrategy {
    /// Pin every override.
    All,
    /// Pin only overrides pointing at a local build directory.
    LocalOnly,
}

/// A normalized override target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideValue {
    /// Absolute path to a local package build.
    LocalPath(PathBuf),
    /// Version, tag or any other specifier the package manager understands.
    Version(String),
}

impl OverrideValue {
    /// Classify a raw override value.
    ///
    /// A value is a local build when it contains `/`, is not a scoped package
    /// name, and names an existing directory (resolved against `base`).
    pub fn normalize(raw: &str, base: &Path) -> Result<Self> {
        if !raw.contains('/') || raw.starts_with('@') {
            return Ok(OverrideValue::Version(raw.to_string()));
        }
        let candidate = lexical_absolute(base, Path::new(raw));
        match std::fs::symlink_metadata(&candidate) {
            Ok(meta) if meta.is_dir() => Ok(OverrideValue::LocalPath(candidate)),
            Ok(_) => Ok(OverrideValue::Version(raw.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(OverrideValue::Version(raw.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, OverrideValue::LocalPath(_))
    }

    /// Specifier written into manifests (`file:<abs>` for local builds).
    pub fn specifier(&self) -> String {
        match self {
            OverrideValue::LocalPath(path) => format!("file:{}", path.display()),
            OverrideValue::Version(version) => version.clone(),
        }
    }
}

/// Mapping from package name (or selector) to a raw override value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverrideMap(BTreeMap<String, String>);

impl OverrideMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Release mode: every name maps to `release`.
    ///
    /// A pre-existing, non-empty override with a different value is an
    /// `OverrideConflict`; an identical value is accepted.
    pub fn pin_release<'a>(
        &mut self,
        names: impl IntoIterator<Item = &'a str>,
        release: &str,
    ) -> Result<()> {
        for name in names {
            if let Some(existing) = self.0.get(name) {
                if !existing.is_empty() && existing != release {
                    return Err(EcosystemError::OverrideConflict {
                        package: name.to_string(),
                        existing: existing.clone(),
                        release: release.to_string(),
                    });
                }
            }
            self.0.insert(name.to_string(), release.to_string());
        }
        Ok(())
    }

    /// Local mode: map `name` to `dir` unless the caller already chose a value.
    pub fn insert_local_default(&mut self, name: &str, dir: &Path) {
        let entry = self.0.entry(name.to_string()).or_default();
        if entry.is_empty() {
            *entry = dir.display().to_string();
        }
    }

    /// Normalize every value against `base`.
    pub fn normalize(&self, base: &Path) -> Result<BTreeMap<String, OverrideValue>> {
        self.0
            .iter()
            .map(|(name, raw)| Ok((name.clone(), OverrideValue::normalize(raw, base)?)))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OverrideMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Join `path` onto `base` and fold `.`/`..` without touching the filesystem.
pub fn lexical_absolute(base: &Path, path: &Path) -> PathBuf {
    let joined = base.join(path);
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_release_conflict_is_rejected() {
        let mut map: OverrideMap = [("@rsbuild/core", "1.0.0")].into_iter().collect();
        let err = map
            .pin_release(["@rsbuild/core", "@rsbuild/shared"], "2.0.0")
            .unwrap_err();
        match err {
            EcosystemError::OverrideConflict {
                package,
                existing,
                release,
            } => {
                assert_eq!(package, "@rsbuild/core");
                assert_eq!(existing, "1.0.0");
                assert_eq!(release, "2.0.0");
            }
            other => panic!("expected OverrideConflict, got {other:?}"),
        }
    }

    #[test]
    fn test_release_matching_manual_override_is_idempotent() {
        let mut map: OverrideMap = [("@rsbuild/core", "2.0.0")].into_iter().collect();
        map.pin_release(["@rsbuild/core", "@rsbuild/shared"], "2.0.0")
            .unwrap();
        assert_eq!(map.get("@rsbuild/core"), Some("2.0.0"));
        assert_eq!(map.get("@rsbuild/shared"), Some("2.0.0"));
    }

    #[test]
    fn test_local_default_keeps_explicit_override() {
        let mut map: OverrideMap = [("@rsbuild/core", "latest")].into_iter().collect();
        map.insert_local_default("@rsbuild/core", Path::new("/ws/rsbuild/packages/core"));
        map.insert_local_default("@rsbuild/shared", Path::new("/ws/rsbuild/packages/shared"));
        assert_eq!(map.get("@rsbuild/core"), Some("latest"));
        assert_eq!(
            map.get("@rsbuild/shared"),
            Some("/ws/rsbuild/packages/shared")
        );
    }

    #[test]
    fn test_normalize_existing_directory_becomes_file_specifier() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("packages/core")).unwrap();

        let value = OverrideValue::normalize("./packages/core", dir.path()).unwrap();
        assert!(value.is_local());
        assert_eq!(
            value.specifier(),
            format!("file:{}", dir.path().join("packages/core").display())
        );
    }

    #[test]
    fn test_normalize_keeps_versions_and_scoped_names() {
        let dir = tempdir().unwrap();
        for raw in ["2.0.0", "latest", "@rsbuild/core", "does/not/exist"] {
            let value = OverrideValue::normalize(raw, dir.path()).unwrap();
            assert_eq!(value, OverrideValue::Version(raw.to_string()));
        }
    }

    #[test]
    fn test_normalize_file_is_not_local() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/index.js"), "").unwrap();
        let value = OverrideValue::normalize("pkg/index.js", dir.path()).unwrap();
        assert!(!value.is_local());
    }

    #[test]
    fn test_lexical_absolute_folds_dots() {
        assert_eq!(
            lexical_absolute(Path::new("/a/b"), Path::new("../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(
            lexical_absolute(Path::new("/a/b"), Path::new("/x/y")),
            PathBuf::from("/x/y")
        );
    }
}
