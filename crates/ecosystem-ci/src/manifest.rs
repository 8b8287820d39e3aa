//! Reading and writing `package.json` and `pnpm-workspace.yaml`.
//!
//! Both documents are edited as untyped trees so unrelated fields, and the
//! key order of `package.json`, survive a round trip.

use std::path::{Path, PathBuf};

use ecosystem_ci_core::{EcosystemError, Result};
use serde_json::{Map, Value};

pub const PACKAGE_JSON: &str = "package.json";
pub const PNPM_WORKSPACE_YAML: &str = "pnpm-workspace.yaml";

/// A project's `package.json`.
#[derive(Debug, Clone)]
pub struct PackageManifest {
    path: PathBuf,
    root: Map<String, Value>,
}

impl PackageManifest {
    /// Load `<dir>/package.json`; a missing file is `MissingManifestField`.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(PACKAGE_JSON);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EcosystemError::MissingManifestField(format!(
                    "{} does not exist",
                    path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<Value>(&text)? {
            Value::Object(root) => Ok(Self { path, root }),
            _ => Err(EcosystemError::MissingManifestField(format!(
                "{} is not a JSON object",
                path.display()
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> Option<&str> {
        self.root.get("name").and_then(Value::as_str)
    }

    pub fn version(&self) -> Option<&str> {
        self.root.get("version").and_then(Value::as_str)
    }

    /// The `packageManager` field (`name@version`).
    pub fn package_manager(&self) -> Option<&str> {
        self.root.get("packageManager").and_then(Value::as_str)
    }

    pub fn scripts(&self) -> impl Iterator<Item = &str> {
        self.object(&["scripts"])
            .into_iter()
            .flat_map(|scripts| scripts.keys().map(String::as_str))
    }

    pub fn script(&self, name: &str) -> Option<&str> {
        self.object(&["scripts"])
            .and_then(|scripts| scripts.get(name))
            .and_then(Value::as_str)
    }

    /// Whether `name` is declared with a non-empty command.
    pub fn has_script(&self, name: &str) -> bool {
        self.script(name).is_some_and(|script| !script.is_empty())
    }

    /// The object at `path`, if every segment exists and is an object.
    pub fn object(&self, path: &[&str]) -> Option<&Map<String, Value>> {
        let (first, rest) = path.split_first()?;
        let mut current = self.root.get(*first)?.as_object()?;
        for key in rest {
            current = current.get(*key)?.as_object()?;
        }
        Some(current)
    }

    /// Whether an object exists at `path`, even an empty one.
    pub fn has_object(&self, path: &[&str]) -> bool {
        self.object(path).is_some()
    }

    /// Merge string entries into the object at `path`, creating it as needed.
    ///
    /// Incoming entries win over existing keys.
    pub fn merge_entries<'a>(
        &mut self,
        path: &[&str],
        entries: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) {
        let entries: Vec<_> = entries.into_iter().collect();
        merge_at(&mut self.root, path, &entries);
    }

    /// Replace `section[name]` only when it is already set to a truthy value.
    pub fn replace_existing(&mut self, section: &str, name: &str, value: &str) -> bool {
        let Some(Value::Object(map)) = self.root.get_mut(section) else {
            return false;
        };
        match map.get_mut(name) {
            Some(current) if is_truthy(current) => {
                *current = Value::String(value.to_string());
                true
            }
            _ => false,
        }
    }

    /// Drop a top-level field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.root.shift_remove(key)
    }

    /// Write back with two-space indentation and no trailing newline.
    pub fn save(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.root)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

fn merge_at(map: &mut Map<String, Value>, path: &[&str], entries: &[(&str, &str)]) {
    let Some((first, rest)) = path.split_first() else {
        for (name, value) in entries {
            map.insert(name.to_string(), Value::String(value.to_string()));
        }
        return;
    };
    if let Some(Value::Object(child)) = map.get_mut(*first) {
        merge_at(child, rest, entries);
    } else {
        let mut child = Map::new();
        merge_at(&mut child, rest, entries);
        map.insert(first.to_string(), Value::Object(child));
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// A project's `pnpm-workspace.yaml`.
#[derive(Debug, Clone)]
pub struct PnpmWorkspaceFile {
    path: PathBuf,
    root: serde_yaml::Mapping,
}

impl PnpmWorkspaceFile {
    /// Load `<dir>/pnpm-workspace.yaml`; `None` when absent. An empty file is an empty mapping.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(PNPM_WORKSPACE_YAML);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let root = match serde_yaml::from_str::<serde_yaml::Value>(&text)? {
            serde_yaml::Value::Mapping(map) => map,
            _ => serde_yaml::Mapping::new(),
        };
        Ok(Some(Self { path, root }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Workspace package globs.
    pub fn packages(&self) -> Vec<String> {
        self.root
            .get("packages")
            .and_then(serde_yaml::Value::as_sequence)
            .map(|seq| {
                seq.iter()
                    .filter_map(serde_yaml::Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn overrides(&self) -> Option<&serde_yaml::Mapping> {
        self.root
            .get("overrides")
            .and_then(serde_yaml::Value::as_mapping)
    }

    /// An `overrides` mapping counts even when it is empty.
    pub fn has_overrides(&self) -> bool {
        self.overrides().is_some()
    }

    /// Merge entries into `overrides`; incoming entries win.
    pub fn merge_overrides<'a>(&mut self, entries: impl IntoIterator<Item = (&'a str, &'a str)>) {
        let key = serde_yaml::Value::from("overrides");
        let slot = self
            .root
            .entry(key)
            .or_insert_with(|| serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
        if !slot.is_mapping() {
            *slot = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
        }
        if let serde_yaml::Value::Mapping(map) = slot {
            for (name, value) in entries {
                map.insert(name.into(), value.into());
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let text = serde_yaml::to_string(&self.root)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_manifest(dir: &Path, json: &str) -> PackageManifest {
        std::fs::write(dir.join(PACKAGE_JSON), json).unwrap();
        PackageManifest::load(dir).unwrap()
    }

    #[test]
    fn test_missing_manifest_is_missing_field() {
        let dir = tempdir().unwrap();
        let err = PackageManifest::load(dir.path()).unwrap_err();
        assert!(matches!(err, EcosystemError::MissingManifestField(_)));
    }

    #[test]
    fn test_merge_and_save_preserves_unrelated_fields_and_order() {
        let dir = tempdir().unwrap();
        let mut pkg = write_manifest(
            dir.path(),
            r#"{"name":"app","private":true,"scripts":{"build":"rsbuild build"},"devDependencies":{"a":"1.0.0"}}"#,
        );
        pkg.merge_entries(&["pnpm", "overrides"], [("@rsbuild/core", "file:/ws/core")]);
        pkg.merge_entries(&["devDependencies"], [("a", "2.0.0"), ("b", "1.0.0")]);
        pkg.save().unwrap();

        let text = std::fs::read_to_string(dir.path().join(PACKAGE_JSON)).unwrap();
        assert!(!text.ends_with('\n'));
        let keys: Vec<_> = text
            .lines()
            .filter(|l| l.starts_with("  \""))
            .map(|l| l.trim().split('"').nth(1).unwrap().to_string())
            .collect();
        assert_eq!(keys, ["name", "private", "scripts", "devDependencies", "pnpm"]);

        let back = PackageManifest::load(dir.path()).unwrap();
        assert_eq!(back.script("build"), Some("rsbuild build"));
        assert!(back.has_object(&["pnpm", "overrides"]));
        let dev = back.object(&["devDependencies"]).unwrap();
        assert_eq!(dev["a"], "2.0.0");
        assert_eq!(dev["b"], "1.0.0");
    }

    #[test]
    fn test_replace_existing_only_touches_present_entries() {
        let dir = tempdir().unwrap();
        let mut pkg = write_manifest(
            dir.path(),
            r#"{"dependencies":{"@rspack/core":"^1.0.0","empty":""}}"#,
        );
        assert!(pkg.replace_existing("dependencies", "@rspack/core", "file:/ws/rspack"));
        assert!(!pkg.replace_existing("dependencies", "empty", "file:/x"));
        assert!(!pkg.replace_existing("dependencies", "missing", "file:/x"));
        assert!(!pkg.replace_existing("devDependencies", "@rspack/core", "file:/x"));

        let deps = pkg.object(&["dependencies"]).unwrap();
        assert_eq!(deps["@rspack/core"], "file:/ws/rspack");
        assert_eq!(deps["empty"], "");
        assert!(deps.get("missing").is_none());
    }

    #[test]
    fn test_has_script_and_scripts() {
        let dir = tempdir().unwrap();
        let pkg = write_manifest(
            dir.path(),
            r#"{"scripts":{"test":"vitest","e2e":"playwright","lint":""}}"#,
        );
        assert!(pkg.has_script("test"));
        assert!(!pkg.has_script("build"));
        assert!(!pkg.has_script("lint"));
        assert_eq!(pkg.scripts().collect::<Vec<_>>(), ["test", "e2e", "lint"]);
    }

    #[test]
    fn test_workspace_file_round_trip() {
        let dir = tempdir().unwrap();
        assert!(PnpmWorkspaceFile::load(dir.path()).unwrap().is_none());

        std::fs::write(
            dir.path().join(PNPM_WORKSPACE_YAML),
            "packages:\n  - packages/*\n  - '!packages/private'\noverrides:\n  foo: 1.0.0\n",
        )
        .unwrap();
        let mut ws = PnpmWorkspaceFile::load(dir.path()).unwrap().unwrap();
        assert_eq!(ws.packages(), ["packages/*", "!packages/private"]);
        assert!(ws.has_overrides());

        ws.merge_overrides([("foo", "2.0.0"), ("bar", "file:/ws/bar")]);
        ws.save().unwrap();

        let back = PnpmWorkspaceFile::load(dir.path()).unwrap().unwrap();
        let overrides = back.overrides().unwrap();
        assert_eq!(overrides.get("foo").and_then(|v| v.as_str()), Some("2.0.0"));
        assert_eq!(overrides.get("bar").and_then(|v| v.as_str()), Some("file:/ws/bar"));
        assert_eq!(back.packages().len(), 2);
    }

    #[test]
    fn test_empty_workspace_file_is_empty_mapping() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(PNPM_WORKSPACE_YAML), "").unwrap();
        let ws = PnpmWorkspaceFile::load(dir.path()).unwrap().unwrap();
        assert!(!ws.has_overrides());
        assert!(ws.packages().is_empty());

        std::fs::write(dir.path().join(PNPM_WORKSPACE_YAML), "overrides: {}\n").unwrap();
        let ws = PnpmWorkspaceFile::load(dir.path()).unwrap().unwrap();
        assert!(ws.has_overrides());
    }
}
