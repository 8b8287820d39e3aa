//! The package set a stack publishes, discovered from its checkout.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use ecosystem_ci_core::{EcosystemError, PackageLayout, Result};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::context::OrchestrationContext;
use crate::manifest::{PackageManifest, PnpmWorkspaceFile, PACKAGE_JSON};

/// File under the engine root that replaces the built-in native-binding table.
pub const PACKAGE_TABLE_FILE: &str = "rspack-package.json";

const BUILTIN_PACKAGE_TABLE: &str = include_str!("../data/rspack-packages.json");

/// A published package and its source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub directory: PathBuf,
}

impl PackageInfo {
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
        }
    }
}

/// Packages a stack contributes to overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackPackages {
    /// Prebuilt per-platform binding packages for the host.
    pub platform: Vec<PackageInfo>,
    /// Native binding packages built from source.
    pub binding: Vec<PackageInfo>,
    /// JavaScript packages.
    pub packages: Vec<PackageInfo>,
}

impl StackPackages {
    pub fn monorepo(packages: Vec<PackageInfo>) -> Self {
        Self {
            packages,
            ..Self::default()
        }
    }

    /// Packages to override; a registry release has no host platform packages to pin.
    pub fn override_targets(&self, release: bool) -> impl Iterator<Item = &PackageInfo> {
        let platform: &[PackageInfo] = if release { &[] } else { &self.platform };
        platform
            .iter()
            .chain(self.binding.iter())
            .chain(self.packages.iter())
    }
}

#[derive(Debug, Deserialize)]
struct PackageTable {
    npm: BTreeMap<String, Vec<PackageInfo>>,
    binding: Vec<PackageInfo>,
    packages: Vec<PackageInfo>,
}

/// Packages of the context's stack, cached until the checkout is replaced.
pub fn stack_packages(ctx: &mut OrchestrationContext) -> Result<StackPackages> {
    if let Some(cached) = ctx.cached_packages() {
        return Ok(cached.clone());
    }
    let packages = match ctx.stack().layout() {
        PackageLayout::Monorepo => {
            StackPackages::monorepo(discover_monorepo_packages(ctx.stack_path())?)
        }
        PackageLayout::NativeBinding => {
            load_native_binding_packages(ctx.root(), ctx.stack_path(), &platform_key())?
        }
    };
    info!(
        "{} exposes {} packages",
        ctx.stack(),
        packages.override_targets(false).count()
    );
    ctx.cache_packages(packages.clone());
    Ok(packages)
}

/// `<os>-<arch>` in the naming used by npm platform packages.
pub fn platform_key() -> String {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "aarch64" => "arm64",
        "x86_64" => "x64",
        "x86" => "ia32",
        other => other,
    };
    format!("{os}-{arch}")
}

/// Load the native-binding package table, anchoring directories at `stack_path`.
///
/// `<root>/rspack-package.json` replaces the built-in table when present.
pub fn load_native_binding_packages(
    root: &Path,
    stack_path: &Path,
    platform: &str,
) -> Result<StackPackages> {
    let override_file = root.join(PACKAGE_TABLE_FILE);
    let table: PackageTable = if override_file.is_file() {
        debug!("using package table {}", override_file.display());
        serde_json::from_str(&std::fs::read_to_string(&override_file)?)?
    } else {
        serde_json::from_str(BUILTIN_PACKAGE_TABLE)?
    };

    let anchor = |pkg: PackageInfo| PackageInfo::new(pkg.name, stack_path.join(pkg.directory));
    let mut npm = table.npm;
    let platform_packages = npm
        .remove(platform)
        .ok_or_else(|| EcosystemError::UnsupportedPlatform(platform.to_string()))?;

    Ok(StackPackages {
        platform: platform_packages.into_iter().map(anchor).collect(),
        binding: table.binding.into_iter().map(anchor).collect(),
        packages: table.packages.into_iter().map(anchor).collect(),
    })
}

/// Strip `optionalDependencies` from each binding manifest so local installs
/// never pull prebuilt platform packages from the registry.
pub fn patch_binding_package_json(binding: &[PackageInfo]) -> Result<()> {
    for info in binding {
        let mut manifest = PackageManifest::load(&info.directory)?;
        if manifest.remove("optionalDependencies").is_some() {
            debug!("dropped optionalDependencies of {}", info.name);
        }
        manifest.save()?;
    }
    Ok(())
}

/// Discover the packages of a pnpm/npm/yarn workspace rooted at `root`.
///
/// Globs come from `pnpm-workspace.yaml` `packages`, falling back to
/// `package.json` `workspaces`. A root without workspace globs is a single
/// package.
pub fn discover_monorepo_packages(root: &Path) -> Result<Vec<PackageInfo>> {
    let globs = workspace_globs(root)?;
    if globs.is_empty() {
        let manifest = PackageManifest::load(root)?;
        return Ok(manifest
            .name()
            .map(|name| vec![PackageInfo::new(name, root)])
            .unwrap_or_default());
    }

    let (excludes, includes): (Vec<_>, Vec<_>) =
        globs.iter().partition(|pattern| pattern.starts_with('!'));
    let excludes = excludes
        .iter()
        .map(|pattern| Pattern::new(pattern.trim_start_matches('!').trim_start_matches("./")))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(invalid_glob)?;

    let mut seen = BTreeSet::new();
    let mut found = Vec::new();
    for pattern in includes {
        let pattern = pattern.trim_start_matches("./").trim_end_matches('/');
        // the root is a literal path, only the workspace pattern may glob
        let full = format!("{}/{pattern}", Pattern::escape(&root.to_string_lossy()));
        for entry in glob::glob(&full).map_err(invalid_glob)? {
            let dir = match entry {
                Ok(dir) => dir,
                Err(e) => {
                    debug!("skipping unreadable workspace entry: {e}");
                    continue;
                }
            };
            let Ok(relative) = dir.strip_prefix(root) else {
                continue;
            };
            if relative.components().any(|c| c.as_os_str() == "node_modules")
                || excludes.iter().any(|ex| ex.matches_path(relative))
                || !dir.join(PACKAGE_JSON).is_file()
                || !seen.insert(dir.clone())
            {
                continue;
            }
            if let Some(name) = PackageManifest::load(&dir)?.name() {
                found.push(PackageInfo::new(name, &dir));
            }
        }
    }
    found.sort_by(|a, b| a.directory.cmp(&b.directory));
    Ok(found)
}

fn workspace_globs(root: &Path) -> Result<Vec<String>> {
    if let Some(workspace) = PnpmWorkspaceFile::load(root)? {
        let packages = workspace.packages();
        if !packages.is_empty() {
            return Ok(packages);
        }
    }
    if !root.join(PACKAGE_JSON).is_file() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(root.join(PACKAGE_JSON))?;
    let manifest: Value = serde_json::from_str(&text)?;
    let workspaces = match manifest.get("workspaces") {
        Some(Value::Array(list)) => Some(list),
        Some(Value::Object(obj)) => obj.get("packages").and_then(Value::as_array),
        _ => None,
    };
    Ok(workspaces
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default())
}

fn invalid_glob(e: glob::PatternError) -> EcosystemError {
    EcosystemError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("invalid workspace glob: {e}"),
    ))
}
