//! Dependency override resolution and injection.
//!
//! Resolution decides which package names map to which local build or
//! release version. Injection writes that map into a project's manifest in
//! the convention of its package manager, then installs.

use std::collections::BTreeMap;
use std::path::Path;

use ecosystem_ci_core::{
    DevDependencyStrategy, EcosystemError, OverrideMap, OverrideValue, PackageLayout, Result,
};
use tracing::info;

use crate::context::OrchestrationContext;
use crate::lifecycle::{HookStage, LifecycleDriver};
use crate::manifest::{PackageManifest, PnpmWorkspaceFile};
use crate::package_manager::{OverrideDialect, PackageManager};
use crate::packages::{patch_binding_package_json, stack_packages};

/// How overrides are pinned and installed for a stack layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverridePolicy {
    pub dev_dependencies: DevDependencyStrategy,
    /// Extra `pnpm install` arguments; other package managers get none.
    pub pnpm_install_args: Vec<&'static str>,
}

impl OverridePolicy {
    pub fn for_layout(layout: PackageLayout) -> Self {
        match layout {
            PackageLayout::Monorepo => Self {
                dev_dependencies: DevDependencyStrategy::LocalOnly,
                pnpm_install_args: vec![
                    "--prefer-frozen-lockfile",
                    "--prefer-offline",
                    "--strict-peer-dependencies",
                    "false",
                ],
            },
            PackageLayout::NativeBinding => Self {
                dev_dependencies: DevDependencyStrategy::All,
                pnpm_install_args: vec![
                    "--prefer-frozen-lockfile",
                    "--prefer-offline",
                    "--no-strict-peer-dependencies",
                ],
            },
        }
    }

    fn install_command(&self, package_manager: PackageManager) -> String {
        match package_manager {
            PackageManager::Pnpm | PackageManager::Pnpm6 => {
                package_manager.install(&self.pnpm_install_args)
            }
            _ => package_manager.install(&[]),
        }
    }
}

/// Compute the override map for the context's stack.
///
/// With `release`, every stack package maps to that version and a manual
/// override with a different value is an `OverrideConflict`. Without it,
/// every stack package maps to its local directory unless the caller chose a
/// value for that name.
pub fn resolve_overrides(
    ctx: &mut OrchestrationContext,
    manual: &OverrideMap,
    release: Option<&str>,
) -> Result<OverrideMap> {
    let packages = stack_packages(ctx)?;
    let mut overrides = manual.clone();
    match release {
        Some(release) => {
            let names = packages.override_targets(true).map(|p| p.name.as_str());
            overrides.pin_release(names, release)?;
        }
        None => {
            if ctx.stack().layout() == PackageLayout::NativeBinding {
                patch_binding_package_json(&packages.binding)?;
            }
            for pkg in packages.override_targets(false) {
                overrides.insert_local_default(&pkg.name, &pkg.directory);
            }
        }
    }
    Ok(overrides)
}

/// Inject `overrides` into the project at `dir`, run the before-install hook
/// and install.
///
/// The working tree is cleaned first so injection never builds on a previous
/// suite's edits.
pub async fn apply_package_overrides(
    ctx: &mut OrchestrationContext,
    dir: &Path,
    manifest: &mut PackageManifest,
    overrides: &OverrideMap,
    policy: &OverridePolicy,
    driver: &mut LifecycleDriver,
) -> Result<()> {
    let package_manager = driver.package_manager();
    let dialect = package_manager.dialect()?;
    let normalized = overrides.normalize(ctx.root())?;

    ctx.run("git clean -fdxq").await?;

    inject_overrides(dir, manifest, &normalized, dialect, policy.dev_dependencies)?;
    manifest.save()?;
    info!(
        "injected {} overrides into {} ({package_manager})",
        normalized.len(),
        manifest.path().display()
    );

    driver.run_stage(ctx, HookStage::BeforeInstall).await?;
    driver
        .install(ctx, &policy.install_command(package_manager))
        .await
}

/// Write normalized overrides into the manifest (and, for pnpm, possibly the
/// workspace file) without persisting the manifest.
pub fn inject_overrides(
    dir: &Path,
    manifest: &mut PackageManifest,
    normalized: &BTreeMap<String, OverrideValue>,
    dialect: OverrideDialect,
    strategy: DevDependencyStrategy,
) -> Result<()> {
    let specifiers: Vec<(String, String)> = normalized
        .iter()
        .map(|(name, value)| (name.clone(), value.specifier()))
        .collect();
    let all = || specifiers.iter().map(|(n, v)| (n.as_str(), v.as_str()));
    let pinned: Vec<(&str, &str)> = normalized
        .iter()
        .zip(specifiers.iter())
        .filter(|((_, value), _)| strategy == DevDependencyStrategy::All || value.is_local())
        .map(|(_, (n, v))| (n.as_str(), v.as_str()))
        .collect();

    match dialect {
        OverrideDialect::WorkspaceFile => {
            manifest.merge_entries(&["devDependencies"], pinned.iter().copied());
            let workspace = PnpmWorkspaceFile::load(dir)?;
            let in_workspace = workspace.as_ref().is_some_and(PnpmWorkspaceFile::has_overrides);
            let in_manifest = manifest.has_object(&["pnpm", "overrides"]);
            if in_workspace && in_manifest {
                return Err(EcosystemError::ConflictingOverrides {
                    dir: dir.to_path_buf(),
                });
            }
            match workspace {
                Some(mut workspace) if in_workspace => {
                    workspace.merge_overrides(all());
                    workspace.save()?;
                }
                _ => manifest.merge_entries(&["pnpm", "overrides"], all()),
            }
        }
        OverrideDialect::Resolutions => {
            manifest.merge_entries(&["devDependencies"], pinned.iter().copied());
            manifest.merge_entries(&["resolutions"], all());
        }
        OverrideDialect::Overrides => {
            manifest.merge_entries(&["overrides"], all());
            for (name, specifier) in all() {
                manifest.replace_existing("dependencies", name, specifier);
                manifest.replace_existing("devDependencies", name, specifier);
            }
        }
    }
    Ok(())
}
