//! Package manager detection and command construction.

use std::fmt;
use std::path::Path;

use ecosystem_ci_core::{EcosystemError, Result};

use crate::manifest::{PackageManifest, PACKAGE_JSON};

/// Where a package manager reads dependency overrides from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideDialect {
    /// `pnpm.overrides` in the manifest, or `overrides` in `pnpm-workspace.yaml`.
    WorkspaceFile,
    /// `resolutions` in the manifest.
    Resolutions,
    /// `overrides` in the manifest plus in-place rewrite of direct dependencies.
    Overrides,
}

/// A package manager agent, resolved once per project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Yarn,
    /// yarn 2 and later
    YarnBerry,
    Pnpm,
    /// pnpm before 7
    Pnpm6,
    Bun,
}

/// Lockfiles in detection order.
const LOCKFILES: [(&str, PackageManager); 6] = [
    ("bun.lockb", PackageManager::Bun),
    ("bun.lock", PackageManager::Bun),
    ("pnpm-lock.yaml", PackageManager::Pnpm),
    ("yarn.lock", PackageManager::Yarn),
    ("package-lock.json", PackageManager::Npm),
    ("npm-shrinkwrap.json", PackageManager::Npm),
];

impl PackageManager {
    pub const ALL: [PackageManager; 6] = [
        PackageManager::Npm,
        PackageManager::Yarn,
        PackageManager::YarnBerry,
        PackageManager::Pnpm,
        PackageManager::Pnpm6,
        PackageManager::Bun,
    ];

    /// Agent name.
    pub fn name(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
            PackageManager::YarnBerry => "yarn@berry",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Pnpm6 => "pnpm@6",
            PackageManager::Bun => "bun",
        }
    }

    /// Executable name.
    pub fn binary(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn | PackageManager::YarnBerry => "yarn",
            PackageManager::Pnpm | PackageManager::Pnpm6 => "pnpm",
            PackageManager::Bun => "bun",
        }
    }

    /// Detect the agent used in `dir`.
    ///
    /// The manifest's `packageManager` field wins over lockfiles.
    pub fn detect(dir: &Path) -> Result<Self> {
        if dir.join(PACKAGE_JSON).exists() {
            let manifest = PackageManifest::load(dir)?;
            if let Some(spec) = manifest.package_manager() {
                return Self::from_spec(spec);
            }
        }
        LOCKFILES
            .iter()
            .find(|(file, _)| dir.join(file).exists())
            .map(|(_, pm)| *pm)
            .ok_or_else(|| EcosystemError::PackageManagerNotDetected(dir.to_path_buf()))
    }

    /// Parse a `packageManager` value such as `pnpm@8.6.0+sha256.abc`.
    pub fn from_spec(spec: &str) -> Result<Self> {
        let (name, version) = match spec.split_once('@') {
            Some((name, version)) => (name, Some(version)),
            None => (spec, None),
        };
        let major = version.and_then(|v| {
            v.trim_start_matches('^')
                .split('.')
                .next()
                .and_then(|m| m.parse::<u64>().ok())
        });
        match name {
            "npm" => Ok(PackageManager::Npm),
            "yarn" if major.is_some_and(|m| m >= 2) => Ok(PackageManager::YarnBerry),
            "yarn" => Ok(PackageManager::Yarn),
            "pnpm" if major.is_some_and(|m| m < 7) => Ok(PackageManager::Pnpm6),
            "pnpm" => Ok(PackageManager::Pnpm),
            "bun" => Ok(PackageManager::Bun),
            other => Err(EcosystemError::UnsupportedPackageManager(other.to_string())),
        }
    }

    /// Override convention for this agent; bun has none.
    pub fn dialect(&self) -> Result<OverrideDialect> {
        match self {
            PackageManager::Pnpm | PackageManager::Pnpm6 => Ok(OverrideDialect::WorkspaceFile),
            PackageManager::Yarn | PackageManager::YarnBerry => Ok(OverrideDialect::Resolutions),
            PackageManager::Npm => Ok(OverrideDialect::Overrides),
            PackageManager::Bun => Err(EcosystemError::UnsupportedPackageManager(
                self.binary().to_string(),
            )),
        }
    }

    /// Install exactly what the lockfile records.
    pub fn frozen_install(&self) -> String {
        match self {
            PackageManager::Npm => "npm ci".to_string(),
            PackageManager::Yarn => "yarn install --frozen-lockfile".to_string(),
            PackageManager::YarnBerry => "yarn install --immutable".to_string(),
            PackageManager::Pnpm | PackageManager::Pnpm6 => {
                "pnpm install --frozen-lockfile".to_string()
            }
            PackageManager::Bun => "bun install --frozen-lockfile".to_string(),
        }
    }

    /// Run a package script; `task` is `<script> [args..]`.
    pub fn run_script(&self, task: &str) -> String {
        let mut words = task.split_whitespace();
        let script = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();
        let mut command = format!("{} run {script}", self.binary());
        if !args.is_empty() {
            if *self == PackageManager::Npm {
                command.push_str(" --");
            }
            command.push(' ');
            command.push_str(&args.join(" "));
        }
        command
    }

    /// Plain install with extra arguments.
    pub fn install(&self, args: &[&str]) -> String {
        std::iter::once(self.binary())
            .chain(std::iter::once("install"))
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for PackageManager {
    type Err = EcosystemError;

    fn from_str(s: &str) -> Result<Self> {
        PackageManager::ALL
            .into_iter()
            .find(|pm| pm.name() == s)
            .ok_or_else(|| {
                let allowed: Vec<_> = PackageManager::ALL.iter().map(|pm| pm.name()).collect();
                EcosystemError::UnsupportedPackageManager(format!(
                    "{s}. Allowed values: {}",
                    allowed.join(", ")
                ))
            })
    }
}
