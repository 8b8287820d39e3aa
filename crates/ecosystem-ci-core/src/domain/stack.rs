//! Stack identities and their per-stack conventions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::EcosystemError;

/// How a stack publishes its packages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PackageLayout {
    /// A pnpm monorepo whose workspace packages are discovered from disk.
    Monorepo,

    /// JS packages plus a native binding with per-platform npm packages.
    NativeBinding,
}

/// The closed set of stacks under test.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Stack {
    Rsbuild,
    Rspack,
    Rstest,
    Rslib,
    Rsdoctor,
    Rspress,
}

impl Stack {
    /// Every stack, in CLI display order.
    pub const ALL: [Stack; 6] = [
        Stack::Rsbuild,
        Stack::Rspack,
        Stack::Rstest,
        Stack::Rslib,
        Stack::Rsdoctor,
        Stack::Rspress,
    ];

    /// Get the stack name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Stack::Rsbuild => "rsbuild",
            Stack::Rspack => "rspack",
            Stack::Rstest => "rstest",
            Stack::Rslib => "rslib",
            Stack::Rsdoctor => "rsdoctor",
            Stack::Rspress => "rspress",
        }
    }

    /// GitHub slug of the stack's upstream repository.
    pub fn default_repository(&self) -> &'static str {
        match self {
            Stack::Rsbuild => "web-infra-dev/rsbuild",
            Stack::Rspack => "web-infra-dev/rspack",
            Stack::Rstest => "web-infra-dev/rstest",
            Stack::Rslib => "web-infra-dev/rslib",
            Stack::Rsdoctor => "web-infra-dev/rsdoctor",
            Stack::Rspress => "web-infra-dev/rspress",
        }
    }

    /// Directory name of the stack checkout inside the workspace root.
    pub fn workspace_dir(&self) -> &'static str {
        self.name()
    }

    pub fn layout(&self) -> PackageLayout {
        match self {
            Stack::Rspack => PackageLayout::NativeBinding,
            _ => PackageLayout::Monorepo,
        }
    }

    /// Manifest (relative to the stack checkout) whose version is the stack version.
    pub fn version_manifest(&self) -> [&'static str; 3] {
        match self {
            Stack::Rspack => ["packages", "rspack", "package.json"],
            _ => ["packages", "core", "package.json"],
        }
    }

    /// Comma separated list of stack names, for help and error text.
    pub fn choices() -> String {
        Stack::ALL
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stack {
    type Err = EcosystemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Stack::ALL
            .into_iter()
            .find(|stack| stack.name() == normalized)
            .ok_or_else(|| {
                EcosystemError::InvalidStack(format!(
                    "{s}. Available stacks: {}",
                    Stack::choices()
                ))
            })
    }
}
