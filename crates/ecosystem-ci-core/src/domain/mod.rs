//! Domain models for ecosystem-ci.
//!
//! - `Stack`: the project family member under test
//! - `RepoRef`: a repository and the ref to land on
//! - `OverrideMap`: package name to local build or version
//! - `RunReport`: per-suite outcome handed to the history recorder

pub mod error;
pub mod overrides;
pub mod repo;
pub mod report;
pub mod stack;

pub use error::{EcosystemError, Result};
pub use overrides::{lexical_absolute, DevDependencyStrategy, OverrideMap, OverrideValue};
pub use repo::{RepoRef, DEFAULT_BRANCH};
pub use report::{overall_status, RunReport, SuiteReport, SuiteStatus};
pub use stack::{PackageLayout, Stack};
