//! ecosystem-ci core library
//!
//! Domain types shared by the engine and the command-line driver.

pub mod domain;
pub mod telemetry;

pub use domain::{
    lexical_absolute, overall_status, DevDependencyStrategy, EcosystemError, OverrideMap,
    OverrideValue, PackageLayout, RepoRef, Result, RunReport, Stack, SuiteReport, SuiteStatus,
    DEFAULT_BRANCH,
};
pub use telemetry::{bisect_span, init_tracing, suite_span};

/// ecosystem-ci version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
