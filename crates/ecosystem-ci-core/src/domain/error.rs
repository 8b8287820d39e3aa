//! Error taxonomy for ecosystem-ci.

use std::path::PathBuf;

/// ecosystem-ci domain errors.
#[derive(Debug, thiserror::Error)]
pub enum EcosystemError {
    /// A child process exited non-zero or could not be spawned.
    #[error("{message}")]
    CommandFailed { command: String, message: String },

    #[error("unsupported package manager detected: {0}")]
    UnsupportedPackageManager(String),

    #[error("failed to detect package manager in {}", .0.display())]
    PackageManagerNotDetected(PathBuf),

    #[error(
        "conflicting overrides detected in {}: both pnpm-workspace.yaml and package.json contain pnpm overrides. \
         Please use only one location for overrides configuration",
        .dir.display()
    )]
    ConflictingOverrides { dir: PathBuf },

    #[error(
        "conflicting overrides[{package}]={existing} and --release={release} config. Use either one or the other"
    )]
    OverrideConflict {
        package: String,
        existing: String,
        release: String,
    },

    #[error("missing manifest field: {0}")]
    MissingManifestField(String),

    #[error("checkout of {repo} failed: {source}")]
    CheckoutFailure {
        repo: String,
        #[source]
        source: Box<EcosystemError>,
    },

    #[error(
        "{label} test succeed {succeeded}, failed {} ({})",
        .failed.len(),
        .failed.join(",")
    )]
    BatchFailed {
        label: String,
        succeeded: usize,
        failed: Vec<String>,
    },

    #[error("invalid stack: {0}")]
    InvalidStack(String),

    #[error("invalid suite(s): {requested} for stack {stack}. available suites: {available}")]
    InvalidSuite {
        stack: String,
        requested: String,
        available: String,
    },

    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("{0} is not supported")]
    UnsupportedPlatform(String),

    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("bisect error: {0}")]
    Bisect(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl EcosystemError {
    /// Wrap a git failure raised while establishing a checkout.
    pub fn checkout(repo: impl Into<String>, source: EcosystemError) -> Self {
        EcosystemError::CheckoutFailure {
            repo: repo.into(),
            source: Box::new(source),
        }
    }
}

/// Result type for ecosystem-ci operations.
pub type Result<T> = std::result::Result<T, EcosystemError>;
