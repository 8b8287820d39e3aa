//! ecosystem-ci engine
//!
//! Checks out a stack and its downstream consumer projects, points the
//! consumers at the stack's freshly built packages, runs their lifecycle
//! hooks and bisects stack history when a suite regresses.

pub mod batch;
pub mod bisect;
pub mod build;
pub mod checkout;
pub mod context;
pub mod fakes;
pub mod lifecycle;
pub mod manifest;
pub mod overrides;
pub mod package_manager;
pub mod packages;
pub mod shell;
pub mod suite;
pub mod suites;
pub mod workspace;

pub use batch::BatchReport;
pub use bisect::{bisect_stack, is_non_code_commit, BisectOutcome, BisectProbe};
pub use build::{
    build_stack, parse_major_version, parse_stack_major, permanent_ref, setup_stack_repo,
    stack_commit,
};
pub use checkout::ensure_checkout;
pub use context::{OrchestrationContext, CI_ENV, WORKSPACE_DIR};
pub use lifecycle::{HookStage, LifecycleDriver, LifecycleHooks, LifecycleState, Task};
pub use manifest::{PackageManifest, PnpmWorkspaceFile};
pub use overrides::{apply_package_overrides, inject_overrides, resolve_overrides, OverridePolicy};
pub use package_manager::{OverrideDialect, PackageManager};
pub use packages::{stack_packages, PackageInfo, StackPackages};
pub use shell::{CommandRunner, ShellRunner};
pub use suite::{run_in_repo, SuiteOptions, SuiteRunResult};
pub use suites::{
    available_suites, run_suite, run_suites, select_suites, BaseRunOptions, SuiteBatchProbe,
    SuiteDefinition, SuitePlan, SuiteRunSummary,
};
pub use workspace::{init_workspace, WorkspaceDeclarationGuard};
