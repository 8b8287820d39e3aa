//! Suite runner: checkout, override injection and lifecycle for one consumer repo.

use std::path::{Path, PathBuf};

use ecosystem_ci_core::{lexical_absolute, EcosystemError, OverrideMap, RepoRef, Result, DEFAULT_BRANCH};
use tracing::{info, warn};

use crate::checkout::ensure_checkout;
use crate::context::OrchestrationContext;
use crate::lifecycle::{HookStage, LifecycleDriver, LifecycleHooks};
use crate::manifest::PackageManifest;
use crate::overrides::{apply_package_overrides, resolve_overrides, OverridePolicy};
use crate::package_manager::PackageManager;
use crate::workspace::WorkspaceDeclarationGuard;

/// Everything needed to run one consumer repository.
#[derive(Debug, Clone)]
pub struct SuiteOptions {
    /// GitHub slug or clone URL.
    pub repo: String,
    pub branch: String,
    pub tag: Option<String>,
    pub commit: Option<String>,
    /// Checkout directory name; defaults to the last segment of `repo`.
    pub dir: Option<String>,
    /// Directory the checkout lives in.
    pub workspace: PathBuf,
    pub hooks: LifecycleHooks,
    /// Caller-chosen overrides, merged with the stack's packages.
    pub overrides: OverrideMap,
    /// Use this registry version of every stack package instead of local builds.
    pub release: Option<String>,
    /// Run the untouched project's build and tests before injecting overrides.
    pub verify: bool,
    /// Reuse the checkout as-is.
    pub skip_git: bool,
    /// Skip detection and use this package manager.
    pub package_manager: Option<PackageManager>,
    pub suite_branch: Option<String>,
    pub suite_tag: Option<String>,
    pub suite_commit: Option<String>,
}

impl SuiteOptions {
    pub fn new(repo: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            branch: DEFAULT_BRANCH.to_string(),
            tag: None,
            commit: None,
            dir: None,
            workspace: workspace.into(),
            hooks: LifecycleHooks::new(),
            overrides: OverrideMap::new(),
            release: None,
            verify: false,
            skip_git: false,
            package_manager: None,
            suite_branch: None,
            suite_tag: None,
            suite_commit: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_hooks(mut self, hooks: LifecycleHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_overrides(mut self, overrides: OverrideMap) -> Self {
        self.overrides = overrides;
        self
    }

    /// Absolute checkout directory.
    pub fn checkout_dir(&self) -> PathBuf {
        let name = self
            .dir
            .clone()
            .unwrap_or_else(|| RepoRef::new(self.repo.as_str()).dir_name().to_string());
        lexical_absolute(&self.workspace, Path::new(&name))
    }

    /// Ref to check out; suite-level refs win over the suite's defaults.
    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(self.repo.as_str())
            .with_branch(self.suite_branch.clone().unwrap_or_else(|| self.branch.clone()))
            .with_tag(self.suite_tag.clone().or_else(|| self.tag.clone()))
            .with_commit(self.suite_commit.clone().or_else(|| self.commit.clone()))
    }
}

/// Outcome of one suite repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteRunResult {
    pub dir: PathBuf,
    pub success: bool,
    pub error: Option<String>,
}

impl SuiteRunResult {
    pub fn passed(dir: PathBuf) -> Self {
        Self {
            dir,
            success: true,
            error: None,
        }
    }

    pub fn failed(dir: PathBuf, error: &EcosystemError) -> Self {
        Self {
            dir,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// Check out a consumer repository, inject the stack's packages and run its workflow.
///
/// The root workspace declaration is parked for the duration of the run and
/// restored on every exit path. Errors escape unchanged.
pub async fn run_in_repo(ctx: &mut OrchestrationContext, options: &SuiteOptions) -> Result<SuiteRunResult> {
    let dir = options.checkout_dir();
    if options.skip_git {
        ctx.cd(&dir);
    } else {
        ensure_checkout(ctx, &options.repo_ref(), &dir).await?;
    }

    let guard = WorkspaceDeclarationGuard::acquire(ctx.root())?;
    let outcome = run_workflow(ctx, options, &dir).await;
    let restored = guard.release();
    if let (Err(_), Err(e)) = (&outcome, &restored) {
        warn!("failed to restore workspace declaration: {e}");
    }
    outcome?;
    restored?;

    info!("{} passed", options.repo);
    Ok(SuiteRunResult::passed(dir))
}

async fn run_workflow(ctx: &mut OrchestrationContext, options: &SuiteOptions, dir: &Path) -> Result<()> {
    let package_manager = match options.package_manager {
        Some(pm) => pm,
        None => PackageManager::detect(dir)?,
    };
    let mut manifest = PackageManifest::load(dir)?;
    let mut driver = LifecycleDriver::new(options.hooks.clone(), package_manager, &manifest);
    let has_test = driver.has_tasks(HookStage::Test);

    if options.verify && has_test {
        driver.frozen_install(ctx).await?;
        driver.run_stage(ctx, HookStage::BeforeBuild).await?;
        driver.run_stage(ctx, HookStage::Build).await?;
        driver.run_stage(ctx, HookStage::BeforeTest).await?;
        driver.run_stage(ctx, HookStage::Test).await?;
    }

    let overrides = resolve_overrides(ctx, &options.overrides, options.release.as_deref())?;
    let policy = OverridePolicy::for_layout(ctx.stack().layout());
    ctx.cd(dir);
    apply_package_overrides(ctx, dir, &mut manifest, &overrides, &policy, &mut driver).await?;

    driver.run_stage(ctx, HookStage::AfterInstall).await?;
    driver.run_stage(ctx, HookStage::BeforeBuild).await?;
    driver.run_stage(ctx, HookStage::Build).await?;
    if has_test {
        driver.run_stage(ctx, HookStage::BeforeTest).await?;
        driver.run_stage(ctx, HookStage::Test).await?;
    }
    driver.finish();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_dir_defaults_to_repo_name() {
        let options = SuiteOptions::new("rstackjs/rspack-examples", "/ws/examples");
        assert_eq!(options.checkout_dir(), PathBuf::from("/ws/examples/rspack-examples"));

        let mut named = options.clone();
        named.dir = Some("custom".to_string());
        assert_eq!(named.checkout_dir(), PathBuf::from("/ws/examples/custom"));
    }

    #[test]
    fn test_suite_refs_win() {
        let mut options = SuiteOptions::new("web-infra-dev/rstest", "/ws").with_branch("dev");
        options.commit = Some("abc".to_string());
        let repo = options.repo_ref();
        assert_eq!(repo.branch, "dev");
        assert_eq!(repo.commit.as_deref(), Some("abc"));
        assert!(repo.shallow);

        options.suite_branch = Some("feature".to_string());
        options.suite_tag = Some("v2.0.0".to_string());
        let repo = options.repo_ref();
        assert_eq!(repo.branch, "feature");
        assert_eq!(repo.tag.as_deref(), Some("v2.0.0"));
    }

    #[test]
    fn test_result_constructors() {
        let ok = SuiteRunResult::passed(PathBuf::from("/ws/a"));
        assert!(ok.success);
        let err = SuiteRunResult::failed(
            PathBuf::from("/ws/b"),
            &EcosystemError::TaskFailed("nope".to_string()),
        );
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("task failed: nope"));
    }
}
