//! Built-in suites per stack, suite selection and the batch runner.
//!
//! Every suite runs in `<workspace>/<suite name>`; its consumer repositories
//! are checked out below that directory.

mod rsbuild;
mod rspack;
mod rspress;
mod rstest;

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use ecosystem_ci_core::{
    suite_span, EcosystemError, Result, Stack, SuiteReport, SuiteStatus, DEFAULT_BRANCH,
};
use futures::FutureExt;
use tracing::{error, info, Instrument};

use crate::batch::BatchReport;
use crate::bisect::BisectProbe;
use crate::build::{build_stack, parse_stack_major};
use crate::context::OrchestrationContext;
use crate::lifecycle::Task;
use crate::suite::{run_in_repo, SuiteOptions};

/// Builds the run plan of a suite from the shared run options.
pub type SuiteBuilder = fn(&BaseRunOptions) -> Result<SuitePlan>;

/// A named suite of a stack.
#[derive(Debug, Clone, Copy)]
pub struct SuiteDefinition {
    pub name: &'static str,
    pub build: SuiteBuilder,
}

impl SuiteDefinition {
    pub const fn new(name: &'static str, build: SuiteBuilder) -> Self {
        Self { name, build }
    }
}

/// What running a suite means.
#[derive(Debug, Clone)]
pub enum SuitePlan {
    /// One consumer repository; its error is the suite's error.
    Single(SuiteOptions),
    /// Many repositories; every item runs and failures are reported together.
    Batch {
        label: String,
        items: Vec<SuiteOptions>,
    },
}

/// Options shared by every suite of one run.
#[derive(Debug, Clone)]
pub struct BaseRunOptions {
    pub stack: Stack,
    /// Directory the suite's repositories live in.
    pub workspace: PathBuf,
    pub stack_path: PathBuf,
    pub stack_major: u64,
    pub release: Option<String>,
    pub verify: bool,
    pub skip_git: bool,
    pub suite_branch: Option<String>,
    pub suite_tag: Option<String>,
    pub suite_commit: Option<String>,
}

impl BaseRunOptions {
    pub fn new(ctx: &OrchestrationContext, stack_major: u64) -> Self {
        Self {
            stack: ctx.stack(),
            workspace: ctx.workspace().to_path_buf(),
            stack_path: ctx.stack_path().to_path_buf(),
            stack_major,
            release: None,
            verify: false,
            skip_git: false,
            suite_branch: None,
            suite_tag: None,
            suite_commit: None,
        }
    }

    pub fn with_release(mut self, release: Option<String>) -> Self {
        self.release = release;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_skip_git(mut self, skip_git: bool) -> Self {
        self.skip_git = skip_git;
        self
    }

    pub fn with_stack_major(mut self, stack_major: u64) -> Self {
        self.stack_major = stack_major;
        self
    }

    /// Refs applied to every suite repository instead of the suite's own.
    pub fn with_suite_refs(
        mut self,
        branch: Option<String>,
        tag: Option<String>,
        commit: Option<String>,
    ) -> Self {
        self.suite_branch = branch;
        self.suite_tag = tag;
        self.suite_commit = commit;
        self
    }

    /// Options scoped to the suite named `name`.
    pub fn for_suite(&self, name: &str) -> Self {
        let mut scoped = self.clone();
        scoped.workspace = self.workspace.join(name);
        scoped
    }

    /// Suite options for `repo`, carrying the shared run settings.
    pub fn suite(&self, repo: &str) -> SuiteOptions {
        let mut options = SuiteOptions::new(repo, self.workspace.clone());
        options.release = self.release.clone();
        options.verify = self.verify;
        options.skip_git = self.skip_git;
        options.suite_branch = self.suite_branch.clone();
        options.suite_tag = self.suite_tag.clone();
        options.suite_commit = self.suite_commit.clone();
        options
    }
}

/// Branch named by environment variable `var`, or the default branch.
pub(crate) fn env_branch(var: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_BRANCH.to_string())
}

/// Task moving the working directory.
pub(crate) fn cd_task(dir: &'static str) -> Task {
    Task::action(move |ctx| {
        async move {
            ctx.cd(dir);
            Ok(())
        }
        .boxed()
    })
}

/// Every suite defined for `stack`.
pub fn catalog(stack: Stack) -> &'static [SuiteDefinition] {
    match stack {
        Stack::Rsbuild => rsbuild::SUITES,
        Stack::Rspack => rspack::SUITES,
        Stack::Rstest => rstest::SUITES,
        Stack::Rspress => rspress::SUITES,
        Stack::Rslib | Stack::Rsdoctor => &[],
    }
}

/// Public suite names of `stack`, sorted.
pub fn available_suites(stack: Stack) -> Vec<&'static str> {
    let mut names: Vec<_> = catalog(stack)
        .iter()
        .map(|def| def.name)
        .filter(|name| !name.starts_with('_'))
        .collect();
    names.sort_unstable();
    names
}

/// Resolve the suites to run: all of them when none are requested.
pub fn select_suites(stack: Stack, requested: &[String]) -> Result<Vec<&'static str>> {
    let available = available_suites(stack);
    if requested.is_empty() {
        return Ok(available);
    }
    let mut selected = Vec::with_capacity(requested.len());
    let mut invalid = Vec::new();
    for name in requested {
        match catalog(stack).iter().find(|def| def.name == name) {
            Some(def) => selected.push(def.name),
            None => invalid.push(name.as_str()),
        }
    }
    if !invalid.is_empty() {
        return Err(EcosystemError::InvalidSuite {
            stack: stack.to_string(),
            requested: invalid.join(", "),
            available: available.join(", "),
        });
    }
    Ok(selected)
}

/// Run the suite `name` of the stack in `base`.
pub async fn run_suite(ctx: &mut OrchestrationContext, name: &str, base: &BaseRunOptions) -> Result<()> {
    let definition = catalog(base.stack)
        .iter()
        .find(|def| def.name == name)
        .ok_or_else(|| EcosystemError::InvalidSuite {
            stack: base.stack.to_string(),
            requested: name.to_string(),
            available: available_suites(base.stack).join(", "),
        })?;

    let plan = (definition.build)(&base.for_suite(name))?;
    async move {
        info!("running suite {}/{name}", base.stack);
        match plan {
            SuitePlan::Single(options) => run_in_repo(ctx, &options).await.map(drop),
            SuitePlan::Batch { label, items } => {
                let mut report = BatchReport::new(label);
                for item in &items {
                    let outcome = run_in_repo(ctx, item).await;
                    report.record(item.repo.as_str(), outcome);
                }
                report.into_result()
            }
        }
    }
    .instrument(suite_span(base.stack, name))
    .await
}

/// Per-suite reports of a sequential run.
#[derive(Debug, Default)]
pub struct SuiteRunSummary {
    pub reports: Vec<SuiteReport>,
    /// The error that stopped the run.
    pub failure: Option<EcosystemError>,
}

/// Run suites in order. The first failure stops the run; later suites are
/// reported as cancelled.
pub async fn run_suites(
    ctx: &mut OrchestrationContext,
    names: &[&str],
    base: &BaseRunOptions,
) -> SuiteRunSummary {
    let mut summary = SuiteRunSummary::default();
    for name in names {
        if summary.failure.is_some() {
            summary
                .reports
                .push(SuiteReport::new(*name, SuiteStatus::Cancelled));
            continue;
        }
        let start = Instant::now();
        let outcome = run_suite(ctx, name, base).await;
        let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok(()) => summary
                .reports
                .push(SuiteReport::new(*name, SuiteStatus::Success).with_duration_ms(elapsed)),
            Err(e) => {
                error!("suite {name} failed: {e}");
                summary.reports.push(
                    SuiteReport::new(*name, SuiteStatus::Failure)
                        .with_duration_ms(elapsed)
                        .with_notes(e.to_string()),
                );
                summary.failure = Some(e);
            }
        }
    }
    summary
}

/// Bisection probe: rebuild the stack and rerun every selected suite.
///
/// Until one probe passes, probes honour `verify` and check suites out. After
/// that every suite checkout exists and later probes reuse them.
#[derive(Debug)]
pub struct SuiteBatchProbe {
    suites: Vec<&'static str>,
    base: BaseRunOptions,
    first_run: bool,
}

impl SuiteBatchProbe {
    pub fn new(suites: Vec<&'static str>, base: BaseRunOptions) -> Self {
        Self {
            suites,
            base,
            first_run: true,
        }
    }
}

#[async_trait]
impl BisectProbe for SuiteBatchProbe {
    async fn probe(&mut self, ctx: &mut OrchestrationContext) -> Result<()> {
        let first_run = self.first_run;
        let verify = first_run && self.base.verify;

        build_stack(ctx, verify).await?;
        let stack_major = parse_stack_major(ctx.stack(), ctx.stack_path())?;
        let base = self
            .base
            .clone()
            .with_stack_major(stack_major)
            .with_verify(verify)
            .with_skip_git(!first_run);
        for suite in &self.suites {
            run_suite(ctx, suite, &base).await?;
        }
        self.first_run = false;
        Ok(())
    }
}
