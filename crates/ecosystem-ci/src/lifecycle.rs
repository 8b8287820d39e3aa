//! Lifecycle hooks and the driver that runs them.
//!
//! A suite's workflow is a fixed order of hook stages. Each stage holds a
//! list of [`Task`]s that run strictly one after another; the first failure
//! ends the stage and the run.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use ecosystem_ci_core::Result;
use futures::future::BoxFuture;
use tracing::{debug, error};

use crate::context::OrchestrationContext;
use crate::manifest::PackageManifest;
use crate::package_manager::PackageManager;

/// Callback task signature.
pub type TaskAction =
    Arc<dyn for<'a> Fn(&'a mut OrchestrationContext) -> BoxFuture<'a, Result<()>> + Send + Sync>;

/// A unit of work inside a hook stage.
#[derive(Clone)]
pub enum Task {
    /// A package script (when the manifest declares the first word) or a shell command.
    Literal(String),
    /// Arbitrary async work against the context.
    Action(TaskAction),
}

impl Task {
    pub fn action<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut OrchestrationContext) -> BoxFuture<'a, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        Task::Action(Arc::new(f))
    }
}

impl From<&str> for Task {
    fn from(command: &str) -> Self {
        Task::Literal(command.to_string())
    }
}

impl From<String> for Task {
    fn from(command: String) -> Self {
        Task::Literal(command)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Literal(command) => f.debug_tuple("Literal").field(command).finish(),
            Task::Action(_) => f.write_str("Action(..)"),
        }
    }
}

/// Hook stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookStage {
    BeforeInstall,
    AfterInstall,
    BeforeBuild,
    Build,
    BeforeTest,
    Test,
}

impl HookStage {
    pub fn name(&self) -> &'static str {
        match self {
            HookStage::BeforeInstall => "beforeInstall",
            HookStage::AfterInstall => "afterInstall",
            HookStage::BeforeBuild => "beforeBuild",
            HookStage::Build => "build",
            HookStage::BeforeTest => "beforeTest",
            HookStage::Test => "test",
        }
    }

    fn state(&self) -> LifecycleState {
        match self {
            HookStage::BeforeInstall | HookStage::AfterInstall => LifecycleState::Installing,
            HookStage::BeforeBuild | HookStage::Build => LifecycleState::Building,
            HookStage::BeforeTest | HookStage::Test => LifecycleState::Testing,
        }
    }
}

/// Tasks per hook stage.
#[derive(Debug, Clone, Default)]
pub struct LifecycleHooks {
    stages: BTreeMap<HookStage, Vec<Task>>,
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append tasks to `stage`.
    pub fn with<I, T>(mut self, stage: HookStage, tasks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Task>,
    {
        self.stages
            .entry(stage)
            .or_default()
            .extend(tasks.into_iter().map(Into::into));
        self
    }

    pub fn tasks(&self, stage: HookStage) -> &[Task] {
        self.stages.get(&stage).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has_tasks(&self, stage: HookStage) -> bool {
        !self.tasks(stage).is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotStarted,
    Installing,
    Building,
    Testing,
    Done,
    Failed,
}

/// Runs hook stages for one project with its detected package manager.
#[derive(Debug)]
pub struct LifecycleDriver {
    hooks: LifecycleHooks,
    package_manager: PackageManager,
    scripts: BTreeSet<String>,
    state: LifecycleState,
}

impl LifecycleDriver {
    pub fn new(hooks: LifecycleHooks, package_manager: PackageManager, manifest: &PackageManifest) -> Self {
        Self {
            hooks,
            package_manager,
            scripts: manifest.scripts().map(str::to_string).collect(),
            state: LifecycleState::NotStarted,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn package_manager(&self) -> PackageManager {
        self.package_manager
    }

    pub fn has_tasks(&self, stage: HookStage) -> bool {
        self.hooks.has_tasks(stage)
    }

    /// Install exactly what the project's lockfile records.
    pub async fn frozen_install(&mut self, ctx: &mut OrchestrationContext) -> Result<()> {
        let command = self.package_manager.frozen_install();
        self.install(ctx, &command).await
    }

    /// Run an install command; a failure moves the driver to `Failed`.
    pub async fn install(&mut self, ctx: &mut OrchestrationContext, command: &str) -> Result<()> {
        self.state = LifecycleState::Installing;
        let outcome = ctx.run(command).await.map(|_| ());
        self.settle(outcome)
    }

    /// Run every task of `stage` in order, stopping at the first failure.
    pub async fn run_stage(&mut self, ctx: &mut OrchestrationContext, stage: HookStage) -> Result<()> {
        let tasks = self.hooks.tasks(stage).to_vec();
        if tasks.is_empty() {
            return Ok(());
        }
        self.state = stage.state();
        debug!("running {} ({} tasks)", stage.name(), tasks.len());
        for task in &tasks {
            let outcome = self.run_task(ctx, task).await;
            if outcome.is_err() {
                return self.settle(outcome);
            }
        }
        Ok(())
    }

    /// Mark the workflow complete.
    pub fn finish(&mut self) {
        self.state = LifecycleState::Done;
    }

    async fn run_task(&self, ctx: &mut OrchestrationContext, task: &Task) -> Result<()> {
        match task {
            Task::Literal(command) => {
                let command = command.trim();
                let Some(first) = command.split_whitespace().next() else {
                    return Ok(());
                };
                if self.scripts.contains(first) {
                    ctx.run(&self.package_manager.run_script(command)).await?;
                } else {
                    ctx.run(command).await?;
                }
                Ok(())
            }
            Task::Action(action) => action(ctx).await,
        }
    }

    fn settle(&mut self, outcome: Result<()>) -> Result<()> {
        if let Err(e) = &outcome {
            error!("lifecycle failed: {e}");
            self.state = LifecycleState::Failed;
        }
        outcome
    }
}
