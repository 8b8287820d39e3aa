//! Orchestration context threaded through every engine operation.
//!
//! Holds the active stack, the workspace layout, the current working
//! directory used for commands, the child environment and the cached stack
//! package list. Nothing here is process-global: two contexts never share
//! state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ecosystem_ci_core::{lexical_absolute, Result, Stack};

use crate::packages::StackPackages;
use crate::shell::CommandRunner;
use crate::workspace::init_workspace;

/// Name of the directory under the engine root that holds every checkout.
pub const WORKSPACE_DIR: &str = "workspace";

/// Variables layered over the inherited environment of every child process.
pub const CI_ENV: [(&str, &str); 5] = [
    ("CI", "true"),
    // replays from a build cache would hide the mutated dependencies
    ("TURBO_FORCE", "true"),
    // overrides mutate lockfiles
    ("YARN_ENABLE_IMMUTABLE_INSTALLS", "false"),
    ("NODE_OPTIONS", "--max-old-space-size=6144"),
    ("ECOSYSTEM_CI", "true"),
];

pub struct OrchestrationContext {
    stack: Stack,
    root: PathBuf,
    workspace: PathBuf,
    stack_path: PathBuf,
    cwd: PathBuf,
    env: BTreeMap<String, String>,
    runner: Arc<dyn CommandRunner>,
    packages: Option<StackPackages>,
}

impl OrchestrationContext {
    /// Build a context rooted at `root` without touching the filesystem.
    ///
    /// The working directory starts at `root`.
    pub fn new(stack: Stack, root: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        let root = root.into();
        let workspace = root.join(WORKSPACE_DIR);
        let stack_path = workspace.join(stack.workspace_dir());
        let env = CI_ENV
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            stack,
            cwd: root.clone(),
            root,
            workspace,
            stack_path,
            env,
            runner,
            packages: None,
        }
    }

    /// Prepare the workspace on disk and start from the process working directory.
    pub fn setup(stack: Stack, root: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let mut ctx = Self::new(stack, root, runner);
        init_workspace(&ctx.workspace)?;
        std::fs::create_dir_all(&ctx.stack_path)?;
        ctx.cwd = std::env::current_dir()?;
        Ok(ctx)
    }

    pub fn stack(&self) -> Stack {
        self.stack
    }

    /// Engine root; holds the workspace and the optional package table override.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Checkout directory of the stack under test.
    pub fn stack_path(&self) -> &Path {
        &self.stack_path
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Add or replace a variable in the child environment.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    /// Move the working directory; relative paths resolve against the current one.
    pub fn cd(&mut self, dir: impl AsRef<Path>) {
        self.cwd = lexical_absolute(&self.cwd, dir.as_ref());
    }

    /// Run `command` in the current working directory.
    pub async fn run(&self, command: &str) -> Result<String> {
        self.runner.run(command, &self.cwd, &self.env).await
    }

    /// Run `command` in `dir` without moving the working directory.
    pub async fn run_in(&self, dir: &Path, command: &str) -> Result<String> {
        self.runner.run(command, dir, &self.env).await
    }

    pub(crate) fn cached_packages(&self) -> Option<&StackPackages> {
        self.packages.as_ref()
    }

    pub(crate) fn cache_packages(&mut self, packages: StackPackages) {
        self.packages = Some(packages);
    }

    /// Forget the cached stack package list.
    ///
    /// Must be called whenever the stack checkout is replaced or rebuilt.
    pub fn invalidate_packages(&mut self) {
        self.packages = None;
    }
}

impl std::fmt::Debug for OrchestrationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationContext")
            .field("stack", &self.stack)
            .field("root", &self.root)
            .field("cwd", &self.cwd)
            .field("packages_cached", &self.packages.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::RecordingRunner;

    #[test]
    fn test_layout_derives_from_root_and_stack() {
        let ctx = OrchestrationContext::new(Stack::Rspress, "/engine", Arc::new(RecordingRunner::new()));
        assert_eq!(ctx.workspace(), Path::new("/engine/workspace"));
        assert_eq!(ctx.stack_path(), Path::new("/engine/workspace/rspress"));
        assert_eq!(ctx.cwd(), Path::new("/engine"));
        assert_eq!(ctx.env().get("ECOSYSTEM_CI").map(String::as_str), Some("true"));
        assert_eq!(
            ctx.env().get("NODE_OPTIONS").map(String::as_str),
            Some("--max-old-space-size=6144")
        );
    }

    #[test]
    fn test_cd_resolves_relative_to_cwd() {
        let mut ctx = OrchestrationContext::new(Stack::Rsbuild, "/engine", Arc::new(RecordingRunner::new()));
        ctx.cd("workspace/examples");
        ctx.cd("./e2e");
        ctx.cd("..");
        assert_eq!(ctx.cwd(), Path::new("/engine/workspace/examples"));
        ctx.cd("/tmp");
        assert_eq!(ctx.cwd(), Path::new("/tmp"));
    }

    #[tokio::test]
    async fn test_run_uses_cwd_and_run_in_does_not_move() {
        let runner = Arc::new(RecordingRunner::new());
        let mut ctx = OrchestrationContext::new(Stack::Rsbuild, "/engine", runner.clone());
        ctx.cd("workspace");
        ctx.run("git status").await.unwrap();
        ctx.run_in(Path::new("/elsewhere"), "git ls-remote --get-url")
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].cwd, PathBuf::from("/engine/workspace"));
        assert_eq!(calls[1].cwd, PathBuf::from("/elsewhere"));
        assert_eq!(ctx.cwd(), Path::new("/engine/workspace"));
    }

    #[test]
    fn test_setup_initialises_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = OrchestrationContext::setup(Stack::Rslib, dir.path(), Arc::new(RecordingRunner::new()))
            .unwrap();
        assert!(ctx.stack_path().is_dir());
        assert!(ctx.workspace().join(".eslintrc.json").is_file());
        assert!(ctx.workspace().join(".editorconfig").is_file());
    }
}
