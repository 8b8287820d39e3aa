//! Suites run against an rspack checkout.

use ecosystem_ci_core::Result;
use futures::FutureExt;
use uuid::Uuid;

use super::{env_branch, BaseRunOptions, SuiteDefinition, SuitePlan};
use crate::lifecycle::{HookStage, LifecycleHooks, Task};

pub(super) const SUITES: &[SuiteDefinition] = &[
    SuiteDefinition::new("devserver", devserver),
    SuiteDefinition::new("examples", examples),
    SuiteDefinition::new("lynx-stack", lynx_stack),
    SuiteDefinition::new("plugin", plugin),
    SuiteDefinition::new("rsbuild", rsbuild),
    SuiteDefinition::new("rsdoctor", rsdoctor),
];

const EXAMPLE_SCRIPTS: [&str; 6] = [
    "build:rspack",
    "test:rspack",
    "build:rsbuild",
    "build:rsdoctor",
    "build:rspress",
    "build:rslib",
];

fn devserver(options: &BaseRunOptions) -> Result<SuitePlan> {
    Ok(SuitePlan::Single(
        options
            .suite("web-infra-dev/rspack-dev-server")
            .with_hooks(LifecycleHooks::new().with(HookStage::Test, ["test"])),
    ))
}

fn examples(options: &BaseRunOptions) -> Result<SuitePlan> {
    Ok(SuitePlan::Single(
        options
            .suite("rspack-contrib/rspack-examples")
            .with_hooks(LifecycleHooks::new().with(HookStage::Test, EXAMPLE_SCRIPTS)),
    ))
}

/// lynx-stack is checked out into a fresh temporary directory on every run.
fn lynx_stack(options: &BaseRunOptions) -> Result<SuitePlan> {
    let workspace = std::env::temp_dir().join(format!("lynx-stack-{}", Uuid::new_v4().simple()));
    std::fs::create_dir_all(&workspace)?;

    let mut suite = options
        .suite("lynx-family/lynx-stack")
        .with_branch(env_branch("LYNX_STACK_REF"))
        .with_hooks(
            LifecycleHooks::new()
                .with(HookStage::BeforeBuild, ["rustup target add wasm32-unknown-unknown"])
                .with(HookStage::Build, ["pnpm turbo build"])
                .with(HookStage::Test, ["pnpm run test --silent"]),
        );
    suite.workspace = workspace;
    Ok(SuitePlan::Single(suite))
}

fn plugin(options: &BaseRunOptions) -> Result<SuitePlan> {
    Ok(SuitePlan::Single(
        options
            .suite("rspack-contrib/rspack-plugin-ci")
            .with_hooks(LifecycleHooks::new().with(HookStage::Test, ["test"])),
    ))
}

fn rsbuild(options: &BaseRunOptions) -> Result<SuitePlan> {
    Ok(SuitePlan::Single(
        options
            .suite("web-infra-dev/rsbuild")
            .with_branch(env_branch("RSBUILD_REF"))
            .with_hooks(LifecycleHooks::new().with(HookStage::Test, ["e2e"])),
    ))
}

fn rsdoctor(options: &BaseRunOptions) -> Result<SuitePlan> {
    let install_browsers = Task::action(|ctx| {
        async move {
            ctx.cd("e2e");
            let installed = ctx.run("pnpm playwright install --with-deps").await;
            ctx.cd("..");
            installed.map(drop)
        }
        .boxed()
    });

    Ok(SuitePlan::Single(
        options
            .suite("web-infra-dev/rsdoctor")
            .with_branch(env_branch("RSDOCTOR"))
            .with_hooks(
                LifecycleHooks::new()
                    .with(HookStage::BeforeTest, [install_browsers])
                    .with(HookStage::Test, ["test:all"]),
            ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OrchestrationContext;
    use crate::fakes::RecordingRunner;
    use ecosystem_ci_core::Stack;
    use std::path::Path;
    use std::sync::Arc;

    fn base() -> BaseRunOptions {
        let ctx = OrchestrationContext::new(Stack::Rspack, "/engine", Arc::new(RecordingRunner::new()));
        BaseRunOptions::new(&ctx, 1)
    }

    #[test]
    fn test_lynx_stack_uses_temporary_workspace() {
        let SuitePlan::Single(suite) = lynx_stack(&base().for_suite("lynx-stack")).unwrap() else {
            panic!("lynx-stack is a single repo");
        };
        assert!(suite.workspace.starts_with(std::env::temp_dir()));
        assert!(suite.workspace.is_dir());
        assert!(suite.hooks.has_tasks(HookStage::BeforeBuild));
        std::fs::remove_dir_all(&suite.workspace).unwrap();
    }

    #[tokio::test]
    async fn test_rsdoctor_installs_browsers_from_e2e() {
        let SuitePlan::Single(suite) = rsdoctor(&base().for_suite("rsdoctor")).unwrap() else {
            panic!("rsdoctor is a single repo");
        };
        let runner = Arc::new(RecordingRunner::new());
        let mut ctx = OrchestrationContext::new(Stack::Rspack, "/engine", runner.clone());
        ctx.cd("/engine/workspace/rsdoctor/rsdoctor");

        let Task::Action(action) = &suite.hooks.tasks(HookStage::BeforeTest)[0] else {
            panic!("expected an action");
        };
        action(&mut ctx).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].command, "pnpm playwright install --with-deps");
        assert_eq!(calls[0].cwd, Path::new("/engine/workspace/rsdoctor/rsdoctor/e2e"));
        assert_eq!(ctx.cwd(), Path::new("/engine/workspace/rsdoctor/rsdoctor"));
    }
}
