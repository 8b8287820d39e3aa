//! Suites building the documentation sites of other stacks with rspress.

use ecosystem_ci_core::Result;

use super::{cd_task, env_branch, BaseRunOptions, SuiteDefinition, SuitePlan};
use crate::lifecycle::{HookStage, LifecycleHooks};

pub(super) const SUITES: &[SuiteDefinition] = &[
    SuiteDefinition::new("rsbuild", rsbuild),
    SuiteDefinition::new("rspack", rspack),
    SuiteDefinition::new("rstest", rstest),
];

fn website(test: &str) -> LifecycleHooks {
    LifecycleHooks::new()
        .with(HookStage::BeforeTest, [cd_task("website")])
        .with(HookStage::Test, [test])
}

fn rsbuild(options: &BaseRunOptions) -> Result<SuitePlan> {
    Ok(SuitePlan::Single(
        options
            .suite("web-infra-dev/rsbuild")
            .with_branch(env_branch("RSBUILD"))
            .with_hooks(website("build")),
    ))
}

fn rspack(options: &BaseRunOptions) -> Result<SuitePlan> {
    Ok(SuitePlan::Single(
        options
            .suite("web-infra-dev/rspack")
            .with_branch(env_branch("RSPACK"))
            .with_hooks(website("pnpm run build")),
    ))
}

fn rstest(options: &BaseRunOptions) -> Result<SuitePlan> {
    Ok(SuitePlan::Single(
        options
            .suite("web-infra-dev/rstest")
            .with_branch(env_branch("RSTEST"))
            .with_hooks(website("build")),
    ))
}
