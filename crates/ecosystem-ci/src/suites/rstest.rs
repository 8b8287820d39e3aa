//! Suites run against an rstest checkout.

use ecosystem_ci_core::Result;

use super::{env_branch, BaseRunOptions, SuiteDefinition, SuitePlan};
use crate::lifecycle::{HookStage, LifecycleHooks};

pub(super) const SUITES: &[SuiteDefinition] = &[
    SuiteDefinition::new("modernjs", modernjs),
    SuiteDefinition::new("rspress", rspress),
];

fn modernjs(options: &BaseRunOptions) -> Result<SuitePlan> {
    Ok(SuitePlan::Single(
        options
            .suite("web-infra-dev/modern.js")
            .with_branch(env_branch("MODERNJS"))
            .with_hooks(LifecycleHooks::new().with(HookStage::Test, ["test:unit"])),
    ))
}

fn rspress(options: &BaseRunOptions) -> Result<SuitePlan> {
    Ok(SuitePlan::Single(
        options
            .suite("web-infra-dev/rspress")
            .with_branch(env_branch("RSPRESS"))
            .with_hooks(LifecycleHooks::new().with(HookStage::Test, ["test:unit"])),
    ))
}
