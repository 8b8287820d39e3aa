//! Suites run against an rsbuild checkout.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ecosystem_ci_core::{OverrideMap, RepoRef, Result};
use futures::FutureExt;
use tracing::warn;

use super::{env_branch, BaseRunOptions, SuiteDefinition, SuitePlan};
use crate::lifecycle::{HookStage, LifecycleHooks, Task};
use crate::manifest::PackageManifest;
use crate::suite::SuiteOptions;

pub(super) const SUITES: &[SuiteDefinition] = &[
    SuiteDefinition::new("examples", examples),
    SuiteDefinition::new("plugins", plugins),
    SuiteDefinition::new("rstest", rstest),
];

const PLUGINS: &[&str] = &["rstackjs/rsbuild-plugin-eslint"];

fn examples(options: &BaseRunOptions) -> Result<SuitePlan> {
    Ok(SuitePlan::Single(
        options
            .suite("rstackjs/rspack-examples")
            .with_hooks(LifecycleHooks::new().with(HookStage::Test, ["build:rsbuild"])),
    ))
}

fn rstest(options: &BaseRunOptions) -> Result<SuitePlan> {
    Ok(SuitePlan::Single(
        options
            .suite("web-infra-dev/rstest")
            .with_branch(env_branch("RSTEST"))
            .with_hooks(
                LifecycleHooks::new()
                    .with(
                        HookStage::BeforeTest,
                        ["npx playwright install chromium webkit --with-deps"],
                    )
                    .with(HookStage::Test, ["test -u"]),
            ),
    ))
}

fn plugins(options: &BaseRunOptions) -> Result<SuitePlan> {
    let items = PLUGINS
        .iter()
        .map(|repo| plugin_suite(options, repo))
        .collect();
    Ok(SuitePlan::Batch {
        label: "plugins".to_string(),
        items,
    })
}

fn plugin_suite(options: &BaseRunOptions, repo: &str) -> SuiteOptions {
    // keep the rsbuild that rslib pins
    let overrides: OverrideMap = [("@rslib/core>@rsbuild/core", "latest")]
        .into_iter()
        .collect();

    let checkout = options.workspace.join(RepoRef::new(repo).dir_name());
    let has_test = Arc::new(AtomicBool::new(false));

    let before_test = {
        let has_test = Arc::clone(&has_test);
        Task::action(move |ctx| {
            let has_test = Arc::clone(&has_test);
            let checkout = checkout.clone();
            async move {
                let probe = PluginProbe::inspect(&checkout);
                has_test.store(probe.has_test, Ordering::SeqCst);
                if probe.playwright {
                    ctx.run("pnpm exec playwright install --with-deps").await?;
                }
                Ok(())
            }
            .boxed()
        })
    };

    let repo_name = repo.to_string();
    let run_tests = Task::action(move |ctx| {
        let has_test = has_test.load(Ordering::SeqCst);
        let repo_name = repo_name.clone();
        async move {
            if has_test {
                ctx.run("pnpm run test").await?;
            } else {
                warn!("not found test script in {repo_name}");
            }
            Ok(())
        }
        .boxed()
    });

    options
        .suite(repo)
        .with_overrides(overrides)
        .with_hooks(
            LifecycleHooks::new()
                .with(HookStage::BeforeTest, [before_test])
                .with(HookStage::Test, [Task::from("build"), run_tests]),
        )
}

/// What a plugin checkout declares about its tests.
#[derive(Debug, Default, PartialEq, Eq)]
struct PluginProbe {
    has_test: bool,
    playwright: bool,
}

impl PluginProbe {
    fn inspect(dir: &Path) -> Self {
        let manifest = match PackageManifest::load(dir) {
            Ok(manifest) => manifest,
            Err(_) => {
                warn!("not found package.json in {}", dir.display());
                return Self::default();
            }
        };
        let test_script = manifest.script("test");
        let playwright_dep = manifest
            .object(&["devDependencies"])
            .is_some_and(|deps| deps.contains_key("playwright"));
        Self {
            has_test: manifest.has_script("test"),
            playwright: playwright_dep || test_script.is_some_and(|s| s.contains("playwright")),
        }
    }
}
