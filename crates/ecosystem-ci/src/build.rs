//! Stack checkout and build.

use std::path::Path;

use chrono::{DateTime, Utc};
use ecosystem_ci_core::{EcosystemError, PackageLayout, RepoRef, Result, Stack};
use tracing::{info, warn};

use crate::checkout::ensure_checkout;
use crate::context::OrchestrationContext;
use crate::manifest::PackageManifest;
use crate::package_manager::PackageManager;

/// Check out the stack into its workspace directory and drop the package cache.
pub async fn setup_stack_repo(ctx: &mut OrchestrationContext, repo: &RepoRef) -> Result<String> {
    let stack_path = ctx.stack_path().to_path_buf();
    let sha = ensure_checkout(ctx, repo, &stack_path).await?;
    ctx.invalidate_packages();
    Ok(sha)
}

/// Commands that build the stack, plus its own tests when `verify` is set.
pub fn build_commands(stack: Stack, verify: bool) -> Vec<String> {
    let pnpm = PackageManager::Pnpm;
    let mut commands = vec![pnpm.frozen_install()];
    match stack.layout() {
        PackageLayout::NativeBinding => {
            commands.push("cargo codegen".to_string());
            commands.push(pnpm.run_script("build:binding:release"));
            commands.push(pnpm.run_script("--filter @rspack/binding move-binding"));
            commands.push(pnpm.run_script("build:js"));
            if verify {
                commands.push(pnpm.run_script("test:js"));
            }
        }
        PackageLayout::Monorepo => {
            commands.push(pnpm.run_script("build"));
            if verify {
                commands.push(pnpm.run_script("test"));
            }
        }
    }
    commands
}

/// Build the stack checkout in place.
pub async fn build_stack(ctx: &mut OrchestrationContext, verify: bool) -> Result<()> {
    let stack_path = ctx.stack_path().to_path_buf();
    ctx.cd(&stack_path);
    for command in build_commands(ctx.stack(), verify) {
        ctx.run(&command).await?;
    }
    ctx.invalidate_packages();
    info!("built {}", ctx.stack());
    Ok(())
}

/// Major version of the stack checkout at `stack_path`.
pub fn parse_stack_major(stack: Stack, stack_path: &Path) -> Result<u64> {
    let manifest_dir = stack
        .version_manifest()
        .iter()
        .take(2)
        .fold(stack_path.to_path_buf(), |path, segment| path.join(segment));
    let manifest = PackageManifest::load(&manifest_dir)?;
    let version = manifest.version().ok_or_else(|| {
        EcosystemError::MissingManifestField(format!("version in {}", manifest.path().display()))
    })?;
    parse_major_version(version)
}

/// Integer before the first `.`, ignoring anything after its leading digits.
pub fn parse_major_version(version: &str) -> Result<u64> {
    let head = version.split('.').next().unwrap_or_default().trim();
    let digits: String = head.chars().take_while(char::is_ascii_digit).collect();
    digits
        .parse()
        .map_err(|_| EcosystemError::InvalidVersion(version.to_string()))
}

/// Short HEAD hash of the stack checkout, if it can be read.
pub async fn permanent_ref(ctx: &mut OrchestrationContext) -> Option<String> {
    let stack_path = ctx.stack_path().to_path_buf();
    ctx.cd(&stack_path);
    match ctx.run("git log -1 --pretty=format:%h").await {
        Ok(sha) => Some(sha),
        Err(e) => {
            warn!("Failed to obtain perm ref. {e}");
            None
        }
    }
}

/// Full HEAD sha and committer timestamp of the stack checkout.
pub async fn stack_commit(ctx: &OrchestrationContext) -> Option<(String, Option<DateTime<Utc>>)> {
    let output = match ctx
        .run_in(ctx.stack_path(), "git log -1 --format=%H%n%cI")
        .await
    {
        Ok(output) => output,
        Err(e) => {
            warn!("failed to read stack commit: {e}");
            return None;
        }
    };
    let mut lines = output.lines();
    let sha = lines.next()?.trim().to_string();
    let timestamp = lines
        .next()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts.trim()).ok())
        .map(|ts| ts.with_timezone(&Utc));
    Some((sha, timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::RecordingRunner;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_parse_major_version() {
        assert_eq!(parse_major_version("1.4.2").unwrap(), 1);
        assert_eq!(parse_major_version("2.0.0-beta.3").unwrap(), 2);
        assert_eq!(parse_major_version("10").unwrap(), 10);
        assert_eq!(parse_major_version("2-canary").unwrap(), 2);
        assert!(matches!(
            parse_major_version("latest"),
            Err(EcosystemError::InvalidVersion(_))
        ));
    }

    #[test]
    fn test_parse_stack_major_reads_version_manifest() {
        let dir = tempdir().unwrap();
        let core = dir.path().join("packages/core");
        std::fs::create_dir_all(&core).unwrap();
        std::fs::write(core.join("package.json"), r#"{"name":"@rsbuild/core","version":"1.3.0"}"#)
            .unwrap();
        assert_eq!(parse_stack_major(Stack::Rsbuild, dir.path()).unwrap(), 1);

        let rspack = dir.path().join("packages/rspack");
        std::fs::create_dir_all(&rspack).unwrap();
        std::fs::write(rspack.join("package.json"), r#"{"name":"@rspack/core","version":"2.0.1"}"#)
            .unwrap();
        assert_eq!(parse_stack_major(Stack::Rspack, dir.path()).unwrap(), 2);
    }

    #[test]
    fn test_build_commands_per_layout() {
        assert_eq!(
            build_commands(Stack::Rsbuild, true),
            ["pnpm install --frozen-lockfile", "pnpm run build", "pnpm run test"]
        );
        assert_eq!(
            build_commands(Stack::Rspack, false),
            [
                "pnpm install --frozen-lockfile",
                "cargo codegen",
                "pnpm run build:binding:release",
                "pnpm run --filter @rspack/binding move-binding",
                "pnpm run build:js",
            ]
        );
    }

    #[tokio::test]
    async fn test_build_stack_runs_in_stack_dir() {
        let runner = Arc::new(RecordingRunner::new());
        let mut ctx = OrchestrationContext::new(Stack::Rslib, "/engine", runner.clone());
        build_stack(&mut ctx, false).await.unwrap();
        assert!(runner
            .calls()
            .iter()
            .all(|c| c.cwd == Path::new("/engine/workspace/rslib")));
        assert_eq!(runner.commands().len(), 2);
    }

    #[tokio::test]
    async fn test_permanent_ref_swallows_failure() {
        let runner = Arc::new(RecordingRunner::new().fail("git log"));
        let mut ctx = OrchestrationContext::new(Stack::Rsbuild, "/engine", runner);
        assert_eq!(permanent_ref(&mut ctx).await, None);

        let runner = Arc::new(RecordingRunner::new().respond("git log", "abc1234"));
        let mut ctx = OrchestrationContext::new(Stack::Rsbuild, "/engine", runner);
        assert_eq!(permanent_ref(&mut ctx).await.as_deref(), Some("abc1234"));
    }

    #[tokio::test]
    async fn test_stack_commit_parses_timestamp() {
        let runner = Arc::new(
            RecordingRunner::new().respond("git log", "0123abcd\n2024-05-01T12:00:00+02:00"),
        );
        let ctx = OrchestrationContext::new(Stack::Rsbuild, "/engine", runner);
        let (sha, ts) = stack_commit(&ctx).await.unwrap();
        assert_eq!(sha, "0123abcd");
        assert_eq!(ts.unwrap().to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }
}
