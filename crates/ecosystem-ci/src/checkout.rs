//! Repository checkout manager.
//!
//! Clones or reuses a working copy at the requested ref. Every git failure
//! aborts the operation; there is no partial-state recovery and no retry.

use std::path::Path;

use ecosystem_ci_core::{EcosystemError, RepoRef, Result};
use tracing::{debug, info};

use crate::context::OrchestrationContext;

/// Establish `dir` as a checkout of `repo` and return the resulting HEAD sha.
///
/// Leaves the context's working directory at `dir`.
pub async fn ensure_checkout(
    ctx: &mut OrchestrationContext,
    repo: &RepoRef,
    dir: &Path,
) -> Result<String> {
    let url = repo.url();
    checkout(ctx, repo, &url, dir)
        .await
        .map_err(|e| EcosystemError::checkout(url.clone(), e))
}

async fn checkout(
    ctx: &mut OrchestrationContext,
    repo: &RepoRef,
    url: &str,
    dir: &Path,
) -> Result<String> {
    if !reusable_checkout(ctx, url, dir).await? {
        clone(ctx, repo, url, dir).await?;
    }

    ctx.cd(dir);
    ctx.run("git clean -fdxq").await?;
    ctx.run(&fetch_command(repo)).await?;

    if repo.shallow {
        ctx.run(&format!(
            "git -c advice.detachedHead=false checkout {}",
            repo.checkout_target()
        ))
        .await?;
    } else {
        ctx.run(&format!("git checkout {}", repo.branch)).await?;
        ctx.run("git merge FETCH_HEAD").await?;
        if let Some(target) = repo.reset_target() {
            ctx.run(&format!("git reset --hard {target}")).await?;
        }
    }

    let sha = ctx.run("git log -1 --format=%H").await?;
    info!("{} is at {sha}", dir.display());
    Ok(sha)
}

/// Keep an existing checkout of the same remote; delete anything else at `dir`.
async fn reusable_checkout(ctx: &OrchestrationContext, url: &str, dir: &Path) -> Result<bool> {
    if !dir.exists() {
        return Ok(false);
    }
    let current = match ctx.run_in(dir, "git ls-remote --get-url").await {
        Ok(current) => Some(current),
        Err(e) => {
            debug!("no usable remote in {}: {e}", dir.display());
            None
        }
    };
    if current.as_deref() == Some(url) {
        info!("reusing checkout of {url} in {}", dir.display());
        return Ok(true);
    }
    info!(
        "removing {} (remote {:?} does not match {url})",
        dir.display(),
        current
    );
    std::fs::remove_dir_all(dir)?;
    Ok(false)
}

async fn clone(ctx: &OrchestrationContext, repo: &RepoRef, url: &str, dir: &Path) -> Result<()> {
    let parent = dir.parent().unwrap_or(dir);
    std::fs::create_dir_all(parent)?;
    ctx.run_in(parent, &clone_command(repo, url, dir)).await?;
    Ok(())
}

fn clone_command(repo: &RepoRef, url: &str, dir: &Path) -> String {
    let branch = format!("--branch {}", repo.clone_target());
    let dir = dir.display().to_string();
    let mut parts = vec!["git -c advice.detachedHead=false clone"];
    if repo.shallow {
        parts.push("--depth=1 --no-tags");
    }
    parts.extend([branch.as_str(), url, dir.as_str()]);
    parts.join(" ")
}

fn fetch_command(repo: &RepoRef) -> String {
    let depth = if repo.shallow {
        "--depth=1 --no-tags"
    } else {
        "--tags"
    };
    format!("git fetch {depth} origin {}", repo.fetch_target())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::RecordingRunner;
    use ecosystem_ci_core::Stack;
    use std::sync::Arc;

    fn context(root: &Path, runner: Arc<RecordingRunner>) -> OrchestrationContext {
        OrchestrationContext::new(Stack::Rsbuild, root, runner)
    }

    #[tokio::test]
    async fn test_shallow_checkout_never_fetches_tags() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("workspace/examples/rspack-examples");
        for repo in [
            RepoRef::new("rstackjs/rspack-examples"),
            RepoRef::new("rstackjs/rspack-examples").with_tag(Some("v1.0.0".to_string())),
            RepoRef::new("rstackjs/rspack-examples").with_commit(Some("abc123".to_string())),
        ] {
            let runner = Arc::new(RecordingRunner::new());
            let mut ctx = context(dir.path(), runner.clone());
            ensure_checkout(&mut ctx, &repo, &target).await.unwrap();

            let fetches = runner.commands_with_prefix("git fetch");
            assert_eq!(fetches.len(), 1);
            assert!(!fetches[0].contains("--tags"), "{}", fetches[0]);
            assert!(fetches[0].contains("--depth=1 --no-tags"));
        }
    }

    #[tokio::test]
    async fn test_shallow_clone_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("suite/rspack-examples");
        let runner = Arc::new(RecordingRunner::new().respond("git log", "deadbeef"));
        let mut ctx = context(dir.path(), runner.clone());

        let sha = ensure_checkout(&mut ctx, &RepoRef::new("rstackjs/rspack-examples"), &target)
            .await
            .unwrap();

        assert_eq!(sha, "deadbeef");
        assert_eq!(
            runner.commands(),
            vec![
                format!(
                    "git -c advice.detachedHead=false clone --depth=1 --no-tags --branch main \
                     https://github.com/rstackjs/rspack-examples.git {}",
                    target.display()
                ),
                "git clean -fdxq".to_string(),
                "git fetch --depth=1 --no-tags origin main".to_string(),
                "git -c advice.detachedHead=false checkout main".to_string(),
                "git log -1 --format=%H".to_string(),
            ]
        );
        assert_eq!(runner.calls()[0].cwd, dir.path().join("suite"));
        assert_eq!(ctx.cwd(), target.as_path());
    }

    #[tokio::test]
    async fn test_full_checkout_merges_then_resets_to_tag() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("rsbuild");
        let runner = Arc::new(RecordingRunner::new());
        let mut ctx = context(dir.path(), runner.clone());
        let repo = RepoRef::new("web-infra-dev/rsbuild")
            .with_tag(Some("v1.2.0".to_string()))
            .with_shallow(false);

        ensure_checkout(&mut ctx, &repo, &target).await.unwrap();

        let commands = runner.commands();
        assert!(commands[0].contains("clone --branch v1.2.0"), "{}", commands[0]);
        assert_eq!(commands[2], "git fetch --tags origin tag v1.2.0");
        assert_eq!(commands[3], "git checkout main");
        assert_eq!(commands[4], "git merge FETCH_HEAD");
        assert_eq!(commands[5], "git reset --hard v1.2.0");
    }

    #[tokio::test]
    async fn test_existing_checkout_with_same_remote_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("rsbuild");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("keep.txt"), "").unwrap();
        let runner = Arc::new(
            RecordingRunner::new()
                .respond("git ls-remote", "https://github.com/web-infra-dev/rsbuild.git"),
        );
        let mut ctx = context(dir.path(), runner.clone());

        ensure_checkout(&mut ctx, &RepoRef::new("web-infra-dev/rsbuild"), &target)
            .await
            .unwrap();

        assert!(target.join("keep.txt").exists());
        assert!(runner.commands_with_prefix("git -c advice.detachedHead=false clone").is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_remote_is_deleted_and_recloned() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("rsbuild");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("stale.txt"), "").unwrap();
        let runner = Arc::new(
            RecordingRunner::new().respond("git ls-remote", "https://github.com/someone/fork.git"),
        );
        let mut ctx = context(dir.path(), runner.clone());

        ensure_checkout(&mut ctx, &RepoRef::new("web-infra-dev/rsbuild"), &target)
            .await
            .unwrap();

        assert!(!target.join("stale.txt").exists());
        assert_eq!(
            runner
                .commands_with_prefix("git -c advice.detachedHead=false clone")
                .len(),
            1
        );
        assert!(runner.commands_with_prefix("git merge").is_empty());
    }

    #[tokio::test]
    async fn test_git_failure_is_checkout_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new().fail("git fetch"));
        let mut ctx = context(dir.path(), runner.clone());

        let err = ensure_checkout(&mut ctx, &RepoRef::new("a/b"), &dir.path().join("b"))
            .await
            .unwrap_err();

        assert!(matches!(err, EcosystemError::CheckoutFailure { .. }));
        assert!(err.to_string().contains("git fetch"));
        assert!(runner.commands_with_prefix("git log").is_empty());
    }
}
