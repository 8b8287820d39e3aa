//! Bisection controller over the stack repository.
//!
//! Each step hard-resets the stack checkout, asks a [`BisectProbe`] whether
//! the current commit is good, and feeds the verdict to `git bisect`. Release
//! and docs commits are skipped without probing.

use async_trait::async_trait;
use ecosystem_ci_core::{bisect_span, EcosystemError, Result};
use regex::Regex;
use tracing::{error, info, warn, Instrument};

use crate::context::OrchestrationContext;

/// Decides whether the currently checked-out stack commit is good.
#[async_trait]
pub trait BisectProbe: Send {
    /// `Ok` means good; any error means bad.
    async fn probe(&mut self, ctx: &mut OrchestrationContext) -> Result<()>;
}

/// Where a bisection ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BisectOutcome {
    /// First bad commit, when git narrowed it down to one.
    pub culprit: Option<String>,
    /// Commits passed over as release or docs commits.
    pub skipped: usize,
    /// Commits actually probed.
    pub probed: usize,
    /// Final `git bisect` output.
    pub summary: String,
}

/// First line of a commit that cannot change behaviour.
const NON_CODE_COMMIT: &str = r"^(?:release|docs)[:(]";

const FIRST_BAD_COMMIT: &str = r"(?m)^([0-9a-f]{7,64}) is the first bad commit";

/// Whether a commit subject marks a release or docs commit.
pub fn is_non_code_commit(subject: &str) -> bool {
    Regex::new(NON_CODE_COMMIT).is_ok_and(|re| re.is_match(subject))
}

fn culprit(output: &str) -> Option<String> {
    let re = Regex::new(FIRST_BAD_COMMIT).ok()?;
    re.captures(output).map(|caps| caps[1].to_string())
}

fn still_bisecting(output: &str) -> bool {
    output
        .get(..10)
        .is_some_and(|head| head.eq_ignore_ascii_case("bisecting:"))
}

/// Bisect the stack between HEAD (bad) and `good`.
///
/// Probe failures are verdicts, never aborts. A git failure aborts the
/// search. `git bisect reset` runs on every exit path.
pub async fn bisect_stack<P: BisectProbe + ?Sized>(
    ctx: &mut OrchestrationContext,
    good: &str,
    probe: &mut P,
) -> Result<BisectOutcome> {
    let span = bisect_span(ctx.stack(), good);
    async move {
        let outcome = bisect_loop(ctx, good, probe).await;
        if let Err(e) = &outcome {
            error!("error while bisecting: {e}");
        }

        let stack_path = ctx.stack_path().to_path_buf();
        ctx.cd(&stack_path);
        if let Err(e) = ctx.run("git bisect reset").await {
            warn!("Error while resetting bisect: {e}");
        }
        outcome
    }
    .instrument(span)
    .await
}

async fn bisect_loop<P: BisectProbe + ?Sized>(
    ctx: &mut OrchestrationContext,
    good: &str,
    probe: &mut P,
) -> Result<BisectOutcome> {
    let stack_path = ctx.stack_path().to_path_buf();
    let mut outcome = BisectOutcome::default();

    ctx.cd(&stack_path);
    ctx.run("git reset --hard HEAD").await?;
    ctx.run("git bisect start").await?;
    ctx.run("git bisect bad").await?;
    let mut output = ctx.run(&format!("git bisect good {good}")).await?;

    while still_bisecting(&output) {
        let subject = ctx.run("git log -1 --format=%s").await?;
        if is_non_code_commit(&subject) {
            info!("skipping non-code commit: {subject}");
            outcome.skipped += 1;
            output = ctx.run("git bisect skip").await?;
            continue;
        }

        let verdict = probe.probe(ctx).await;
        outcome.probed += 1;
        ctx.cd(&stack_path);
        ctx.run("git reset --hard HEAD").await?;
        output = match verdict {
            Ok(()) => {
                info!("commit is good: {subject}");
                ctx.run("git bisect good").await?
            }
            Err(e) => {
                info!("commit is bad: {subject} ({e})");
                ctx.run("git bisect bad").await?
            }
        };
    }

    outcome.culprit = culprit(&output);
    match &outcome.culprit {
        Some(sha) => info!("first bad commit: {sha}"),
        None => warn!("bisect ended without a single culprit"),
    }
    outcome.summary = output;
    if outcome.culprit.is_none() && outcome.probed == 0 && outcome.skipped == 0 {
        return Err(EcosystemError::Bisect(format!(
            "git bisect did not start: {}",
            outcome.summary
        )));
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::RecordingRunner;
    use ecosystem_ci_core::Stack;
    use std::sync::Arc;

    struct AlwaysBad;

    #[async_trait]
    impl BisectProbe for AlwaysBad {
        async fn probe(&mut self, _ctx: &mut OrchestrationContext) -> Result<()> {
            Err(EcosystemError::TaskFailed("red".to_string()))
        }
    }

    #[test]
    fn test_non_code_commit_pattern() {
        assert!(is_non_code_commit("release: v1.2.0"));
        assert!(is_non_code_commit("docs(core): fix typo"));
        assert!(!is_non_code_commit("fix: docs: handle"));
        assert!(!is_non_code_commit("feat: release notes"));
        assert!(!is_non_code_commit("releases: x"));
    }

    #[test]
    fn test_still_bisecting_marker() {
        assert!(still_bisecting("Bisecting: 3 revisions left to test"));
        assert!(still_bisecting("bisecting: 0 revisions left"));
        assert!(!still_bisecting("abc is the first bad commit"));
        assert!(!still_bisecting(""));
    }

    #[tokio::test]
    async fn test_git_failure_aborts_but_still_resets() {
        let runner = Arc::new(RecordingRunner::new().fail("git bisect start"));
        let mut ctx = OrchestrationContext::new(Stack::Rsbuild, "/engine", runner.clone());

        let err = bisect_stack(&mut ctx, "v1.0.0", &mut AlwaysBad).await.unwrap_err();

        assert!(matches!(err, EcosystemError::CommandFailed { .. }));
        assert_eq!(
            runner.commands(),
            vec!["git reset --hard HEAD", "git bisect start", "git bisect reset"]
        );
    }

    #[tokio::test]
    async fn test_resolves_culprit_from_scripted_git() {
        let runner = Arc::new(
            RecordingRunner::new()
                .respond("git bisect good v1", "Bisecting: 0 revisions left to test after this")
                .respond("git log -1 --format=%s", "fix: something")
                .respond(
                    "git bisect bad",
                    "1111111111111111111111111111111111111111 is the first bad commit\ncommit 1111",
                ),
        );
        let mut ctx = OrchestrationContext::new(Stack::Rsbuild, "/engine", runner.clone());

        let outcome = bisect_stack(&mut ctx, "v1", &mut AlwaysBad).await.unwrap();

        assert_eq!(
            outcome.culprit.as_deref(),
            Some("1111111111111111111111111111111111111111")
        );
        assert_eq!(outcome.probed, 1);
        assert_eq!(runner.commands().last().map(String::as_str), Some("git bisect reset"));
    }

    struct CountingProbe(usize);

    #[async_trait]
    impl BisectProbe for CountingProbe {
        async fn probe(&mut self, _ctx: &mut OrchestrationContext) -> Result<()> {
            self.0 += 1;
            Err(EcosystemError::TaskFailed("red".to_string()))
        }
    }

    #[tokio::test]
    async fn test_adjacent_non_code_commits_are_each_skipped() {
        let runner = Arc::new(
            RecordingRunner::new()
                .respond("git bisect good v1", "Bisecting: 3 revisions left to test after this")
                .respond_once("git log -1 --format=%s", "docs: plugin guide")
                .respond_once("git log -1 --format=%s", "release: v1.1.0")
                .respond("git log -1 --format=%s", "fix: rework loader")
                .respond_once("git bisect skip", "Bisecting: 2 revisions left to test after this")
                .respond_once("git bisect skip", "Bisecting: 1 revision left to test after this")
                .respond_once("git bisect bad", "")
                .respond(
                    "git bisect bad",
                    "2222222222222222222222222222222222222222 is the first bad commit",
                ),
        );
        let mut ctx = OrchestrationContext::new(Stack::Rsbuild, "/engine", runner.clone());
        let mut probe = CountingProbe(0);

        let outcome = bisect_stack(&mut ctx, "v1", &mut probe).await.unwrap();

        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.probed, 1);
        assert_eq!(probe.0, 1);
        assert_eq!(runner.commands_with_prefix("git bisect skip").len(), 2);
        assert_eq!(
            outcome.culprit.as_deref(),
            Some("2222222222222222222222222222222222222222")
        );

        // each skip directly follows the subject lookup of its commit
        let commands = runner.commands();
        let skips: Vec<_> = commands
            .iter()
            .enumerate()
            .filter(|(_, c)| c.as_str() == "git bisect skip")
            .map(|(i, _)| i)
            .collect();
        for i in skips {
            assert_eq!(commands[i - 1], "git log -1 --format=%s");
        }
    }
}
