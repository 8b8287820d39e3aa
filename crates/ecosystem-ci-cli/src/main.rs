//! ecosystem-ci - downstream regression testing for the Rstack toolchain
//!
//! The `ecosystem-ci` command builds a stack from source (or picks a registry
//! release), runs consumer projects against it and bisects regressions.
//!
//! ## Commands
//!
//! - `run`: Check out and build the stack, then run suites
//! - `build`: Check out and build the stack only
//! - `run-suites`: Run suites against an already built stack
//! - `bisect`: Find the stack commit that broke the selected suites

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ecosystem_ci::{
    bisect_stack, build_stack, parse_major_version, parse_stack_major, run_suites,
    select_suites, setup_stack_repo, stack_commit, BaseRunOptions, BisectProbe,
    OrchestrationContext, ShellRunner, SuiteBatchProbe,
};
use ecosystem_ci_core::{RepoRef, RunReport, Stack};
use tracing::{error, info, Level};

/// Suite ref value meaning "use the suite's own ref".
const PRECODED: &str = "precoded";

#[derive(Parser)]
#[command(name = "ecosystem-ci")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run downstream projects against a stack build", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Engine root; checkouts live in <root>/workspace
    #[arg(long, global = true, env = "ECOSYSTEM_CI_ROOT", default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the selected stack and run suites
    Run {
        /// Suites to run (default: all)
        suites: Vec<String>,

        #[command(flatten)]
        stack: StackArgs,

        /// Use this registry release instead of building the stack
        #[arg(long)]
        release: Option<String>,

        #[command(flatten)]
        refs: SuiteRefArgs,

        /// Write a results report to this path
        #[arg(long)]
        results_json: Option<PathBuf>,
    },

    /// Build the selected stack only
    Build {
        #[command(flatten)]
        stack: StackArgs,
    },

    /// Run suites using a pre-built version of the selected stack
    RunSuites {
        /// Suites to run (default: all)
        suites: Vec<String>,

        /// Target stack
        #[arg(long)]
        stack: Stack,

        /// Verify checkouts by running their tests before using the local stack
        #[arg(long)]
        verify: bool,

        /// Use this registry release instead of the local stack
        #[arg(long)]
        release: Option<String>,

        #[command(flatten)]
        refs: SuiteRefArgs,

        /// Write a results report to this path
        #[arg(long)]
        results_json: Option<PathBuf>,
    },

    /// Use git bisect to find the stack commit that broke suites
    Bisect {
        /// Suites to run on every step (default: all)
        suites: Vec<String>,

        /// Last known good ref, e.g. a previous tag
        #[arg(long)]
        good: String,

        #[command(flatten)]
        stack: StackArgs,

        #[command(flatten)]
        refs: SuiteRefArgs,
    },
}

/// Which stack to check out and build.
#[derive(Args, Debug, Clone)]
struct StackArgs {
    /// Target stack (rsbuild, rspack, rstest, rslib, rsdoctor, rspress)
    #[arg(long)]
    stack: Stack,

    /// Verify checkouts by running tests
    #[arg(long)]
    verify: bool,

    /// Stack repository (default: web-infra-dev/<stack>)
    #[arg(long)]
    repo: Option<String>,

    /// Branch to use
    #[arg(long, default_value = "main")]
    branch: String,

    /// Tag to use
    #[arg(long)]
    tag: Option<String>,

    /// Commit sha to use
    #[arg(long)]
    commit: Option<String>,
}

impl StackArgs {
    fn repo_ref(&self) -> RepoRef {
        let repo = self
            .repo
            .clone()
            .unwrap_or_else(|| self.stack.default_repository().to_string());
        RepoRef::new(repo)
            .with_branch(self.branch.clone())
            .with_tag(self.tag.clone())
            .with_commit(self.commit.clone())
    }
}

/// Refs forced onto every suite repository.
#[derive(Args, Debug, Clone, Default)]
struct SuiteRefArgs {
    /// Use the refs coded into each suite, ignoring the options below
    #[arg(long)]
    suite_precoded: bool,

    /// Suite branch to use
    #[arg(long)]
    suite_branch: Option<String>,

    /// Suite tag to use
    #[arg(long)]
    suite_tag: Option<String>,

    /// Suite commit sha to use
    #[arg(long)]
    suite_commit: Option<String>,
}

impl SuiteRefArgs {
    fn apply(&self, base: BaseRunOptions) -> BaseRunOptions {
        if self.suite_precoded {
            return base;
        }
        base.with_suite_refs(
            ignore_precoded(self.suite_branch.clone()),
            ignore_precoded(self.suite_tag.clone()),
            ignore_precoded(self.suite_commit.clone()),
        )
    }
}

fn ignore_precoded(value: Option<String>) -> Option<String> {
    value.filter(|v| v != PRECODED)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    ecosystem_ci_core::init_tracing(cli.json, level);

    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("Engine root {} not found", cli.root.display()))?;

    match cli.command {
        Commands::Run {
            suites,
            stack,
            release,
            refs,
            results_json,
        } => cmd_run(&root, &suites, &stack, release, &refs, results_json.as_deref()).await,
        Commands::Build { stack } => cmd_build(&root, &stack).await,
        Commands::RunSuites {
            suites,
            stack,
            verify,
            release,
            refs,
            results_json,
        } => {
            cmd_run_suites(
                &root,
                &suites,
                stack,
                verify,
                release,
                &refs,
                results_json.as_deref(),
            )
            .await
        }
        Commands::Bisect {
            suites,
            good,
            stack,
            refs,
        } => cmd_bisect(&root, &suites, &good, &stack, &refs).await,
    }
}

fn setup_context(root: &Path, stack: Stack) -> Result<OrchestrationContext> {
    OrchestrationContext::setup(stack, root, Arc::new(ShellRunner::from_env()))
        .with_context(|| format!("Failed to prepare workspace under {}", root.display()))
}

/// Check out and build the stack, returning its major version.
async fn checkout_and_build(ctx: &mut OrchestrationContext, args: &StackArgs) -> Result<u64> {
    let sha = setup_stack_repo(ctx, &args.repo_ref())
        .await
        .context("Failed to check out stack")?;
    info!("{} checked out at {sha}", args.stack);
    build_stack(ctx, args.verify)
        .await
        .with_context(|| format!("Failed to build {}", args.stack))?;
    Ok(parse_stack_major(args.stack, ctx.stack_path())?)
}

/// Build the stack and run suites against it
async fn cmd_run(
    root: &Path,
    suites: &[String],
    args: &StackArgs,
    release: Option<String>,
    refs: &SuiteRefArgs,
    results_json: Option<&Path>,
) -> Result<()> {
    let mut ctx = setup_context(root, args.stack)?;
    let suites = select_suites(args.stack, suites)?;
    let stack_major = match &release {
        Some(release) => parse_major_version(release)?,
        None => checkout_and_build(&mut ctx, args).await?,
    };
    let base = refs.apply(
        BaseRunOptions::new(&ctx, stack_major)
            .with_release(release)
            .with_verify(args.verify),
    );
    run_and_report(&mut ctx, &suites, &base, results_json).await
}

/// Build the stack only
async fn cmd_build(root: &Path, args: &StackArgs) -> Result<()> {
    let mut ctx = setup_context(root, args.stack)?;
    let stack_major = checkout_and_build(&mut ctx, args).await?;
    println!("Built {} (major {stack_major})", args.stack);
    Ok(())
}

/// Run suites against the stack already built in the workspace
async fn cmd_run_suites(
    root: &Path,
    suites: &[String],
    stack: Stack,
    verify: bool,
    release: Option<String>,
    refs: &SuiteRefArgs,
    results_json: Option<&Path>,
) -> Result<()> {
    let mut ctx = setup_context(root, stack)?;
    let suites = select_suites(stack, suites)?;
    let stack_major = match &release {
        Some(release) => parse_major_version(release)?,
        None => parse_stack_major(stack, ctx.stack_path())
            .context("No usable stack build; run `ecosystem-ci build` first")?,
    };
    let base = refs.apply(
        BaseRunOptions::new(&ctx, stack_major)
            .with_release(release)
            .with_verify(verify),
    );
    run_and_report(&mut ctx, &suites, &base, results_json).await
}

async fn run_and_report(
    ctx: &mut OrchestrationContext,
    suites: &[&str],
    base: &BaseRunOptions,
    results_json: Option<&Path>,
) -> Result<()> {
    let summary = run_suites(ctx, suites, base).await;

    let report = RunReport::new(base.stack, summary.reports);
    for suite in &report.suites {
        info!("{}: {:?}", suite.name, suite.status);
    }
    println!(
        "{} passed, {} failed, {} total",
        report.passed_count(),
        report.failed_count(),
        report.suites.len()
    );

    if let Some(path) = results_json {
        let (sha, timestamp) = match base.release {
            Some(_) => (None, None),
            None => match stack_commit(ctx).await {
                Some((sha, timestamp)) => (Some(sha), timestamp),
                None => (None, None),
            },
        };
        report
            .with_commit(sha, timestamp)
            .write_json(path)
            .with_context(|| format!("Failed to write results to {}", path.display()))?;
        info!("results written to {}", path.display());
    }

    match summary.failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Bisect the stack between HEAD and a known good ref
async fn cmd_bisect(
    root: &Path,
    suites: &[String],
    good: &str,
    args: &StackArgs,
    refs: &SuiteRefArgs,
) -> Result<()> {
    let mut ctx = setup_context(root, args.stack)?;
    let suites = select_suites(args.stack, suites)?;

    setup_stack_repo(&mut ctx, &args.repo_ref().with_shallow(false))
        .await
        .context("Failed to check out stack")?;

    let base = refs.apply(BaseRunOptions::new(&ctx, 0).with_verify(args.verify));
    let mut probe = SuiteBatchProbe::new(suites, base);
    if let Err(e) = probe.probe(&mut ctx).await {
        error!("starting commit fails: {e}");
    } else {
        println!("no errors for starting commit, cannot bisect");
        return Ok(());
    }

    let outcome = bisect_stack(&mut ctx, good, &mut probe)
        .await
        .context("Bisection failed")?;
    match &outcome.culprit {
        Some(sha) => println!("{sha} is the first bad commit"),
        None => println!("{}", outcome.summary),
    }
    info!(
        "bisect probed {} commits, skipped {}",
        outcome.probed, outcome.skipped
    );
    Ok(())
}
