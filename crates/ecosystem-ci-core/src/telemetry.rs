//! Tracing setup and the spans engine operations log under.
//!
//! Suite runs log inside a `suite` span and bisection inside a `bisect`
//! span, so every command line carries the stack and suite it belongs to.

use tracing::{info_span, Level, Span};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::domain::Stack;

/// Log targets of this workspace; the `ecosystem-ci` binary shares the
/// engine's target. Everything else only reports warnings.
const TARGETS: [&str; 2] = ["ecosystem_ci", "ecosystem_ci_core"];

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise our crates log at `level` and
/// dependencies at `warn`. Later calls are ignored.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
            .ok();
    } else {
        // log groups under GitHub Actions render escape codes literally
        let ansi = std::env::var_os("GITHUB_ACTIONS").is_none();
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_ansi(ansi))
            .try_init()
            .ok();
    }
}

fn default_directives(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    std::iter::once("warn".to_string())
        .chain(TARGETS.iter().map(|target| format!("{target}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Span wrapping one suite of a run.
pub fn suite_span(stack: Stack, suite: &str) -> Span {
    info_span!("suite", %stack, suite)
}

/// Span wrapping a bisection of `stack` down to `good`.
pub fn bisect_span(stack: Stack, good: &str) -> Span {
    info_span!("bisect", %stack, good)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_scope_level_to_workspace_crates() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "warn,ecosystem_ci=debug,ecosystem_ci_core=debug"
        );
        assert!(EnvFilter::try_new(default_directives(Level::INFO)).is_ok());
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
        let span = suite_span(Stack::Rsbuild, "examples");
        let _entered = span.enter();
        tracing::info!("inside suite span");
    }
}
