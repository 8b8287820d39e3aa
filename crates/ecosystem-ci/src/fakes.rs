//! In-memory fakes for the command runner (testing only)
//!
//! `RecordingRunner` satisfies the [`CommandRunner`] contract without spawning
//! anything: it records each invocation and answers from scripted responses.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use ecosystem_ci_core::{EcosystemError, Result};

use crate::shell::CommandRunner;

/// A command seen by [`RecordingRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub command: String,
    pub cwd: PathBuf,
}

#[derive(Debug, Clone)]
enum Response {
    Stdout(String),
    Failure(String),
}

#[derive(Debug)]
struct Scripted {
    prefix: String,
    response: Response,
    /// Consumed by its first match.
    once: bool,
}

/// Records commands and replies with the first scripted response whose
/// prefix matches. Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<RecordedCommand>>,
    responses: Mutex<Vec<Scripted>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `stdout` to commands starting with `prefix`.
    pub fn respond(self, prefix: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.push(prefix.into(), Response::Stdout(stdout.into()), false);
        self
    }

    /// Reply with `stdout` to the next command starting with `prefix` only.
    ///
    /// One-shot replies queue in the order they were added and take
    /// precedence over later persistent ones.
    pub fn respond_once(self, prefix: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.push(prefix.into(), Response::Stdout(stdout.into()), true);
        self
    }

    /// Fail commands starting with `prefix` as if they exited with code 1.
    pub fn fail(self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let message = failure_message(&prefix);
        self.push(prefix, Response::Failure(message), false);
        self
    }

    /// Fail only the next command starting with `prefix`.
    pub fn fail_once(self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let message = failure_message(&prefix);
        self.push(prefix, Response::Failure(message), true);
        self
    }

    fn push(&self, prefix: String, response: Response, once: bool) {
        self.responses.lock().unwrap().push(Scripted {
            prefix,
            response,
            once,
        });
    }

    /// Every recorded invocation, in order.
    pub fn calls(&self) -> Vec<RecordedCommand> {
        self.calls.lock().unwrap().clone()
    }

    /// Every recorded command line, in order.
    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.command).collect()
    }

    /// Commands starting with `prefix`.
    pub fn commands_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }
}

fn failure_message(prefix: &str) -> String {
    format!("Command failed with exit code 1: {prefix}")
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(
        &self,
        command: &str,
        cwd: &Path,
        _env: &BTreeMap<String, String>,
    ) -> Result<String> {
        self.calls.lock().unwrap().push(RecordedCommand {
            command: command.to_string(),
            cwd: cwd.to_path_buf(),
        });

        let mut responses = self.responses.lock().unwrap();
        let matched = match responses
            .iter()
            .position(|s| command.starts_with(s.prefix.as_str()))
        {
            Some(index) if responses[index].once => Some(responses.remove(index).response),
            Some(index) => Some(responses[index].response.clone()),
            None => None,
        };

        match matched {
            Some(Response::Stdout(stdout)) => Ok(stdout),
            Some(Response::Failure(message)) => Err(EcosystemError::CommandFailed {
                command: command.to_string(),
                message,
            }),
            None => Ok(String::new()),
        }
    }
}
