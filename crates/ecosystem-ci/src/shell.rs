//! Shell command execution with streamed, captured output.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use ecosystem_ci_core::{EcosystemError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::info;

/// Executes literal command lines on behalf of the engine.
///
/// Implementations must surface every non-zero exit as
/// [`EcosystemError::CommandFailed`]; a failing command is never a silent result.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` in `cwd` with `env` layered over the inherited environment.
    ///
    /// Returns captured stdout with the trailing newline removed.
    async fn run(&self, command: &str, cwd: &Path, env: &BTreeMap<String, String>)
        -> Result<String>;
}

/// Runs commands through the platform shell, teeing child output to our own
/// stdout/stderr while capturing stdout.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    log_groups: bool,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable GitHub Actions log groups when running under GitHub Actions.
    pub fn from_env() -> Self {
        Self {
            log_groups: std::env::var_os("GITHUB_ACTIONS").is_some_and(|v| !v.is_empty()),
        }
    }

    pub fn with_log_groups(mut self, log_groups: bool) -> Self {
        self.log_groups = log_groups;
        self
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        command: &str,
        cwd: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<String> {
        let start = Instant::now();
        let header = format!("{} $> {}", cwd.display(), command);
        if self.log_groups {
            println!("::group::{header}");
        } else {
            info!("{header}");
        }

        let mut child = shell_command(command)
            .current_dir(cwd)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EcosystemError::CommandFailed {
                command: command.to_string(),
                message: format!("Command failed to spawn: {command}: {e}"),
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (captured, _, status) = tokio::join!(
            pump(stdout, tokio::io::stdout()),
            pump(stderr, tokio::io::stderr()),
            child.wait()
        );

        if self.log_groups {
            println!("::endgroup::");
            println!(
                "Cost for `{command}`: {} s",
                start.elapsed().as_secs_f64().ceil()
            );
        }

        let io_failure = |e: std::io::Error| EcosystemError::CommandFailed {
            command: command.to_string(),
            message: format!("Command failed: {command}: {e}"),
        };
        let status = status.map_err(io_failure)?;
        let captured = captured.map_err(io_failure)?;

        if !status.success() {
            let message = match status.code() {
                Some(code) => format!("Command failed with exit code {code}: {command}"),
                None => format!("Command was killed with a signal: {command}"),
            };
            return Err(EcosystemError::CommandFailed {
                command: command.to_string(),
                message,
            });
        }

        Ok(String::from_utf8_lossy(&captured).trim_end().to_string())
    }
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// Copy everything from `reader` to `sink`, returning what was copied.
async fn pump<R, W>(reader: Option<R>, mut sink: W) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut captured = Vec::new();
    let Some(mut reader) = reader else {
        return Ok(captured);
    };
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        sink.write_all(&buf[..n]).await?;
        captured.extend_from_slice(&buf[..n]);
    }
    sink.flush().await?;
    Ok(captured)
}
