// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External command execution.
//!
//! The catalog needs to ask the system a couple of questions that only
//! external programs can answer, e.g., where an executable lives, or which
//! user owns the current session. Those calls go through the
//! [`CommandRunner`] trait so callers can swap the shell out in tests.
//!
//! Command failures are never fatal to the catalog. Helpers like [`which`]
//! and [`whoami`] contain them and hand back `None` instead.

use std::{
    io::Read,
    path::PathBuf,
    process::{Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, instrument, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Execute shell command lines and capture their standard output.
pub trait CommandRunner {
    /// Run command line to completion.
    ///
    /// # Errors
    ///
    /// - Return [`CommandError::NotFound`] if the command does not exist.
    /// - Return [`CommandError::Timeout`] if the command did not finish in time.
    /// - Return [`CommandError::Failed`] if the command exits unsuccessfully.
    /// - Return [`CommandError::Spawn`] if the command cannot be started.
    fn run(&self, command_line: &str) -> Result<String>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, command_line: &str) -> Result<String> {
        (**self).run(command_line)
    }
}

/// Command runner backed by `sh -c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRunner {
    timeout: Duration,
    trim: bool,
}

impl ShellRunner {
    /// Construct new shell runner that gives up after `timeout`.
    ///
    /// Captured output has trailing whitespace trimmed by default.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            trim: true,
        }
    }

    /// Keep trailing whitespace of captured output.
    pub fn untrimmed(mut self) -> Self {
        self.trim = false;
        self
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl CommandRunner for ShellRunner {
    #[instrument(skip(self), level = "debug")]
    fn run(&self, command_line: &str) -> Result<String> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        // INVARIANT: Drain stdout concurrently so a chatty child never
        // blocks on a full pipe while we poll for its exit.
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout of child was not captured"))?;
        let reader = thread::spawn(move || -> std::io::Result<Vec<u8>> {
            let mut buffer = Vec::new();
            stdout.read_to_end(&mut buffer)?;
            Ok(buffer)
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }

            if Instant::now() >= deadline {
                warn!("command {command_line:?} timed out after {:?}", self.timeout);
                if let Err(error) = child.kill() {
                    debug!("cannot kill {command_line:?}: {error}");
                }
                if let Err(error) = child.wait() {
                    debug!("cannot reap {command_line:?}: {error}");
                }
                return Err(CommandError::Timeout {
                    command: command_line.into(),
                    timeout: self.timeout,
                });
            }

            thread::sleep(POLL_INTERVAL);
        };

        let bytes = reader
            .join()
            .map_err(|_| std::io::Error::other("stdout reader panicked"))??;
        let mut output = String::from_utf8_lossy(bytes.as_slice()).into_owned();
        if self.trim {
            output.truncate(output.trim_end().len());
        }

        check_status(command_line, status, output)
    }
}

fn check_status(command_line: &str, status: ExitStatus, stdout: String) -> Result<String> {
    match status.code() {
        Some(0) => Ok(stdout),
        Some(127) => Err(CommandError::NotFound {
            command: command_line.into(),
        }),
        code => Err(CommandError::Failed {
            command: command_line.into(),
            status: code,
            stdout,
        }),
    }
}

/// Locate executable on the user's `PATH`.
///
/// Only absolute answers count. Builtins, aliases, and lookup failures all
/// yield `None`, leaving the path unresolved.
pub fn which(runner: &impl CommandRunner, executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    match runner.run(&format!("command -v {}", shell_quote(executable))) {
        Ok(output) => {
            let found = output.lines().next().unwrap_or_default().trim();
            let path = PathBuf::from(found);
            if path.is_absolute() {
                Some(path)
            } else {
                debug!("{executable:?} resolved to non-path answer {found:?}");
                None
            }
        }
        Err(error) => {
            debug!("cannot locate {executable:?}: {error}");
            None
        }
    }
}

/// Determine name of the user running the current session.
pub fn whoami(runner: &impl CommandRunner) -> Option<String> {
    match runner.run("whoami") {
        Ok(user) if !user.trim().is_empty() => Some(user.trim().to_string()),
        Ok(_) => None,
        Err(error) => {
            debug!("whoami failed: {error}");
            None
        }
    }
}

fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Command execution error types.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Shell could not find the command.
    #[error("command not found: {command:?}")]
    NotFound { command: String },

    /// Command ran longer than allowed and was killed.
    #[error("command {command:?} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// Command exited unsuccessfully, captured output is kept for the caller.
    #[error("command {command:?} failed with status {status:?}")]
    Failed {
        command: String,
        status: Option<i32>,
        stdout: String,
    },

    /// Command could not be spawned or waited on.
    #[error(transparent)]
    Spawn(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = CommandError> = std::result::Result<T, E>;
