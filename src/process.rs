//! Blocking invocation of external build tools (pip, venv, pex).

use anyhow::{Context, Result};
use log::debug;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Captured outcome of an external program run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunResult {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.code == 0
    }

    /// Best description of a failure: stderr verbatim, else stdout, else the exit code.
    pub fn error_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("exited with code {}", self.code)
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait ProcessRunner: Send + Sync {
    /// Run `program` with `args` to completion, capturing output.
    /// Only a failure to spawn is an `Err`; non-zero exits are reported in the result.
    fn run(&self, program: &Path, args: &[String]) -> Result<RunResult>;

    /// Locate an executable on PATH (or validate an explicit path).
    fn which(&self, program: &str) -> Option<PathBuf>;
}

pub struct RealRunner;

impl ProcessRunner for RealRunner {
    #[tracing::instrument(skip(self))]
    fn run(&self, program: &Path, args: &[String]) -> Result<RunResult> {
        debug!("Running: {} {}", program.display(), args.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to run {}", program.display()))?;

        Ok(RunResult {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn which(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// Render a command line for log messages.
pub fn describe(program: &Path, args: &[String]) -> String {
    if args.is_empty() {
        program.display().to_string()
    } else {
        format!("{} {}", program.display(), args.join(" "))
    }
}
