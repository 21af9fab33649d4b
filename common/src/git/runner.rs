// Subprocess wrapper for the git executable

use std::path::{Path, PathBuf};
use std::process::Output;

use tokio::process::Command;
use tracing::debug;

use crate::errors::RepositoryError;

/// Thin wrapper around the `git` executable scoped to one working tree
#[derive(Debug, Clone)]
pub struct GitRunner {
    working_dir: PathBuf,
}

impl GitRunner {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Run git, returning the raw output whatever the exit status
    pub async fn run(&self, args: &[&str]) -> Result<Output, RepositoryError> {
        debug!(args = ?args, dir = %self.working_dir.display(), "Running git command");

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.working_dir)
            // Never block on credential prompts; messages are matched in English
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_LITERAL_PATHSPECS", "1")
            .env("LC_ALL", "C")
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(args = ?args, stderr = %stderr.trim(), "Git command exited non-zero");
        }

        Ok(output)
    }

    /// Run git and fail on a non-zero exit status
    pub async fn run_checked(&self, args: &[&str]) -> Result<Output, RepositoryError> {
        let output = self.run(args).await?;

        if !output.status.success() {
            return Err(command_failed(args, &output));
        }

        Ok(output)
    }

    /// Run git and return stdout as text
    pub async fn stdout(&self, args: &[&str]) -> Result<String, RepositoryError> {
        let output = self.run_checked(args).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

pub(crate) fn command_failed(args: &[&str], output: &Output) -> RepositoryError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stderr = if stderr.is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        stderr
    };
    RepositoryError::CommandFailed {
        command: args.first().copied().unwrap_or_default().to_string(),
        stderr,
    }
}
