// Repository capability consumed by the execution pipeline

use crate::errors::RepositoryError;
use crate::git::runner::{command_failed, GitRunner};
use crate::git::status::parse_porcelain;
use async_trait::async_trait;
use globset::Glob;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Working-tree operations the pipeline needs from a repository
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Repository: Send + Sync {
    /// Any staged, unstaged or untracked change
    async fn has_changes(&self) -> Result<bool, RepositoryError>;

    async fn has_staged_changes(&self) -> Result<bool, RepositoryError>;

    /// Stage everything, then unstage paths matching any exclude glob
    async fn stage(&self, excludes: &[String]) -> Result<(), RepositoryError>;

    /// Staged diff, or the unstaged diff when nothing is staged
    async fn diff(&self) -> Result<String, RepositoryError>;

    /// Commit the staged changes; `NothingToCommit` when none are staged
    async fn commit(&self, message: &str) -> Result<(), RepositoryError>;

    /// Push the current branch; an up-to-date remote is success
    async fn push(&self) -> Result<(), RepositoryError>;
}

/// Opens a repository handle for a registered path
#[async_trait]
pub trait RepositoryOpener: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Box<dyn Repository>, RepositoryError>;
}

/// Identity recorded on automated commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

/// Repository backed by the `git` executable
pub struct GitRepository {
    git: GitRunner,
    identity: CommitIdentity,
    remote: Option<String>,
}

impl GitRepository {
    /// Open the working tree rooted at `path`
    ///
    /// # Errors
    /// `NotARepository` when `path` is not the top level of a git work tree.
    /// Subdirectories are refused: staging and excludes operate on the whole
    /// tree with root-relative paths.
    pub async fn open(
        path: &Path,
        identity: CommitIdentity,
        remote: Option<String>,
    ) -> Result<Self, RepositoryError> {
        if !path.is_dir() {
            return Err(RepositoryError::NotARepository(path.display().to_string()));
        }

        let git = GitRunner::new(path);
        let output = git.run(&["rev-parse", "--show-toplevel"]).await?;
        if !output.status.success() {
            return Err(RepositoryError::NotARepository(path.display().to_string()));
        }

        let toplevel = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
        if !same_directory(path, &toplevel).await {
            return Err(RepositoryError::NotARepository(format!(
                "{} (work tree root is {})",
                path.display(),
                toplevel.display()
            )));
        }

        Ok(Self {
            git,
            identity,
            remote,
        })
    }

    async fn status(&self) -> Result<Vec<crate::git::status::StatusEntry>, RepositoryError> {
        let output = self.git.stdout(&["status", "--porcelain", "-z"]).await?;
        Ok(parse_porcelain(&output))
    }

    async fn staged_paths(&self) -> Result<Vec<String>, RepositoryError> {
        let output = self
            .git
            .stdout(&["diff", "--cached", "--name-only", "-z"])
            .await?;
        Ok(output
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn has_head(&self) -> Result<bool, RepositoryError> {
        let output = self.git.run(&["rev-parse", "--verify", "-q", "HEAD"]).await?;
        Ok(output.status.success())
    }

    async fn unstage(&self, paths: &[String]) -> Result<(), RepositoryError> {
        if paths.is_empty() {
            return Ok(());
        }

        let mut args: Vec<&str> = if self.has_head().await? {
            vec!["reset", "-q", "HEAD", "--"]
        } else {
            // Unborn branch: nothing to reset to, drop the paths from the index
            vec!["rm", "--cached", "-q", "-r", "--ignore-unmatch", "--"]
        };
        args.extend(paths.iter().map(String::as_str));

        self.git.run_checked(&args).await?;
        Ok(())
    }

    async fn current_branch(&self) -> Result<String, RepositoryError> {
        let output = self.git.run(&["symbolic-ref", "--short", "-q", "HEAD"]).await?;
        if !output.status.success() {
            return Err(RepositoryError::CommandFailed {
                command: "push".to_string(),
                stderr: "HEAD is detached; no branch to push".to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn push_remote(&self, branch: &str) -> Result<String, RepositoryError> {
        if let Some(remote) = &self.remote {
            return Ok(remote.clone());
        }

        let key = format!("branch.{}.remote", branch);
        let output = self.git.run(&["config", "--get", &key]).await?;
        let configured = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() && !configured.is_empty() {
            Ok(configured)
        } else {
            Ok("origin".to_string())
        }
    }
}

async fn same_directory(a: &Path, b: &Path) -> bool {
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[async_trait]
impl Repository for GitRepository {
    #[instrument(skip(self), fields(path = %self.git.working_dir().display()))]
    async fn has_changes(&self) -> Result<bool, RepositoryError> {
        Ok(!self.status().await?.is_empty())
    }

    #[instrument(skip(self), fields(path = %self.git.working_dir().display()))]
    async fn has_staged_changes(&self) -> Result<bool, RepositoryError> {
        Ok(self.status().await?.iter().any(|e| e.is_staged()))
    }

    /// Staging is not transactional across patterns: an invalid pattern
    /// aborts after the earlier patterns have been applied.
    #[instrument(skip(self), fields(path = %self.git.working_dir().display()))]
    async fn stage(&self, excludes: &[String]) -> Result<(), RepositoryError> {
        self.git.run_checked(&["add", "-A"]).await?;

        for pattern in excludes.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            let matcher = Glob::new(pattern)
                .map_err(|e| RepositoryError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                })?
                .compile_matcher();

            let matched: Vec<String> = self
                .staged_paths()
                .await?
                .into_iter()
                .filter(|p| matcher.is_match(p))
                .collect();

            if !matched.is_empty() {
                debug!(pattern = %pattern, count = matched.len(), "Unstaging excluded paths");
                self.unstage(&matched).await?;
            }
        }

        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.git.working_dir().display()))]
    async fn diff(&self) -> Result<String, RepositoryError> {
        let staged = self.git.stdout(&["diff", "--staged"]).await?;
        if !staged.is_empty() {
            return Ok(staged);
        }
        self.git.stdout(&["diff"]).await
    }

    #[instrument(skip(self, message), fields(path = %self.git.working_dir().display()))]
    async fn commit(&self, message: &str) -> Result<(), RepositoryError> {
        if !self.has_staged_changes().await? {
            return Err(RepositoryError::NothingToCommit);
        }

        let name = format!("user.name={}", self.identity.name);
        let email = format!("user.email={}", self.identity.email);
        let args: [&str; 8] = ["-c", &name, "-c", &email, "commit", "-q", "-m", message];
        let output = self.git.run(&args).await?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stdout.contains("nothing to commit") || stderr.contains("nothing to commit") {
                return Err(RepositoryError::NothingToCommit);
            }
            return Err(command_failed(&["commit"], &output));
        }

        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.git.working_dir().display()))]
    async fn push(&self) -> Result<(), RepositoryError> {
        let branch = self.current_branch().await?;
        let remote = self.push_remote(&branch).await?;
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);

        // Exits zero with "Everything up-to-date" when there is nothing to send
        self.git.run_checked(&["push", &remote, &refspec]).await?;

        info!(remote = %remote, branch = %branch, "Pushed branch");
        Ok(())
    }
}

/// Opens `GitRepository` handles with a shared identity and remote policy
#[derive(Debug, Clone)]
pub struct GitRepositoryOpener {
    identity: CommitIdentity,
    remote: Option<String>,
}

impl GitRepositoryOpener {
    pub fn new(identity: CommitIdentity, remote: Option<String>) -> Self {
        Self { identity, remote }
    }
}

#[async_trait]
impl RepositoryOpener for GitRepositoryOpener {
    async fn open(&self, path: &Path) -> Result<Box<dyn Repository>, RepositoryError> {
        let repo = GitRepository::open(path, self.identity.clone(), self.remote.clone()).await?;
        Ok(Box::new(repo))
    }
}
