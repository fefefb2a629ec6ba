//! Git boundary for run workspaces.
//!
//! A run directory is a fresh repository. Each agent gets a branch and a
//! worktree checked out on it, so agents never share a working directory
//! and every agent's contribution is a separately diffable branch.
//!
//! All commands run through [`run_bounded`]; a command that exceeds the
//! configured timeout counts as a failed step.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::process::{CommandError, run_bounded};

/// Name and email used for the seed commit.
pub const COMMIT_IDENTITY: (&str, &str) = ("swarm", "swarm@localhost");

#[derive(Debug, Error)]
pub enum VcsError {
    /// The git executable could not be run, or did not finish in time.
    #[error("git {command}: {source}")]
    Command {
        command: String,
        #[source]
        source: CommandError,
    },

    /// A git command exited with a non-zero status.
    #[error("git {command} failed (exit {code}): {stderr}")]
    Exit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A repository rooted at one run directory.
#[derive(Debug, Clone)]
pub struct GitRepo {
    git_binary: String,
    repo_path: PathBuf,
    timeout: Duration,
}

impl GitRepo {
    pub fn new(
        git_binary: impl Into<String>,
        repo_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            git_binary: git_binary.into(),
            repo_path: repo_path.into(),
            timeout,
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Initialise the repository with a fixed identity and a seed commit.
    ///
    /// `seed_files` are written relative to the repo root before the commit.
    /// Stops at the first failing step.
    pub async fn init_with_seed(&self, seed_files: &[(&str, &str)]) -> Result<(), VcsError> {
        self.git(["init"]).await?;
        self.git(["config", "user.name", COMMIT_IDENTITY.0]).await?;
        self.git(["config", "user.email", COMMIT_IDENTITY.1]).await?;

        for (name, contents) in seed_files {
            let path = self.repo_path.join(name);
            std::fs::write(&path, contents).map_err(|source| VcsError::Io { path, source })?;
        }

        self.git(["add", "."]).await?;
        self.git(["commit", "-m", "Initialize run workspace"]).await?;
        Ok(())
    }

    /// Create `branch_name` at HEAD and check it out into a new worktree at
    /// `worktree_path`.
    pub async fn add_worktree(
        &self,
        branch_name: &str,
        worktree_path: &Path,
    ) -> Result<(), VcsError> {
        self.git(["branch", branch_name]).await?;

        let args: Vec<OsString> = vec![
            "worktree".into(),
            "add".into(),
            worktree_path.as_os_str().to_os_string(),
            branch_name.into(),
        ];
        self.git(args).await?;
        Ok(())
    }

    /// Branch currently checked out at `path`, if any.
    pub async fn current_branch(&self, path: &Path) -> Result<String, VcsError> {
        let out = self
            .git_in(path, ["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;
        Ok(out.trim().to_string())
    }

    async fn git<I, S>(&self, args: I) -> Result<String, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let repo_path = self.repo_path.clone();
        self.git_in(&repo_path, args).await
    }

    async fn git_in<I, S>(&self, dir: &Path, args: I) -> Result<String, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let command = args
            .iter()
            .take(2)
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");

        let output = run_bounded(&self.git_binary, &args, Some(dir), self.timeout)
            .await
            .map_err(|source| VcsError::Command {
                command: command.clone(),
                source,
            })?;

        if !output.success() {
            return Err(VcsError::Exit {
                command,
                code: output.exit_code.unwrap_or(-1),
                stderr: output.stderr.trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}
