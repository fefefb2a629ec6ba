//! Workspace provisioner: one run directory, one isolated workspace per agent.
//!
//! Layout under the workspace root:
//!
//! ```text
//! runs/<run_id>/
//!     .git/
//!     README.md            seed commit
//!     .gitignore           ignores worktrees/
//!     worktrees/
//!         agent-1/         worktree on branch agent-1 (or a plain directory)
//!         agent-2/
//! ```
//!
//! Only run-directory creation is fatal. Git trouble degrades the run to
//! plain directories, and a single failed worktree degrades only that agent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::SwarmConfig;
use crate::error::OrchestrateError;
use crate::worktree::GitRepo;

/// Directory under the workspace root that holds all runs.
pub const RUNS_DIR: &str = "runs";
/// Directory under a run that holds per-agent workspaces.
pub const WORKTREES_DIR: &str = "worktrees";

/// How an agent's workspace is isolated from its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkspaceIsolation {
    /// A git worktree checked out on the agent's own branch.
    Worktree,
    /// A plain directory, because version control was unavailable for the
    /// run or the worktree could not be created.
    PlainDirectory { reason: String },
}

impl WorkspaceIsolation {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::PlainDirectory { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentWorkspace {
    /// 1-based, unique within the run.
    pub agent_id: usize,
    /// Relative to the run directory.
    pub worktree_path: PathBuf,
    pub branch_name: String,
    /// Absolute path of the workspace as the container runtime sees it.
    pub host_mount_path: PathBuf,
    pub isolation: WorkspaceIsolation,
}

impl AgentWorkspace {
    pub fn branch_for(agent_id: usize) -> String {
        format!("agent-{agent_id}")
    }

    pub fn relative_path_for(agent_id: usize) -> PathBuf {
        Path::new(WORKTREES_DIR).join(Self::branch_for(agent_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    /// Relative to the workspace root.
    pub run_dir: PathBuf,
    pub vcs_initialized: bool,
    /// Why version control is unavailable for this run, when it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs_error: Option<String>,
    pub agent_workspaces: Vec<AgentWorkspace>,
}

/// Creates run directories and agent workspaces.
#[derive(Debug, Clone)]
pub struct WorkspaceProvisioner {
    config: Arc<SwarmConfig>,
}

impl WorkspaceProvisioner {
    pub fn new(config: Arc<SwarmConfig>) -> Self {
        Self { config }
    }

    /// Absolute path of `run`'s directory as seen by this process.
    pub fn run_path(&self, run: &Run) -> PathBuf {
        self.config.local_path(&run.run_dir)
    }

    /// Absolute path of an agent's workspace as seen by this process.
    pub fn workspace_path(&self, run: &Run, workspace: &AgentWorkspace) -> PathBuf {
        self.run_path(run).join(&workspace.worktree_path)
    }

    /// Provision a run with `agent_count` isolated workspaces.
    pub async fn provision(&self, agent_count: usize) -> Result<Run, OrchestrateError> {
        let run_id = generate_run_id();
        let run_dir = Path::new(RUNS_DIR).join(&run_id);
        let run_path = self.config.local_path(&run_dir);

        create_run_dir(&run_path)?;
        tracing::info!(run_id = %run_id, path = %run_path.display(), "created run directory");

        let repo = GitRepo::new(
            self.config.git_binary.clone(),
            run_path.clone(),
            self.config.vcs_timeout,
        );
        let readme = format!("# swarm run {run_id}\n\nEach agent works on its own branch.\n");
        let gitignore = format!("{WORKTREES_DIR}/\n");

        let vcs_error = match repo
            .init_with_seed(&[("README.md", &readme), (".gitignore", &gitignore)])
            .await
        {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    run_id = %run_id,
                    error = %e,
                    "version control unavailable, agents get plain directories"
                );
                Some(e.to_string())
            }
        };
        let vcs_initialized = vcs_error.is_none();

        let mut agent_workspaces = Vec::with_capacity(agent_count);
        for agent_id in 1..=agent_count {
            let worktree_path = AgentWorkspace::relative_path_for(agent_id);
            let branch_name = AgentWorkspace::branch_for(agent_id);
            let local = run_path.join(&worktree_path);

            let isolation = match &vcs_error {
                None => match repo.add_worktree(&branch_name, &local).await {
                    Ok(()) => WorkspaceIsolation::Worktree,
                    Err(e) => {
                        tracing::warn!(
                            run_id = %run_id,
                            agent_id,
                            error = %e,
                            "worktree creation failed, falling back to plain directory"
                        );
                        // A failed `worktree add` may leave a half-populated
                        // directory behind.
                        let _ = std::fs::remove_dir_all(&local);
                        create_plain_dir(&local)?;
                        WorkspaceIsolation::PlainDirectory {
                            reason: e.to_string(),
                        }
                    }
                },
                Some(reason) => {
                    create_plain_dir(&local)?;
                    WorkspaceIsolation::PlainDirectory {
                        reason: reason.clone(),
                    }
                }
            };

            agent_workspaces.push(AgentWorkspace {
                agent_id,
                host_mount_path: self.config.host_path(&run_dir.join(&worktree_path)),
                worktree_path,
                branch_name,
                isolation,
            });
        }

        tracing::info!(
            run_id = %run_id,
            agents = agent_count,
            vcs_initialized,
            "run provisioned"
        );

        Ok(Run {
            run_id,
            run_dir,
            vcs_initialized,
            vcs_error,
            agent_workspaces,
        })
    }
}

/// `YYYYMMDD-HHMMSS-<8 hex>` in UTC.
pub fn generate_run_id() -> String {
    let mut suffix = [0u8; 4];
    rand::rng().fill(&mut suffix);
    format!(
        "{}-{}",
        chrono::Utc::now().format("%Y%m%d-%H%M%S"),
        hex::encode(suffix)
    )
}

fn create_run_dir(path: &Path) -> Result<(), OrchestrateError> {
    let provisioning = |source| OrchestrateError::Provisioning {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(provisioning)?;
    }
    // `create_dir`, not `create_dir_all`: an existing directory means a
    // run id collision and must not be reused.
    std::fs::create_dir(path).map_err(provisioning)
}

fn create_plain_dir(path: &Path) -> Result<(), OrchestrateError> {
    std::fs::create_dir_all(path).map_err(|source| OrchestrateError::Provisioning {
        path: path.to_path_buf(),
        source,
    })
}
