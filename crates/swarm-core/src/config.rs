//! Immutable orchestrator configuration.
//!
//! Built once at process start (see the CLI's resolution chain) and handed
//! to each component as `Arc<SwarmConfig>`. Nothing in the core reads the
//! process environment on its own.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

/// Upper bound on agents per run.
pub const MAX_AGENTS: usize = 10;

/// Environment variable name the runtime secret is exported under.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Secret forwarded to the agent runtime through its environment.
    pub api_key: Option<SecretString>,
    /// Root under which run directories are created, as seen by this process.
    pub workspace_root: PathBuf,
    /// The same root as seen by the container runtime. Differs from
    /// `workspace_root` when the orchestrator itself runs in a container and
    /// launches agents through a peer daemon.
    pub host_workspace_root: PathBuf,
    /// Execution image that serves the agent's tools.
    pub mcp_image: String,
    /// Mount point of the agent workspace inside the execution container.
    pub container_workdir: PathBuf,
    pub docker_binary: String,
    pub docker_socket: PathBuf,
    pub git_binary: String,
    pub claude_binary: String,
    /// Bound on each probe command.
    pub probe_timeout: Duration,
    /// Bound on each version-control command.
    pub vcs_timeout: Duration,
    pub max_agents: usize,
}

impl SwarmConfig {
    pub const DEFAULT_IMAGE: &str = "claude-mcp:latest";
    pub const DEFAULT_WORKSPACE: &str = "/workspace";
    pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

    /// Defaults rooted at `workspace_root`, with the host root equal to it.
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        let workspace_root = workspace_root.into();
        Self {
            api_key: None,
            host_workspace_root: workspace_root.clone(),
            workspace_root,
            mcp_image: Self::DEFAULT_IMAGE.to_string(),
            container_workdir: PathBuf::from(Self::DEFAULT_WORKSPACE),
            docker_binary: "docker".to_string(),
            docker_socket: PathBuf::from(Self::DEFAULT_DOCKER_SOCKET),
            git_binary: "git".to_string(),
            claude_binary: "claude".to_string(),
            probe_timeout: Duration::from_secs(10),
            vcs_timeout: Duration::from_secs(30),
            max_agents: MAX_AGENTS,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_host_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.host_workspace_root = root.into();
        self
    }

    /// Absolute path of `relative` under the process-visible workspace root.
    pub fn local_path(&self, relative: &Path) -> PathBuf {
        self.workspace_root.join(relative)
    }

    /// Absolute path of `relative` under the host-visible workspace root.
    pub fn host_path(&self, relative: &Path) -> PathBuf {
        self.host_workspace_root.join(relative)
    }
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WORKSPACE)
    }
}
