//! Environment prober: preflight checks for the container runtime.
//!
//! Each check is independent and best-effort. A failing check adds a line
//! to [`EnvironmentStatus::errors`] and the remaining checks still run, so
//! a probe always returns a complete status.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SwarmConfig;
use crate::process::{find_executable, run_bounded};

/// Outcome of one probe. Field names match the diagnostics payload shipped
/// in agent error details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentStatus {
    #[serde(rename = "docker_cli_available")]
    pub runtime_cli_present: bool,
    #[serde(rename = "docker_socket_exists")]
    pub runtime_socket_present: bool,
    #[serde(rename = "docker_daemon_running")]
    pub runtime_daemon_reachable: bool,
    #[serde(rename = "mcp_image_exists")]
    pub required_image_present: bool,
    pub errors: Vec<String>,
}

impl EnvironmentStatus {
    /// An agent can only be launched when the daemon answers and the image
    /// is present locally.
    pub fn ready_for_launch(&self) -> bool {
        self.runtime_daemon_reachable && self.required_image_present
    }

    /// Short reason for refusing a launch, if any.
    pub fn unavailable_reason(&self) -> Option<String> {
        if !self.runtime_daemon_reachable {
            Some("container daemon is not reachable".to_string())
        } else if !self.required_image_present {
            Some("required execution image is not present".to_string())
        } else {
            None
        }
    }
}

/// Source of environment diagnostics. Called once per agent launch.
#[async_trait]
pub trait EnvironmentProbe: Send + Sync {
    async fn probe(&self) -> EnvironmentStatus;
}

/// Probes a Docker-compatible CLI.
#[derive(Debug, Clone)]
pub struct DockerProbe {
    docker_binary: String,
    socket_path: PathBuf,
    image: String,
    timeout: Duration,
}

impl DockerProbe {
    pub fn new(config: &SwarmConfig) -> Self {
        Self {
            docker_binary: config.docker_binary.clone(),
            socket_path: config.docker_socket.clone(),
            image: config.mcp_image.clone(),
            timeout: config.probe_timeout,
        }
    }

    pub fn shared(config: &SwarmConfig) -> Arc<dyn EnvironmentProbe> {
        Arc::new(Self::new(config))
    }

    async fn daemon_reachable(&self, errors: &mut Vec<String>) -> bool {
        match run_bounded(&self.docker_binary, ["info"], None, self.timeout).await {
            Ok(out) if out.success() => true,
            Ok(out) => {
                errors.push(format!(
                    "docker info failed (exit {}): {}",
                    exit_label(out.exit_code),
                    out.stderr.trim()
                ));
                false
            }
            Err(e) => {
                errors.push(format!("docker info failed: {e}"));
                false
            }
        }
    }

    async fn image_present(&self, errors: &mut Vec<String>) -> bool {
        match run_bounded(
            &self.docker_binary,
            ["images", "-q", self.image.as_str()],
            None,
            self.timeout,
        )
        .await
        {
            Ok(out) if out.success() => {
                if out.stdout.trim().is_empty() {
                    errors.push(format!("image {} not found", self.image));
                    false
                } else {
                    true
                }
            }
            Ok(out) => {
                errors.push(format!(
                    "docker images failed (exit {}): {}",
                    exit_label(out.exit_code),
                    out.stderr.trim()
                ));
                false
            }
            Err(e) => {
                errors.push(format!("docker images failed: {e}"));
                false
            }
        }
    }
}

#[async_trait]
impl EnvironmentProbe for DockerProbe {
    async fn probe(&self) -> EnvironmentStatus {
        let mut status = EnvironmentStatus::default();

        status.runtime_cli_present = find_executable(&self.docker_binary).is_some();
        if !status.runtime_cli_present {
            status
                .errors
                .push(format!("{} not found on PATH", self.docker_binary));
        }

        status.runtime_socket_present = self.socket_path.exists();
        if !status.runtime_socket_present {
            status.errors.push(format!(
                "docker socket not found at {}",
                self.socket_path.display()
            ));
        }

        status.runtime_daemon_reachable = self.daemon_reachable(&mut status.errors).await;

        if status.runtime_daemon_reachable {
            status.required_image_present = self.image_present(&mut status.errors).await;
        }

        if !status.errors.is_empty() {
            tracing::warn!(errors = ?status.errors, "environment probe reported problems");
        }
        status
    }
}

fn exit_label(code: Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}
