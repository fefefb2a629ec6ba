//! Run orchestrator: validate, provision once, fan out N agent runners,
//! merge their results into one [`RunReport`].
//!
//! Once provisioning succeeds the orchestrator always returns a report. An
//! agent task that dies is recorded as that agent's `Error` result.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{API_KEY_ENV, SwarmConfig};
use crate::error::OrchestrateError;
use crate::probe::EnvironmentProbe;
use crate::prompt::augment_prompt;
use crate::runner::{AgentResult, AgentRunner, AgentStatus};
use crate::runtime::AgentRuntime;
use crate::workspace::{Run, WorkspaceProvisioner};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_results(results: &[AgentResult]) -> Self {
        let successful = results
            .iter()
            .filter(|r| r.status == AgentStatus::Success)
            .count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run: Run,
    /// Ordered by `agent_id`.
    pub results: Vec<AgentResult>,
    pub summary: RunSummary,
}

/// Check a request before anything touches the filesystem. Returns the
/// agent count as a `usize`.
pub fn validate_request(
    prompt: &str,
    agent_count: i64,
    max_agents: usize,
) -> Result<usize, OrchestrateError> {
    if prompt.trim().is_empty() {
        return Err(OrchestrateError::EmptyPrompt);
    }
    match usize::try_from(agent_count) {
        Ok(n) if (1..=max_agents).contains(&n) => Ok(n),
        _ => Err(OrchestrateError::AgentCountOutOfRange {
            got: agent_count,
            max: max_agents,
        }),
    }
}

pub struct Orchestrator {
    config: Arc<SwarmConfig>,
    provisioner: WorkspaceProvisioner,
    runner: AgentRunner,
}

impl Orchestrator {
    pub fn new(
        config: Arc<SwarmConfig>,
        probe: Arc<dyn EnvironmentProbe>,
        runtime: Arc<dyn AgentRuntime>,
    ) -> Self {
        Self {
            provisioner: WorkspaceProvisioner::new(config.clone()),
            runner: AgentRunner::new(config.clone(), probe, runtime),
            config,
        }
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    pub async fn orchestrate(
        &self,
        prompt: &str,
        agent_count: usize,
    ) -> Result<RunReport, OrchestrateError> {
        let requested = i64::try_from(agent_count).unwrap_or(i64::MAX);
        let agent_count = validate_request(prompt, requested, self.config.max_agents)?;

        if self.config.api_key.is_none() {
            return Err(OrchestrateError::Configuration(format!(
                "{API_KEY_ENV} is not set"
            )));
        }

        let run = self.provisioner.provision(agent_count).await?;
        tracing::info!(
            run_id = %run.run_id,
            agent_count,
            vcs_initialized = run.vcs_initialized,
            prompt = %preview(prompt),
            "run provisioned, launching agents"
        );

        let mut handles = Vec::with_capacity(agent_count);
        for workspace in &run.agent_workspaces {
            let augmented = augment_prompt(prompt, workspace, &self.config.container_workdir);
            let runner = self.runner.clone();
            let workspace = workspace.clone();
            handles.push(tokio::spawn(async move {
                runner.run(augmented, workspace).await
            }));
        }

        let joined = futures::future::join_all(handles).await;
        let mut results: Vec<AgentResult> = joined
            .into_iter()
            .zip(&run.agent_workspaces)
            .map(|(joined, workspace)| match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(
                        run_id = %run.run_id,
                        agent_id = workspace.agent_id,
                        error = %e,
                        "agent task aborted"
                    );
                    AgentResult::aborted(workspace.clone(), format!("agent task aborted: {e}"))
                }
            })
            .collect();
        results.sort_by_key(|r| r.agent_id);

        let summary = RunSummary::from_results(&results);
        tracing::info!(
            run_id = %run.run_id,
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            "run completed"
        );

        Ok(RunReport {
            run,
            results,
            summary,
        })
    }
}

/// First 50 characters of a prompt, for logs.
fn preview(prompt: &str) -> String {
    let mut chars = prompt.chars();
    let head: String = chars.by_ref().take(50).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
