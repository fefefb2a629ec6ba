//! Agent runner: one agent, one launch, one terminal [`AgentResult`].
//!
//! ```text
//! Pending --(success result)--> Success
//!    |
//!    +----(error result | probe refused | launch/stream failure
//!          | stream closed early)---------------------------> Error
//! ```
//!
//! Nothing in here returns an error to the caller. Every failure is folded
//! into the result so sibling agents never observe it.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::{API_KEY_ENV, SwarmConfig};
use crate::error::AgentErrorKind;
use crate::probe::EnvironmentProbe;
use crate::runtime::claude_code::default_allowed_tools;
use crate::runtime::{AgentRuntime, BindMount, LaunchSpec, RuntimeMessage};
use crate::workspace::AgentWorkspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Success,
    Error,
}

impl AgentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_id: usize,
    pub status: AgentStatus,
    pub output: String,
    /// Non-terminal runtime messages, in arrival order.
    pub messages: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<AgentErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<Value>,
    #[serde(rename = "workspace_ref")]
    pub workspace: AgentWorkspace,
}

impl AgentResult {
    pub fn pending(workspace: AgentWorkspace) -> Self {
        Self {
            agent_id: workspace.agent_id,
            status: AgentStatus::Pending,
            output: String::new(),
            messages: Vec::new(),
            error: None,
            error_kind: None,
            error_detail: None,
            workspace,
        }
    }

    /// Result for an agent whose task died before it could report.
    pub fn aborted(workspace: AgentWorkspace, message: impl Into<String>) -> Self {
        let mut result = Self::pending(workspace);
        result.fail(AgentErrorKind::TaskAborted, message, None);
        result
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// No-op once terminal.
    pub(crate) fn succeed(&mut self, output: String) {
        if self.is_terminal() {
            return;
        }
        self.status = AgentStatus::Success;
        self.output = output;
    }

    /// No-op once terminal.
    pub(crate) fn fail(
        &mut self,
        kind: AgentErrorKind,
        message: impl Into<String>,
        detail: Option<Value>,
    ) {
        if self.is_terminal() {
            return;
        }
        self.status = AgentStatus::Error;
        self.error = Some(message.into());
        self.error_kind = Some(kind);
        self.error_detail = detail;
    }
}

/// Runs single agents against a shared probe and runtime.
#[derive(Clone)]
pub struct AgentRunner {
    config: Arc<SwarmConfig>,
    probe: Arc<dyn EnvironmentProbe>,
    runtime: Arc<dyn AgentRuntime>,
}

impl AgentRunner {
    pub fn new(
        config: Arc<SwarmConfig>,
        probe: Arc<dyn EnvironmentProbe>,
        runtime: Arc<dyn AgentRuntime>,
    ) -> Self {
        Self {
            config,
            probe,
            runtime,
        }
    }

    pub fn launch_spec(&self, prompt: String, workspace: &AgentWorkspace) -> LaunchSpec {
        let mut env: HashMap<String, SecretString> = HashMap::new();
        if let Some(key) = &self.config.api_key {
            env.insert(API_KEY_ENV.to_string(), key.clone());
        }

        LaunchSpec {
            agent_id: workspace.agent_id,
            prompt,
            mount: BindMount {
                host_path: workspace.host_mount_path.clone(),
                container_path: self.config.container_workdir.clone(),
            },
            image: self.config.mcp_image.clone(),
            allowed_tools: default_allowed_tools(),
            env,
        }
    }

    pub async fn run(&self, prompt: String, workspace: AgentWorkspace) -> AgentResult {
        let agent_id = workspace.agent_id;
        let mut result = AgentResult::pending(workspace);

        let status = self.probe.probe().await;
        if let Some(reason) = status.unavailable_reason() {
            warn!(agent_id, %reason, "refusing to launch agent");
            let detail = serde_json::to_value(&status).ok();
            result.fail(AgentErrorKind::RuntimeUnavailable, reason, detail);
            return result;
        }

        let spec = self.launch_spec(prompt, &result.workspace);
        info!(
            agent_id,
            runtime = self.runtime.name(),
            mount = %spec.mount.to_volume_arg(),
            "launching agent"
        );

        let mut stream = match self.runtime.launch(&spec).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(agent_id, error = %e, "agent launch failed");
                result.fail(
                    AgentErrorKind::Protocol,
                    format!("failed to launch agent runtime: {e}"),
                    Some(json!({ "stage": "launch", "error": format!("{e:#}") })),
                );
                return result;
            }
        };

        while let Some(item) = stream.next().await {
            match item {
                Ok(RuntimeMessage::Success { result: output }) => {
                    info!(agent_id, "agent reported success");
                    result.succeed(output);
                    break;
                }
                Ok(RuntimeMessage::Error { result: message }) => {
                    warn!(agent_id, error = %message, "agent reported an error");
                    result.fail(AgentErrorKind::AgentReported, message, None);
                    break;
                }
                Ok(RuntimeMessage::Other(value)) => {
                    let message_type = value
                        .get("type")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("opaque");
                    debug!(agent_id, message_type, "runtime message");
                    result.messages.push(value);
                }
                Err(e) => {
                    warn!(agent_id, error = %e, "agent stream failed");
                    let detail = json!({
                        "stage": "stream",
                        "error": format!("{e:#}"),
                        "messages_received": result.messages.len(),
                    });
                    result.fail(
                        AgentErrorKind::Protocol,
                        format!("agent stream failed: {e}"),
                        Some(detail),
                    );
                    break;
                }
            }
        }

        if !result.is_terminal() {
            let detail = json!({ "messages_received": result.messages.len() });
            result.fail(
                AgentErrorKind::NoTerminalMessage,
                "agent stream ended without a result message",
                Some(detail),
            );
        }

        info!(
            agent_id,
            status = ?result.status,
            messages = result.messages.len(),
            "agent finished"
        );
        result
    }
}
