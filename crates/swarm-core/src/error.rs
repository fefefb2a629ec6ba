//! Error taxonomy.
//!
//! Run-level failures are [`OrchestrateError`] and abort the request without
//! a report. Agent-level failures never surface as errors: they are recorded
//! on the agent's result with an [`AgentErrorKind`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestrateError {
    #[error("prompt is required")]
    EmptyPrompt,

    #[error("agent count must be between 1 and {max}, got {got}")]
    AgentCountOutOfRange { got: i64, max: usize },

    /// A required setting (the runtime secret) is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The run directory could not be created.
    #[error("failed to create run directory {}", path.display())]
    Provisioning {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OrchestrateError {
    /// True for errors caused by the caller's input rather than the service.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Self::EmptyPrompt | Self::AgentCountOutOfRange { .. }
        )
    }
}

/// Why a single agent ended in `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentErrorKind {
    /// Container daemon unreachable or execution image missing.
    RuntimeUnavailable,
    /// The runtime delivered an error result.
    AgentReported,
    /// Launching or reading the runtime stream failed.
    Protocol,
    /// The stream closed without a terminal result.
    NoTerminalMessage,
    /// The agent task itself died before producing a result.
    TaskAborted,
}
