//! Run orchestration core for swarm.
//!
//! One prompt fans out to N agents. Each agent gets its own branch-scoped
//! workspace inside a shared run directory, runs against an external
//! message-streaming agent runtime, and reduces that stream to a terminal
//! [`runner::AgentResult`]. The [`orchestrator::Orchestrator`] merges the
//! results into one [`orchestrator::RunReport`].

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod probe;
pub mod process;
pub mod prompt;
pub mod runner;
pub mod runtime;
pub mod workspace;
pub mod worktree;

pub use config::SwarmConfig;
pub use error::{AgentErrorKind, OrchestrateError};
pub use orchestrator::{Orchestrator, RunReport, RunSummary};
