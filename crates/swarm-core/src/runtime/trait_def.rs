//! The `AgentRuntime` trait.

use anyhow::Result;
use async_trait::async_trait;

use super::types::{LaunchSpec, MessageStream};

/// Launches one agent and hands back its message stream.
///
/// Implementations classify raw runtime output into [`super::RuntimeMessage`]
/// before yielding it. The stream ends when the runtime signals
/// end-of-stream and cannot be restarted.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Human-readable name (e.g. "claude-code").
    fn name(&self) -> &str;

    /// Start the runtime for `spec`. An `Err` means nothing was launched.
    async fn launch(&self, spec: &LaunchSpec) -> Result<MessageStream>;
}

// Compile-time assertion: AgentRuntime must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn AgentRuntime) {}
};
