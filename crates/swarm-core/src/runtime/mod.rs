//! Agent runtime boundary.
//!
//! The runtime is a black box that takes one prompt plus a [`LaunchSpec`]
//! and answers with a finite, one-shot stream of [`RuntimeMessage`]s.
//!
//! ```text
//! AgentRunner
//!     |
//!     |   launch(spec) ----> Arc<dyn AgentRuntime>
//!     |                          |
//!     |   MessageStream <--------+
//!     v
//! Success | Error | Other(..) ... end-of-stream
//! ```

pub mod claude_code;
pub mod trait_def;
pub mod types;

pub use claude_code::ClaudeCodeRuntime;
pub use trait_def::AgentRuntime;
pub use types::{BindMount, LaunchSpec, MessageStream, RuntimeMessage};
