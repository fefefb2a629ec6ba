//! Types that cross the runtime boundary.

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;

use futures::Stream;
use secrecy::SecretString;
use serde_json::Value;

/// A host directory exposed inside the execution container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub host_path: PathBuf,
    pub container_path: PathBuf,
}

impl BindMount {
    /// `-v` argument value.
    pub fn to_volume_arg(&self) -> String {
        format!(
            "{}:{}",
            self.host_path.display(),
            self.container_path.display()
        )
    }
}

/// Everything needed to start one agent.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub agent_id: usize,
    pub prompt: String,
    pub mount: BindMount,
    pub image: String,
    /// Tools the agent may call.
    pub allowed_tools: Vec<String>,
    /// Secrets exported into the runtime's process environment. Never put
    /// on a command line or into the prompt.
    pub env: HashMap<String, SecretString>,
}

/// One message from the runtime, classified at the stream boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeMessage {
    /// Terminal result reporting success.
    Success { result: String },
    /// Terminal result reporting failure.
    Error { result: String },
    /// Anything else, kept verbatim.
    Other(Value),
}

pub type MessageStream = Pin<Box<dyn Stream<Item = anyhow::Result<RuntimeMessage>> + Send>>;

impl RuntimeMessage {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Classify one line of stream-json output. Lines that are not JSON are
    /// kept as opaque strings.
    pub fn from_line(line: &str) -> Self {
        match serde_json::from_str::<Value>(line) {
            Ok(v) => Self::from_json(v),
            Err(_) => Self::Other(Value::String(line.to_string())),
        }
    }

    /// Classify a decoded message. Only `{"type": "result"}` objects with a
    /// success or error subtype are terminal.
    pub fn from_json(v: Value) -> Self {
        if v.get("type").and_then(Value::as_str) != Some("result") {
            return Self::Other(v);
        }

        let subtype = v.get("subtype").and_then(Value::as_str).unwrap_or("");
        let is_error = v.get("is_error").and_then(Value::as_bool).unwrap_or(false);

        if subtype == "success" && !is_error {
            let result = v
                .get("result")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Self::Success { result };
        }

        if subtype == "success" || subtype == "error" || subtype.starts_with("error_") || is_error {
            return Self::Error {
                result: error_text(&v, subtype),
            };
        }

        Self::Other(v)
    }
}

fn error_text(v: &Value, subtype: &str) -> String {
    if let Some(text) = v.get("result").and_then(Value::as_str) {
        if !text.is_empty() {
            return text.to_string();
        }
    }
    if let Some(errors) = v.get("errors").and_then(Value::as_array) {
        let joined = errors
            .iter()
            .map(|e| e.as_str().map_or_else(|| e.to_string(), str::to_string))
            .collect::<Vec<_>>()
            .join("; ");
        if !joined.is_empty() {
            return joined;
        }
    }
    if subtype.is_empty() {
        "agent reported an error".to_string()
    } else {
        subtype.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_result_is_terminal() {
        let msg = RuntimeMessage::from_line(
            r#"{"type":"result","subtype":"success","is_error":false,"result":"All done."}"#,
        );
        assert_eq!(
            msg,
            RuntimeMessage::Success {
                result: "All done.".to_string()
            }
        );
        assert!(msg.is_terminal());
    }

    #[test]
    fn error_result_is_terminal() {
        let msg =
            RuntimeMessage::from_line(r#"{"type":"result","subtype":"error","result":"boom"}"#);
        assert_eq!(
            msg,
            RuntimeMessage::Error {
                result: "boom".to_string()
            }
        );
    }

    #[test]
    fn error_subtypes_without_result_use_subtype() {
        let msg = RuntimeMessage::from_json(json!({
            "type": "result",
            "subtype": "error_max_turns",
            "is_error": true,
        }));
        assert_eq!(
            msg,
            RuntimeMessage::Error {
                result: "error_max_turns".to_string()
            }
        );
    }

    #[test]
    fn error_list_is_joined() {
        let msg = RuntimeMessage::from_json(json!({
            "type": "result",
            "subtype": "error_during_execution",
            "errors": ["first", "second"],
        }));
        assert_eq!(
            msg,
            RuntimeMessage::Error {
                result: "first; second".to_string()
            }
        );
    }

    #[test]
    fn success_flagged_as_error_is_error() {
        let msg = RuntimeMessage::from_json(json!({
            "type": "result",
            "subtype": "success",
            "is_error": true,
            "result": "API Error: 401",
        }));
        assert_eq!(
            msg,
            RuntimeMessage::Error {
                result: "API Error: 401".to_string()
            }
        );
    }

    #[test]
    fn non_result_messages_are_other() {
        let v = json!({"type": "assistant", "message": {"content": []}});
        assert_eq!(RuntimeMessage::from_json(v.clone()), RuntimeMessage::Other(v));

        let unknown = json!({"type": "result", "subtype": "partial"});
        assert!(!RuntimeMessage::from_json(unknown).is_terminal());
    }

    #[test]
    fn non_json_line_is_kept_verbatim() {
        assert_eq!(
            RuntimeMessage::from_line("warming up..."),
            RuntimeMessage::Other(Value::String("warming up...".to_string()))
        );
    }

    #[test]
    fn volume_arg() {
        let mount = BindMount {
            host_path: PathBuf::from("/srv/runs/r/worktrees/agent-1"),
            container_path: PathBuf::from("/workspace"),
        };
        assert_eq!(mount.to_volume_arg(), "/srv/runs/r/worktrees/agent-1:/workspace");
    }
}
