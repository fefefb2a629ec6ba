//! Claude Code runtime adapter.
//!
//! Runs `claude -p --output-format stream-json` with a single MCP stdio
//! server that executes inside the execution image:
//!
//! ```text
//! claude -p ... --mcp-config '{"mcpServers":{"claude-code-docker":{...}}}'
//!     `-- docker run -i --rm -v <host_mount>:/workspace -e ANTHROPIC_API_KEY \
//!             <image> claude mcp serve
//! ```
//!
//! The prompt goes in on stdin and secrets go in through the environment,
//! so neither appears in any process's argument list.

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::trait_def::AgentRuntime;
use super::types::{LaunchSpec, MessageStream, RuntimeMessage};
use crate::config::SwarmConfig;

/// MCP server name; tool names are namespaced under it.
pub const MCP_SERVER_NAME: &str = "claude-code-docker";

/// Lines of stderr kept for diagnostics when `claude` fails.
const STDERR_TAIL_LINES: usize = 20;

/// Allowlist granting every tool of the execution container and nothing else.
pub fn default_allowed_tools() -> Vec<String> {
    vec![format!("mcp__{MCP_SERVER_NAME}__*")]
}

#[derive(Debug, Clone)]
pub struct ClaudeCodeRuntime {
    /// Path to the `claude` binary. Defaults to `"claude"` (found via `$PATH`).
    claude_binary: String,
    /// Container CLI the MCP server is started with.
    docker_binary: String,
}

impl ClaudeCodeRuntime {
    pub fn new(config: &SwarmConfig) -> Self {
        Self {
            claude_binary: config.claude_binary.clone(),
            docker_binary: config.docker_binary.clone(),
        }
    }

    /// Adapter with a custom `claude` binary and the default container CLI.
    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            claude_binary: path.into(),
            docker_binary: "docker".to_string(),
        }
    }

    /// MCP configuration for one launch. Environment variables are named
    /// with `-e NAME` only, so their values are inherited, not inlined.
    pub fn mcp_config(&self, spec: &LaunchSpec) -> serde_json::Value {
        let mut args = vec![
            "run".to_string(),
            "-i".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            spec.mount.to_volume_arg(),
        ];

        let mut env_names: Vec<&String> = spec.env.keys().collect();
        env_names.sort();
        for name in env_names {
            args.push("-e".to_string());
            args.push(name.clone());
        }

        args.push(spec.image.clone());
        args.extend(["claude", "mcp", "serve"].map(String::from));

        json!({
            "mcpServers": {
                MCP_SERVER_NAME: {
                    "type": "stdio",
                    "command": self.docker_binary,
                    "args": args,
                }
            }
        })
    }

    fn command(&self, spec: &LaunchSpec) -> Command {
        let mut cmd = Command::new(&self.claude_binary);
        cmd.arg("-p")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .arg("--mcp-config")
            .arg(self.mcp_config(spec).to_string())
            .arg("--allowedTools")
            .arg(spec.allowed_tools.join(","));

        for (key, value) in &spec.env {
            cmd.env(key, value.expose_secret());
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }
}

#[async_trait]
impl AgentRuntime for ClaudeCodeRuntime {
    fn name(&self) -> &str {
        "claude-code"
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<MessageStream> {
        let mut child = self.command(spec).spawn().with_context(|| {
            format!(
                "failed to spawn claude binary at '{}' -- is it installed and on PATH?",
                self.claude_binary
            )
        })?;
        let pid = child.id().unwrap_or_default();
        let agent_id = spec.agent_id;

        // Print mode reads the whole prompt from stdin; closing it starts the run.
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(spec.prompt.as_bytes()).await {
                warn!(agent_id, pid, error = %e, "failed to write prompt to claude stdin");
            }
            drop(stdin);
        }

        let stdout = child
            .stdout
            .take()
            .context("claude stdout was not captured")?;
        let stderr = child
            .stderr
            .take()
            .context("claude stderr was not captured")?;

        // Drained concurrently so a chatty stderr cannot stall stdout.
        let stderr_tail = tokio::spawn(async move {
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        });

        let stream = async_stream::stream! {
            let mut lines = BufReader::new(stdout).lines();
            let mut saw_terminal = false;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        let message = RuntimeMessage::from_line(trimmed);
                        saw_terminal |= message.is_terminal();
                        yield Ok(message);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(agent_id, pid, error = %e, "error reading claude stdout");
                        terminate(&mut child).await;
                        yield Err(anyhow::Error::new(e).context("failed to read claude output"));
                        return;
                    }
                }
            }

            match child.wait().await {
                Ok(status) if status.success() || saw_terminal => {
                    debug!(agent_id, pid, %status, "claude exited");
                }
                Ok(status) => {
                    let tail = stderr_tail.await.unwrap_or_default();
                    warn!(
                        agent_id,
                        pid,
                        %status,
                        stderr = %tail,
                        "claude exited without a result"
                    );
                    yield Err(anyhow::anyhow!(
                        "claude exited with {status}: {}",
                        tail.trim()
                    ));
                }
                Err(e) => warn!(agent_id, pid, error = %e, "failed to reap claude process"),
            }
        };

        Ok(Box::pin(stream))
    }
}

/// SIGTERM, a short grace period, then SIGKILL.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: pid belongs to a child we spawned and have not reaped.
        let ret = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if ret != 0 {
            warn!(pid, "SIGTERM failed, proceeding to SIGKILL");
        }
    }

    match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
        Ok(Ok(_)) => {}
        _ => {
            let _ = child.kill().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::types::BindMount;
    use futures::StreamExt;
    use secrecy::SecretString;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    fn spec(prompt: &str) -> LaunchSpec {
        LaunchSpec {
            agent_id: 7,
            prompt: prompt.to_string(),
            mount: BindMount {
                host_path: PathBuf::from("/srv/runs/r1/worktrees/agent-7"),
                container_path: PathBuf::from("/workspace"),
            },
            image: "claude-mcp:latest".to_string(),
            allowed_tools: default_allowed_tools(),
            env: HashMap::from([(
                "ANTHROPIC_API_KEY".to_string(),
                SecretString::from("sk-test-secret".to_string()),
            )]),
        }
    }

    /// Write an executable fake `claude` that records its argv, stdin and
    /// API key under `dir`, then runs `body`.
    fn fake_claude(dir: &Path, body: &str) -> PathBuf {
        let script = dir.join("fake_claude.sh");
        let d = dir.display();
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\n\
                 printf '%s\\n' \"$@\" > {d}/argv.txt\n\
                 cat > {d}/stdin.txt\n\
                 printf '%s' \"$ANTHROPIC_API_KEY\" > {d}/env.txt\n\
                 {body}"
            ),
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        script
    }

    #[test]
    fn mcp_config_shape() {
        let runtime = ClaudeCodeRuntime::with_binary("claude");
        let cfg = runtime.mcp_config(&spec("x"));
        let server = &cfg["mcpServers"]["claude-code-docker"];
        assert_eq!(server["type"], "stdio");
        assert_eq!(server["command"], "docker");
        let args: Vec<&str> = server["args"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a.as_str().unwrap())
            .collect();
        assert_eq!(
            args,
            vec![
                "run",
                "-i",
                "--rm",
                "-v",
                "/srv/runs/r1/worktrees/agent-7:/workspace",
                "-e",
                "ANTHROPIC_API_KEY",
                "claude-mcp:latest",
                "claude",
                "mcp",
                "serve",
            ]
        );
        assert!(!cfg.to_string().contains("sk-test-secret"));
    }

    #[test]
    fn default_allowlist_is_mcp_only() {
        assert_eq!(default_allowed_tools(), vec!["mcp__claude-code-docker__*"]);
    }

    #[tokio::test]
    async fn streams_classified_messages() {
        let tmp = tempfile::tempdir().unwrap();
        let script = fake_claude(
            tmp.path(),
            "echo '{\"type\":\"system\",\"subtype\":\"init\"}'\n\
             echo ''\n\
             echo 'not json at all'\n\
             echo '{\"type\":\"result\",\"subtype\":\"success\",\"result\":\"Done.\"}'\n",
        );

        let runtime = ClaudeCodeRuntime::with_binary(script.to_str().unwrap());
        let messages: Vec<RuntimeMessage> = runtime
            .launch(&spec("build it"))
            .await
            .unwrap()
            .map(|m| m.unwrap())
            .collect()
            .await;

        assert_eq!(messages.len(), 3, "blank lines are skipped: {messages:?}");
        assert!(matches!(&messages[0], RuntimeMessage::Other(v) if v["subtype"] == "init"));
        assert_eq!(
            messages[1],
            RuntimeMessage::Other(serde_json::Value::String("not json at all".into()))
        );
        assert_eq!(
            messages[2],
            RuntimeMessage::Success {
                result: "Done.".to_string()
            }
        );
    }

    #[tokio::test]
    async fn prompt_on_stdin_and_secret_in_env_only() {
        let tmp = tempfile::tempdir().unwrap();
        let script = fake_claude(tmp.path(), "");

        let runtime = ClaudeCodeRuntime::with_binary(script.to_str().unwrap());
        let _: Vec<_> = runtime
            .launch(&spec("the full prompt text"))
            .await
            .unwrap()
            .collect()
            .await;

        let argv = std::fs::read_to_string(tmp.path().join("argv.txt")).unwrap();
        let stdin = std::fs::read_to_string(tmp.path().join("stdin.txt")).unwrap();
        let env = std::fs::read_to_string(tmp.path().join("env.txt")).unwrap();

        assert_eq!(stdin, "the full prompt text");
        assert_eq!(env, "sk-test-secret");
        assert!(!argv.contains("sk-test-secret"));
        assert!(!argv.contains("the full prompt text"));
        assert!(argv.contains("stream-json"));
        assert!(argv.contains("mcp__claude-code-docker__*"));
        assert!(argv.contains("/srv/runs/r1/worktrees/agent-7:/workspace"));
    }

    #[tokio::test]
    async fn stream_without_result_just_ends() {
        let tmp = tempfile::tempdir().unwrap();
        let script = fake_claude(tmp.path(), "echo '{\"type\":\"assistant\"}'\n");

        let runtime = ClaudeCodeRuntime::with_binary(script.to_str().unwrap());
        let messages: Vec<_> = runtime.launch(&spec("x")).await.unwrap().collect().await;
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].as_ref().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn failed_exit_surfaces_status_and_stderr() {
        let tmp = tempfile::tempdir().unwrap();
        let script = fake_claude(
            tmp.path(),
            "echo '{\"type\":\"system\"}'\necho 'Invalid API key' >&2\nexit 3\n",
        );

        let runtime = ClaudeCodeRuntime::with_binary(script.to_str().unwrap());
        let items: Vec<_> = runtime.launch(&spec("x")).await.unwrap().collect().await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        let err = format!("{:#}", items[1].as_ref().unwrap_err());
        assert!(err.contains("exit status: 3"), "unexpected error: {err}");
        assert!(err.contains("Invalid API key"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn failed_exit_after_result_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let script = fake_claude(
            tmp.path(),
            "echo '{\"type\":\"result\",\"subtype\":\"success\",\"result\":\"ok\"}'\n\
             echo 'late warning' >&2\nexit 1\n",
        );

        let runtime = ClaudeCodeRuntime::with_binary(script.to_str().unwrap());
        let items: Vec<_> = runtime.launch(&spec("x")).await.unwrap().collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].as_ref().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn missing_binary_fails_launch() {
        let runtime = ClaudeCodeRuntime::with_binary("/nonexistent/path/to/claude");
        let err = match runtime.launch(&spec("x")).await {
            Ok(_) => panic!("launch should fail"),
            Err(e) => e,
        };
        assert!(
            format!("{err:#}").contains("failed to spawn claude binary"),
            "unexpected error: {err:#}"
        );
    }

    #[test]
    fn runtime_name() {
        assert_eq!(ClaudeCodeRuntime::with_binary("claude").name(), "claude-code");
    }
}
