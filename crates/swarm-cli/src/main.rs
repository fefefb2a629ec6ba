mod config;
mod serve_cmd;
#[cfg(test)]
mod test_util;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use swarm_core::probe::{DockerProbe, EnvironmentProbe};
use swarm_core::runtime::ClaudeCodeRuntime;
use swarm_core::{Orchestrator, SwarmConfig};

use config::CliOverrides;

#[derive(Parser)]
#[command(name = "swarm", about = "Fan one prompt out to a swarm of isolated coding agents")]
struct Cli {
    /// Workspace root (overrides WORKSPACE_PATH env var)
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Execution image for the agent's MCP server (overrides DOCKER_MCP_IMAGE)
    #[arg(long, global = true)]
    image: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a swarm config file
    Init {
        /// Workspace root to record in the file
        #[arg(long, default_value = SwarmConfig::DEFAULT_WORKSPACE)]
        root: PathBuf,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Start the HTTP server
    Serve {
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,
        /// Port to listen on
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },
    /// Run one prompt across N agents and print the report as JSON
    Run {
        /// Task prompt given to every agent
        prompt: String,
        /// Number of agents
        #[arg(long, short = 'n', default_value_t = 1)]
        agents: usize,
    },
    /// Check the container runtime and print the environment status as JSON
    Probe,
}

/// Execute the `swarm init` command: write config file.
fn cmd_init(root: PathBuf, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        workspace: config::WorkspaceSection {
            root: Some(root.clone()),
            host_root: None,
        },
        runtime: config::RuntimeSection {
            image: Some(SwarmConfig::DEFAULT_IMAGE.to_string()),
            ..Default::default()
        },
        auth: config::AuthSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  workspace.root = {}", root.display());
    println!("  runtime.image = {}", SwarmConfig::DEFAULT_IMAGE);
    println!();
    println!("Next: export ANTHROPIC_API_KEY (or set auth.api_key) and run `swarm serve`.");

    Ok(())
}

fn build_orchestrator(config: SwarmConfig) -> Orchestrator {
    let probe = DockerProbe::shared(&config);
    let runtime = Arc::new(ClaudeCodeRuntime::new(&config));
    Orchestrator::new(Arc::new(config), probe, runtime)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = CliOverrides {
        workspace: cli.workspace,
        image: cli.image,
    };

    match cli.command {
        Commands::Init { root, force } => {
            cmd_init(root, force)?;
        }
        Commands::Serve { bind, port } => {
            let resolved = config::resolve(&overrides)?;
            if resolved.api_key.is_none() {
                tracing::warn!("ANTHROPIC_API_KEY not set, /orchestrate will fail until it is");
            }
            let orchestrator = Arc::new(build_orchestrator(resolved));
            serve_cmd::run_serve(orchestrator, &bind, port).await?;
        }
        Commands::Run { prompt, agents } => {
            let resolved = config::resolve(&overrides)?;
            let orchestrator = build_orchestrator(resolved);
            let report = orchestrator.orchestrate(&prompt, agents).await?;
            let json =
                serde_json::to_string_pretty(&report).context("failed to serialize run report")?;
            println!("{json}");
            if report.summary.failed > 0 {
                std::process::exit(1);
            }
        }
        Commands::Probe => {
            let resolved = config::resolve(&overrides)?;
            let status = DockerProbe::new(&resolved).probe().await;
            let json = serde_json::to_string_pretty(&status)
                .context("failed to serialize environment status")?;
            println!("{json}");
            if !status.ready_for_launch() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
