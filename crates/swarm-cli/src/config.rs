//! Configuration file management for swarm.
//!
//! Provides a TOML config file at `~/.config/swarm/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use swarm_core::SwarmConfig;
use swarm_core::config::API_KEY_ENV;

pub const WORKSPACE_ENV: &str = "WORKSPACE_PATH";
pub const HOST_WORKSPACE_ENV: &str = "HOST_WORKSPACE_PATH";
pub const IMAGE_ENV: &str = "DOCKER_MCP_IMAGE";
pub const CLAUDE_BINARY_ENV: &str = "SWARM_CLAUDE_BINARY";
pub const DOCKER_BINARY_ENV: &str = "SWARM_DOCKER_BINARY";
pub const GIT_BINARY_ENV: &str = "SWARM_GIT_BINARY";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub workspace: WorkspaceSection,
    #[serde(default)]
    pub runtime: RuntimeSection,
    #[serde(default)]
    pub auth: AuthSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WorkspaceSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// The same directory as the container daemon sees it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_root: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RuntimeSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_binary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_binary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_binary: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AuthSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the swarm config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/swarm` or `~/.config/swarm`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("swarm");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("swarm")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. `Ok(None)` when there is none.
pub fn load_config() -> Result<Option<ConfigFile>> {
    let path = config_path();
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolution
// -----------------------------------------------------------------------

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub workspace: Option<PathBuf>,
    pub image: Option<String>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Resolve configuration using the chain: CLI flag > env var > config file > default.
///
/// The API key is never required here; a missing key surfaces as a
/// configuration error when a run is requested.
pub fn resolve(cli: &CliOverrides) -> Result<SwarmConfig> {
    let file = load_config()?.unwrap_or_default();

    let workspace_root = cli
        .workspace
        .clone()
        .or_else(|| env_var(WORKSPACE_ENV).map(PathBuf::from))
        .or(file.workspace.root)
        .unwrap_or_else(|| PathBuf::from(SwarmConfig::DEFAULT_WORKSPACE));

    let mut config = SwarmConfig::new(&workspace_root);

    if let Some(host) = env_var(HOST_WORKSPACE_ENV)
        .map(PathBuf::from)
        .or(file.workspace.host_root)
    {
        config = config.with_host_workspace_root(host);
    }

    if let Some(image) = cli
        .image
        .clone()
        .or_else(|| env_var(IMAGE_ENV))
        .or(file.runtime.image)
    {
        config.mcp_image = image;
    }
    if let Some(bin) = env_var(CLAUDE_BINARY_ENV).or(file.runtime.claude_binary) {
        config.claude_binary = bin;
    }
    if let Some(bin) = env_var(DOCKER_BINARY_ENV).or(file.runtime.docker_binary) {
        config.docker_binary = bin;
    }
    if let Some(bin) = env_var(GIT_BINARY_ENV).or(file.runtime.git_binary) {
        config.git_binary = bin;
    }
    if let Some(key) = env_var(API_KEY_ENV).or(file.auth.api_key) {
        config = config.with_api_key(key);
    }

    Ok(config)
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::path::Path;

    const ALL_ENV: &[&str] = &[
        API_KEY_ENV,
        WORKSPACE_ENV,
        HOST_WORKSPACE_ENV,
        IMAGE_ENV,
        CLAUDE_BINARY_ENV,
        DOCKER_BINARY_ENV,
        GIT_BINARY_ENV,
        "XDG_CONFIG_HOME",
    ];

    /// Holds the env lock, points `XDG_CONFIG_HOME` at a temp dir and clears
    /// every swarm variable. Restores the previous values on drop.
    struct EnvSandbox {
        _lock: std::sync::MutexGuard<'static, ()>,
        saved: Vec<(&'static str, Option<String>)>,
        dir: tempfile::TempDir,
    }

    impl EnvSandbox {
        fn new() -> Self {
            let lock = crate::test_util::lock_env();
            let saved = ALL_ENV
                .iter()
                .map(|name| (*name, std::env::var(name).ok()))
                .collect();
            let dir = tempfile::TempDir::new().unwrap();
            for name in ALL_ENV {
                unsafe { std::env::remove_var(name) };
            }
            unsafe { std::env::set_var("XDG_CONFIG_HOME", dir.path()) };
            Self {
                _lock: lock,
                saved,
                dir,
            }
        }

        fn set(&self, name: &str, value: &str) {
            unsafe { std::env::set_var(name, value) };
        }
    }

    impl Drop for EnvSandbox {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => unsafe { std::env::set_var(name, v) },
                    None => unsafe { std::env::remove_var(name) },
                }
            }
        }
    }

    fn file_with_everything() -> ConfigFile {
        ConfigFile {
            workspace: WorkspaceSection {
                root: Some(PathBuf::from("/file/ws")),
                host_root: Some(PathBuf::from("/file/host")),
            },
            runtime: RuntimeSection {
                image: Some("file-image:1".into()),
                claude_binary: Some("/file/claude".into()),
                docker_binary: Some("/file/docker".into()),
                git_binary: Some("/file/git".into()),
            },
            auth: AuthSection {
                api_key: Some("sk-file".into()),
            },
        }
    }

    #[test]
    fn defaults_when_nothing_set() {
        let _env = EnvSandbox::new();
        let config = resolve(&CliOverrides::default()).unwrap();

        assert_eq!(config.workspace_root, Path::new("/workspace"));
        assert_eq!(config.host_workspace_root, Path::new("/workspace"));
        assert_eq!(config.mcp_image, "claude-mcp:latest");
        assert_eq!(config.claude_binary, "claude");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn config_file_overrides_defaults() {
        let _env = EnvSandbox::new();
        save_config(&file_with_everything()).unwrap();

        let config = resolve(&CliOverrides::default()).unwrap();
        assert_eq!(config.workspace_root, Path::new("/file/ws"));
        assert_eq!(config.host_workspace_root, Path::new("/file/host"));
        assert_eq!(config.mcp_image, "file-image:1");
        assert_eq!(config.docker_binary, "/file/docker");
        assert_eq!(config.git_binary, "/file/git");
        assert_eq!(config.api_key.unwrap().expose_secret(), "sk-file");
    }

    #[test]
    fn env_overrides_config_file() {
        let env = EnvSandbox::new();
        save_config(&file_with_everything()).unwrap();
        env.set(WORKSPACE_ENV, "/env/ws");
        env.set(IMAGE_ENV, "env-image:2");
        env.set(API_KEY_ENV, "sk-env");
        env.set(CLAUDE_BINARY_ENV, "/env/claude");

        let config = resolve(&CliOverrides::default()).unwrap();
        assert_eq!(config.workspace_root, Path::new("/env/ws"));
        assert_eq!(config.host_workspace_root, Path::new("/file/host"));
        assert_eq!(config.mcp_image, "env-image:2");
        assert_eq!(config.claude_binary, "/env/claude");
        assert_eq!(config.api_key.unwrap().expose_secret(), "sk-env");
    }

    #[test]
    fn cli_overrides_env() {
        let env = EnvSandbox::new();
        env.set(WORKSPACE_ENV, "/env/ws");
        env.set(IMAGE_ENV, "env-image:2");

        let cli = CliOverrides {
            workspace: Some(PathBuf::from("/cli/ws")),
            image: Some("cli-image:3".into()),
        };
        let config = resolve(&cli).unwrap();
        assert_eq!(config.workspace_root, Path::new("/cli/ws"));
        assert_eq!(config.host_workspace_root, Path::new("/cli/ws"));
        assert_eq!(config.mcp_image, "cli-image:3");
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let env = EnvSandbox::new();
        env.set(API_KEY_ENV, "");
        let config = resolve(&CliOverrides::default()).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let env = EnvSandbox::new();
        let dir = env.dir.path().join("swarm");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.toml"), "[workspace\nroot = ").unwrap();

        let err = resolve(&CliOverrides::default()).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config file"));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let _env = EnvSandbox::new();
        save_config(&file_with_everything()).unwrap();

        let loaded = load_config().unwrap().unwrap();
        assert_eq!(loaded.workspace.root, Some(PathBuf::from("/file/ws")));
        assert_eq!(loaded.runtime.image.as_deref(), Some("file-image:1"));
        assert_eq!(loaded.auth.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn load_without_file_is_none() {
        let _env = EnvSandbox::new();
        assert!(load_config().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn save_config_sets_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let _env = EnvSandbox::new();
        save_config(&ConfigFile::default()).unwrap();

        let mode = std::fs::metadata(config_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let _env = EnvSandbox::new();
        let path = config_path();
        assert!(
            path.ends_with("swarm/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
