//! Daemon configuration.
//!
//! Loaded from `~/.config/agentboard/config.toml` when present, with every
//! field optional in the file. Unknown keys are ignored so older daemons
//! tolerate newer configs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_max_sessions() -> usize {
    5
}

fn default_agent_command() -> String {
    "claude".to_string()
}

fn default_skip_permissions() -> bool {
    true
}

fn default_warmup_secs() -> u64 {
    5
}

fn default_term() -> String {
    "xterm-256color".to_string()
}

fn default_main_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Hard ceiling on concurrently registered sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Executable launched inside each session's PTY.
    #[serde(default = "default_agent_command")]
    pub agent_command: String,
    /// Pass the permission-bypass flag to the agent CLI.
    #[serde(default = "default_skip_permissions")]
    pub skip_permissions: bool,
    /// Seconds to wait after spawn before the session accepts input.
    #[serde(default = "default_warmup_secs")]
    pub warmup_secs: u64,
    /// TERM value exported into the PTY.
    #[serde(default = "default_term")]
    pub term: String,
    /// Branch that task worktrees branch from and merge back into.
    #[serde(default = "default_main_branch")]
    pub main_branch: String,
    /// Repository the orchestrator manages. Defaults to the daemon's cwd.
    #[serde(default)]
    pub project_root: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            agent_command: default_agent_command(),
            skip_permissions: default_skip_permissions(),
            warmup_secs: default_warmup_secs(),
            term: default_term(),
            main_branch: default_main_branch(),
            project_root: None,
        }
    }
}

impl Settings {
    /// Load settings from the default config path. Missing file means
    /// defaults; a malformed file is an error rather than a silent reset.
    pub fn load() -> Result<Self, String> {
        match config_path() {
            Some(path) if path.is_file() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        toml::from_str(&raw).map_err(|e| format!("Failed to parse {}: {e}", path.display()))
    }

    /// Directory the orchestrator treats as the project checkout.
    pub fn project_root(&self) -> PathBuf {
        self.project_root
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

/// `~/.config/agentboard/config.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("agentboard").join("config.toml"))
}

fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("agentboard")
}

/// Unix socket the daemon listens on.
pub fn socket_path() -> PathBuf {
    runtime_dir().join("agentboardd.sock")
}

/// PID file guarding against double daemon starts.
pub fn pid_path() -> PathBuf {
    runtime_dir().join("agentboardd.pid")
}
