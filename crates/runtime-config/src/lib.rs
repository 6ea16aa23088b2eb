//! Configuration types for the agentdeck CLI.
//!
//! `agentdeck.toml` is read and written with these types. Loading, saving and
//! the `config` command live in the CLI crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "agentdeck.toml";

pub const ENV_SERVER_URL: &str = "AGENTDECK_SERVER_URL";
pub const ENV_API_KEY: &str = "AGENTDECK_API_KEY";

/// Top-level configuration (persisted as `agentdeck.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DeckConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub stream: StreamSettings,
    #[serde(default)]
    pub chat: ChatSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_server_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            api_key: String::new(),
        }
    }
}

impl ServerSettings {
    /// API key safe for display: first four characters, rest masked.
    pub fn masked_api_key(&self) -> String {
        if self.api_key.is_empty() {
            return "(not set)".to_string();
        }
        let visible: String = self.api_key.chars().take(4).collect();
        format!("{visible}****")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamSettings {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Applies to plain requests only; event streams stay open until the task ends.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Render explicit heartbeat events as system notes.
    #[serde(default = "default_false")]
    pub show_heartbeats: bool,
    /// Effective event types never shown in the transcript.
    #[serde(default)]
    pub hidden_event_types: Vec<String>,
    /// Read size used by `agentdeck replay`.
    #[serde(default = "default_replay_chunk_bytes")]
    pub replay_chunk_bytes: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            show_heartbeats: false,
            hidden_event_types: Vec::new(),
            replay_chunk_bytes: default_replay_chunk_bytes(),
        }
    }
}

impl StreamSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSettings {
    /// Agent used when `--agent` is not given. Empty means the server default.
    #[serde(default)]
    pub default_agent: String,
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,
    #[serde(default = "default_true")]
    pub show_welcome: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            default_agent: String::new(),
            welcome_message: default_welcome_message(),
            show_welcome: true,
        }
    }
}

impl ChatSettings {
    pub fn agent(&self) -> Option<&str> {
        Some(self.default_agent.trim()).filter(|agent| !agent.is_empty())
    }
}

fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_server_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_replay_chunk_bytes() -> usize {
    64
}
fn default_welcome_message() -> String {
    "Hello! Describe a task and I'll get an agent working on it.".to_string()
}

/// Apply compatibility fallbacks after loading raw TOML.
/// Returns true when any field was updated.
pub fn apply_compat_fallbacks(config: &mut DeckConfig) -> bool {
    let mut changed = false;

    let trimmed = config.server.url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        config.server.url = default_server_url();
        changed = true;
    } else if trimmed != config.server.url {
        config.server.url = trimmed.to_string();
        changed = true;
    }

    if config.stream.replay_chunk_bytes == 0 {
        config.stream.replay_chunk_bytes = default_replay_chunk_bytes();
        changed = true;
    }

    if config.stream.connect_timeout_secs == 0 {
        config.stream.connect_timeout_secs = default_connect_timeout_secs();
        changed = true;
    }

    changed
}

/// Override server settings from the environment. `lookup` is usually
/// `|key| std::env::var(key).ok()`. Returns true when anything was applied.
pub fn apply_env_overrides<F>(config: &mut DeckConfig, lookup: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let mut changed = false;
    if let Some(url) = lookup(ENV_SERVER_URL).filter(|v| !v.trim().is_empty()) {
        config.server.url = url.trim().trim_end_matches('/').to_string();
        changed = true;
    }
    if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.trim().is_empty()) {
        config.server.api_key = key.trim().to_string();
        changed = true;
    }
    changed
}
