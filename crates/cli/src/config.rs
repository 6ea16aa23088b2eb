use agentdeck_runtime_config::{
    CONFIG_FILE_NAME, DeckConfig, apply_compat_fallbacks, apply_env_overrides,
};
use agentdeck_stream::VisibilityPolicy;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Get the config directory path (~/.config/agentdeck/)
pub fn config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Could not determine home directory")?;
    Ok(PathBuf::from(home).join(".config").join("agentdeck"))
}

/// Canonical config file path.
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

fn read_config_file(path: &Path) -> Result<DeckConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let mut config: DeckConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config at {}", path.display()))?;
    apply_compat_fallbacks(&mut config);
    Ok(config)
}

/// Config as stored on disk, default if not found. Environment overrides
/// are not applied, so this is what `config` edits and writes back.
pub fn load_file_config() -> Result<DeckConfig> {
    let path = config_path()?;
    if path.exists() {
        read_config_file(&path)
    } else {
        Ok(DeckConfig::default())
    }
}

/// Effective config: file values plus `AGENTDECK_*` environment overrides.
pub fn load_config() -> Result<DeckConfig> {
    let mut config = load_file_config()?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

pub fn save_config(config: &DeckConfig) -> Result<()> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config dir at {}", dir.display()))?;

    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    let path = config_path()?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write config at {}", path.display()))?;
    Ok(())
}

/// Visibility policy for the stream pipeline.
pub fn visibility_policy(config: &DeckConfig) -> VisibilityPolicy {
    VisibilityPolicy::new()
        .with_hidden(config.stream.hidden_event_types.iter().cloned())
        .with_heartbeats(config.stream.show_heartbeats)
}

/// Print current config.
pub fn show_config() -> Result<()> {
    let config = load_config()?;
    let path = config_path()?;
    println!("Config file: {}", path.display());
    println!();
    println!("[server]");
    println!("  url     = {}", config.server.url);
    println!("  api_key = {}", config.server.masked_api_key());
    println!();
    println!("[stream]");
    println!("  connect_timeout_secs = {}", config.stream.connect_timeout_secs);
    println!("  request_timeout_secs = {}", config.stream.request_timeout_secs);
    println!("  max_retries          = {}", config.stream.max_retries);
    println!("  show_heartbeats      = {}", config.stream.show_heartbeats);
    if config.stream.hidden_event_types.is_empty() {
        println!("  hidden_event_types   = (none)");
    } else {
        println!(
            "  hidden_event_types   = {}",
            config.stream.hidden_event_types.join(", ")
        );
    }
    println!("  replay_chunk_bytes   = {}", config.stream.replay_chunk_bytes);
    println!();
    println!("[chat]");
    println!(
        "  default_agent = {}",
        config.chat.agent().unwrap_or("(server default)")
    );
    println!("  show_welcome  = {}", config.chat.show_welcome);
    Ok(())
}

/// Update config with provided values.
pub fn set_config(
    server_url: Option<String>,
    api_key: Option<String>,
    agent: Option<String>,
) -> Result<()> {
    let mut config = load_file_config()?;

    if let Some(url) = server_url {
        config.server.url = url;
    }
    if let Some(key) = api_key {
        config.server.api_key = key;
    }
    if let Some(agent) = agent {
        config.chat.default_agent = agent;
    }
    apply_compat_fallbacks(&mut config);

    save_config(&config)?;
    println!("Configuration updated.");
    show_config()?;
    Ok(())
}
