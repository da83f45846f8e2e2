//! TOML configuration file loading
//!
//! Supports `~/.config/thread-relay/config.toml` as a persistent config
//! source. All fields are optional; the file is a partial overlay on top of
//! defaults, and environment variables win over it.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfigFile {
    /// Name the assistant speaks as
    pub persona: Option<String>,

    /// Directory for the thread handle and audit log
    pub data_dir: Option<String>,

    /// Assistant and completion settings
    #[serde(default)]
    pub assistant: AssistantFileConfig,

    /// Chat transport settings
    #[serde(default)]
    pub whatsapp: WhatsAppFileConfig,

    /// Music metadata credentials
    #[serde(default)]
    pub spotify: SpotifyFileConfig,

    /// Proxy and circuit renewal
    #[serde(default)]
    pub network: NetworkFileConfig,

    /// Webhook server
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Optional handler routes
    #[serde(default)]
    pub routing: RoutingFileConfig,

    /// External transcript tool
    #[serde(default)]
    pub transcript: TranscriptFileConfig,
}

/// Assistant-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct AssistantFileConfig {
    pub api_key: Option<String>,
    pub assistant_id: Option<String>,
    /// Model for the intent classifier (e.g. "gpt-4o-mini")
    pub intent_model: Option<String>,
    /// Model for video summaries (e.g. "gpt-4o-mini")
    pub summary_model: Option<String>,
    pub base_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub max_poll_attempts: Option<u32>,
    pub max_run_secs: Option<u64>,
}

/// `WhatsApp` Cloud API configuration
#[derive(Debug, Default, Deserialize)]
pub struct WhatsAppFileConfig {
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub verify_token: Option<String>,
}

/// Spotify credentials
#[derive(Debug, Default, Deserialize)]
pub struct SpotifyFileConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Network configuration
#[derive(Debug, Default, Deserialize)]
pub struct NetworkFileConfig {
    /// Outbound proxy for the chat transport (e.g. "socks5h://127.0.0.1:9150")
    pub proxy: Option<String>,
    pub tor_control_addr: Option<String>,
    pub tor_control_password: Option<String>,
    pub reconnect_attempts: Option<u32>,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Webhook server port
    pub port: Option<u16>,
}

/// Route toggles
#[derive(Debug, Default, Deserialize)]
pub struct RoutingFileConfig {
    pub music_links: Option<bool>,
    pub images: Option<bool>,
}

/// Transcript tool configuration
#[derive(Debug, Default, Deserialize)]
pub struct TranscriptFileConfig {
    /// Command line; the video URL is appended as the last argument
    pub command: Option<String>,
    /// Seconds before the command is killed
    pub timeout_secs: Option<u64>,
}

/// Parse a config file body
///
/// # Errors
///
/// Returns error if the TOML is malformed or has unknown sections
pub fn parse_config_file(content: &str) -> Result<RelayConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load a config file from an explicit path
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_config_file_from(path: &Path) -> Result<RelayConfigFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
    let config = parse_config_file(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Load the TOML config file from the standard path
///
/// Returns `RelayConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> RelayConfigFile {
    let Some(path) = config_file_path() else {
        return RelayConfigFile::default();
    };

    if !path.exists() {
        return RelayConfigFile::default();
    }

    match load_config_file_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            RelayConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/thread-relay/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("thread-relay").join("config.toml"))
}
