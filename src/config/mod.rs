//! Configuration management for thread-relay
//!
//! Precedence: environment variables, then the TOML file, then defaults.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::assistant::RunPolicy;
use crate::dispatch::RoutingFlags;
use crate::integrations::DEFAULT_TRANSCRIPT_TIMEOUT;
use crate::integrations::tor::DEFAULT_CONTROL_ADDR;
use crate::lifecycle::ReconnectPolicy;
use crate::{Error, Result};

pub use file::RelayConfigFile;

/// Assistant id used when none is configured
pub const DEFAULT_ASSISTANT_ID: &str = "asst_jNcK131A35qLwUfIweW6mx9L";

/// thread-relay configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Name the assistant speaks as
    pub persona: String,

    /// Path to data directory (thread handle, audit log)
    pub data_dir: PathBuf,

    /// Assistants API and completion settings
    pub assistant: AssistantConfig,

    /// `WhatsApp` Cloud API settings
    pub whatsapp: WhatsAppConfig,

    /// Spotify credentials (music handler disabled when absent)
    pub spotify: Option<SpotifyConfig>,

    /// Proxy and circuit renewal
    pub network: NetworkConfig,

    /// Webhook server port
    pub port: u16,

    /// Optional handler routes
    pub routing: RoutingFlags,

    /// Transcript tool command line
    pub transcript_command: String,

    /// How long the transcript tool may run
    pub transcript_timeout: Duration,
}

/// Assistants API configuration
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// API key (required to run)
    pub api_key: Option<SecretString>,

    /// Assistant profile every run uses
    pub assistant_id: String,

    /// Model for the intent classifier
    pub intent_model: String,

    /// Model for video summaries
    pub summary_model: String,

    /// API base URL
    pub base_url: String,

    /// Run polling bounds
    pub run_policy: RunPolicy,
}

/// `WhatsApp` Cloud API configuration
#[derive(Debug, Clone, Default)]
pub struct WhatsAppConfig {
    /// Cloud API access token
    pub access_token: Option<SecretString>,

    /// Phone number ID messages are sent from
    pub phone_number_id: Option<String>,

    /// Token expected during webhook verification
    pub verify_token: Option<SecretString>,
}

/// Spotify client credentials
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: SecretString,
}

/// Network configuration
#[derive(Debug, Clone, Default)]
pub struct NetworkConfig {
    /// Outbound proxy for the chat transport
    pub proxy: Option<String>,

    /// Tor control port; renewal is enabled when this or a proxy is set
    pub tor_control_addr: Option<String>,

    /// Tor control password
    pub tor_control_password: Option<SecretString>,

    /// Reconnect backoff
    pub reconnect: ReconnectPolicy,
}

impl NetworkConfig {
    /// Control port to renew circuits on, if renewal applies
    #[must_use]
    pub fn circuit_control_addr(&self) -> Option<&str> {
        match (&self.tor_control_addr, &self.proxy) {
            (Some(addr), _) => Some(addr),
            (None, Some(_)) => Some(DEFAULT_CONTROL_ADDR),
            (None, None) => None,
        }
    }
}

/// Parse a boolean flag the way env vars are usually written
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Default data directory (`~/.local/share/thread-relay` on Linux)
#[must_use]
pub fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("thread-relay"))
}

impl Config {
    /// Load configuration from the environment and a config file
    ///
    /// An explicit `path` must exist and parse; the default path is optional.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file is unreadable or invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = match path {
            Some(path) => file::load_config_file_from(path)?,
            None => file::load_config_file(),
        };

        Ok(Self::from_sources(fc, |key| std::env::var(key).ok()))
    }

    /// Build configuration from a parsed file and an environment lookup
    #[must_use]
    pub fn from_sources(fc: RelayConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| non_empty(env(key));

        // Run polling bounds (toml > default)
        let defaults = RunPolicy::default();
        let run_policy = RunPolicy {
            poll_interval: fc
                .assistant
                .poll_interval_ms
                .map_or(defaults.poll_interval, Duration::from_millis),
            max_attempts: fc.assistant.max_poll_attempts.unwrap_or(defaults.max_attempts),
            max_duration: fc
                .assistant
                .max_run_secs
                .map_or(defaults.max_duration, Duration::from_secs),
        };

        // Assistant (env > toml > default)
        let assistant = AssistantConfig {
            api_key: var("OPENAI_API_KEY")
                .or(fc.assistant.api_key)
                .map(SecretString::from),
            assistant_id: var("ASSISTANT_ID")
                .or(fc.assistant.assistant_id)
                .unwrap_or_else(|| DEFAULT_ASSISTANT_ID.to_string()),
            intent_model: var("RELAY_INTENT_MODEL")
                .or(fc.assistant.intent_model)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            summary_model: var("RELAY_SUMMARY_MODEL")
                .or(fc.assistant.summary_model)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            base_url: var("OPENAI_BASE_URL")
                .or(fc.assistant.base_url)
                .unwrap_or_else(|| crate::assistant::DEFAULT_BASE_URL.to_string()),
            run_policy,
        };

        let whatsapp = WhatsAppConfig {
            access_token: var("WHATSAPP_TOKEN")
                .or(fc.whatsapp.access_token)
                .map(SecretString::from),
            phone_number_id: var("WHATSAPP_PHONE_ID").or(fc.whatsapp.phone_number_id),
            verify_token: var("WHATSAPP_VERIFY_TOKEN")
                .or(fc.whatsapp.verify_token)
                .map(SecretString::from),
        };

        // Music handler only with both halves of the credentials
        let spotify = match (
            var("SPOTIFY_CLIENT_ID").or(fc.spotify.client_id),
            var("SPOTIFY_CLIENT_SECRET").or(fc.spotify.client_secret),
        ) {
            (Some(client_id), Some(secret)) => Some(SpotifyConfig {
                client_id,
                client_secret: SecretString::from(secret),
            }),
            _ => None,
        };

        let reconnect_defaults = ReconnectPolicy::default();
        let network = NetworkConfig {
            proxy: var("RELAY_PROXY").or(fc.network.proxy),
            tor_control_addr: var("TOR_CONTROL_ADDR").or(fc.network.tor_control_addr),
            tor_control_password: var("TOR_CONTROL_PASSWORD")
                .or(fc.network.tor_control_password)
                .map(SecretString::from),
            reconnect: ReconnectPolicy {
                max_attempts: fc
                    .network
                    .reconnect_attempts
                    .unwrap_or(reconnect_defaults.max_attempts),
                ..reconnect_defaults
            },
        };

        let port = var("RELAY_PORT")
            .and_then(|s| s.parse().ok())
            .or(fc.server.port)
            .unwrap_or(3000);

        let routing = RoutingFlags {
            music_links: var("RELAY_ROUTE_MUSIC")
                .and_then(|v| parse_flag(&v))
                .or(fc.routing.music_links)
                .unwrap_or(true),
            images: var("RELAY_ROUTE_IMAGES")
                .and_then(|v| parse_flag(&v))
                .or(fc.routing.images)
                .unwrap_or(true),
        };

        let data_dir = var("RELAY_DATA_DIR")
            .or(fc.data_dir)
            .map_or_else(default_data_dir, PathBuf::from);

        Self {
            persona: var("RELAY_PERSONA")
                .or(fc.persona)
                .unwrap_or_else(|| "Jeroen".to_string()),
            data_dir,
            assistant,
            whatsapp,
            spotify,
            network,
            port,
            routing,
            transcript_command: var("RELAY_TRANSCRIPT_CMD")
                .or(fc.transcript.command)
                .unwrap_or_else(|| "python transcript.py".to_string()),
            transcript_timeout: var("RELAY_TRANSCRIPT_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .or(fc.transcript.timeout_secs)
                .map_or(DEFAULT_TRANSCRIPT_TIMEOUT, Duration::from_secs),
        }
    }

    /// The API key, or an error naming the missing variable
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no key is configured
    pub fn require_api_key(&self) -> Result<SecretString> {
        self.assistant
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is not set".to_string()))
    }

    /// `WhatsApp` token, phone id and verify token, or an error naming what is missing
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if any of the three is missing
    pub fn require_whatsapp(&self) -> Result<(SecretString, String, SecretString)> {
        let token = self
            .whatsapp
            .access_token
            .clone()
            .ok_or_else(|| Error::Config("WHATSAPP_TOKEN is not set".to_string()))?;
        let phone_id = self
            .whatsapp
            .phone_number_id
            .clone()
            .ok_or_else(|| Error::Config("WHATSAPP_PHONE_ID is not set".to_string()))?;
        let verify = self
            .whatsapp
            .verify_token
            .clone()
            .ok_or_else(|| Error::Config("WHATSAPP_VERIFY_TOKEN is not set".to_string()))?;
        Ok((token, phone_id, verify))
    }
}
