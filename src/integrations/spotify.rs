//! Spotify Web API client
//!
//! Client-credentials authentication with an in-memory token cache, plus
//! metadata lookups for the five linkable resource kinds.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::links::MusicLink;
use crate::{Error, Result};

/// Token endpoint
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Metadata API base
pub const API_BASE: &str = "https://api.spotify.com/v1";

/// Tokens are refreshed this many seconds before they expire
const REFRESH_MARGIN_SECS: i64 = 60;

/// Upper bound on a token lifetime we are willing to trust
const MAX_TOKEN_LIFETIME_SECS: u64 = 86_400;

/// Cached access token
#[derive(Debug, Default)]
pub struct TokenCache {
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenCache {
    /// Token usable at `now`, if any
    ///
    /// A token counts as stale from 60 seconds before its expiry.
    #[must_use]
    pub fn valid_at(&self, now: DateTime<Utc>) -> Option<&str> {
        let expires_at = self.expires_at?;
        if now + TimeDelta::seconds(REFRESH_MARGIN_SECS) < expires_at {
            self.token.as_deref()
        } else {
            None
        }
    }

    /// Store a token issued at `issued_at` that lives `expires_in_secs`
    pub fn store(&mut self, token: String, expires_in_secs: u64, issued_at: DateTime<Utc>) {
        let secs = i64::try_from(expires_in_secs.min(MAX_TOKEN_LIFETIME_SECS)).unwrap_or(0);
        let lifetime = TimeDelta::seconds(secs);
        self.token = Some(token);
        self.expires_at = Some(issued_at + lifetime);
    }

    /// Forget the cached token
    pub fn clear(&mut self) {
        self.token = None;
        self.expires_at = None;
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: u64,
}

/// Object with a display name
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Named {
    /// Name
    #[serde(default)]
    pub name: Option<String>,
}

/// Playlist owner
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Owner {
    /// Display name
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Track count wrapper
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackCount {
    /// Number of tracks
    #[serde(default)]
    pub total: Option<u64>,
}

/// Show summary embedded in an episode
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShowRef {
    /// Show name
    #[serde(default)]
    pub name: Option<String>,
    /// Show publisher
    #[serde(default)]
    pub publisher: Option<String>,
}

/// Metadata fields used by the prompts, across all resource kinds
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MusicMetadata {
    /// Resource name / title
    #[serde(default)]
    pub name: Option<String>,
    /// Artists (tracks, albums)
    #[serde(default)]
    pub artists: Vec<Named>,
    /// Album (tracks)
    #[serde(default)]
    pub album: Option<Named>,
    /// Owner (playlists)
    #[serde(default)]
    pub owner: Option<Owner>,
    /// Track count (playlists)
    #[serde(default)]
    pub tracks: Option<TrackCount>,
    /// Publisher (shows)
    #[serde(default)]
    pub publisher: Option<String>,
    /// Parent show (episodes)
    #[serde(default)]
    pub show: Option<ShowRef>,
}

/// Spotify API client
pub struct SpotifyClient {
    client: Client,
    client_id: String,
    client_secret: SecretString,
    token_url: String,
    api_base: String,
    cache: Mutex<TokenCache>,
}

impl SpotifyClient {
    /// Create a client against the public endpoints
    ///
    /// # Errors
    ///
    /// Returns error if credentials are empty or the HTTP client cannot be built
    pub fn new(client_id: String, client_secret: SecretString) -> Result<Self> {
        Self::with_endpoints(client_id, client_secret, TOKEN_URL, API_BASE)
    }

    /// Create a client against custom endpoints
    ///
    /// # Errors
    ///
    /// Returns error if credentials are empty or the HTTP client cannot be built
    pub fn with_endpoints(
        client_id: String,
        client_secret: SecretString,
        token_url: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self> {
        if client_id.is_empty() || client_secret.expose_secret().is_empty() {
            return Err(Error::Config(
                "Spotify client id and secret required".to_string(),
            ));
        }

        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(15)).build()?,
            client_id,
            client_secret,
            token_url: token_url.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            cache: Mutex::new(TokenCache::default()),
        })
    }

    /// Get a cached access token, refreshing when absent or near expiry
    ///
    /// # Errors
    ///
    /// Returns error if the token request fails or returns no token
    pub async fn access_token(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.valid_at(Utc::now()) {
            return Ok(token.to_string());
        }

        let issued_at = Utc::now();
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| Error::Music(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Music(format!("token request failed: {status} - {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Music(format!("token parse error: {e}")))?;

        let Some(access_token) = token.access_token else {
            return Err(Error::Music("token response without access_token".to_string()));
        };

        cache.store(access_token.clone(), token.expires_in, issued_at);
        tracing::info!(expires_in = token.expires_in, "Spotify token refreshed");

        Ok(access_token)
    }

    /// Fetch metadata for a linked resource with a given token
    ///
    /// # Errors
    ///
    /// Returns `Error::MusicNotFound` for missing or private resources and
    /// `Error::Music` for other failures
    pub async fn fetch_metadata(&self, link: &MusicLink, token: &str) -> Result<MusicMetadata> {
        let url = format!(
            "{}/{}/{}",
            self.api_base,
            link.category.collection(),
            link.id
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::Music(format!("metadata request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, category = %link.category, id = %link.id, "Spotify API error");
            if status == StatusCode::UNAUTHORIZED {
                self.cache.lock().await.clear();
            }
            return Err(Error::MusicNotFound(format!("{} {} ({status})", link.category, link.id)));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Music(format!("metadata parse error: {e}")))
    }
}

impl std::fmt::Debug for SpotifyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyClient")
            .field("client_id", &self.client_id)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}
