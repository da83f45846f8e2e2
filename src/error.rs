//! Error types for thread-relay

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Chat transport error
    #[error("channel error: {0}")]
    Channel(String),

    /// Assistants API error (threads, runs, files)
    #[error("assistant error: {0}")]
    Assistant(String),

    /// Stateless completion error
    #[error("completion error: {0}")]
    Completion(String),

    /// Music metadata service error
    #[error("music error: {0}")]
    Music(String),

    /// Music resource missing or private
    #[error("music resource not found: {0}")]
    MusicNotFound(String),

    /// Transcript extraction error
    #[error("transcript error: {0}")]
    Transcript(String),

    /// Attachment download/processing error
    #[error("attachment error: {0}")]
    Attachment(String),

    /// Conversation store error
    #[error("store error: {0}")]
    Store(String),

    /// Network circuit renewal error
    #[error("circuit error: {0}")]
    Circuit(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
