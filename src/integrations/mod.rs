//! Third-party service integrations

pub mod spotify;
pub mod tor;
pub mod transcript;

pub use spotify::{MusicMetadata, SpotifyClient, TokenCache};
pub use tor::CircuitRenewer;
pub use transcript::{CommandTranscript, DEFAULT_TRANSCRIPT_TIMEOUT, TranscriptSource};
