//! Chat transport adapters
//!
//! The dispatcher talks to the chat only through the `Channel` trait: send a
//! reply, show a composing signal, fetch attachment bytes, probe health.

mod whatsapp;

use async_trait::async_trait;

pub use whatsapp::{
    WhatsAppChannel, WhatsAppMedia, WhatsAppMessage, WhatsAppTextContent,
    WhatsAppWebhook, WhatsAppWebhookChange, WhatsAppWebhookEntry, WhatsAppWebhookValue,
};

use crate::Result;

/// Type of attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    /// Image file (JPEG, PNG, GIF, etc.)
    Image,
    /// Audio file (MP3, WAV, OGG, etc.)
    Audio,
    /// Video file (MP4, MOV, etc.)
    Video,
    /// Generic file
    File,
}

impl AttachmentKind {
    /// Determine attachment kind from MIME type
    #[must_use]
    pub fn from_mime(mime_type: &str) -> Self {
        let lower = mime_type.to_lowercase();
        if lower.starts_with("image/") {
            Self::Image
        } else if lower.starts_with("audio/") {
            Self::Audio
        } else if lower.starts_with("video/") {
            Self::Video
        } else {
            Self::File
        }
    }
}

/// An attachment on an incoming message
///
/// Either the bytes are inline (`data`) or the channel resolves them from
/// `media_id` on demand.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Type of attachment
    pub kind: AttachmentKind,

    /// Platform media handle (if the bytes live on the platform)
    pub media_id: Option<String>,

    /// Raw attachment data (if available)
    pub data: Option<Vec<u8>>,

    /// MIME type
    pub mime_type: String,

    /// Original filename
    pub filename: Option<String>,
}

impl Attachment {
    /// Create an attachment referring to platform media
    #[must_use]
    pub fn from_media_id(media_id: String, mime_type: String, filename: Option<String>) -> Self {
        Self {
            kind: AttachmentKind::from_mime(&mime_type),
            media_id: Some(media_id),
            data: None,
            mime_type,
            filename,
        }
    }

    /// Create an attachment from inline data
    #[must_use]
    pub fn from_data(data: Vec<u8>, mime_type: String, filename: Option<String>) -> Self {
        Self {
            kind: AttachmentKind::from_mime(&mime_type),
            media_id: None,
            data: Some(data),
            mime_type,
            filename,
        }
    }
}

/// A message from the chat
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Message identifier (used for quoting and read receipts)
    pub id: String,

    /// Chat the message arrived in
    pub chat_id: String,

    /// Sender identifier
    pub sender_id: String,

    /// Text body (or media caption)
    pub content: String,

    /// Attachments on the message
    pub attachments: Vec<Attachment>,
}

impl IncomingMessage {
    /// First image attachment, if any
    #[must_use]
    pub fn first_image(&self) -> Option<&Attachment> {
        self.attachments
            .iter()
            .find(|a| a.kind == AttachmentKind::Image)
    }
}

/// A message to send to the chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Chat identifier
    pub chat_id: String,

    /// Message content
    pub content: String,

    /// Message to quote
    pub reply_to: Option<String>,
}

impl OutgoingMessage {
    /// Create a `reply` quoting another message
    #[must_use]
    pub fn reply(chat_id: String, content: String, reply_to: String) -> Self {
        Self {
            chat_id,
            content,
            reply_to: Some(reply_to),
        }
    }
}

/// Trait for chat transport adapters
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name
    fn name(&self) -> &'static str;

    /// Connect to the transport
    async fn connect(&self) -> Result<()>;

    /// Disconnect from the transport
    async fn disconnect(&self) -> Result<()>;

    /// Send a message
    async fn send(&self, message: OutgoingMessage) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Show the composing signal in reaction to `message_id`
    ///
    /// Default implementation is a no-op for transports without one
    async fn send_typing(&self, _chat_id: &str, _message_id: &str) -> Result<()> {
        Ok(())
    }

    /// Fetch the bytes of an attachment
    async fn download_media(&self, attachment: &Attachment) -> Result<Vec<u8>>;

    /// Probe whether the transport is still usable
    async fn health_check(&self) -> Result<()>;
}
