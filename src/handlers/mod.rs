//! Specialized handlers for messages that need extra context
//!
//! Each handler fetches or transforms something (a transcript, music
//! metadata, an image), appends it to the conversation as a user message
//! and lets the assistant answer. Short-circuit messages for the chat are
//! sent by the handler itself.

mod image;
mod music;
mod video;

pub use image::{IMAGE_DOWNLOAD_FAILED, IMAGE_FAILED, handle_image, image_instruction};
pub use music::{
    MUSIC_FAILED, MUSIC_NOT_FOUND, MUSIC_TOKEN_FAILED, MUSIC_UNPARSEABLE, build_music_prompt,
    handle_music,
};
pub use video::{SUMMARY_FAILED, TRANSCRIPT_MISSING, VideoHandler, video_context};

use crate::Result;
use crate::assistant::Conversation;
use crate::channels::{Channel, IncomingMessage, OutgoingMessage};

/// What every handler works against
#[derive(Clone, Copy)]
pub struct HandlerContext<'a> {
    /// The shared conversation
    pub conversation: &'a Conversation,
    /// Transport to answer on
    pub channel: &'a dyn Channel,
    /// Message being handled
    pub message: &'a IncomingMessage,
    /// Name the assistant speaks as
    pub persona: &'a str,
}

impl HandlerContext<'_> {
    /// Reply to the message, quoting it
    ///
    /// # Errors
    ///
    /// Returns error if the channel rejects the message
    pub async fn reply(&self, text: impl Into<String>) -> Result<()> {
        self.channel
            .send(OutgoingMessage::reply(
                self.message.chat_id.clone(),
                text.into(),
                self.message.id.clone(),
            ))
            .await
    }

    /// Run the assistant on the conversation and reply with its outcome
    ///
    /// # Errors
    ///
    /// Returns error if the reply cannot be sent
    pub async fn run_and_reply(&self) -> Result<()> {
        let text = self.conversation.reply_text().await;
        self.reply(text).await
    }
}

impl std::fmt::Debug for HandlerContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("conversation", self.conversation)
            .field("channel", &self.channel.name())
            .field("message_id", &self.message.id)
            .field("persona", &self.persona)
            .finish()
    }
}
