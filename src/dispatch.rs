//! Per-message decision procedure
//!
//! The dispatcher is the single consumer of the inbound queue and the only
//! owner of the conversation, so one message is fully handled (classified,
//! appended, answered) before the next one starts and runs never overlap.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;

use crate::Result;
use crate::assistant::Conversation;
use crate::channels::{Channel, IncomingMessage, OutgoingMessage};
use crate::handlers::{HandlerContext, VideoHandler, handle_image, handle_music};
use crate::integrations::SpotifyClient;
use crate::intent::IntentClassifier;
use crate::links::{is_music_link, is_video_link};

/// Prefix for messages the bot decided not to answer
pub const IGNORE_MARKER: &str = "🔻🔻🔻 ";

/// Which optional routes are enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingFlags {
    /// Send music links to the music handler
    pub music_links: bool,
    /// Send image attachments to the image handler
    pub images: bool,
}

impl Default for RoutingFlags {
    fn default() -> Self {
        Self {
            music_links: true,
            images: true,
        }
    }
}

/// Human-looking pauses around a generic reply
#[derive(Debug, Clone)]
pub struct TypingDelay {
    /// Pause before the composing signal
    pub before: RangeInclusive<Duration>,
    /// Pause between the answer arriving and sending it
    pub after: RangeInclusive<Duration>,
}

impl Default for TypingDelay {
    fn default() -> Self {
        Self {
            before: Duration::from_secs(3)..=Duration::from_secs(10),
            after: Duration::from_secs(2)..=Duration::from_secs(5),
        }
    }
}

impl TypingDelay {
    /// No pauses at all
    #[must_use]
    pub const fn none() -> Self {
        Self {
            before: Duration::ZERO..=Duration::ZERO,
            after: Duration::ZERO..=Duration::ZERO,
        }
    }

    /// Uniform sample from `range`
    #[must_use]
    pub fn sample(range: &RangeInclusive<Duration>) -> Duration {
        let (low, high) = (*range.start(), *range.end());
        if high <= low {
            return low;
        }
        rand::thread_rng().gen_range(low..=high)
    }

    async fn pause(range: &RangeInclusive<Duration>) {
        let wait = Self::sample(range);
        if !wait.is_zero() {
            tracing::debug!(wait_ms = wait.as_millis(), "pausing before reply");
            tokio::time::sleep(wait).await;
        }
    }
}

/// Text appended to the conversation for an inbound message
#[must_use]
pub fn thread_entry(body: &str, should_respond: bool) -> String {
    if should_respond {
        body.to_string()
    } else {
        format!("{IGNORE_MARKER}{body}")
    }
}

/// Route picked for a message that warrants a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Video link
    Video,
    /// Music link
    Music,
    /// Image attachment
    Image,
    /// Plain assistant run
    Generic,
}

/// Owns the conversation and answers inbound messages one at a time
pub struct Dispatcher {
    conversation: Conversation,
    classifier: IntentClassifier,
    channel: Arc<dyn Channel>,
    video: VideoHandler,
    spotify: Option<Arc<SpotifyClient>>,
    routing: RoutingFlags,
    delay: TypingDelay,
    persona: String,
}

impl Dispatcher {
    /// Create a dispatcher with default routing and delays and no music client
    #[must_use]
    pub fn new(
        conversation: Conversation,
        classifier: IntentClassifier,
        channel: Arc<dyn Channel>,
        video: VideoHandler,
        persona: impl Into<String>,
    ) -> Self {
        Self {
            conversation,
            classifier,
            channel,
            video,
            spotify: None,
            routing: RoutingFlags::default(),
            delay: TypingDelay::default(),
            persona: persona.into(),
        }
    }

    /// Enable music metadata lookups
    #[must_use]
    pub fn with_spotify(mut self, spotify: Arc<SpotifyClient>) -> Self {
        self.spotify = Some(spotify);
        self
    }

    /// Override routing flags
    #[must_use]
    pub const fn with_routing(mut self, routing: RoutingFlags) -> Self {
        self.routing = routing;
        self
    }

    /// Override reply pauses
    #[must_use]
    pub fn with_delay(mut self, delay: TypingDelay) -> Self {
        self.delay = delay;
        self
    }

    /// The conversation every message lands in
    #[must_use]
    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Pick the route for a message that warrants a reply
    #[must_use]
    pub fn route(&self, message: &IncomingMessage) -> Route {
        if is_video_link(&message.content) {
            Route::Video
        } else if self.routing.music_links && is_music_link(&message.content) {
            if self.spotify.is_some() {
                Route::Music
            } else {
                tracing::debug!("music link but no music client configured");
                Route::Generic
            }
        } else if self.routing.images && message.first_image().is_some() {
            Route::Image
        } else {
            Route::Generic
        }
    }

    /// Consume the inbound queue until it closes
    ///
    /// Errors are logged per message and never stop the loop.
    pub async fn run(self, mut inbound: mpsc::Receiver<IncomingMessage>) {
        tracing::info!(thread_id = %self.conversation.thread_id(), "dispatcher started");

        while let Some(message) = inbound.recv().await {
            if let Err(e) = self.handle(&message).await {
                tracing::error!(message_id = %message.id, error = %e, "message handling failed");
            }
        }

        tracing::info!("inbound queue closed, dispatcher stopped");
    }

    /// Handle one inbound message
    ///
    /// # Errors
    ///
    /// Returns error if appending to the conversation or answering fails
    pub async fn handle(&self, message: &IncomingMessage) -> Result<()> {
        tracing::info!(
            message_id = %message.id,
            from = %message.sender_id,
            body = %message.content,
            "message received"
        );

        let decision = self.classifier.classify(&message.content).await;

        self.conversation
            .append_text(thread_entry(&message.content, decision.should_respond))
            .await?;

        if !decision.should_respond {
            tracing::debug!(message_id = %message.id, "no reply warranted, marked in thread");
            return Ok(());
        }

        let ctx = HandlerContext {
            conversation: &self.conversation,
            channel: self.channel.as_ref(),
            message,
            persona: &self.persona,
        };

        let route = self.route(message);
        tracing::debug!(message_id = %message.id, ?route, "routing message");

        match route {
            Route::Video => self.video.handle(ctx).await,
            Route::Music => match &self.spotify {
                Some(spotify) => handle_music(ctx, spotify).await,
                None => self.reply_generic(message).await,
            },
            Route::Image => match message.first_image() {
                Some(image) => handle_image(ctx, image).await,
                None => self.reply_generic(message).await,
            },
            Route::Generic => self.reply_generic(message).await,
        }
    }

    async fn reply_generic(&self, message: &IncomingMessage) -> Result<()> {
        TypingDelay::pause(&self.delay.before).await;

        if let Err(e) = self.channel.send_typing(&message.chat_id, &message.id).await {
            tracing::debug!(error = %e, "typing indicator failed");
        }

        let text = self.conversation.reply_text().await;
        tracing::info!(message_id = %message.id, "assistant answered");

        TypingDelay::pause(&self.delay.after).await;

        self.channel
            .send(OutgoingMessage::reply(
                message.chat_id.clone(),
                text,
                message.id.clone(),
            ))
            .await
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("conversation", &self.conversation)
            .field("channel", &self.channel.name())
            .field("routing", &self.routing)
            .field("persona", &self.persona)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_entry_marks_negative() {
        assert_eq!(thread_entry("hallo", true), "hallo");
        assert_eq!(thread_entry("hallo", false), "🔻🔻🔻 hallo");
    }

    #[test]
    fn test_sample_stays_in_range() {
        let range = Duration::from_millis(10)..=Duration::from_millis(20);
        for _ in 0..100 {
            let d = TypingDelay::sample(&range);
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }
        assert_eq!(TypingDelay::sample(&TypingDelay::none().before), Duration::ZERO);
    }
}
