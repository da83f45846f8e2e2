//! `WhatsApp` channel adapter
//!
//! Uses the `WhatsApp` Cloud API for sending, typing signals and media.
//! Inbound messages arrive through the webhook router, which hands the
//! payload to [`WhatsAppChannel::handle_webhook`].

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use reqwest::{Client, Proxy, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::{Mutex, mpsc};

use super::{Attachment, Channel, IncomingMessage, OutgoingMessage};
use crate::{Error, Result};

/// Graph API base URL
pub const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v18.0";

/// Capacity of the inbound queue
const INBOUND_QUEUE: usize = 100;

/// Recent message ids remembered to drop webhook redeliveries
const SEEN_IDS: usize = 1024;

/// `WhatsApp` channel adapter
pub struct WhatsAppChannel {
    /// Cloud API access token
    access_token: SecretString,
    /// Phone number ID for sending messages
    phone_number_id: String,
    api_base: String,
    client: Client,
    message_tx: mpsc::Sender<IncomingMessage>,
    /// Message ids already queued
    seen: Mutex<LruCache<String, ()>>,
    connected: AtomicBool,
}

#[derive(Debug, Deserialize)]
struct MediaInfo {
    url: String,
}

impl WhatsAppChannel {
    /// Create the adapter and the receiver for inbound messages
    ///
    /// All outbound traffic goes through `proxy` when given (e.g.
    /// `socks5h://127.0.0.1:9150`).
    ///
    /// # Errors
    ///
    /// Returns error if the proxy URL is invalid or the HTTP client cannot be built
    pub fn with_receiver(
        access_token: SecretString,
        phone_number_id: String,
        proxy: Option<&str>,
    ) -> Result<(Self, mpsc::Receiver<IncomingMessage>)> {
        let mut builder = Client::builder().timeout(Duration::from_secs(30));
        if let Some(proxy) = proxy {
            let proxy = Proxy::all(proxy)
                .map_err(|e| Error::Config(format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
        let seen_capacity = NonZeroUsize::new(SEEN_IDS).unwrap_or(NonZeroUsize::MIN);
        let channel = Self {
            access_token,
            phone_number_id,
            api_base: DEFAULT_API_BASE.to_string(),
            client: builder.build()?,
            message_tx: tx,
            seen: Mutex::new(LruCache::new(seen_capacity)),
            connected: AtomicBool::new(false),
        };
        Ok((channel, rx))
    }

    /// Point the adapter at another Graph API base
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(self.access_token.expose_secret())
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.api_base, self.phone_number_id)
    }

    /// Process an incoming `WhatsApp` webhook event
    ///
    /// The Cloud API redelivers events it considers unacknowledged, so
    /// message ids already queued are skipped. Returns how many messages
    /// were queued for dispatch.
    ///
    /// # Errors
    ///
    /// Returns error if the dispatcher queue is closed
    pub async fn handle_webhook(&self, payload: &WhatsAppWebhook) -> Result<usize> {
        let mut queued = 0;

        for incoming in parse_webhook(payload) {
            if !self.first_delivery(&incoming.id).await {
                tracing::debug!(id = %incoming.id, "WhatsApp redelivery skipped");
                continue;
            }

            tracing::debug!(
                id = %incoming.id,
                from = %incoming.sender_id,
                "WhatsApp message received"
            );
            self.message_tx
                .send(incoming)
                .await
                .map_err(|e| Error::Channel(format!("Failed to forward message: {e}")))?;
            queued += 1;
        }

        Ok(queued)
    }

    /// Record a message id; false if it was seen before
    async fn first_delivery(&self, id: &str) -> bool {
        let mut seen = self.seen.lock().await;
        if seen.get(id).is_some() {
            return false;
        }
        seen.put(id.to_string(), ());
        true
    }

    /// Send a text message, optionally quoting another message
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn send_text(&self, to: &str, text: &str, reply_to: Option<&str>) -> Result<()> {
        let mut body = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": {
                "body": text,
                "preview_url": true
            }
        });

        if let Some(message_id) = reply_to {
            body["context"] = serde_json::json!({
                "message_id": message_id
            });
        }

        let response = self
            .authorized(self.client.post(self.messages_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("WhatsApp API error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "WhatsApp API error: {status} - {body}"
            )));
        }

        tracing::debug!(to, "WhatsApp message sent");
        Ok(())
    }

    async fn fetch_media(&self, media_id: &str) -> Result<Vec<u8>> {
        let info_url = format!("{}/{media_id}", self.api_base);
        let response = self
            .authorized(self.client.get(&info_url))
            .send()
            .await
            .map_err(|e| Error::Attachment(format!("media lookup failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Attachment(format!(
                "media lookup failed: {}",
                response.status()
            )));
        }

        let info: MediaInfo = response
            .json()
            .await
            .map_err(|e| Error::Attachment(format!("media lookup parse error: {e}")))?;

        let response = self
            .authorized(self.client.get(&info.url))
            .send()
            .await
            .map_err(|e| Error::Attachment(format!("media download failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Attachment(format!(
                "media download failed: {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Attachment(format!("media read failed: {e}")))?;

        tracing::debug!(media_id, size = bytes.len(), "WhatsApp media downloaded");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Channel for WhatsAppChannel {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    async fn connect(&self) -> Result<()> {
        if self.access_token.expose_secret().is_empty() {
            return Err(Error::Channel(
                "WhatsApp access token required".to_string(),
            ));
        }
        if self.phone_number_id.is_empty() {
            return Err(Error::Channel(
                "WhatsApp phone number ID required".to_string(),
            ));
        }

        self.health_check().await?;
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(phone_number_id = %self.phone_number_id, "WhatsApp channel connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        tracing::info!("WhatsApp channel disconnected");
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        self.send_text(&message.chat_id, &message.content, message.reply_to.as_deref())
            .await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_typing(&self, _chat_id: &str, message_id: &str) -> Result<()> {
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": message_id,
            "typing_indicator": { "type": "text" }
        });

        let response = self
            .authorized(self.client.post(self.messages_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("typing indicator failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Channel(format!(
                "typing indicator failed: {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn download_media(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        if let Some(data) = &attachment.data {
            return Ok(data.clone());
        }

        let Some(media_id) = attachment.media_id.as_deref() else {
            return Err(Error::Attachment("attachment has no media id".to_string()));
        };

        self.fetch_media(media_id).await
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/{}", self.api_base, self.phone_number_id);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| {
                self.connected.store(false, Ordering::SeqCst);
                Error::Channel(format!("health probe failed: {e}"))
            })?;

        if !response.status().is_success() {
            self.connected.store(false, Ordering::SeqCst);
            return Err(Error::Channel(format!(
                "health probe failed: {}",
                response.status()
            )));
        }

        Ok(())
    }
}

impl std::fmt::Debug for WhatsAppChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppChannel")
            .field("phone_number_id", &self.phone_number_id)
            .field("api_base", &self.api_base)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Turn a webhook payload into inbound messages
///
/// Text bodies win over captions. Messages with neither text nor media are
/// skipped (reactions, status updates).
#[must_use]
pub fn parse_webhook(payload: &WhatsAppWebhook) -> Vec<IncomingMessage> {
    let mut out = Vec::new();

    for entry in &payload.entry {
        for change in &entry.changes {
            let Some(messages) = &change.value.messages else {
                continue;
            };

            for msg in messages {
                let mut content = msg
                    .text
                    .as_ref()
                    .map(|t| t.body.clone())
                    .unwrap_or_default();

                let mut attachments = Vec::new();
                let media = [
                    (msg.image.as_ref(), "image/jpeg"),
                    (msg.video.as_ref(), "video/mp4"),
                    (msg.audio.as_ref(), "audio/ogg"),
                    (msg.document.as_ref(), "application/octet-stream"),
                ];

                for (item, fallback_mime) in media {
                    let Some(item) = item else { continue };
                    if content.is_empty()
                        && let Some(caption) = &item.caption
                    {
                        content.clone_from(caption);
                    }
                    let mime = item
                        .mime_type
                        .clone()
                        .unwrap_or_else(|| fallback_mime.to_string());
                    attachments.push(Attachment::from_media_id(
                        item.id.clone(),
                        mime,
                        item.filename.clone(),
                    ));
                }

                if content.is_empty() && attachments.is_empty() {
                    continue;
                }

                out.push(IncomingMessage {
                    id: msg.id.clone(),
                    chat_id: msg.from.clone(),
                    sender_id: msg.from.clone(),
                    content,
                    attachments,
                });
            }
        }
    }

    out
}

/// `WhatsApp` webhook payload from Cloud API
#[derive(Debug, Deserialize)]
pub struct WhatsAppWebhook {
    /// Webhook entries
    #[serde(default)]
    pub entry: Vec<WhatsAppWebhookEntry>,
}

/// `WhatsApp` webhook entry
#[derive(Debug, Deserialize)]
pub struct WhatsAppWebhookEntry {
    /// Changes in this entry
    #[serde(default)]
    pub changes: Vec<WhatsAppWebhookChange>,
}

/// `WhatsApp` webhook change
#[derive(Debug, Deserialize)]
pub struct WhatsAppWebhookChange {
    /// The change value
    pub value: WhatsAppWebhookValue,
}

/// `WhatsApp` webhook value containing messages
#[derive(Debug, Deserialize)]
pub struct WhatsAppWebhookValue {
    /// Incoming messages (absent for status callbacks)
    pub messages: Option<Vec<WhatsAppMessage>>,
}

/// `WhatsApp` message
#[derive(Debug, Deserialize)]
pub struct WhatsAppMessage {
    /// Sender phone number
    pub from: String,
    /// Message ID
    pub id: String,
    /// Text content (for text messages)
    pub text: Option<WhatsAppTextContent>,
    /// Image content
    pub image: Option<WhatsAppMedia>,
    /// Document content
    pub document: Option<WhatsAppMedia>,
    /// Audio content
    pub audio: Option<WhatsAppMedia>,
    /// Video content
    pub video: Option<WhatsAppMedia>,
}

/// `WhatsApp` media object
#[derive(Debug, Deserialize)]
pub struct WhatsAppMedia {
    /// Media ID (use to fetch URL)
    pub id: String,
    /// MIME type
    pub mime_type: Option<String>,
    /// Caption
    pub caption: Option<String>,
    /// Filename (documents)
    pub filename: Option<String>,
}

/// `WhatsApp` text message content
#[derive(Debug, Deserialize)]
pub struct WhatsAppTextContent {
    /// Message body
    pub body: String,
}
