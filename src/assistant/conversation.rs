//! The single shared conversation

use std::path::Path;
use std::sync::Arc;

use super::run::{RUN_FAILED_TEXT, run_to_outcome};
use super::{AssistantBackend, NewMessage, RunOutcome, RunPolicy};
use crate::Result;
use crate::store::ConversationStore;

/// The one thread every inbound message lands in
///
/// Owned by the dispatcher; not `Clone`, so runs against the thread can only
/// be started by its single owner.
pub struct Conversation {
    backend: Arc<dyn AssistantBackend>,
    thread_id: String,
    assistant_id: String,
    policy: RunPolicy,
}

impl Conversation {
    /// Attach to a known thread
    #[must_use]
    pub fn new(
        backend: Arc<dyn AssistantBackend>,
        thread_id: impl Into<String>,
        assistant_id: impl Into<String>,
        policy: RunPolicy,
    ) -> Self {
        Self {
            backend,
            thread_id: thread_id.into(),
            assistant_id: assistant_id.into(),
            policy,
        }
    }

    /// Load the persisted thread, or create and persist a new one
    ///
    /// The new handle is saved before anything is appended to it.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreadable, thread creation fails or
    /// the new handle cannot be saved
    pub async fn open_or_create(
        backend: Arc<dyn AssistantBackend>,
        store: &ConversationStore,
        assistant_id: impl Into<String>,
        policy: RunPolicy,
    ) -> Result<Self> {
        let thread_id = if let Some(id) = store.load()? {
            tracing::info!(thread_id = %id, "loaded stored conversation");
            id
        } else {
            tracing::info!(path = %store.path().display(), "no stored conversation, creating one");
            let id = backend.create_thread().await?;
            store.save(&id)?;
            tracing::info!(thread_id = %id, "created conversation");
            id
        };

        Ok(Self::new(backend, thread_id, assistant_id, policy))
    }

    /// Thread id
    #[must_use]
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Append a message
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the message
    pub async fn append(&self, message: &NewMessage) -> Result<()> {
        self.backend.append_message(&self.thread_id, message).await
    }

    /// Append a plain-text user message
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the message
    pub async fn append_text(&self, text: impl Into<String>) -> Result<()> {
        self.append(&NewMessage::user_text(text)).await
    }

    /// Upload a file for use in a later message
    ///
    /// # Errors
    ///
    /// Returns error if the upload fails
    pub async fn upload(&self, path: &Path, purpose: &str) -> Result<String> {
        self.backend.upload_file(path, purpose).await
    }

    /// Start a run, wait for it within the policy bounds, and read the reply
    ///
    /// # Errors
    ///
    /// Returns error if the run cannot be created or its reply cannot be listed
    pub async fn run_and_reply(&self) -> Result<RunOutcome> {
        run_to_outcome(
            self.backend.as_ref(),
            &self.thread_id,
            &self.assistant_id,
            &self.policy,
        )
        .await
    }

    /// Run the assistant and turn whatever happens into chat text
    ///
    /// Errors are logged and answered with the could-not-reply message.
    pub async fn reply_text(&self) -> String {
        match self.run_and_reply().await {
            Ok(outcome) => {
                tracing::debug!(thread_id = %self.thread_id, ?outcome, "run outcome");
                outcome.into_reply()
            }
            Err(e) => {
                tracing::error!(thread_id = %self.thread_id, error = %e, "run failed to start");
                RUN_FAILED_TEXT.to_string()
            }
        }
    }
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("thread_id", &self.thread_id)
            .field("assistant_id", &self.assistant_id)
            .finish_non_exhaustive()
    }
}
