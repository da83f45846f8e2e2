//! Conversational AI collaborator
//!
//! Two seams are exposed as traits so the dispatcher can run against any
//! backend (and against mocks in tests):
//! - [`AssistantBackend`] for the stateful thread / run / file API
//! - [`CompletionBackend`] for stateless chat completions

pub mod content;
mod conversation;
mod openai;
mod run;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use content::{ContentPart, MessageContent, render_content};
pub use conversation::Conversation;
pub use openai::{DEFAULT_BASE_URL, OpenAiClient};
pub use run::{NO_REPLY_TEXT, RUN_FAILED_TEXT, RunOutcome, RunPolicy};

use crate::Result;

/// Author of a thread entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End user (every chat message, every synthesized context message)
    User,
    /// The assistant profile
    Assistant,
}

/// Image detail hint for vision input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    /// Cheap low-resolution pass
    Low,
}

/// Reference to an uploaded file used as image input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageFileRef {
    /// Uploaded file id
    pub file_id: String,
    /// Detail hint
    pub detail: ImageDetail,
}

/// One part of an outgoing multi-part message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NewPart {
    /// Plain text
    Text {
        /// Text body
        text: String,
    },
    /// Uploaded image
    ImageFile {
        /// File reference
        image_file: ImageFileRef,
    },
}

/// Content of an outgoing thread message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum NewContent {
    /// Plain string content
    Text(String),
    /// Ordered parts
    Parts(Vec<NewPart>),
}

/// A message to append to a thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMessage {
    /// Author role
    pub role: Role,
    /// Content
    pub content: NewContent,
}

impl NewMessage {
    /// Create a plain-text user message
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: NewContent::Text(text.into()),
        }
    }

    /// Create a multi-part user message
    #[must_use]
    pub const fn user_parts(parts: Vec<NewPart>) -> Self {
        Self {
            role: Role::User,
            content: NewContent::Parts(parts),
        }
    }

    /// Plain text of the message, if it is a plain-text message
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            NewContent::Text(text) => Some(text),
            NewContent::Parts(_) => None,
        }
    }
}

/// Status of a run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Waiting to start
    Queued,
    /// Generating
    InProgress,
    /// Waiting for tool output
    RequiresAction,
    /// Cancellation requested
    Cancelling,
    /// Finished with a reply
    Completed,
    /// Finished with an error
    Failed,
    /// Cancelled before finishing
    Cancelled,
    /// Timed out on the backend side
    Expired,
    /// Finished but truncated
    Incomplete,
    /// Any status this client does not know yet
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether polling can stop
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Expired | Self::Incomplete
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Incomplete => "incomplete",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A run against a thread
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Run {
    /// Run id
    pub id: String,
    /// Current status
    pub status: RunStatus,
}

/// An entry read back from a thread
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadMessage {
    /// Message id
    pub id: String,
    /// Author role
    pub role: Role,
    /// Run that produced the message (assistant messages only)
    #[serde(default)]
    pub run_id: Option<String>,
    /// Raw content; rendered through [`MessageContent`]
    #[serde(default)]
    pub content: serde_json::Value,
}

/// A message in a stateless completion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// "system" or "user"
    pub role: &'static str,
    /// Text content
    pub content: String,
}

impl ChatMessage {
    /// System message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    /// User message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// Stateless completion request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,
    /// Prompt messages
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature; backend default when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Stateful thread / run / file API
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Create a new thread and return its id
    async fn create_thread(&self) -> Result<String>;

    /// Append a message to a thread
    async fn append_message(&self, thread_id: &str, message: &NewMessage) -> Result<()>;

    /// Start a run of `assistant_id` against a thread
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run>;

    /// Fetch the current state of a run
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    /// Ask the backend to cancel a run
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()>;

    /// List thread messages, newest first
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>>;

    /// Upload a local file and return its file id
    async fn upload_file(&self, path: &Path, purpose: &str) -> Result<String>;
}

/// Stateless text completion
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run one completion and return the text of the first choice
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}
