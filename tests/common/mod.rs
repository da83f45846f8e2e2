//! Shared test utilities
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Path as UrlPath;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use thread_relay::assistant::{
    AssistantBackend, CompletionBackend, CompletionRequest, Conversation, NewMessage, Role, Run,
    RunPolicy, RunStatus, ThreadMessage,
};
use thread_relay::channels::{Attachment, Channel, IncomingMessage, OutgoingMessage};
use thread_relay::integrations::TranscriptSource;
use thread_relay::{Error, Result};
use tokio::sync::Mutex;

/// Thread id every mock conversation uses
pub const THREAD_ID: &str = "thread_test";

/// Build a plain-text inbound message
pub fn text_message(id: &str, body: &str) -> IncomingMessage {
    IncomingMessage {
        id: id.to_string(),
        chat_id: "31600000000".to_string(),
        sender_id: "31600000000".to_string(),
        content: body.to_string(),
        attachments: Vec::new(),
    }
}

/// Build an inbound message carrying one image
pub fn image_message(id: &str, caption: &str) -> IncomingMessage {
    IncomingMessage {
        attachments: vec![Attachment::from_media_id(
            "media-1".to_string(),
            "image/jpeg".to_string(),
            None,
        )],
        ..text_message(id, caption)
    }
}

/// Polling policy that never sleeps long
pub fn fast_policy(max_attempts: u32) -> RunPolicy {
    RunPolicy {
        poll_interval: Duration::from_millis(1),
        max_attempts,
        max_duration: Duration::from_secs(5),
    }
}

/// Mock channel for testing
#[derive(Default)]
pub struct MockChannel {
    pub sent_messages: Arc<Mutex<Vec<OutgoingMessage>>>,
    pub typing: AtomicUsize,
    pub media: Option<Vec<u8>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel whose media downloads return `bytes`
    pub fn with_media(bytes: Vec<u8>) -> Self {
        Self {
            media: Some(bytes),
            ..Self::default()
        }
    }

    pub async fn get_sent_messages(&self) -> Vec<OutgoingMessage> {
        self.sent_messages.lock().await.clone()
    }

    pub async fn sent_texts(&self) -> Vec<String> {
        self.get_sent_messages()
            .await
            .into_iter()
            .map(|m| m.content)
            .collect()
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        self.sent_messages.lock().await.push(message);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn send_typing(&self, _chat_id: &str, _message_id: &str) -> Result<()> {
        self.typing.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn download_media(&self, _attachment: &Attachment) -> Result<Vec<u8>> {
        self.media
            .clone()
            .ok_or_else(|| Error::Attachment("no media".to_string()))
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Scripted assistant backend
///
/// `create_run` returns a queued run; each `retrieve_run` pops the next
/// scripted status and reports `exhausted` once the script runs out.
/// Like the real API, appends are rejected while a run is still active
/// and a cancelled run reports `cancelled` on its next status check.
pub struct MockAssistant {
    pub appended: Mutex<Vec<NewMessage>>,
    pub uploads: Mutex<Vec<(PathBuf, bool)>>,
    statuses: Mutex<VecDeque<RunStatus>>,
    exhausted: RunStatus,
    pub reply: String,
    pub runs_created: AtomicUsize,
    pub polls: AtomicUsize,
    pub cancels: AtomicUsize,
    pub threads_created: AtomicUsize,
    run_active: AtomicBool,
    cancel_requested: AtomicBool,
    failing_polls: AtomicUsize,
    pub appends_allowed: Option<usize>,
    pub fail_run: bool,
    pub fail_upload: bool,
}

impl MockAssistant {
    /// Backend whose first run completes after `polls` status checks and
    /// whose later runs complete on the first check
    pub fn completing(polls: usize, reply: &str) -> Self {
        let warmup = std::iter::repeat_n(RunStatus::InProgress, polls.saturating_sub(1));
        Self {
            exhausted: RunStatus::Completed,
            ..Self::scripted(warmup, reply)
        }
    }

    /// Backend following an explicit status script, stuck `in_progress` after
    pub fn scripted(statuses: impl IntoIterator<Item = RunStatus>, reply: &str) -> Self {
        Self {
            appended: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            statuses: Mutex::new(statuses.into_iter().collect()),
            exhausted: RunStatus::InProgress,
            reply: reply.to_string(),
            runs_created: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            threads_created: AtomicUsize::new(0),
            run_active: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            failing_polls: AtomicUsize::new(0),
            appends_allowed: None,
            fail_run: false,
            fail_upload: false,
        }
    }

    /// Reject every append
    pub fn rejecting_appends(self) -> Self {
        self.rejecting_appends_after(0)
    }

    /// Accept the first `n` appends and reject the rest
    pub fn rejecting_appends_after(mut self, n: usize) -> Self {
        self.appends_allowed = Some(n);
        self
    }

    /// Reject every `create_run`
    pub fn rejecting_runs(mut self) -> Self {
        self.fail_run = true;
        self
    }

    /// Reject every upload
    pub fn rejecting_uploads(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    /// Fail the next `n` status checks with a transient error
    pub fn failing_first_polls(self, n: usize) -> Self {
        self.failing_polls.store(n, Ordering::SeqCst);
        self
    }

    /// Whether a run is still holding the thread
    pub fn run_active(&self) -> bool {
        self.run_active.load(Ordering::SeqCst)
    }

    /// Plain-text bodies of every appended message, in order
    pub async fn appended_texts(&self) -> Vec<String> {
        self.appended
            .lock()
            .await
            .iter()
            .map(|m| m.as_text().unwrap_or("<parts>").to_string())
            .collect()
    }
}

#[async_trait]
impl AssistantBackend for MockAssistant {
    async fn create_thread(&self) -> Result<String> {
        self.threads_created.fetch_add(1, Ordering::SeqCst);
        Ok(THREAD_ID.to_string())
    }

    async fn append_message(&self, _thread_id: &str, message: &NewMessage) -> Result<()> {
        if self.run_active() {
            return Err(Error::Assistant(
                "400 - can't add messages while a run is active".to_string(),
            ));
        }
        let mut appended = self.appended.lock().await;
        if self.appends_allowed.is_some_and(|n| appended.len() >= n) {
            return Err(Error::Assistant("append rejected".to_string()));
        }
        appended.push(message.clone());
        Ok(())
    }

    async fn create_run(&self, _thread_id: &str, _assistant_id: &str) -> Result<Run> {
        if self.fail_run {
            return Err(Error::Assistant("create run rejected".to_string()));
        }
        let n = self.runs_created.fetch_add(1, Ordering::SeqCst) + 1;
        self.run_active.store(true, Ordering::SeqCst);
        self.cancel_requested.store(false, Ordering::SeqCst);
        Ok(Run {
            id: format!("run_{n}"),
            status: RunStatus::Queued,
        })
    }

    async fn retrieve_run(&self, _thread_id: &str, run_id: &str) -> Result<Run> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Assistant("retrieve run failed: 502 Bad Gateway".to_string()));
        }
        let status = if self.cancel_requested.load(Ordering::SeqCst) {
            RunStatus::Cancelled
        } else {
            self.statuses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| self.exhausted.clone())
        };
        if status.is_terminal() {
            self.run_active.store(false, Ordering::SeqCst);
        }
        Ok(Run {
            id: run_id.to_string(),
            status,
        })
    }

    async fn cancel_run(&self, _thread_id: &str, _run_id: &str) -> Result<()> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.cancel_requested.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn list_messages(&self, _thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let run_id = format!("run_{}", self.runs_created.load(Ordering::SeqCst));
        Ok(vec![
            ThreadMessage {
                id: "msg_2".to_string(),
                role: Role::Assistant,
                run_id: Some(run_id),
                content: json!([
                    {"type": "text", "text": {"value": self.reply, "annotations": []}}
                ]),
            },
            ThreadMessage {
                id: "msg_1".to_string(),
                role: Role::User,
                run_id: None,
                content: json!([{"type": "text", "text": {"value": "vraag"}}]),
            },
        ])
    }

    async fn upload_file(&self, path: &Path, purpose: &str) -> Result<String> {
        assert_eq!(purpose, "vision");
        self.uploads
            .lock()
            .await
            .push((path.to_path_buf(), path.exists()));
        if self.fail_upload {
            return Err(Error::Assistant("upload rejected".to_string()));
        }
        Ok("file_123".to_string())
    }
}

/// Completion backend with one fixed behaviour
pub struct MockCompletion {
    answer: std::result::Result<String, String>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletion {
    pub fn answering(text: &str) -> Self {
        Self {
            answer: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            answer: Err(message.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub async fn calls(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl CompletionBackend for MockCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.requests.lock().await.push(request);
        self.answer.clone().map_err(Error::Completion)
    }
}

/// Transcript source with one fixed behaviour
pub struct MockTranscript {
    answer: std::result::Result<String, String>,
    pub urls: Mutex<Vec<String>>,
}

impl MockTranscript {
    pub fn returning(text: &str) -> Self {
        Self {
            answer: Ok(text.to_string()),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            answer: Err(message.to_string()),
            urls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TranscriptSource for MockTranscript {
    async fn transcript(&self, video_url: &str) -> Result<String> {
        self.urls.lock().await.push(video_url.to_string());
        self.answer.clone().map_err(Error::Transcript)
    }
}

/// Conversation on the mock backend with fast polling
pub fn conversation(backend: Arc<MockAssistant>) -> Conversation {
    Conversation::new(backend, THREAD_ID, "asst_test", fast_policy(50))
}

/// In-process fake of the Spotify token and metadata endpoints
pub struct FakeSpotify {
    pub base_url: String,
    pub token_requests: Arc<AtomicUsize>,
}

impl FakeSpotify {
    pub fn token_url(&self) -> String {
        format!("{}/api/token", self.base_url)
    }

    pub fn api_base(&self) -> String {
        format!("{}/v1", self.base_url)
    }
}

/// Start the fake Spotify server on an ephemeral port
///
/// Resource id `missing` answers 404; anything without the issued bearer
/// token answers 401.
pub async fn spawn_fake_spotify() -> FakeSpotify {
    let token_requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&token_requests);

    let app = Router::new()
        .route(
            "/api/token",
            post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!({
                        "access_token": "fake-token",
                        "token_type": "Bearer",
                        "expires_in": 3600
                    }))
                }
            }),
        )
        .route("/v1/{collection}/{id}", get(fake_metadata));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake spotify");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake spotify server");
    });

    FakeSpotify {
        base_url: format!("http://{addr}"),
        token_requests,
    }
}

async fn fake_metadata(
    UrlPath((collection, id)): UrlPath<(String, String)>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer fake-token");
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"})));
    }
    if id == "missing" {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "not found"})));
    }

    let body = match collection.as_str() {
        "tracks" => json!({
            "name": "Never Gonna Give You Up",
            "artists": [{"name": "Rick Astley"}],
            "album": {"name": "Whenever You Need Somebody"}
        }),
        "playlists" => json!({
            "name": "Vrijdagmiddag",
            "owner": {"display_name": "kees"},
            "tracks": {"total": 42}
        }),
        _ => json!({"name": "Iets"}),
    };
    (StatusCode::OK, Json(body))
}
