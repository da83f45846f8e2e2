//! `OpenAI` Assistants (v2) and chat completions over REST

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use super::{
    AssistantBackend, CompletionBackend, CompletionRequest, NewMessage, Run, ThreadMessage,
};
use crate::{Error, Result};

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Page size when reading back thread messages
const MESSAGE_PAGE_SIZE: u32 = 20;

/// `OpenAI` REST client
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiClient {
    /// Create a client against the public API
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty or the HTTP client cannot be built
    pub fn new(api_key: SecretString) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client against a custom base URL
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty or the HTTP client cannot be built
    pub fn with_base_url(api_key: SecretString, base_url: impl Into<String>) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required".to_string()));
        }

        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(self.api_key.expose_secret())
            .header("OpenAI-Beta", "assistants=v2")
    }

    /// Send a request and turn non-success statuses into `Error::Assistant`
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| Error::Assistant(format!("{what} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Assistant(format!("{what} failed: {status} - {body}")));
        }

        Ok(response)
    }
}

#[async_trait]
impl AssistantBackend for OpenAiClient {
    async fn create_thread(&self) -> Result<String> {
        let response = self
            .send(self.client.post(self.url("threads")).json(&json!({})), "create thread")
            .await?;
        let thread: IdResponse = response.json().await?;
        Ok(thread.id)
    }

    async fn append_message(&self, thread_id: &str, message: &NewMessage) -> Result<()> {
        let url = self.url(&format!("threads/{thread_id}/messages"));
        self.send(self.client.post(url).json(message), "append message")
            .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        let url = self.url(&format!("threads/{thread_id}/runs"));
        let response = self
            .send(
                self.client
                    .post(url)
                    .json(&json!({ "assistant_id": assistant_id })),
                "create run",
            )
            .await?;
        Ok(response.json().await?)
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let url = self.url(&format!("threads/{thread_id}/runs/{run_id}"));
        let response = self.send(self.client.get(url), "retrieve run").await?;
        Ok(response.json().await?)
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        let url = self.url(&format!("threads/{thread_id}/runs/{run_id}/cancel"));
        self.send(self.client.post(url), "cancel run").await?;
        Ok(())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let url = self.url(&format!("threads/{thread_id}/messages"));
        let limit = MESSAGE_PAGE_SIZE.to_string();
        let response = self
            .send(
                self.client
                    .get(url)
                    .query(&[("order", "desc"), ("limit", limit.as_str())]),
                "list messages",
            )
            .await?;
        let list: MessageList = response.json().await?;
        Ok(list.data)
    }

    async fn upload_file(&self, path: &Path, purpose: &str) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());

        let form = reqwest::multipart::Form::new()
            .text("purpose", purpose.to_string())
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );

        let response = self
            .send(self.client.post(self.url("files")).multipart(form), "upload file")
            .await?;
        let file: IdResponse = response.json().await?;

        tracing::debug!(file_id = %file.id, purpose, "file uploaded");
        Ok(file.id)
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Completion(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Completion(format!("API error: {status} - {body}")));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Completion(format!("failed to parse response: {e}")))?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Completion("empty completion".to_string()))
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
