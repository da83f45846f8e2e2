//! Video links: transcript, summary, assistant reaction

use std::sync::Arc;

use super::HandlerContext;
use crate::Result;
use crate::assistant::{ChatMessage, CompletionBackend, CompletionRequest, RUN_FAILED_TEXT};
use crate::integrations::TranscriptSource;
use crate::links::video_url;

/// Reply when no transcript could be extracted
pub const TRANSCRIPT_MISSING: &str = "⚠️ Kon geen transcript vinden voor deze video.";

/// Reply when the transcript could not be summarized
pub const SUMMARY_FAILED: &str = "⚠️ Kon de video niet samenvatten.";

const SUMMARIZER_PROMPT: &str = "Je bent een AI die YouTube-transcripties samenvat.";

/// Summarizes linked videos and lets the assistant react to the summary
pub struct VideoHandler {
    transcripts: Arc<dyn TranscriptSource>,
    completion: Arc<dyn CompletionBackend>,
    summary_model: String,
}

impl VideoHandler {
    /// Create a video handler
    #[must_use]
    pub fn new(
        transcripts: Arc<dyn TranscriptSource>,
        completion: Arc<dyn CompletionBackend>,
        summary_model: impl Into<String>,
    ) -> Self {
        Self {
            transcripts,
            completion,
            summary_model: summary_model.into(),
        }
    }

    /// Handle a message containing a video link
    ///
    /// # Errors
    ///
    /// Returns error if the reply cannot be sent
    pub async fn handle(&self, ctx: HandlerContext<'_>) -> Result<()> {
        let url = video_url(&ctx.message.content);
        tracing::info!(url = %url, "video link, fetching transcript");

        let transcript = match self.transcripts.transcript(&url).await {
            Ok(transcript) => transcript,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "no transcript");
                return ctx.reply(TRANSCRIPT_MISSING).await;
            }
        };

        let summary = match self.summarize(&transcript).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "summarization failed");
                return ctx.reply(SUMMARY_FAILED).await;
            }
        };

        if let Err(e) = ctx
            .conversation
            .append_text(video_context(&summary, ctx.persona))
            .await
        {
            tracing::error!(url = %url, error = %e, "appending video summary failed");
            return ctx.reply(RUN_FAILED_TEXT).await;
        }
        ctx.run_and_reply().await
    }

    async fn summarize(&self, transcript: &str) -> Result<String> {
        let request = CompletionRequest {
            model: self.summary_model.clone(),
            messages: vec![
                ChatMessage::system(SUMMARIZER_PROMPT),
                ChatMessage::user(format!("Vat deze transcriptie samen: {transcript}")),
            ],
            temperature: None,
        };

        self.completion.complete(request).await
    }
}

impl std::fmt::Debug for VideoHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoHandler")
            .field("summary_model", &self.summary_model)
            .finish_non_exhaustive()
    }
}

/// Context message appended before the assistant reacts to a video
#[must_use]
pub fn video_context(summary: &str, persona: &str) -> String {
    format!("Samenvatting van de video:\n{summary}\n\nReageer zoals {persona}.")
}
