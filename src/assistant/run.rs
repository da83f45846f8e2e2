//! Run orchestration: start a run, poll it to a terminal state, read the reply

use std::time::Duration;

use tokio::time::Instant;

use super::{AssistantBackend, Role, RunStatus, ThreadMessage, render_content};
use crate::Result;

/// Reply used when a completed run left no assistant message behind
pub const NO_REPLY_TEXT: &str = "Geen AI-antwoord ontvangen...";

/// Reply used when the run was truncated
const TRUNCATED_TEXT: &str = "Sorry, mijn antwoord werd afgebroken.";

/// Status checks spent waiting for a cancelled run to settle
const CANCEL_SETTLE_POLLS: u32 = 10;

/// Reply used when the run failed, was cancelled, never finished in time or
/// could not be started
pub const RUN_FAILED_TEXT: &str = "De AI kon niet reageren. Probeer later nog eens!";

/// Bounds for run polling
///
/// Polling happens at a fixed interval (no backoff) and stops at whichever
/// limit is hit first.
#[derive(Debug, Clone)]
pub struct RunPolicy {
    /// Delay between status checks
    pub poll_interval: Duration,
    /// Maximum number of status checks
    pub max_attempts: u32,
    /// Maximum wall-clock time spent polling
    pub max_duration: Duration,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            max_attempts: 120,
            max_duration: Duration::from_secs(180),
        }
    }
}

/// How a run ended, from the chat's point of view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Completed; carries the rendered reply
    Reply(String),
    /// Completed but cut off
    Truncated,
    /// Failed, cancelled or expired on the backend
    Failed(RunStatus),
    /// Polling bounds exceeded before a terminal status
    TimedOut,
}

impl RunOutcome {
    /// Text to send back to the chat
    #[must_use]
    pub fn into_reply(self) -> String {
        match self {
            Self::Reply(text) => text,
            Self::Truncated => TRUNCATED_TEXT.to_string(),
            Self::Failed(_) | Self::TimedOut => RUN_FAILED_TEXT.to_string(),
        }
    }
}

/// Create a run and drive it to an outcome
///
/// A failed status check counts as a spent attempt; polling carries on
/// until a terminal status or a bound. A run that never finishes is
/// cancelled so the thread accepts new messages again.
pub(super) async fn run_to_outcome(
    backend: &dyn AssistantBackend,
    thread_id: &str,
    assistant_id: &str,
    policy: &RunPolicy,
) -> Result<RunOutcome> {
    let mut run = backend.create_run(thread_id, assistant_id).await?;
    tracing::debug!(thread_id, run_id = %run.id, status = %run.status, "run created");

    let started = Instant::now();
    let mut attempts = 0_u32;

    while !run.status.is_terminal() {
        if attempts >= policy.max_attempts || started.elapsed() >= policy.max_duration {
            tracing::warn!(
                thread_id,
                run_id = %run.id,
                status = %run.status,
                attempts,
                elapsed_ms = started.elapsed().as_millis(),
                "run polling gave up"
            );
            cancel_and_settle(backend, thread_id, &run.id, policy.poll_interval).await;
            return Ok(RunOutcome::TimedOut);
        }

        tokio::time::sleep(policy.poll_interval).await;
        attempts += 1;
        match backend.retrieve_run(thread_id, &run.id).await {
            Ok(polled) => {
                run = polled;
                tracing::trace!(run_id = %run.id, status = %run.status, attempts, "run polled");
            }
            Err(e) => {
                tracing::warn!(run_id = %run.id, attempts, error = %e, "run poll failed");
            }
        }
    }

    tracing::info!(thread_id, run_id = %run.id, status = %run.status, attempts, "run finished");

    let outcome = match run.status {
        RunStatus::Completed => {
            let messages = backend.list_messages(thread_id).await?;
            RunOutcome::Reply(latest_reply(&messages, &run.id))
        }
        RunStatus::Incomplete => RunOutcome::Truncated,
        other => RunOutcome::Failed(other),
    };

    Ok(outcome)
}

/// Cancel a run and wait (bounded) until it leaves `cancelling`
async fn cancel_and_settle(
    backend: &dyn AssistantBackend,
    thread_id: &str,
    run_id: &str,
    interval: Duration,
) {
    if let Err(e) = backend.cancel_run(thread_id, run_id).await {
        tracing::warn!(run_id, error = %e, "run cancel failed");
    }

    for _ in 0..CANCEL_SETTLE_POLLS {
        tokio::time::sleep(interval).await;
        match backend.retrieve_run(thread_id, run_id).await {
            Ok(run) if run.status.is_terminal() => {
                tracing::debug!(run_id, status = %run.status, "cancelled run settled");
                return;
            }
            Ok(run) => tracing::trace!(run_id, status = %run.status, "waiting for cancel"),
            Err(e) => tracing::debug!(run_id, error = %e, "cancel status check failed"),
        }
    }

    tracing::warn!(run_id, "run still active after cancel");
}

/// Pick the reply text from a newest-first message list
///
/// Prefers the newest assistant message produced by `run_id` and falls back
/// to the newest assistant message overall.
fn latest_reply(messages: &[ThreadMessage], run_id: &str) -> String {
    let mut assistant = messages.iter().filter(|m| m.role == Role::Assistant);

    let from_run = messages
        .iter()
        .find(|m| m.role == Role::Assistant && m.run_id.as_deref() == Some(run_id));

    from_run
        .or_else(|| assistant.next())
        .map_or_else(|| NO_REPLY_TEXT.to_string(), |m| render_content(&m.content))
}
