//! Video transcript extraction through an external command
//!
//! The command receives the video URL as its last argument and prints the
//! transcript on stdout. Output starting with `Fout` marks a failure.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::{Error, Result};

/// Prefix the tool uses for failure output
const FAILURE_PREFIX: &str = "Fout";

/// How long the command may run unless configured otherwise
pub const DEFAULT_TRANSCRIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Source of video transcripts
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Fetch the transcript of a video
    ///
    /// Returns an error when no usable transcript exists.
    async fn transcript(&self, video_url: &str) -> Result<String>;
}

/// Runs an external transcript command
#[derive(Debug, Clone)]
pub struct CommandTranscript {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandTranscript {
    /// Create from a program and its leading arguments
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_TRANSCRIPT_TIMEOUT,
        }
    }

    /// Parse a whitespace-separated command line, e.g. `python transcript.py`
    ///
    /// # Errors
    ///
    /// Returns error if the command line is empty
    pub fn from_command_line(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(String::from);
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("transcript command is empty".to_string()))?;
        Ok(Self::new(program, parts.collect()))
    }

    /// Override the execution timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl TranscriptSource for CommandTranscript {
    async fn transcript(&self, video_url: &str) -> Result<String> {
        tracing::debug!(program = %self.program, video_url, "running transcript command");

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(video_url)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| Error::Transcript(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| Error::Transcript(format!("failed to start {}: {e}", self.program)))?;

        interpret_output(
            output.status.success(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )
    }
}

/// Turn raw command output into a transcript or an error
///
/// # Errors
///
/// Returns error on non-zero exit, failure-prefixed output or empty output
pub fn interpret_output(success: bool, stdout: &str, stderr: &str) -> Result<String> {
    if !success {
        let detail = if stderr.trim().is_empty() { stdout } else { stderr };
        return Err(Error::Transcript(detail.trim().to_string()));
    }

    let transcript = stdout.trim();
    if transcript.starts_with(FAILURE_PREFIX) {
        return Err(Error::Transcript(transcript.to_string()));
    }
    if transcript.is_empty() {
        return Err(Error::Transcript("empty transcript".to_string()));
    }

    Ok(transcript.to_string())
}
