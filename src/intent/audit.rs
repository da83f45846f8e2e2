//! Append-only audit log of intent decisions

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::io::AsyncWriteExt;

/// Default audit log file name
pub const AUDIT_FILE: &str = "bot_log.txt";

/// One line per classification, appended to a local text file
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Create an audit log writing to `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create an audit log at the default file name inside `data_dir`
    #[must_use]
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(AUDIT_FILE))
    }

    /// Path of the log file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one decision line
    ///
    /// Write failures are logged and swallowed so auditing can never change
    /// the classification outcome.
    pub async fn record(&self, message: &str, raw_output: &str, decision: &str) {
        let line = format_entry(Utc::now(), message, raw_output, decision);

        if let Err(e) = self.append(&line).await {
            tracing::error!(path = %self.path.display(), error = %e, "failed to write audit log");
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

/// Format one audit line, newline included
#[must_use]
pub fn format_entry(
    timestamp: DateTime<Utc>,
    message: &str,
    raw_output: &str,
    decision: &str,
) -> String {
    format!(
        "[{}] Bericht: \"{message}\" | AI Antwoord: \"{raw_output}\" | Beslissing: {decision}\n",
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}
