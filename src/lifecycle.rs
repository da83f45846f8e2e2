//! Transport connection lifecycle
//!
//! A periodic health probe watches the chat transport. When it fails the
//! outbound circuit is renewed and reconnects are attempted with
//! exponential backoff until the transport answers again or the attempt
//! limit is reached.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::channels::Channel;
use crate::integrations::CircuitRenewer;
use crate::{Error, Result};

/// Reconnect backoff policy
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Reconnect attempts before giving up
    pub max_attempts: u32,
    /// Delay before the first attempt (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Interval between health probes while connected
    pub probe_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
            probe_interval: Duration::from_secs(60),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (zero-based)
    ///
    /// `min(base_delay * 2^attempt + jitter, max_delay)` with 0-25% jitter.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);

        let jitter = base.mul_f64(rand::thread_rng().gen_range(0.0..=0.25));
        (base + jitter).min(self.max_delay)
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport is usable
    Connected,
    /// Waiting for or performing reconnect attempt `attempt` (one-based)
    Reconnecting { attempt: u32 },
    /// Attempt limit reached
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Reconnect state machine
#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    policy: ReconnectPolicy,
}

impl ConnectionMachine {
    /// Start in `Connected`
    #[must_use]
    pub const fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Connected,
            policy,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Policy in use
    #[must_use]
    pub const fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Record a successful probe or reconnect; resets the attempt count
    pub fn connected(&mut self) {
        self.state = ConnectionState::Connected;
    }

    /// Record a lost connection or a failed reconnect
    ///
    /// Returns the delay before the next attempt, or `None` once the
    /// machine has moved to `Failed`.
    pub fn disconnected(&mut self) -> Option<Duration> {
        let attempt = match self.state {
            ConnectionState::Connected => 1,
            ConnectionState::Reconnecting { attempt } => attempt.saturating_add(1),
            ConnectionState::Failed => return None,
        };

        if attempt > self.policy.max_attempts {
            self.state = ConnectionState::Failed;
            return None;
        }

        self.state = ConnectionState::Reconnecting { attempt };
        Some(self.policy.delay_for_attempt(attempt - 1))
    }
}

/// Probe the channel until the reconnect attempts run out
///
/// Runs forever while the transport stays healthy.
///
/// # Errors
///
/// Returns `Error::Channel` once the machine reaches `Failed`
pub async fn supervise(
    channel: Arc<dyn Channel>,
    renewer: Option<Arc<CircuitRenewer>>,
    policy: ReconnectPolicy,
) -> Result<()> {
    let mut machine = ConnectionMachine::new(policy);

    loop {
        tokio::time::sleep(machine.policy().probe_interval).await;

        let Err(e) = channel.health_check().await else {
            continue;
        };
        tracing::warn!(channel = channel.name(), error = %e, "transport health probe failed");

        loop {
            let Some(delay) = machine.disconnected() else {
                tracing::error!(channel = channel.name(), "reconnect attempts exhausted");
                return Err(Error::Channel(format!(
                    "{} unreachable after {} reconnect attempts",
                    channel.name(),
                    machine.policy().max_attempts
                )));
            };

            if let Some(renewer) = &renewer {
                let renewer = Arc::clone(renewer);
                tokio::spawn(async move {
                    if let Err(e) = renewer.renew().await {
                        tracing::warn!(error = %e, "circuit renewal failed");
                    }
                });
            }

            tracing::info!(
                state = %machine.state(),
                delay_ms = delay.as_millis(),
                "reconnecting"
            );
            tokio::time::sleep(delay).await;

            match channel.connect().await {
                Ok(()) => {
                    machine.connected();
                    tracing::info!(channel = channel.name(), "transport reconnected");
                    break;
                }
                Err(e) => {
                    tracing::warn!(state = %machine.state(), error = %e, "reconnect failed");
                }
            }
        }
    }
}
