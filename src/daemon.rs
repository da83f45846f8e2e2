//! Daemon - the main relay service
//!
//! Wires the conversation, classifier, handlers and transport together,
//! then runs the webhook server, the dispatcher and the connection
//! supervisor until interrupted.

use std::sync::Arc;

use crate::api::{ApiServer, ApiState};
use crate::assistant::{AssistantBackend, CompletionBackend, Conversation, OpenAiClient};
use crate::channels::{Channel, WhatsAppChannel};
use crate::dispatch::Dispatcher;
use crate::handlers::VideoHandler;
use crate::integrations::{CircuitRenewer, CommandTranscript, SpotifyClient};
use crate::intent::{AuditLog, IntentClassifier};
use crate::lifecycle;
use crate::store::ConversationStore;
use crate::{Config, Error, Result};

/// The relay daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a new daemon instance
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until Ctrl-C, a server failure or an unrecoverable transport loss
    ///
    /// # Errors
    ///
    /// Returns error if startup fails or the transport cannot be recovered
    pub async fn run(self) -> Result<()> {
        let config = self.config;

        std::fs::create_dir_all(&config.data_dir)?;
        tracing::info!(path = %config.data_dir.display(), "data directory ready");

        let openai = Arc::new(OpenAiClient::with_base_url(
            config.require_api_key()?,
            config.assistant.base_url.clone(),
        )?);
        let assistant: Arc<dyn AssistantBackend> = openai.clone();
        let completion: Arc<dyn CompletionBackend> = openai;

        let store = ConversationStore::in_dir(&config.data_dir);
        let conversation = Conversation::open_or_create(
            assistant,
            &store,
            config.assistant.assistant_id.clone(),
            config.assistant.run_policy.clone(),
        )
        .await?;

        let (token, phone_number_id, verify_token) = config.require_whatsapp()?;
        let (whatsapp, inbound) = WhatsAppChannel::with_receiver(
            token,
            phone_number_id,
            config.network.proxy.as_deref(),
        )?;
        let whatsapp = Arc::new(whatsapp);
        whatsapp.connect().await?;
        let channel: Arc<dyn Channel> = whatsapp.clone();

        let classifier = IntentClassifier::new(
            Arc::clone(&completion),
            config.assistant.intent_model.clone(),
            config.persona.clone(),
            AuditLog::in_dir(&config.data_dir),
        );

        let transcripts = Arc::new(
            CommandTranscript::from_command_line(&config.transcript_command)?
                .with_timeout(config.transcript_timeout),
        );
        let video = VideoHandler::new(
            transcripts,
            completion,
            config.assistant.summary_model.clone(),
        );

        let mut dispatcher = Dispatcher::new(
            conversation,
            classifier,
            Arc::clone(&channel),
            video,
            config.persona.clone(),
        )
        .with_routing(config.routing);

        if let Some(spotify) = &config.spotify {
            let client =
                SpotifyClient::new(spotify.client_id.clone(), spotify.client_secret.clone())?;
            dispatcher = dispatcher.with_spotify(Arc::new(client));
            tracing::info!("music links enabled");
        } else {
            tracing::info!("no Spotify credentials, music links answered generically");
        }

        let mut dispatcher_handle = tokio::spawn(dispatcher.run(inbound));

        let server = ApiServer::new(
            ApiState {
                whatsapp: Arc::clone(&whatsapp),
                verify_token,
            },
            config.port,
        );
        let mut server_handle = server.spawn();

        let renewer = config.network.circuit_control_addr().map(|addr| {
            Arc::new(CircuitRenewer::new(
                addr,
                config.network.tor_control_password.clone(),
            ))
        });
        let mut supervisor_handle = tokio::spawn(lifecycle::supervise(
            Arc::clone(&channel),
            renewer,
            config.network.reconnect.clone(),
        ));

        tracing::info!(
            persona = %config.persona,
            port = config.port,
            routing = ?config.routing,
            "thread-relay ready"
        );

        let result = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                Ok(())
            }
            joined = &mut server_handle => flatten("webhook server", joined),
            joined = &mut supervisor_handle => flatten("connection supervisor", joined),
            _ = &mut dispatcher_handle => {
                Err(Error::Channel("dispatcher stopped unexpectedly".to_string()))
            }
        };

        server_handle.abort();
        supervisor_handle.abort();
        dispatcher_handle.abort();

        if let Err(e) = channel.disconnect().await {
            tracing::warn!(error = %e, "disconnect failed");
        }

        tracing::info!("daemon stopped");
        result
    }
}

/// Turn a finished background task into the daemon's result
fn flatten(
    task: &str,
    joined: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    match joined {
        Ok(Ok(())) => Err(Error::Config(format!("{task} exited"))),
        Ok(Err(e)) => Err(e),
        Err(e) => Err(Error::Config(format!("{task} panicked: {e}"))),
    }
}
