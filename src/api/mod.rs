//! HTTP server for inbound chat webhooks

pub mod health;
pub mod webhooks;

use std::sync::Arc;

use axum::Router;
use secrecy::SecretString;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::channels::WhatsAppChannel;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Channel that queues verified inbound messages
    pub whatsapp: Arc<WhatsAppChannel>,
    /// Token expected during webhook verification
    pub verify_token: SecretString,
}

/// Webhook server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Create a server bound to `port` once run
    #[must_use]
    pub fn new(state: ApiState, port: u16) -> Self {
        Self {
            state: Arc::new(state),
            port,
        }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        Router::new()
            .merge(health::router())
            .merge(webhooks::router(Arc::clone(&self.state)))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind webhook server: {e}")))?;

        tracing::info!(port = self.port, "webhook server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("webhook server error: {e}")))?;

        Ok(())
    }

    /// Run the server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
