//! `WhatsApp` Cloud API webhook handlers

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::api::ApiState;
use crate::channels::WhatsAppWebhook;

/// Subscription verification query (`GET /webhook`)
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Webhook response
#[derive(Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
}

/// Echo the challenge when mode and token match
pub async fn verify_subscription(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<VerifyQuery>,
) -> (StatusCode, String) {
    let expected = state.verify_token.expose_secret();
    let token_ok = !expected.is_empty() && query.verify_token.as_deref() == Some(expected);

    match (query.mode.as_deref(), query.challenge) {
        (Some("subscribe"), Some(challenge)) if token_ok => {
            tracing::info!("WhatsApp webhook verified");
            (StatusCode::OK, challenge)
        }
        _ => {
            tracing::warn!(mode = ?query.mode, "WhatsApp webhook verification rejected");
            (StatusCode::FORBIDDEN, String::new())
        }
    }
}

/// Queue inbound messages for the dispatcher
pub async fn handle_event(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<WhatsAppWebhook>,
) -> (StatusCode, Json<WebhookResponse>) {
    match state.whatsapp.handle_webhook(&payload).await {
        Ok(count) => {
            if count > 0 {
                tracing::debug!(count, "queued WhatsApp messages");
            }
            (StatusCode::OK, Json(WebhookResponse { ok: true }))
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to queue WhatsApp messages");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(WebhookResponse { ok: false }),
            )
        }
    }
}
