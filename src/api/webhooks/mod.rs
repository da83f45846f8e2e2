//! Webhook endpoints for the chat transport

use std::sync::Arc;

use axum::{Router, routing::get};

use super::ApiState;

pub mod whatsapp;

/// Build webhooks router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route(
            "/webhook",
            get(whatsapp::verify_subscription).post(whatsapp::handle_event),
        )
        .with_state(state)
}
