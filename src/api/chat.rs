//! Conversation endpoint

use std::sync::Arc;

use axum::{Router, body::Bytes, extract::State, routing::post};
use serde::Deserialize;

use super::{ApiError, ApiKey, ApiState};
use crate::message::Message;

/// Build conversation router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/openai", post(chat))
        .with_state(state)
}

/// Conversation request: the full history, newest last
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Answer the newest message
///
/// The body is parsed regardless of its declared content type, since browser
/// clients post it as plain text. The reply is returned as a plain text body.
async fn chat(
    State(state): State<Arc<ApiState>>,
    api_key: ApiKey,
    body: Bytes,
) -> Result<String, ApiError> {
    let request: ChatRequest = serde_json::from_slice(&body)?;
    crate::gateway::split_history(&request.messages)?;

    tracing::debug!(turns = request.messages.len(), "conversation requested");

    let answer = state
        .chat
        .reply(&request.messages, state.credential(&api_key))
        .await?;

    Ok(answer)
}
