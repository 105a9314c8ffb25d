//! Voice API endpoints for speech-to-text and text-to-speech

use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Multipart, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;

use super::{ApiError, ApiKey, ApiState};
use crate::Error;
use crate::gateway::AudioFile;

/// Multipart field holding the recording
const AUDIO_FIELD: &str = "audio";

/// Build speech-to-text router
pub fn stt_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/openai", post(transcribe))
        .with_state(state)
}

/// Build text-to-speech router
pub fn tts_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/openai", post(synthesize))
        .with_state(state)
}

/// Transcribe the uploaded `audio` field
///
/// Responds with the provider's JSON unchanged.
async fn transcribe(
    State(state): State<Arc<ApiState>>,
    api_key: ApiKey,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut audio = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(AUDIO_FIELD) {
            continue;
        }

        let mime_type = field.content_type().unwrap_or("audio/mpeg").to_string();
        let file_name = field.file_name().map(ToString::to_string);
        let data = field.bytes().await?;

        let mut file = AudioFile::named_for(mime_type, data.to_vec());
        if let Some(name) = file_name.filter(|n| !n.is_empty()) {
            file.name = name;
        }
        audio = Some(file);
        break;
    }

    let audio = audio
        .filter(|a| !a.data.is_empty())
        .ok_or(Error::InputMissing("audio"))?;

    tracing::debug!(
        file_name = %audio.name,
        audio_bytes = audio.data.len(),
        "transcription requested"
    );

    let json = state
        .stt
        .transcribe(audio, state.credential(&api_key))
        .await?;

    Ok(Json(json))
}

/// Synthesis request
#[derive(Debug, Default, Deserialize)]
pub struct SynthesizeRequest {
    #[serde(default)]
    pub content: String,
}

/// Synthesize `content` to speech, streaming the provider's audio back
async fn synthesize(
    State(state): State<Arc<ApiState>>,
    api_key: ApiKey,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: SynthesizeRequest = serde_json::from_slice(&body)?;

    if request.content.is_empty() {
        return Err(Error::InputMissing("content").into());
    }

    tracing::debug!(chars = request.content.len(), "synthesis requested");

    let speech = state
        .tts
        .synthesize(&request.content, state.credential(&api_key))
        .await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, speech.content_type)],
        Body::from_stream(speech.audio),
    )
        .into_response())
}
