//! HTTP client for a running Parley gateway

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use crate::api::API_KEY_HEADER;
use crate::gateway::AudioFile;
use crate::message::Message;
use crate::session::VoiceBackend;
use crate::voice::AudioSource;
use crate::{Error, Result};

/// Calls `/api/stt/openai`, `/api/chat/openai` and `/api/tts/openai`
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a backend for the gateway at `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn post(&self, path: &str, credential: Option<&str>) -> RequestBuilder {
        let request = self.client.post(format!("{}{path}", self.base_url));
        match credential {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    async fn send(request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Error::from_response(response).await)
        }
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    messages: &'a [Message],
}

#[derive(Serialize)]
struct SpeechBody<'a> {
    content: &'a str,
}

#[async_trait]
impl VoiceBackend for HttpBackend {
    async fn transcribe(&self, audio: AudioFile, credential: Option<&str>) -> Result<String> {
        tracing::debug!(bytes = audio.data.len(), file_name = %audio.name, "uploading recording");

        let part = reqwest::multipart::Part::bytes(audio.data)
            .file_name(audio.name)
            .mime_str(&audio.mime_type)?;
        let form = reqwest::multipart::Form::new().part("audio", part);

        let response = Self::send(self.post("/api/stt/openai", credential).multipart(form)).await?;
        let transcription: TranscriptionResponse = response.json().await?;

        Ok(transcription.text)
    }

    async fn reply(&self, messages: &[Message], credential: Option<&str>) -> Result<String> {
        let request = self
            .post("/api/chat/openai", credential)
            .json(&ChatBody { messages });

        let response = Self::send(request).await?;
        Ok(response.text().await?)
    }

    async fn speak(&self, content: &str, credential: Option<&str>) -> Result<AudioSource> {
        let request = self
            .post("/api/tts/openai", credential)
            .json(&SpeechBody { content });

        let response = Self::send(request).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();

        let data = response.bytes().await?.to_vec();
        if data.is_empty() {
            return Err(Error::Audio("empty speech payload".to_string()));
        }

        tracing::debug!(bytes = data.len(), content_type = %content_type, "speech received");
        Ok(AudioSource::new(content_type, data))
    }
}
