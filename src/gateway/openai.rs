//! OpenAI-compatible provider for all three gateways

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use super::{AudioFile, Conversation, SpeechSynthesis, SpeechToText, SynthesizedSpeech};
use crate::config::OpenAiConfig;
use crate::message::{Message, Role};
use crate::{Error, Result};

/// Talks to `/audio/transcriptions`, `/chat/completions` and `/audio/speech`
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    chat_model: String,
    stt_model: String,
    tts_model: String,
    tts_voice: String,
    system_prompt: String,
}

impl OpenAiProvider {
    /// Create a provider from configuration
    #[must_use]
    pub fn new(config: &OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.clone(),
            chat_model: config.chat_model.clone(),
            stt_model: config.stt_model.clone(),
            tts_model: config.tts_model.clone(),
            tts_voice: config.tts_voice.clone(),
            system_prompt: config.system_prompt.clone(),
        }
    }

    fn post(&self, path: &str, credential: Option<&str>) -> RequestBuilder {
        let request = self.client.post(format!("{}{path}", self.base_url));
        match credential {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Build the chat completion body: preamble, replayed memory, then the new input
    fn chat_request<'a>(&'a self, messages: &'a [Message]) -> Result<ChatCompletionRequest<'a>> {
        let (memory, input) = super::split_history(messages)?;

        let preamble = (!self.system_prompt.is_empty()).then(|| ChatMessage {
            role: "system",
            content: &self.system_prompt,
        });

        let replayed = memory.iter().map(|m| ChatMessage {
            role: chat_role(m.role),
            content: &m.content,
        });

        let current = std::iter::once(ChatMessage {
            role: "user",
            content: &input.content,
        });

        Ok(ChatCompletionRequest {
            model: &self.chat_model,
            messages: preamble.into_iter().chain(replayed).chain(current).collect(),
        })
    }
}

/// Chat completion role for a log role
const fn chat_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::Human => "user",
        Role::Ai => "assistant",
    }
}

#[async_trait]
impl SpeechToText for OpenAiProvider {
    async fn transcribe(
        &self,
        audio: AudioFile,
        credential: Option<&str>,
    ) -> Result<serde_json::Value> {
        if audio.data.is_empty() {
            return Err(Error::InputMissing("audio"));
        }

        tracing::debug!(
            audio_bytes = audio.data.len(),
            mime_type = %audio.mime_type,
            "starting transcription"
        );

        let part = reqwest::multipart::Part::bytes(audio.data)
            .file_name(audio.name)
            .mime_str(&audio.mime_type)?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.stt_model.clone());

        let response = self
            .post("/audio/transcriptions", credential)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                e
            })?;

        if !response.status().is_success() {
            let err = Error::from_response(response).await;
            tracing::error!(error = %err, "transcription API error");
            return Err(err);
        }

        let json: serde_json::Value = response.json().await?;
        tracing::info!(transcript = %json["text"], "transcription complete");
        Ok(json)
    }
}

#[async_trait]
impl Conversation for OpenAiProvider {
    async fn reply(&self, messages: &[Message], credential: Option<&str>) -> Result<String> {
        let request = self.chat_request(messages)?;
        tracing::debug!(
            model = %self.chat_model,
            turns = messages.len(),
            "requesting chat completion"
        );

        let response = self
            .post("/chat/completions", credential)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Error::from_response(response).await;
            tracing::error!(error = %err, "chat API error");
            return Err(err);
        }

        let result: ChatCompletionResponse = response.json().await?;
        let answer = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        tracing::info!(chars = answer.len(), "chat reply received");
        Ok(answer)
    }
}

#[async_trait]
impl SpeechSynthesis for OpenAiProvider {
    async fn synthesize(
        &self,
        content: &str,
        credential: Option<&str>,
    ) -> Result<SynthesizedSpeech> {
        if content.is_empty() {
            return Err(Error::InputMissing("content"));
        }

        let request = SpeechRequest {
            model: &self.tts_model,
            voice: &self.tts_voice,
            input: content,
        };

        let response = self
            .post("/audio/speech", credential)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Error::from_response(response).await;
            tracing::error!(error = %err, "speech API error");
            return Err(err);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();

        tracing::debug!(content_type = %content_type, "streaming synthesized speech");

        Ok(SynthesizedSpeech {
            content_type,
            audio: response.bytes_stream().map_err(Error::from).boxed(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(&OpenAiConfig::default())
    }

    #[test]
    fn chat_request_replays_memory_before_input() {
        let provider = provider();
        let history = vec![
            Message::new(Role::System, "be brief"),
            Message::new(Role::Human, "hello"),
            Message::new(Role::Ai, "hi there"),
            Message::new(Role::Human, "what's up"),
        ];

        let request = provider.chat_request(&history).unwrap();
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gpt-4");
        let roles: Vec<_> = json["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(roles, ["system", "system", "user", "assistant", "user"]);
        assert_eq!(json["messages"][4]["content"], "what's up");
    }

    #[test]
    fn chat_request_without_preamble() {
        let config = OpenAiConfig {
            system_prompt: String::new(),
            ..OpenAiConfig::default()
        };
        let provider = OpenAiProvider::new(&config);
        let history = vec![Message::new(Role::Human, "hello")];

        let request = provider.chat_request(&history).unwrap();
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "user");
    }

    #[test]
    fn chat_request_needs_history() {
        assert!(matches!(
            provider().chat_request(&[]),
            Err(Error::InputMissing(_))
        ));
    }

    #[tokio::test]
    async fn empty_content_fails_before_network() {
        let err = provider().synthesize("", None).await.unwrap_err();
        assert!(matches!(err, Error::InputMissing("content")));
    }

    #[tokio::test]
    async fn empty_audio_fails_before_network() {
        let audio = AudioFile::named_for("audio/wav", Vec::new());
        let err = provider().transcribe(audio, None).await.unwrap_err();
        assert!(matches!(err, Error::InputMissing("audio")));
    }
}
