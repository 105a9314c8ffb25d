//! Provider gateways for transcription, conversation and synthesis
//!
//! Each gateway forwards one local request to one upstream call. There is no
//! retry and no cache. Every call takes an optional credential; with none,
//! no authorization is sent and the provider decides.

mod openai;

use async_trait::async_trait;
use axum::body::Bytes;
use futures::stream::BoxStream;

use crate::message::Message;
use crate::{Error, Result};

pub use openai::OpenAiProvider;

/// Fixed stem for captured audio files
pub const AUDIO_FILE_STEM: &str = "speech";

/// An encoded audio file ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFile {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl AudioFile {
    /// Build a file named after the fixed stem with an extension matching `mime_type`
    #[must_use]
    pub fn named_for(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        let mime_type = mime_type.into();
        let name = format!("{AUDIO_FILE_STEM}.{}", extension_for(&mime_type));
        Self {
            name,
            mime_type,
            data,
        }
    }
}

/// File extension for an audio MIME type
///
/// Transcription providers sniff the format from the file name.
#[must_use]
pub fn extension_for(mime_type: &str) -> &'static str {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    match essence {
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/webm" => "webm",
        "audio/ogg" => "ogg",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/flac" => "flac",
        _ => "mp3",
    }
}

/// Chunked audio body as produced by the provider
pub type AudioStream = BoxStream<'static, Result<Bytes>>;

/// Synthesized speech, streamed
pub struct SynthesizedSpeech {
    pub content_type: String,
    pub audio: AudioStream,
}

impl std::fmt::Debug for SynthesizedSpeech {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesizedSpeech")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Speech-to-text gateway
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe a file, returning the provider's JSON (`{ "text": ... }`)
    async fn transcribe(
        &self,
        audio: AudioFile,
        credential: Option<&str>,
    ) -> Result<serde_json::Value>;
}

/// Conversational model gateway
#[async_trait]
pub trait Conversation: Send + Sync {
    /// Answer the last message, replaying all earlier ones as memory
    async fn reply(&self, messages: &[Message], credential: Option<&str>) -> Result<String>;
}

/// Text-to-speech gateway
#[async_trait]
pub trait SpeechSynthesis: Send + Sync {
    /// Synthesize `content` into an audio stream
    async fn synthesize(&self, content: &str, credential: Option<&str>)
    -> Result<SynthesizedSpeech>;
}

/// Split a history into replayed memory and the new utterance
///
/// # Errors
///
/// Returns `InputMissing` for an empty history
pub fn split_history(messages: &[Message]) -> Result<(&[Message], &Message)> {
    messages
        .split_last()
        .map(|(input, memory)| (memory, input))
        .ok_or(Error::InputMissing("messages"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn file_name_follows_mime() {
        assert_eq!(AudioFile::named_for("audio/wav", vec![]).name, "speech.wav");
        assert_eq!(
            AudioFile::named_for("audio/webm;codecs=opus", vec![]).name,
            "speech.webm"
        );
        assert_eq!(AudioFile::named_for("audio/mpeg", vec![]).name, "speech.mp3");
    }

    #[test]
    fn split_history_takes_last_as_input() {
        let history = vec![
            Message::new(Role::Human, "hello"),
            Message::new(Role::Ai, "hi there"),
            Message::new(Role::Human, "how are you"),
        ];

        let (memory, input) = split_history(&history).unwrap();
        assert_eq!(memory.len(), 2);
        assert_eq!(input.content, "how are you");
    }

    #[test]
    fn split_history_rejects_empty() {
        assert!(matches!(
            split_history(&[]),
            Err(Error::InputMissing("messages"))
        ));
    }
}
