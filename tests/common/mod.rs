//! Shared test utilities

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use futures::StreamExt;
use tokio::sync::{Notify, mpsc};

use parley::gateway::SynthesizedSpeech;
use parley::voice::{
    AudioOutput, AudioSource, CaptureController, DeviceStream, EndedCallback, InputDevice,
    PlaybackController, Recorder, RecorderEvent, Sink,
};
use parley::{
    ApiServer, ApiServerBuilder, AudioFile, Config, Conversation, Error, Message, Result,
    SpeechSynthesis, SpeechToText, VoiceBackend,
};

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(5);

/// Audio bytes the fake synthesis gateway returns
pub const SPEECH_BYTES: &[u8] = b"ID3fake-mp3-frames";

/// Error a fake returns instead of answering
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    pub status: u16,
    pub body: String,
}

impl ProviderFailure {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    fn to_error(&self) -> Error {
        Error::Provider {
            status: self.status,
            content_type: Some("application/json".to_string()),
            body: self.body.clone(),
        }
    }
}

/// In-memory stand-in for all three provider gateways
#[derive(Default)]
pub struct FakeGateway {
    pub credentials: Mutex<Vec<Option<String>>>,
    pub uploads: Mutex<Vec<AudioFile>>,
    pub histories: Mutex<Vec<Vec<Message>>>,
    pub spoken: Mutex<Vec<String>>,
    pub failure: Option<ProviderFailure>,
}

impl FakeGateway {
    pub fn failing(status: u16, body: &str) -> Self {
        Self {
            failure: Some(ProviderFailure::new(status, body)),
            ..Self::default()
        }
    }

    fn record_credential(&self, credential: Option<&str>) -> Result<()> {
        self.credentials
            .lock()
            .unwrap()
            .push(credential.map(ToString::to_string));

        match &self.failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }

    pub fn last_credential(&self) -> Option<String> {
        self.credentials.lock().unwrap().last().cloned().flatten()
    }
}

#[async_trait]
impl SpeechToText for FakeGateway {
    async fn transcribe(
        &self,
        audio: AudioFile,
        credential: Option<&str>,
    ) -> Result<serde_json::Value> {
        self.record_credential(credential)?;
        let text = format!("heard {} bytes", audio.data.len());
        self.uploads.lock().unwrap().push(audio);
        Ok(serde_json::json!({ "text": text }))
    }
}

#[async_trait]
impl Conversation for FakeGateway {
    async fn reply(&self, messages: &[Message], credential: Option<&str>) -> Result<String> {
        self.record_credential(credential)?;
        self.histories.lock().unwrap().push(messages.to_vec());
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        Ok(format!("you said: {last}"))
    }
}

#[async_trait]
impl SpeechSynthesis for FakeGateway {
    async fn synthesize(
        &self,
        content: &str,
        credential: Option<&str>,
    ) -> Result<SynthesizedSpeech> {
        self.record_credential(credential)?;
        self.spoken.lock().unwrap().push(content.to_string());

        let (head, tail) = SPEECH_BYTES.split_at(3);
        let chunks: Vec<Result<Bytes>> =
            vec![Ok(Bytes::from_static(head)), Ok(Bytes::from_static(tail))];

        Ok(SynthesizedSpeech {
            content_type: "audio/mpeg".to_string(),
            audio: futures::stream::iter(chunks).boxed(),
        })
    }
}

/// Build a gateway server whose three routes all hit `gateway`
pub fn test_server(gateway: &Arc<FakeGateway>, default_key: Option<&str>) -> ApiServer {
    let mut config = Config::default();
    config.openai.api_key = default_key.map(ToString::to_string);

    ApiServerBuilder::new(&config)
        .stt(gateway.clone())
        .chat(gateway.clone())
        .tts(gateway.clone())
        .build()
}

/// Microphone that yields one fixed chunk per recording
pub struct FakeMicrophone {
    pub chunk: Vec<u8>,
}

impl InputDevice for FakeMicrophone {
    fn acquire(&self) -> Result<Arc<dyn DeviceStream>> {
        Ok(Arc::new(FakeStream {
            chunk: self.chunk.clone(),
        }))
    }
}

struct FakeStream {
    chunk: Vec<u8>,
}

impl DeviceStream for FakeStream {
    fn mime_type(&self) -> &str {
        "audio/webm"
    }

    fn record(&self, events: mpsc::UnboundedSender<RecorderEvent>) -> Result<Box<dyn Recorder>> {
        Ok(Box::new(FakeRecorder {
            chunk: self.chunk.clone(),
            events,
        }))
    }
}

struct FakeRecorder {
    chunk: Vec<u8>,
    events: mpsc::UnboundedSender<RecorderEvent>,
}

impl Recorder for FakeRecorder {
    fn stop(&mut self) {
        if !self.chunk.is_empty() {
            let _ = self.events.send(RecorderEvent::Data(self.chunk.clone()));
        }
        let _ = self.events.send(RecorderEvent::Stopped);
    }
}

/// Speaker that keeps every sink playing until the test ends it
#[derive(Clone, Default)]
pub struct FakeSpeaker {
    pub played: Arc<Mutex<Vec<AudioSource>>>,
    endings: Arc<Mutex<Vec<EndedCallback>>>,
}

impl FakeSpeaker {
    /// Run the end-of-audio callback of the most recent sink
    pub fn finish_latest(&self) {
        let callback = self.endings.lock().unwrap().pop();
        if let Some(callback) = callback {
            callback();
        }
    }

    pub fn played(&self) -> Vec<AudioSource> {
        self.played.lock().unwrap().clone()
    }
}

struct FakeSink;

impl Sink for FakeSink {
    fn pause(&mut self) {}
}

impl AudioOutput for FakeSpeaker {
    fn play(&self, source: AudioSource, on_ended: EndedCallback) -> Result<Box<dyn Sink>> {
        self.played.lock().unwrap().push(source);
        self.endings.lock().unwrap().push(on_ended);
        Ok(Box::new(FakeSink))
    }
}

/// Controllers over a fake microphone and speaker
pub fn fake_devices(chunk: &[u8]) -> (CaptureController, PlaybackController, FakeSpeaker) {
    let speaker = FakeSpeaker::default();
    let capture = CaptureController::new(Arc::new(FakeMicrophone {
        chunk: chunk.to_vec(),
    }));
    let playback = PlaybackController::new(Arc::new(speaker.clone()));
    (capture, playback, speaker)
}

/// Session backend with scripted answers
pub struct ScriptedBackend {
    pub transcript: String,
    pub answer: String,
    pub calls: Mutex<Vec<String>>,
    pub credentials: Mutex<Vec<Option<String>>>,
    pub fail_reply: bool,
    /// When set, `reply` waits for a notification before answering
    pub reply_gate: Option<Arc<Notify>>,
}

impl ScriptedBackend {
    pub fn new(transcript: &str, answer: &str) -> Self {
        Self {
            transcript: transcript.to_string(),
            answer: answer.to_string(),
            calls: Mutex::new(Vec::new()),
            credentials: Mutex::new(Vec::new()),
            fail_reply: false,
            reply_gate: None,
        }
    }

    fn record(&self, call: String, credential: Option<&str>) {
        self.calls.lock().unwrap().push(call);
        self.credentials
            .lock()
            .unwrap()
            .push(credential.map(ToString::to_string));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceBackend for ScriptedBackend {
    async fn transcribe(&self, audio: AudioFile, credential: Option<&str>) -> Result<String> {
        self.record(format!("transcribe:{}", audio.name), credential);
        Ok(self.transcript.clone())
    }

    async fn reply(&self, messages: &[Message], credential: Option<&str>) -> Result<String> {
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.record(format!("reply:{last}"), credential);

        if let Some(gate) = &self.reply_gate {
            gate.notified().await;
        }

        if self.fail_reply {
            return Err(Error::Provider {
                status: 429,
                content_type: None,
                body: "rate limited".to_string(),
            });
        }
        Ok(self.answer.clone())
    }

    async fn speak(&self, content: &str, credential: Option<&str>) -> Result<AudioSource> {
        self.record(format!("speak:{content}"), credential);
        Ok(AudioSource::new("audio/mpeg", SPEECH_BYTES.to_vec()))
    }
}
