//! Parley - voice chat playground
//!
//! Records speech, transcribes it, asks a conversational model for a reply,
//! and speaks the reply back:
//! - HTTP gateways forwarding transcription, conversation and synthesis to an
//!   OpenAI-compatible provider
//! - Capture and playback controllers over microphone and speaker
//! - A session orchestrator chaining each turn through the message log
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │                 Session (client)                   │
//! │  Capture  │  Message Log  │  Playback  │  Events   │
//! └────────────────────┬──────────────────────────────┘
//!                      │ HTTP (x-api-key)
//! ┌────────────────────▼──────────────────────────────┐
//! │                 Parley Gateway                     │
//! │   /api/stt/openai  │  /api/chat/openai  │  /api/tts │
//! └────────────────────┬──────────────────────────────┘
//!                      │
//! ┌────────────────────▼──────────────────────────────┐
//! │            OpenAI-compatible provider              │
//! │   Transcription  │  Chat completions  │  Speech    │
//! └───────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod message;
pub mod session;
pub mod voice;

pub use api::{ApiServer, ApiServerBuilder, ApiState};
pub use client::HttpBackend;
pub use config::Config;
pub use error::{Error, Result};
pub use gateway::{AudioFile, Conversation, OpenAiProvider, SpeechSynthesis, SpeechToText};
pub use message::{Message, MessageLog, Role};
pub use session::{Phase, Session, SessionEvent, Stage, VoiceBackend};
