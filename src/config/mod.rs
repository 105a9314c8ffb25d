//! Configuration management for Parley
//!
//! Values are layered env > TOML file > defaults.

pub mod file;

use std::path::PathBuf;

use crate::{Error, Result};

/// Default OpenAI-compatible API base URL
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default port for the HTTP gateway
pub const DEFAULT_PORT: u16 = 3000;

/// Preamble sent ahead of the replayed conversation
pub const DEFAULT_SYSTEM_PROMPT: &str = "The following is a friendly conversation between a human and an AI. \
The AI is talkative and provides lots of specific details from its context. \
If the AI does not know the answer to a question, it truthfully says it does not know.";

/// Parley configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// HTTP gateway server
    pub server: ServerConfig,

    /// Upstream provider
    pub openai: OpenAiConfig,

    /// Voice session client
    pub client: ClientConfig,
}

/// HTTP gateway server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Path to a pre-built web UI served as the fallback route
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            static_dir: None,
        }
    }
}

/// Upstream provider configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Process-wide default credential, overridable per request
    pub api_key: Option<String>,

    /// API base URL (no trailing slash)
    pub base_url: String,

    /// Chat completion model
    pub chat_model: String,

    /// Transcription model
    pub stt_model: String,

    /// Speech model
    pub tts_model: String,

    /// Speech voice
    pub tts_voice: String,

    /// Conversation preamble
    pub system_prompt: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            chat_model: "gpt-4".to_string(),
            stt_model: "whisper-1".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Voice session client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of a running Parley gateway
    pub server_url: String,

    /// Per-user credential override sent as `x-api-key`
    pub api_key: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: format!("http://127.0.0.1:{DEFAULT_PORT}"),
            api_key: None,
        }
    }
}

impl Config {
    /// Load configuration from the environment and the optional config file
    ///
    /// # Errors
    ///
    /// Returns error if an environment value cannot be parsed
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if an environment value cannot be parsed
    pub fn from_sources<F>(fc: file::ParleyConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match env("PARLEY_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|e| Error::Config(format!("invalid PARLEY_PORT {raw:?}: {e}")))?,
            None => fc.server.port.unwrap_or(defaults.server.port),
        };

        let server = ServerConfig {
            host: env("PARLEY_HOST")
                .or(fc.server.host)
                .unwrap_or(defaults.server.host),
            port,
            static_dir: env("PARLEY_STATIC_DIR")
                .or(fc.server.static_dir)
                .map(PathBuf::from),
        };

        let openai = OpenAiConfig {
            api_key: env("OPENAI_API_KEY")
                .or(fc.openai.api_key)
                .filter(|k| !k.is_empty()),
            base_url: env("OPENAI_BASE_URL")
                .or(fc.openai.base_url)
                .map_or(defaults.openai.base_url, |url| {
                    url.trim_end_matches('/').to_string()
                }),
            chat_model: env("PARLEY_CHAT_MODEL")
                .or(fc.openai.chat_model)
                .unwrap_or(defaults.openai.chat_model),
            stt_model: env("PARLEY_STT_MODEL")
                .or(fc.openai.stt_model)
                .unwrap_or(defaults.openai.stt_model),
            tts_model: env("PARLEY_TTS_MODEL")
                .or(fc.openai.tts_model)
                .unwrap_or(defaults.openai.tts_model),
            tts_voice: env("PARLEY_TTS_VOICE")
                .or(fc.openai.tts_voice)
                .unwrap_or(defaults.openai.tts_voice),
            system_prompt: fc
                .openai
                .system_prompt
                .unwrap_or(defaults.openai.system_prompt),
        };

        let client = ClientConfig {
            server_url: env("PARLEY_SERVER_URL")
                .or(fc.client.server_url)
                .map_or(defaults.client.server_url, |url| {
                    url.trim_end_matches('/').to_string()
                }),
            api_key: fc.client.api_key.filter(|k| !k.is_empty()),
        };

        Ok(Self {
            server,
            openai,
            client,
        })
    }
}
