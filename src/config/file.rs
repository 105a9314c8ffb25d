//! TOML configuration file loading
//!
//! Supports `~/.config/parley/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ParleyConfigFile {
    /// HTTP gateway configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Upstream provider configuration
    #[serde(default)]
    pub openai: OpenAiFileConfig,

    /// Voice session client configuration
    #[serde(default)]
    pub client: ClientFileConfig,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub static_dir: Option<String>,
}

/// Provider configuration
#[derive(Debug, Default, Deserialize)]
pub struct OpenAiFileConfig {
    /// Default credential when requests carry none
    pub api_key: Option<String>,

    /// Base URL for an OpenAI-compatible API
    pub base_url: Option<String>,

    /// Chat model (e.g. "gpt-4")
    pub chat_model: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// Conversation preamble
    pub system_prompt: Option<String>,
}

/// Client configuration
#[derive(Debug, Default, Deserialize)]
pub struct ClientFileConfig {
    pub server_url: Option<String>,
    pub api_key: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ParleyConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ParleyConfigFile {
    config_file_path().map_or_else(ParleyConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file, falling back to defaults if it is missing or malformed
pub fn load_config_from(path: &Path) -> ParleyConfigFile {
    if !path.exists() {
        return ParleyConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ParleyConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ParleyConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/parley/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("parley").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_parses() {
        let fc: ParleyConfigFile = toml::from_str("[client]\nserver_url = \"http://x:1\"\n").unwrap();
        assert_eq!(fc.client.server_url.as_deref(), Some("http://x:1"));
        assert!(fc.server.port.is_none());
        assert!(fc.openai.api_key.is_none());
    }

    #[test]
    fn empty_file_parses() {
        let fc: ParleyConfigFile = toml::from_str("").unwrap();
        assert!(fc.server.host.is_none());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("parley-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[server\nport = \"not a number\"").unwrap();

        let fc = load_config_from(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(fc.server.port.is_none());
        assert!(fc.openai.base_url.is_none());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let fc = load_config_from(Path::new("/nonexistent/parley/config.toml"));
        assert!(fc.client.server_url.is_none());
    }
}
