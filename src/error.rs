//! Error types for Parley

use thiserror::Error;

/// Result type alias for Parley operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Parley
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or codec error
    #[error("audio error: {0}")]
    Audio(String),

    /// No live recorder or microphone (permission denied, or stop without start)
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// No live playback sink
    #[error("playback unavailable: no audio sink is active")]
    PlaybackUnavailable,

    /// Recording stopped before any audio chunk was delivered
    #[error("no audio captured")]
    NoAudioCaptured,

    /// Operation aborted through its cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// A turn is already in flight or audio is still playing
    #[error("session busy: {0}")]
    Busy(&'static str),

    /// Caller omitted a required field
    #[error("missing input: {0}")]
    InputMissing(&'static str),

    /// Upstream provider answered with a non-success status
    #[error("provider error {status}: {body}")]
    Provider {
        status: u16,
        content_type: Option<String>,
        body: String,
    },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a `Provider` error from a failed upstream response, consuming its body
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = response.text().await.unwrap_or_default();

        Self::Provider {
            status,
            content_type,
            body,
        }
    }
}
