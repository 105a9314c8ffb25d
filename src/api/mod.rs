//! HTTP API server for the Parley gateway

pub mod chat;
mod credential;
mod error;
pub mod health;
pub mod voice;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::config::Config;
use crate::gateway::{Conversation, OpenAiProvider, SpeechSynthesis, SpeechToText};

pub use credential::{API_KEY_HEADER, ApiKey};
pub use error::ApiError;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub stt: Arc<dyn SpeechToText>,
    pub chat: Arc<dyn Conversation>,
    pub tts: Arc<dyn SpeechSynthesis>,
    /// Process-wide credential used when a request carries none
    pub default_api_key: Option<String>,
}

impl ApiState {
    /// Credential for one request: header first, then the process default
    #[must_use]
    pub fn credential<'a>(&'a self, header: &'a ApiKey) -> Option<&'a str> {
        header.0.as_deref().or(self.default_api_key.as_deref())
    }
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    host: String,
    port: u16,
    static_dir: Option<PathBuf>,
    default_api_key: Option<String>,
    stt: Arc<dyn SpeechToText>,
    chat: Arc<dyn Conversation>,
    tts: Arc<dyn SpeechSynthesis>,
}

impl ApiServerBuilder {
    /// Create a builder wired to the configured OpenAI provider
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let provider = Arc::new(OpenAiProvider::new(&config.openai));

        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            static_dir: config.server.static_dir.clone(),
            default_api_key: config.openai.api_key.clone(),
            stt: provider.clone(),
            chat: provider.clone(),
            tts: provider,
        }
    }

    /// Override the port
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the static files directory for serving the web UI
    #[must_use]
    pub fn static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    /// Replace the transcription gateway
    #[must_use]
    pub fn stt(mut self, stt: Arc<dyn SpeechToText>) -> Self {
        self.stt = stt;
        self
    }

    /// Replace the conversation gateway
    #[must_use]
    pub fn chat(mut self, chat: Arc<dyn Conversation>) -> Self {
        self.chat = chat;
        self
    }

    /// Replace the synthesis gateway
    #[must_use]
    pub fn tts(mut self, tts: Arc<dyn SpeechSynthesis>) -> Self {
        self.tts = tts;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let state = Arc::new(ApiState {
            stt: self.stt,
            chat: self.chat,
            tts: self.tts,
            default_api_key: self.default_api_key,
        });

        ApiServer {
            state,
            host: self.host,
            port: self.port,
            static_dir: self.static_dir,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    host: String,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServer {
    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .nest("/api/stt", voice::stt_router(self.state.clone()))
            .nest("/api/chat", chat::router(self.state.clone()))
            .nest("/api/tts", voice::tts_router(self.state.clone()))
            .merge(health::router())
            .merge(health::ready_router(self.state.clone()));

        // Serve static files if configured
        if let Some(static_dir) = &self.static_dir {
            let index_file = static_dir.join("index.html");
            let serve_dir =
                ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file));

            router = router.fallback_service(serve_dir);
            tracing::info!(path = %static_dir.display(), "serving static files");
        }

        // CORS layer for cross-origin requests from frontend
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        if self.state.default_api_key.is_none() {
            tracing::warn!(
                "no default OpenAI API key configured - requests must send {API_KEY_HEADER}"
            );
        }

        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(addr = %addr, "API server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down API server");
}
