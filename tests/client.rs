//! HTTP client round trips against a live gateway

use std::sync::Arc;

use parley::{AudioFile, Error, HttpBackend, Message, Role, VoiceBackend};
use tokio::net::TcpListener;

mod common;
use common::{FakeGateway, SPEECH_BYTES, test_server};

/// Serve a gateway on an ephemeral port, returning its base URL
async fn spawn_gateway(gateway: &Arc<FakeGateway>, default_key: Option<&str>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = test_server(gateway, default_key).router();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn test_transcribe_uploads_audio_field() {
    let gateway = Arc::new(FakeGateway::default());
    let backend = HttpBackend::new(spawn_gateway(&gateway, None).await);

    let file = AudioFile::named_for("audio/webm", b"0123456789".to_vec());
    let text = backend.transcribe(file, Some("sk-user")).await.unwrap();

    assert_eq!(text, "heard 10 bytes");
    assert_eq!(gateway.last_credential().as_deref(), Some("sk-user"));

    let uploads = gateway.uploads.lock().unwrap();
    assert_eq!(uploads[0].name, "speech.webm");
    assert_eq!(uploads[0].mime_type, "audio/webm");
}

#[tokio::test]
async fn test_reply_sends_full_history() {
    let gateway = Arc::new(FakeGateway::default());
    let backend = HttpBackend::new(spawn_gateway(&gateway, None).await);

    let history = vec![
        Message::new(Role::System, "be brief"),
        Message::new(Role::Human, "hello"),
        Message::new(Role::Ai, "hi"),
        Message::new(Role::Human, "how are you"),
    ];
    let answer = backend.reply(&history, None).await.unwrap();

    assert_eq!(answer, "you said: how are you");
    assert_eq!(gateway.histories.lock().unwrap()[0], history);
}

#[tokio::test]
async fn test_speak_returns_audio_with_content_type() {
    let gateway = Arc::new(FakeGateway::default());
    let backend = HttpBackend::new(spawn_gateway(&gateway, Some("sk-default")).await);

    let source = backend.speak("hi there", None).await.unwrap();

    assert_eq!(source.content_type, "audio/mpeg");
    assert_eq!(source.data, SPEECH_BYTES);
    assert_eq!(gateway.last_credential().as_deref(), Some("sk-default"));
}

#[tokio::test]
async fn test_provider_status_reaches_client() {
    let gateway = Arc::new(FakeGateway::failing(429, r#"{"error":{"message":"slow down"}}"#));
    let url = spawn_gateway(&gateway, None).await;
    let backend = HttpBackend::new(format!("{url}/"));

    let err = backend.speak("hi", None).await.unwrap_err();
    match err {
        Error::Provider { status, body, .. } => {
            assert_eq!(status, 429);
            assert!(body.contains("slow down"));
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_gateway_is_http_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = HttpBackend::new(format!("http://{addr}"));
    let err = backend.reply(&[Message::new(Role::Human, "hi")], None).await;

    assert!(matches!(err, Err(Error::Http(_))));
}
