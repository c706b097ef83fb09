//! GeminiBackend against a mock HTTP server.

use std::sync::Arc;

use oracle::{AudioClip, GeminiBackend, GenerateRequest, InferenceError, ModelBackend, Oracle};
use serde_json::json;
use smithconf::ModelConfig;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

fn config_for(server: &MockServer) -> ModelConfig {
    ModelConfig {
        api_base: server.uri(),
        api_key: Some("test-key".to_string()),
        timeout_secs: 5,
        max_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        ..ModelConfig::default()
    }
}

fn text_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    }))
}

#[tokio::test]
async fn test_generate_sends_key_and_returns_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(text_reply("waveform"))
        .expect(1)
        .mount(&server)
        .await;

    let backend = GeminiBackend::from_config(&config_for(&server)).unwrap();
    let reply = backend.generate(&GenerateRequest::new("hi")).await.unwrap();
    assert_eq!(reply, "waveform");
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(text_reply("bar-spectrum"))
        .expect(1)
        .mount(&server)
        .await;

    let backend = GeminiBackend::from_config(&config_for(&server)).unwrap();
    let reply = backend.generate(&GenerateRequest::new("hi")).await.unwrap();
    assert_eq!(reply, "bar-spectrum");
}

#[tokio::test]
async fn test_retry_budget_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .expect(3)
        .mount(&server)
        .await;

    let backend = GeminiBackend::from_config(&config_for(&server)).unwrap();
    let err = backend
        .generate(&GenerateRequest::new("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, InferenceError::Unavailable { attempts: 3, .. }));
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad audio"))
        .expect(1)
        .mount(&server)
        .await;

    let backend = GeminiBackend::from_config(&config_for(&server)).unwrap();
    let err = backend
        .generate(&GenerateRequest::new("hi"))
        .await
        .unwrap_err();
    match err {
        InferenceError::Rejected { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "bad audio");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unparseable_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let backend = GeminiBackend::from_config(&config_for(&server)).unwrap();
    let err = backend
        .generate(&GenerateRequest::new("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, InferenceError::Malformed(_)));
}

#[tokio::test]
async fn test_resumable_upload_then_classify() {
    let server = MockServer::start().await;
    let session_url = format!("{}/upload-session/defaults", server.uri());

    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .and(header("x-goog-upload-command", "start"))
        .and(header("x-goog-upload-header-content-type", "text/csv"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-goog-upload-url", session_url.as_str()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload-session/defaults"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "file": {
                "name": "files/abc123",
                "uri": "https://generativelanguage.googleapis.com/v1beta/files/abc123",
                "mimeType": "text/csv"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(text_reply("rain-spectrum"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let table = dir.path().join("visualizer_defaults.csv");
    std::fs::write(&table, "field,type,default\n").unwrap();

    let backend = Arc::new(GeminiBackend::from_config(&config_for(&server)).unwrap());
    let oracle = Oracle::connect(backend, &table).await.unwrap();
    assert_eq!(
        oracle.defaults_table().unwrap().uri,
        "https://generativelanguage.googleapis.com/v1beta/files/abc123"
    );

    let choice = oracle
        .classify_preset(&AudioClip::new("audio/mpeg", b"ID3".to_vec()))
        .await
        .unwrap();
    assert_eq!(choice.script_path(), "presets/rain-spectrum-script.js");
}

#[tokio::test]
async fn test_upload_without_session_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let backend = GeminiBackend::from_config(&config_for(&server)).unwrap();
    let err = backend
        .upload_reference("visualizer_defaults.csv", "text/csv", b"a,b\n".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, InferenceError::Malformed(_)));
}
