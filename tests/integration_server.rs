#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// HTTP round trips through the real Ollama clients against a mocked backend

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use pdf_chat::config::Config;
use pdf_chat::conversation::ModelClients;
use pdf_chat::server::{AppState, router};
use pdf_chat::session::SessionManager;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request as MockRequest, ResponseTemplate};

const BOUNDARY: &str = "integrationboundary";

fn one_page_pdf(text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Times-Roman",
        "Encoding" => "WinAnsiEncoding",
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().expect("content should encode"),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("pdf should serialize");
    bytes
}

/// Three-dimensional embedding keyed on a few topic words
fn topic_vector(text: &str) -> Value {
    let lower = text.to_lowercase();
    json!([
        if lower.contains("bird") { 1.0 } else { 0.0 },
        if lower.contains("engine") { 1.0 } else { 0.0 },
        0.1
    ])
}

async fn mock_ollama() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(|request: &MockRequest| {
            let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
            let embeddings: Vec<Value> = body["input"]
                .as_array()
                .map(|inputs| {
                    inputs
                        .iter()
                        .map(|input| topic_vector(input.as_str().unwrap_or_default()))
                        .collect()
                })
                .unwrap_or_default();
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
        })
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(|request: &MockRequest| {
            let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
            let system = body["messages"][0]["content"].as_str().unwrap_or_default();
            let turns = body["messages"].as_array().map_or(0, Vec::len);
            let reply = if system.contains("describes a bird") {
                format!("The document describes a bird. ({} messages)", turns)
            } else {
                "I don't know.".to_string()
            };
            ResponseTemplate::new(200).set_body_json(json!({
                "message": { "role": "assistant", "content": reply },
                "done": true
            }))
        })
        .mount(&server)
        .await;

    server
}

fn app_for(server: &MockServer, temp_dir: &TempDir) -> axum::Router {
    let url = Url::parse(&server.uri()).expect("mock uri should parse");
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.ollama.host = url.host_str().unwrap_or("127.0.0.1").to_string();
    config.ollama.port = url.port().unwrap_or(80);
    config.ollama.retry_attempts = 1;

    let clients = ModelClients::from_config(&config.ollama).expect("clients should build");
    router(AppState {
        manager: Arc::new(SessionManager::new(config, clients)),
    })
}

async fn call(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read");
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn upload(file_name: &str, content: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/pdf\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/process-document")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request should build")
}

fn message(text: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/process-message")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "userMessage": text }).to_string()))
        .expect("request should build")
}

#[tokio::test]
async fn upload_and_chat_through_ollama_api() {
    let server = mock_ollama().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let app = app_for(&server, &temp_dir);

    let (status, body) = call(&app, upload("bird.pdf", &one_page_pdf("This document describes a bird."))).await;
    assert_eq!(status, StatusCode::OK, "upload failed: {}", body);

    let (status, body) = call(&app, message("What is the document about?")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["botResponse"],
        "The document describes a bird. (2 messages)"
    );

    let (status, body) = call(&app, message("Tell me more.")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["botResponse"],
        "The document describes a bird. (4 messages)"
    );

    let (_, health) = call(
        &app,
        Request::builder()
            .uri("/health")
            .body(Body::empty())
            .expect("request should build"),
    )
    .await;
    assert_eq!(health["document_loaded"], true);
}

#[tokio::test]
async fn backend_outage_maps_to_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let app = app_for(&server, &temp_dir);

    let (status, body) = call(&app, upload("bird.pdf", &one_page_pdf("This document describes a bird."))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(
        body["botResponse"]
            .as_str()
            .is_some_and(|m| m.contains("Embedding service error"))
    );
}
