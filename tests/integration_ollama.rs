#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a local Ollama instance
// Run with: cargo test --test integration_ollama -- --ignored

use pdf_chat::config::OllamaConfig;
use pdf_chat::embeddings::{Embedder, OllamaEmbedder};
use pdf_chat::generation::{ChatMessage, LanguageModel, OllamaChatModel};
use pdf_chat::ollama::{OllamaTransport, health_check};
use std::env;
use tracing::info;

fn live_config() -> OllamaConfig {
    let defaults = OllamaConfig::default();
    OllamaConfig {
        host: env::var("OLLAMA_HOST").unwrap_or(defaults.host.clone()),
        port: env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port),
        embedding_model: env::var("OLLAMA_EMBEDDING_MODEL")
            .unwrap_or(defaults.embedding_model.clone()),
        chat_model: env::var("OLLAMA_CHAT_MODEL").unwrap_or(defaults.chat_model.clone()),
        ..defaults
    }
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_health_check() {
    init_test_tracing();
    let config = live_config();
    let transport = OllamaTransport::new(&config).expect("transport should build");

    let result = health_check(
        &transport,
        &[config.embedding_model.as_str(), config.chat_model.as_str()],
    );

    assert!(result.is_ok(), "Health check failed: {:?}", result);
}

#[tokio::test]
#[ignore = "requires a local Ollama instance"]
async fn real_ollama_embeddings_share_dimension() {
    init_test_tracing();
    let embedder = OllamaEmbedder::new(&live_config()).expect("embedder should build");

    let texts: Vec<String> = (0..5)
        .map(|i| format!("Paragraph {} about birds and their migrations.", i))
        .collect();
    let vectors = embedder
        .embed_batch(&texts)
        .await
        .expect("batch embedding should succeed");
    let single = embedder
        .embed("What is the document about?")
        .await
        .expect("single embedding should succeed");

    assert_eq!(vectors.len(), texts.len());
    assert!(vectors.iter().all(|v| v.len() == single.len()));
    info!("Embedding dimension: {}", single.len());
}

#[tokio::test]
#[ignore = "requires a local Ollama instance"]
async fn real_ollama_chat_completion() {
    init_test_tracing();
    let model = OllamaChatModel::new(&live_config()).expect("model should build");

    let reply = model
        .generate(&[
            ChatMessage::system("Answer with a single word."),
            ChatMessage::user("What animal is a sparrow?"),
        ])
        .await
        .expect("generation should succeed");

    assert!(!reply.trim().is_empty());
    info!("Reply: {}", reply);
}
