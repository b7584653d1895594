#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end tests of the ingest and question pipeline with deterministic model stand-ins

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use pdf_chat::ChatError;
use pdf_chat::config::Config;
use pdf_chat::conversation::ModelClients;
use pdf_chat::embeddings::{ChunkingConfig, Embedder, split_pages};
use pdf_chat::generation::{ChatMessage, LanguageModel, Role};
use pdf_chat::index::IndexBackend;
use pdf_chat::session::SessionManager;
use pdf_chat::document::PageText;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const DIMENSION: usize = 64;

/// Hashes each word into a bucket so shared vocabulary means higher similarity
struct KeywordEmbedder;

fn keyword_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIMENSION];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
    {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(17_usize, |acc, b| acc.wrapping_mul(131).wrapping_add(b as usize))
            % DIMENSION;
        vector[bucket] += 1.0;
    }
    vector
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ChatError> {
        Ok(keyword_vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ChatError> {
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// Answers with the excerpts it was given
struct GroundedModel;

#[async_trait]
impl LanguageModel for GroundedModel {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let context = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(format!("Based on the document: {}", context))
    }
}

fn write_pdf(dir: &Path, name: &str, pages: &[&str]) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 11.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
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
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let path = dir.join(name);
    doc.save(&path).expect("pdf should save");
    path
}

fn manager_for(temp_dir: &TempDir, backend: IndexBackend) -> SessionManager {
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.index.backend = backend;
    SessionManager::new(
        config,
        ModelClients::new(Arc::new(KeywordEmbedder), Arc::new(GroundedModel)),
    )
}

#[tokio::test]
async fn bird_document_question_is_grounded() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let pdf = write_pdf(temp_dir.path(), "bird.pdf", &["This document describes a bird."]);
    let manager = manager_for(&temp_dir, IndexBackend::Memory);

    let chunks = manager.ingest(&pdf).await.expect("ingest should succeed");
    let answer = manager
        .ask("What is the document about?")
        .await
        .expect("ask should succeed");

    assert_eq!(chunks, 1);
    assert!(answer.contains("This document describes a bird."));
}

#[tokio::test]
async fn asking_first_fails_with_no_document() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let manager = manager_for(&temp_dir, IndexBackend::Memory);

    let result = manager.ask("Anything?").await;

    assert!(matches!(result, Err(ChatError::NoDocumentLoaded)));
    assert!(manager.history().await.is_empty());
    assert!(!manager.has_document().await);
}

#[tokio::test]
async fn second_document_fully_replaces_first() {
    for backend in [IndexBackend::Memory, IndexBackend::LanceDb] {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let herons = write_pdf(
            temp_dir.path(),
            "herons.pdf",
            &["Herons wade through marshes spearing frogs with their beaks."],
        );
        let engines = write_pdf(
            temp_dir.path(),
            "engines.pdf",
            &["Diesel engines ignite fuel through compression heat alone."],
        );
        let manager = manager_for(&temp_dir, backend);

        manager.ingest(&herons).await.expect("first ingest");
        manager.ask("What do herons eat?").await.expect("first ask");
        manager.ingest(&engines).await.expect("second ingest");

        assert!(manager.history().await.is_empty(), "{} backend", backend);
        let answer = manager.ask("What do herons eat?").await.expect("second ask");
        assert!(!answer.contains("marshes"), "{} backend leaked old chunks", backend);
        assert!(answer.contains("Diesel"));
        assert_eq!(manager.document_name().await.as_deref(), Some("engines.pdf"));
    }
}

#[tokio::test]
async fn history_grows_by_one_per_answer() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let pdf = write_pdf(
        temp_dir.path(),
        "birds.pdf",
        &[
            "Sparrows are small brown birds common in cities.",
            "Owls are nocturnal hunters with silent flight.",
        ],
    );
    let manager = manager_for(&temp_dir, IndexBackend::Memory);
    manager.ingest(&pdf).await.expect("ingest should succeed");

    let questions = ["Where do sparrows live?", "When do owls hunt?", "Are owls loud?"];
    for (i, question) in questions.iter().enumerate() {
        manager.ask(question).await.expect("ask should succeed");
        let history = manager.history().await;
        assert_eq!(history.len(), i + 1);
        assert_eq!(history[i].question, *question);
    }
}

#[tokio::test]
async fn non_pdf_file_is_rejected_and_state_kept() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let pdf = write_pdf(temp_dir.path(), "bird.pdf", &["This document describes a bird."]);
    let text_file = temp_dir.path().join("notes.pdf");
    std::fs::write(&text_file, "these are not pdf bytes").expect("should write file");
    let manager = manager_for(&temp_dir, IndexBackend::Memory);
    manager.ingest(&pdf).await.expect("ingest should succeed");

    let result = manager.ingest(&text_file).await;

    assert!(matches!(result, Err(ChatError::DocumentLoad(_))));
    assert_eq!(manager.document_name().await.as_deref(), Some("bird.pdf"));
}

#[test]
fn three_pages_of_five_hundred_chars_make_two_chunks() {
    let page_text = |n: usize| -> String {
        let sentence = format!("Page {} talks about migratory birds and their routes. ", n);
        sentence.chars().cycle().take(500).collect()
    };
    let pages: Vec<PageText> = (1..=3)
        .map(|n| PageText {
            page_number: n,
            text: page_text(n),
        })
        .collect();

    let chunks = split_pages(&pages, &ChunkingConfig::default());

    assert_eq!(chunks.len(), 2);
    assert!((800..=900).contains(&chunks[1].source_offset));
    assert!(chunks.iter().all(|c| c.char_len() <= 1000));
}
