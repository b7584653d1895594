// Deterministic stand-ins for the model services, shared by unit tests

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use crate::ChatError;
use crate::embeddings::Embedder;
use crate::generation::{ChatMessage, LanguageModel, Role};

pub const STUB_DIMENSION: usize = 32;

/// Bag-of-words embedder: each word bumps one hashed bucket
#[derive(Debug, Default)]
pub struct StubEmbedder {
    pub batch_calls: AtomicUsize,
    pub batch_sizes: Mutex<Vec<usize>>,
}

impl StubEmbedder {
    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; STUB_DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            let bucket = word
                .bytes()
                .fold(7_usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
                % STUB_DIMENSION;
            vector[bucket] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ChatError> {
        Ok(Self::vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ChatError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes
            .lock()
            .expect("batch size lock poisoned")
            .push(texts.len());
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

/// Embedder whose every call fails
#[derive(Debug, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ChatError> {
        Err(ChatError::EmbeddingService("stub embedder offline".to_string()))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ChatError> {
        Err(ChatError::EmbeddingService("stub embedder offline".to_string()))
    }
}

/// Embedder that drops the last vector of every batch
#[derive(Debug, Default)]
pub struct ShortEmbedder;

#[async_trait]
impl Embedder for ShortEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ChatError> {
        Ok(StubEmbedder::vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ChatError> {
        let mut vectors: Vec<Vec<f32>> = texts.iter().map(|t| StubEmbedder::vector_for(t)).collect();
        vectors.pop();
        Ok(vectors)
    }
}

/// Language model that quotes its system prompt back and records every request
#[derive(Debug, Default)]
pub struct EchoLanguageModel {
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl EchoLanguageModel {
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().expect("request lock poisoned").clone()
    }
}

#[async_trait]
impl LanguageModel for EchoLanguageModel {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        self.requests
            .lock()
            .expect("request lock poisoned")
            .push(messages.to_vec());

        let system = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map_or("", |m| m.content.as_str());
        let question = messages.last().map_or("", |m| m.content.as_str());
        Ok(format!("Q: {} A: {}", question, system))
    }
}

/// Language model whose every call fails
#[derive(Debug, Default)]
pub struct FailingLanguageModel;

#[async_trait]
impl LanguageModel for FailingLanguageModel {
    async fn generate(&self, _messages: &[ChatMessage]) -> Result<String, ChatError> {
        Err(ChatError::Generation("stub model offline".to_string()))
    }
}

/// Minimal PDF with one line of Courier text per page
pub fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
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

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("pdf should serialize");
    bytes
}
