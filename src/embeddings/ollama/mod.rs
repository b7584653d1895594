
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::Embedder;
use crate::ChatError;
use crate::config::OllamaConfig;
use crate::ollama::OllamaTransport;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedding client for the Ollama `/api/embed` endpoint
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    transport: OllamaTransport,
    model: String,
    batch_size: usize,
}

impl OllamaEmbedder {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self, ChatError> {
        let transport = OllamaTransport::new(config)
            .map_err(|e| ChatError::EmbeddingService(format!("{:#}", e)))?;
        Ok(Self::with_transport(
            transport,
            config.embedding_model.clone(),
            config.batch_size as usize,
        ))
    }

    #[inline]
    pub fn with_transport(transport: OllamaTransport, model: String, batch_size: usize) -> Self {
        info!(
            "Created Ollama embedder for {} using model {}",
            transport.base_url(),
            model
        );
        Self {
            transport,
            model,
            batch_size: batch_size.max(1),
        }
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn transport(&self) -> &OllamaTransport {
        &self.transport
    }

    /// Embed all texts, `batch_size` per request
    fn embed_all_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ChatError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for (batch_idx, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!(
                "Embedding batch {} ({} texts) with {}",
                batch_idx + 1,
                batch.len(),
                self.model
            );

            let request = EmbedRequest {
                model: &self.model,
                input: batch,
            };
            let response: EmbedResponse = self
                .transport
                .post_json("/api/embed", &request)
                .map_err(|e| ChatError::EmbeddingService(format!("{:#}", e)))?;

            if response.embeddings.len() != batch.len() {
                return Err(ChatError::EmbeddingService(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    response.embeddings.len()
                )));
            }

            vectors.extend(response.embeddings);
        }

        if let Some(first) = vectors.first() {
            let dimension = first.len();
            if dimension == 0 || vectors.iter().any(|v| v.len() != dimension) {
                return Err(ChatError::EmbeddingService(
                    "Embedding service returned vectors of inconsistent dimension".to_string(),
                ));
            }
        }

        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    #[inline]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ChatError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            ChatError::EmbeddingService("Embedding service returned no vector".to_string())
        })
    }

    #[inline]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ChatError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embedder = self.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || embedder.embed_all_blocking(&texts))
            .await
            .map_err(|e| ChatError::EmbeddingService(format!("Embedding task failed: {}", e)))?
    }
}
