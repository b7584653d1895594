// Embeddings module
// Text chunking and the embedding model seam

pub mod chunking;
pub mod ollama;

use async_trait::async_trait;

use crate::ChatError;

pub use chunking::{ChunkingConfig, DocumentChunk, split_pages, split_text};
pub use ollama::OllamaEmbedder;

/// Maps text to fixed-dimension vectors.
///
/// Implementations must return vectors of one dimension for the lifetime of
/// a session, and `embed_batch` must return exactly one vector per input.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ChatError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ChatError>;
}
