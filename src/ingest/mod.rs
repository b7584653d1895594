// Ingest module
// Turns a PDF into a populated vector index: load, split, embed, insert


use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::ChatError;
use crate::config::Config;
use crate::document::{PageText, load_pdf};
use crate::embeddings::{Embedder, split_pages};
use crate::index::{IndexedChunk, VectorIndex, clear_stale_indexes, create_index};

/// Builds a fresh vector index for a document.
///
/// Assumes it is the only writer to the configured vector database: the
/// first ingestion clears indexes that earlier processes left behind.
pub struct DocumentIngestor {
    config: Config,
    embedder: Arc<dyn Embedder>,
    stale_cleared: OnceCell<()>,
}

impl DocumentIngestor {
    #[inline]
    pub fn new(config: Config, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            config,
            embedder,
            stale_cleared: OnceCell::new(),
        }
    }

    /// Load the PDF at `path` and index its text
    #[inline]
    pub async fn ingest(&self, path: &Path) -> Result<Box<dyn VectorIndex>, ChatError> {
        info!("Ingesting document {}", path.display());

        let owned_path = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || load_pdf(&owned_path))
            .await
            .map_err(|e| ChatError::DocumentLoad(format!("PDF extraction task failed: {}", e)))??;

        self.ingest_pages(pages).await
    }

    /// Index text that has already been extracted
    #[inline]
    pub async fn ingest_pages(
        &self,
        pages: Vec<PageText>,
    ) -> Result<Box<dyn VectorIndex>, ChatError> {
        let started = Instant::now();
        let chunks = split_pages(&pages, &self.config.chunking);

        if chunks.is_empty() {
            return Err(ChatError::DocumentLoad(
                "Document contains no extractable text".to_string(),
            ));
        }

        let batch_size = (self.config.ollama.batch_size as usize).max(1);
        let mut entries = Vec::with_capacity(chunks.len());
        let mut dimension: Option<usize> = None;

        for (batch_idx, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;

            if vectors.len() != batch.len() {
                return Err(ChatError::EmbeddingService(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            for vector in &vectors {
                let expected = *dimension.get_or_insert(vector.len());
                if vector.len() != expected {
                    return Err(ChatError::EmbeddingService(format!(
                        "Inconsistent embedding dimensions: expected {}, got {}",
                        expected,
                        vector.len()
                    )));
                }
            }

            debug!(
                "Embedded batch {} ({} chunks)",
                batch_idx + 1,
                batch.len()
            );

            entries.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, vector)| IndexedChunk { chunk, vector }),
            );
        }

        self.clear_stale_once().await;
        let mut index = create_index(&self.config).await?;
        if let Err(e) = index.insert(entries).await {
            if let Err(discard_error) = index.discard().await {
                warn!("Failed to release partially built index: {}", discard_error);
            }
            return Err(e);
        }

        info!(
            "Indexed {} pages as {} chunks in {:.2?}",
            pages.len(),
            index.len(),
            started.elapsed()
        );

        Ok(index)
    }

    async fn clear_stale_once(&self) {
        self.stale_cleared
            .get_or_init(|| async {
                if let Err(e) = clear_stale_indexes(&self.config).await {
                    warn!("Failed to clear stale indexes: {}", e);
                }
            })
            .await;
    }
}
