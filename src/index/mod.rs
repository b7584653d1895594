// Vector index module
// Stores chunk embeddings for one document and answers top-k similarity queries

pub mod lancedb;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::ChatError;
use crate::config::Config;
use crate::embeddings::DocumentChunk;

pub use self::lancedb::LanceIndex;
pub use memory::MemoryIndex;

/// A chunk together with its embedding
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub chunk: DocumentChunk,
    pub vector: Vec<f32>,
}

/// A retrieved chunk and its cosine similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Similarity index over the chunks of a single document.
///
/// All vectors in one index share a dimension. `query` returns at most `k`
/// results ordered by descending similarity.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn insert(&mut self, entries: Vec<IndexedChunk>) -> Result<(), ChatError>;

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, ChatError>;

    fn len(&self) -> usize;

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension, known once the first entry is inserted
    fn dimension(&self) -> Option<usize>;

    /// Release any storage held by the index
    #[inline]
    async fn discard(&self) -> Result<(), ChatError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Memory,
    #[serde(rename = "lancedb")]
    LanceDb,
}

impl fmt::Display for IndexBackend {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::LanceDb => write!(f, "lancedb"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub backend: IndexBackend,
}

/// Create an empty index using the configured backend
#[inline]
pub async fn create_index(config: &Config) -> Result<Box<dyn VectorIndex>, ChatError> {
    info!("Creating {} vector index", config.index.backend);
    match config.index.backend {
        IndexBackend::Memory => Ok(Box::new(MemoryIndex::new())),
        IndexBackend::LanceDb => Ok(Box::new(LanceIndex::new(config).await?)),
    }
}

/// Remove indexes an earlier process left in the configured backend
#[inline]
pub async fn clear_stale_indexes(config: &Config) -> Result<usize, ChatError> {
    match config.index.backend {
        IndexBackend::Memory => Ok(0),
        IndexBackend::LanceDb => LanceIndex::drop_document_tables(config).await,
    }
}

/// Reject entries whose dimension differs from `expected` or from each other
pub(crate) fn check_dimensions(
    entries: &[IndexedChunk],
    expected: Option<usize>,
) -> Result<Option<usize>, ChatError> {
    let Some(first) = entries.first() else {
        return Ok(expected);
    };
    let dimension = expected.unwrap_or(first.vector.len());

    if dimension == 0 {
        return Err(ChatError::Index("Cannot index empty vectors".to_string()));
    }

    if let Some(bad) = entries.iter().find(|e| e.vector.len() != dimension) {
        return Err(ChatError::Index(format!(
            "Vector dimension mismatch: expected {}, got {} for chunk {}",
            dimension,
            bad.vector.len(),
            bad.chunk.chunk_index
        )));
    }

    Ok(Some(dimension))
}

/// Order results by descending score, ties broken by chunk position
pub(crate) fn rank(results: &mut Vec<ScoredChunk>, k: usize) {
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
    results.truncate(k);
}
