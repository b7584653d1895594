
use async_trait::async_trait;
use tracing::debug;

use super::{IndexedChunk, ScoredChunk, VectorIndex, check_dimensions, rank};
use crate::ChatError;

/// Brute-force cosine index held in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryIndex {
    entries: Vec<IndexedChunk>,
    dimension: Option<usize>,
}

impl MemoryIndex {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    #[inline]
    async fn insert(&mut self, entries: Vec<IndexedChunk>) -> Result<(), ChatError> {
        self.dimension = check_dimensions(&entries, self.dimension)?;
        debug!("Inserting {} vectors into memory index", entries.len());
        self.entries.extend(entries);
        Ok(())
    }

    #[inline]
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, ChatError> {
        if let Some(dimension) = self.dimension {
            if vector.len() != dimension {
                return Err(ChatError::Retrieval(format!(
                    "Query vector has dimension {}, index expects {}",
                    vector.len(),
                    dimension
                )));
            }
        }

        let mut results: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(vector, &entry.vector),
            })
            .collect();

        rank(&mut results, k);
        Ok(results)
    }

    #[inline]
    fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}

/// Cosine similarity, 0.0 when either vector has zero magnitude
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
