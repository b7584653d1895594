use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Failed to load document: {0}")]
    DocumentLoad(String),

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("No document has been loaded yet. Upload a PDF before asking questions.")]
    NoDocumentLoaded,

    #[error("Vector index error: {0}")]
    Index(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod conversation;
pub mod document;
pub mod embeddings;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod ollama;
pub mod server;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;
