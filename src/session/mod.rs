// Session module
// Owns the single conversation the service holds and serializes access to it


use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::ChatError;
use crate::config::Config;
use crate::conversation::{ConversationSession, ConversationTurn, ModelClients};
use crate::document::PageText;
use crate::embeddings::Embedder;
use crate::generation::LanguageModel;
use crate::index::VectorIndex;
use crate::ingest::DocumentIngestor;

/// Current state: either nothing loaded, or one document and its conversation
#[derive(Debug, Default)]
pub struct Session {
    conversation: Option<ConversationSession>,
}

impl Session {
    #[inline]
    pub fn conversation(&self) -> Option<&ConversationSession> {
        self.conversation.as_ref()
    }

    #[inline]
    pub fn has_document(&self) -> bool {
        self.conversation.is_some()
    }
}

/// Entry point for ingesting documents and asking questions.
///
/// `turn` is held across a whole answer and across every swap, so questions
/// run one at a time and a swap waits for the answer in flight. `session` is
/// only held for short reads and writes, so status queries never wait on a model.
pub struct SessionManager {
    config: Config,
    clients: ModelClients,
    ingestor: DocumentIngestor,
    turn: Mutex<()>,
    session: Mutex<Session>,
}

impl SessionManager {
    #[inline]
    pub fn new(config: Config, clients: ModelClients) -> Self {
        let ingestor = DocumentIngestor::new(config.clone(), Arc::clone(&clients.embedder));
        Self {
            config,
            clients,
            ingestor,
            turn: Mutex::new(()),
            session: Mutex::new(Session::default()),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.clients.embedder)
    }

    #[inline]
    pub fn language_model(&self) -> Arc<dyn LanguageModel> {
        Arc::clone(&self.clients.language_model)
    }

    /// Index the PDF at `path` and make it the current document.
    ///
    /// On failure the previous document and history stay in place.
    #[inline]
    pub async fn ingest(&self, path: &Path) -> Result<usize, ChatError> {
        let index = self.ingestor.ingest(path).await?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(self.replace(index, name).await)
    }

    /// Index already extracted pages and make them the current document
    #[inline]
    pub async fn ingest_pages(
        &self,
        name: impl Into<String>,
        pages: Vec<PageText>,
    ) -> Result<usize, ChatError> {
        let index = self.ingestor.ingest_pages(pages).await?;
        Ok(self.replace(index, name.into()).await)
    }

    async fn replace(&self, index: Box<dyn VectorIndex>, name: String) -> usize {
        let chunk_count = index.len();
        let turn = self.turn.lock().await;
        let previous = self
            .session
            .lock()
            .await
            .conversation
            .replace(ConversationSession::new(index, name.clone()));
        drop(turn);

        if let Some(previous) = previous {
            info!(
                "Replacing {} ({} turns) with {}",
                previous.document_name(),
                previous.history().len(),
                name
            );
            if let Err(e) = previous.discard().await {
                warn!("Failed to release index for {}: {}", previous.document_name(), e);
            }
        } else {
            info!("Loaded {} ({} chunks)", name, chunk_count);
        }

        chunk_count
    }

    /// Answer a question about the current document
    #[inline]
    pub async fn ask(&self, question: &str) -> Result<String, ChatError> {
        let _turn = self.turn.lock().await;
        let mut conversation = self
            .with_session(|session| session.conversation().cloned())
            .await
            .ok_or(ChatError::NoDocumentLoaded)?;

        let answer = conversation
            .answer(question, &self.clients, &self.config.retrieval)
            .await?;

        // Nothing else writes the conversation while `turn` is held
        self.session.lock().await.conversation = Some(conversation);
        Ok(answer)
    }

    /// Drop the current document and release its index storage
    #[inline]
    pub async fn close(&self) -> Result<(), ChatError> {
        let _turn = self.turn.lock().await;
        let current = self.session.lock().await.conversation.take();
        match current {
            Some(conversation) => {
                info!("Closing {}", conversation.document_name());
                conversation.discard().await
            }
            None => Ok(()),
        }
    }

    #[inline]
    pub async fn history(&self) -> Vec<ConversationTurn> {
        self.with_session(|session| {
            session
                .conversation()
                .map(|c| c.history().turns().to_vec())
                .unwrap_or_default()
        })
        .await
    }

    #[inline]
    pub async fn document_name(&self) -> Option<String> {
        self.with_session(|session| {
            session
                .conversation()
                .map(|c| c.document_name().to_string())
        })
        .await
    }

    #[inline]
    pub async fn has_document(&self) -> bool {
        self.with_session(Session::has_document).await
    }

    /// Run `f` with read access to the current session
    #[inline]
    pub async fn with_session<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        let session = self.session.lock().await;
        f(&session)
    }
}

impl std::fmt::Debug for SessionManager {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
