// Conversation module
// Retrieval-augmented question answering over one indexed document


use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ChatError;
use crate::config::OllamaConfig;
use crate::embeddings::{Embedder, OllamaEmbedder};
use crate::generation::{ChatMessage, LanguageModel, OllamaChatModel};
use crate::index::{ScoredChunk, VectorIndex};

const ANSWER_INSTRUCTIONS: &str = "You answer questions about a document the user uploaded. \
Use only the excerpts below and the conversation so far. \
If the excerpts do not contain the answer, say that you don't know instead of guessing.";

const CONDENSE_INSTRUCTIONS: &str = "Rewrite the user's follow-up question as a single \
standalone question that can be understood without the conversation. \
Keep the original language. Reply with the question only.";

/// Retrieval settings applied to every question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks retrieved per question
    pub k: usize,
    /// Most recent turns placed in the prompt, all when unset
    pub max_history_turns: Option<usize>,
    /// Rewrite follow-up questions into standalone ones before retrieval
    pub condense_question: bool,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            k: 2,
            max_history_turns: None,
            condense_question: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

/// Append-only record of answered questions, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, question: String, answer: String) {
        self.turns.push(ConversationTurn { question, answer });
    }

    #[inline]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The last `limit` turns, or all of them when `limit` is `None`
    #[inline]
    pub fn recent(&self, limit: Option<usize>) -> &[ConversationTurn] {
        let skip = limit.map_or(0, |n| self.turns.len().saturating_sub(n));
        &self.turns[skip..]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Model service handles built once and shared by every session
#[derive(Clone)]
pub struct ModelClients {
    pub embedder: Arc<dyn Embedder>,
    pub language_model: Arc<dyn LanguageModel>,
}

impl ModelClients {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, language_model: Arc<dyn LanguageModel>) -> Self {
        Self {
            embedder,
            language_model,
        }
    }

    /// Ollama-backed clients for embedding and chat
    #[inline]
    pub fn from_config(config: &OllamaConfig) -> Result<Self, ChatError> {
        config.validate()?;
        Ok(Self::new(
            Arc::new(OllamaEmbedder::new(config)?),
            Arc::new(OllamaChatModel::new(config)?),
        ))
    }
}

impl std::fmt::Debug for ModelClients {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClients").finish_non_exhaustive()
    }
}

/// An indexed document and the conversation held about it
pub struct ConversationSession {
    index: Arc<dyn VectorIndex>,
    history: ConversationHistory,
    document_name: String,
}

impl ConversationSession {
    #[inline]
    pub fn new(index: Box<dyn VectorIndex>, document_name: impl Into<String>) -> Self {
        Self {
            index: Arc::from(index),
            history: ConversationHistory::new(),
            document_name: document_name.into(),
        }
    }

    #[inline]
    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    #[inline]
    pub fn document_name(&self) -> &str {
        &self.document_name
    }

    #[inline]
    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    /// Answer `question` from the indexed document and record the turn.
    ///
    /// History is only appended when every step succeeds.
    #[inline]
    pub async fn answer(
        &mut self,
        question: &str,
        clients: &ModelClients,
        config: &RetrievalConfig,
    ) -> Result<String, ChatError> {
        let prompt_history = self.history.recent(config.max_history_turns);

        let retrieval_question = if config.condense_question && !prompt_history.is_empty() {
            let condensed = clients
                .language_model
                .generate(&build_condense_prompt(prompt_history, question))
                .await?;
            let condensed = condensed.trim();
            debug!("Condensed question: {}", condensed);
            if condensed.is_empty() {
                question.to_string()
            } else {
                condensed.to_string()
            }
        } else {
            question.to_string()
        };

        let query_vector = clients.embedder.embed(&retrieval_question).await?;
        let chunks = self.index.query(&query_vector, config.k).await?;
        debug!(
            "Retrieved {} chunks (scores: {})",
            chunks.len(),
            chunks.iter().map(|c| format!("{:.3}", c.score)).join(", ")
        );

        let messages = build_prompt(&chunks, prompt_history, question);
        let answer = clients.language_model.generate(&messages).await?;

        self.history.push(question.to_string(), answer.clone());
        info!(
            "Answered question {} about {}",
            self.history.len(),
            self.document_name
        );

        Ok(answer)
    }

    /// Release the storage behind this session's index
    #[inline]
    pub async fn discard(&self) -> Result<(), ChatError> {
        self.index.discard().await
    }
}

impl Clone for ConversationSession {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            index: Arc::clone(&self.index),
            history: self.history.clone(),
            document_name: self.document_name.clone(),
        }
    }
}

impl std::fmt::Debug for ConversationSession {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSession")
            .field("document_name", &self.document_name)
            .field("indexed_chunks", &self.index.len())
            .field("history", &self.history.len())
            .finish()
    }
}

/// System message with the retrieved excerpts, then past turns, then the question
#[inline]
pub fn build_prompt(
    chunks: &[ScoredChunk],
    history: &[ConversationTurn],
    question: &str,
) -> Vec<ChatMessage> {
    let excerpts = if chunks.is_empty() {
        "(no relevant excerpts found)".to_string()
    } else {
        chunks
            .iter()
            .map(|c| format!("[page {}]\n{}", c.chunk.page, c.chunk.text.trim()))
            .join("\n\n---\n\n")
    };

    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    messages.push(ChatMessage::system(format!(
        "{}\n\nDocument excerpts:\n\n{}",
        ANSWER_INSTRUCTIONS, excerpts
    )));
    push_history(&mut messages, history);
    messages.push(ChatMessage::user(question));
    messages
}

/// Messages asking the model to turn a follow-up into a standalone question
#[inline]
pub fn build_condense_prompt(history: &[ConversationTurn], question: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    messages.push(ChatMessage::system(CONDENSE_INSTRUCTIONS));
    push_history(&mut messages, history);
    messages.push(ChatMessage::user(format!("Follow-up question: {}", question)));
    messages
}

fn push_history(messages: &mut Vec<ChatMessage>, history: &[ConversationTurn]) {
    for turn in history {
        messages.push(ChatMessage::user(turn.question.clone()));
        messages.push(ChatMessage::assistant(turn.answer.clone()));
    }
}
