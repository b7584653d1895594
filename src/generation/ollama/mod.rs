
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ChatMessage, LanguageModel};
use crate::ChatError;
use crate::config::OllamaConfig;
use crate::ollama::OllamaTransport;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

/// Chat completion client for the Ollama `/api/chat` endpoint
#[derive(Debug, Clone)]
pub struct OllamaChatModel {
    transport: OllamaTransport,
    model: String,
    temperature: f32,
}

impl OllamaChatModel {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self, ChatError> {
        let transport = OllamaTransport::new(config)
            .map_err(|e| ChatError::Generation(format!("{:#}", e)))?;
        Ok(Self::with_transport(
            transport,
            config.chat_model.clone(),
            config.temperature,
        ))
    }

    #[inline]
    pub fn with_transport(transport: OllamaTransport, model: String, temperature: f32) -> Self {
        info!(
            "Created Ollama chat model {} at {}",
            model,
            transport.base_url()
        );
        Self {
            transport,
            model,
            temperature,
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

    fn generate_blocking(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        debug!(
            "Requesting completion from {} with {} messages",
            self.model,
            messages.len()
        );

        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        let response: ChatResponse = self
            .transport
            .post_json("/api/chat", &request)
            .map_err(|e| ChatError::Generation(format!("{:#}", e)))?;

        debug!(
            "Received {} chars from {}",
            response.message.content.len(),
            self.model
        );
        Ok(response.message.content)
    }
}

#[async_trait]
impl LanguageModel for OllamaChatModel {
    #[inline]
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let model = self.clone();
        let messages = messages.to_vec();
        tokio::task::spawn_blocking(move || model.generate_blocking(&messages))
            .await
            .map_err(|e| ChatError::Generation(format!("Generation task failed: {}", e)))?
    }
}
