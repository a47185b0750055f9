//! services/api/src/adapters/model_llm.rs
//!
//! This module contains the adapter for the generative model service.
//! It implements the `ModelService` port from the `core` crate: one free-text
//! channel (prompt in, completion out) that the core's index and dialogue
//! sub-protocols are layered on.

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use cognify_core::ports::{ModelService, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ModelService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiModelAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiModelAdapter {
    /// Creates a new `OpenAiModelAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `ModelService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ModelService for OpenAiModelAdapter {
    async fn complete(&self, prompt: &str) -> PortResult<String> {
        let messages = vec![ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.to_string())
                .build()
                .map_err(|e| PortError::ModelUnavailable(e.to_string()))?,
        )];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()
            .map_err(|e| PortError::ModelUnavailable(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| PortError::ModelUnavailable(e.to_string()))?;

        let completion = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| {
                PortError::ModelUnavailable("Model returned no completion text".to_string())
            })?;

        Ok(completion)
    }
}

/// Stand-in used when no API key is configured. Every call reports the model
/// service as unavailable, which the engine degrades to an apology turn.
pub struct UnconfiguredModelAdapter;

#[async_trait]
impl ModelService for UnconfiguredModelAdapter {
    async fn complete(&self, _prompt: &str) -> PortResult<String> {
        Err(PortError::ModelUnavailable(
            "OPENAI_API_KEY is not configured".to_string(),
        ))
    }
}
