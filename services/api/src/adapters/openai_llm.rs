//! services/api/src/adapters/openai_llm.rs
//!
//! This module contains the adapter for an OpenAI chat model.
//! It implements the `TextGenerationService` port from the `core` crate, and backs
//! the planner when `LLM_PROVIDER=openai` as well as the study aids.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use lesson_core::ports::{PortError, PortResult, TextGenerationService};

const SYSTEM_INSTRUCTIONS: &str = "You are an experienced teacher who designs clear, accurate \
lessons and study material. When asked for JSON, reply with a single JSON object and nothing else.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TextGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiTextAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiTextAdapter {
    /// Creates a new `OpenAiTextAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

/// Rate limits are the only OpenAI failure the retry policy should see as transient.
fn map_openai_error(e: OpenAIError) -> PortError {
    match e {
        OpenAIError::ApiError(api)
            if api.code.as_deref() == Some("rate_limit_exceeded")
                || api.r#type.as_deref() == Some("requests") =>
        {
            PortError::Provider {
                status: 429,
                message: api.message,
                retry_after: None,
            }
        }
        other => PortError::Unexpected(other.to_string()),
    }
}

//=========================================================================================
// `TextGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextGenerationService for OpenAiTextAdapter {
    async fn generate_text(&self, prompt: &str) -> PortResult<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        match response.choices.into_iter().next() {
            Some(choice) => choice.message.content.ok_or_else(|| {
                PortError::Unexpected("LLM response contained no text content.".to_string())
            }),
            None => Err(PortError::Unexpected(
                "LLM returned no choices in its response.".to_string(),
            )),
        }
    }
}
