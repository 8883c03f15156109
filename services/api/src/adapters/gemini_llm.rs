//! services/api/src/adapters/gemini_llm.rs
//!
//! This module contains the adapter for Google's Gemini `generateContent` API.
//! It implements the `TextGenerationService` port from the `core` crate.
//!
//! The REST API is called directly so that rate-limit statuses and their
//! `retry-after` delay reach the planner's retry policy untouched.

use async_trait::async_trait;
use lesson_core::ports::{PortError, PortResult, TextGenerationService};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::http;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize, Serialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TextGenerationService` using Gemini, with Google
/// Search grounding enabled so plans can follow official curricula.
#[derive(Clone)]
pub struct GeminiTextAdapter {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiTextAdapter {
    /// Creates a new `GeminiTextAdapter`.
    pub fn new(api_key: String, model: String) -> PortResult<Self> {
        Ok(Self {
            client: http::client(Duration::from_secs(120))?,
            api_key,
            model,
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }
}

//=========================================================================================
// `TextGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextGenerationService for GeminiTextAdapter {
    async fn generate_text(&self, prompt: &str) -> PortResult<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "tools": [{ "google_search": {} }],
        });

        debug!(model = %self.model, prompt_len = prompt.len(), "Calling Gemini");
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(http::transport_error)?;

        if !response.status().is_success() {
            return Err(http::provider_error(response).await);
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(PortError::Unexpected(
                "Gemini response contained no text content.".to_string(),
            ));
        }
        Ok(text)
    }
}
