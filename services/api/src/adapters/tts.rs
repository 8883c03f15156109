//! services/api/src/adapters/tts.rs
//!
//! This module contains the adapter for OpenAI's Text-to-Speech (TTS) service.
//! It implements the `TextToSpeechService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::audio::{CreateSpeechRequest, SpeechModel, SpeechResponseFormat, Voice},
    Client,
};
use async_trait::async_trait;
use lesson_core::domain::VoiceOptions;
use lesson_core::ports::{PortError, PortResult, TextToSpeechService};

/// Maps a configured voice name onto the provider's voice list.
pub fn parse_voice(name: &str) -> Option<Voice> {
    match name.trim().to_lowercase().as_str() {
        "alloy" => Some(Voice::Alloy),
        "echo" => Some(Voice::Echo),
        "fable" => Some(Voice::Fable),
        "onyx" => Some(Voice::Onyx),
        "nova" => Some(Voice::Nova),
        "shimmer" => Some(Voice::Shimmer),
        _ => None,
    }
}

pub fn parse_model(name: &str) -> SpeechModel {
    match name.trim() {
        "tts-1" => SpeechModel::Tts1,
        "tts-1-hd" => SpeechModel::Tts1Hd,
        other => SpeechModel::Other(other.to_string()),
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `TextToSpeechService` port using the OpenAI TTS API.
#[derive(Clone)]
pub struct OpenAiTtsAdapter {
    client: Client<OpenAIConfig>,
    model: SpeechModel,
    voice: Voice,
}

impl OpenAiTtsAdapter {
    /// Creates a new `OpenAiTtsAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: SpeechModel, voice: Voice) -> Self {
        Self {
            client,
            model,
            voice,
        }
    }
}

//=========================================================================================
// `TextToSpeechService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextToSpeechService for OpenAiTtsAdapter {
    /// Generates MP3 bytes for `text`. A recognised `voice_name` overrides the
    /// configured voice; the provider detects the language from the text itself.
    async fn generate_audio(&self, text: &str, voice: &VoiceOptions) -> PortResult<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(PortError::InvalidInput(
                "Cannot synthesize empty text".to_string(),
            ));
        }

        let voice = voice
            .voice_name
            .as_deref()
            .and_then(parse_voice)
            .unwrap_or_else(|| self.voice.clone());

        let request = CreateSpeechRequest {
            model: self.model.clone(),
            input: text.to_string(),
            voice,
            response_format: Some(SpeechResponseFormat::Mp3),
            ..Default::default()
        };

        let response = self
            .client
            .audio()
            .speech()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        Ok(response.bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_names_are_case_insensitive() {
        assert_eq!(parse_voice(" Nova "), Some(Voice::Nova));
        assert_eq!(parse_voice("fr-FR-Standard-A"), None);
    }

    #[test]
    fn unknown_models_pass_through() {
        assert_eq!(parse_model("tts-1-hd"), SpeechModel::Tts1Hd);
        assert_eq!(
            parse_model("gpt-4o-mini-tts"),
            SpeechModel::Other("gpt-4o-mini-tts".to_string())
        );
    }
}
