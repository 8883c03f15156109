//! services/api/src/web/audio.rs
//!
//! On-demand narration of arbitrary text.

use crate::web::{
    response::{bad_request, lesson_error, Envelope, HandlerError},
    state::AppState,
};
use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Json},
};
use bytes::Bytes;
use lesson_core::domain::VoiceOptions;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

pub const MAX_TEXT_CHARS: usize = 5000;

#[derive(Deserialize, ToSchema, Debug)]
pub struct AudioRequest {
    /// 1 to 5000 characters after trimming.
    pub text: String,
    /// A provider voice name; the configured voice is used when absent.
    pub voice: Option<String>,
}

#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AudioUrlResponse {
    pub audio_url: String,
    pub text: String,
    pub voice: Option<String>,
}

fn validate(req: &AudioRequest) -> Result<(String, Option<VoiceOptions>), HandlerError> {
    let text = req.text.trim();
    let chars = text.chars().count();
    if chars == 0 || chars > MAX_TEXT_CHARS {
        return Err(bad_request(format!(
            "text must be between 1 and {} characters",
            MAX_TEXT_CHARS
        )));
    }
    let voice = req.voice.as_ref().map(|name| VoiceOptions {
        language_code: None,
        voice_name: Some(name.clone()),
    });
    Ok((text.to_string(), voice))
}

/// Synthesize text and return the MP3 bytes directly.
#[utoipa::path(
    post,
    path = "/api/v1/audio/stream",
    request_body = AudioRequest,
    responses(
        (status = 200, description = "MP3 audio", content_type = "audio/mpeg"),
        (status = 400, description = "Empty or oversized text"),
        (status = 502, description = "Speech provider failure")
    )
)]
pub async fn stream_audio_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<AudioRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let (text, voice) = validate(&payload)?;
    let audio = app_state
        .speech
        .synthesize(&text, voice.as_ref())
        .await
        .map_err(|e| lesson_error("Failed to generate audio", e))?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::ACCEPT_RANGES, "bytes"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        Bytes::from(audio),
    ))
}

/// Synthesize text, store it on the media CDN and return its URL.
#[utoipa::path(
    post,
    path = "/api/v1/audio/url",
    request_body = AudioRequest,
    responses(
        (status = 200, description = "Stored audio", body = AudioUrlResponse),
        (status = 400, description = "Empty or oversized text"),
        (status = 502, description = "Speech or storage provider failure")
    )
)]
pub async fn audio_url_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<AudioRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let (text, voice) = validate(&payload)?;
    let audio_url = app_state
        .speech
        .synthesize_named(&text, voice.as_ref(), "stream")
        .await
        .map_err(|e| lesson_error("Failed to generate audio", e))?;

    Ok(Json(Envelope::ok(AudioUrlResponse {
        audio_url,
        text,
        voice: payload.voice,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> AudioRequest {
        AudioRequest {
            text: text.to_string(),
            voice: None,
        }
    }

    #[test]
    fn text_length_is_bounded() {
        assert!(validate(&request("   ")).is_err());
        assert!(validate(&request(&"a".repeat(MAX_TEXT_CHARS))).is_ok());
        assert!(validate(&request(&"a".repeat(MAX_TEXT_CHARS + 1))).is_err());
    }

    #[test]
    fn voice_becomes_a_voice_override() {
        let (_, voice) = validate(&AudioRequest {
            text: "Bonjour".to_string(),
            voice: Some("nova".to_string()),
        })
        .unwrap();
        assert_eq!(voice.unwrap().voice_name.as_deref(), Some("nova"));
    }
}
