//! crates/lesson_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases, model
//! providers, image sources or the media CDN.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{
    AssetKind, AudioTransform, ImageTransform, Lesson, LessonEvent, LessonId, LessonPatch,
    LessonProgress, NewLesson, StoredImage, UserProfile, VoiceOptions,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// The provider answered with a non-success status.
    #[error("Provider returned status {status}: {message}")]
    Provider {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },
    /// A concurrent write won the race for the same record.
    #[error("Write conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// Rate limiting (429) and overload (503) are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Provider { status: 429 | 503, .. })
    }

    /// The delay the provider asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PortError::Provider { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Lessons ---
    async fn create_lesson(&self, lesson: NewLesson) -> PortResult<Lesson>;

    async fn get_lesson(&self, lesson_id: LessonId) -> PortResult<Lesson>;

    async fn list_lessons(&self, device_id: Option<&str>) -> PortResult<Vec<Lesson>>;

    /// Applies the `Some` fields of `patch` and bumps `updated_at`.
    async fn update_lesson(&self, lesson_id: LessonId, patch: LessonPatch) -> PortResult<Lesson>;

    // --- Learner Profiles ---
    async fn get_profile_by_device(&self, device_id: &str) -> PortResult<Option<UserProfile>>;

    async fn upsert_profile(&self, profile: UserProfile) -> PortResult<UserProfile>;

    // --- Lesson Progress ---
    async fn get_progress(
        &self,
        lesson_id: LessonId,
        device_id: &str,
    ) -> PortResult<Option<LessonProgress>>;

    async fn save_progress(&self, progress: LessonProgress) -> PortResult<LessonProgress>;

    /// Most recently updated first.
    async fn list_progress(&self, device_id: &str) -> PortResult<Vec<LessonProgress>>;
}

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// Sends a single prompt to the generative model and returns its raw text answer.
    async fn generate_text(&self, prompt: &str) -> PortResult<String>;
}

/// A reference-work page summary, as returned by the image source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSummary {
    pub title: String,
    pub extract: Option<String>,
    pub thumbnail_url: Option<String>,
}

#[async_trait]
pub trait ImageLookupService: Send + Sync {
    /// Looks up the summary of the page named exactly `title`.
    async fn page_summary(&self, title: &str) -> PortResult<Option<PageSummary>>;

    /// Full-text search returning up to `limit` page titles in relevance order.
    async fn search_titles(&self, query: &str, limit: usize) -> PortResult<Vec<String>>;
}

#[async_trait]
pub trait TextToSpeechService: Send + Sync {
    /// Generates audio data from a string of text.
    async fn generate_audio(&self, text: &str, voice: &VoiceOptions) -> PortResult<Vec<u8>>;
}

#[async_trait]
pub trait MediaStorageService: Send + Sync {
    /// Fetches `source_url` into the CDN, applying `transform`.
    async fn upload_image(
        &self,
        source_url: &str,
        folder: &str,
        transform: &ImageTransform,
    ) -> PortResult<StoredImage>;

    /// Uploads an audio buffer under `public_id` and returns its durable URL.
    async fn upload_audio(
        &self,
        audio: &[u8],
        folder: &str,
        public_id: &str,
        transform: &AudioTransform,
    ) -> PortResult<String>;

    async fn delete_asset(&self, public_id: &str, kind: AssetKind) -> PortResult<bool>;
}

#[async_trait]
pub trait ProgressPublisher: Send + Sync {
    /// Pushes an event to the lesson's subscribers. Delivery failures are the
    /// publisher's concern and never reach the pipeline.
    async fn publish(&self, event: LessonEvent);
}
