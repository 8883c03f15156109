//! crates/lesson_core/src/test_support.rs
//!
//! Hand-written fakes for every port, shared by the unit tests here and the
//! service's integration tests (behind the `test-support` feature).

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::{
    AssetKind, AudioTransform, ImageTransform, Lesson, LessonEvent, LessonId, LessonPatch,
    LessonProgress, LessonStatus, NewLesson, StoredImage, UserProfile, VoiceOptions,
};
use crate::memory::InMemoryDatabase;
use crate::ports::{
    DatabaseService, ImageLookupService, MediaStorageService, PageSummary, PortError, PortResult,
    ProgressPublisher, TextGenerationService, TextToSpeechService,
};

//=========================================================================================
// Text generation
//=========================================================================================

/// Answers prompts from a fixed script, one entry per call.
pub struct ScriptedLlm {
    script: Mutex<Vec<PortResult<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLlm {
    pub fn new(mut script: Vec<PortResult<String>>) -> Self {
        script.reverse();
        Self {
            script: Mutex::new(script),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }

    pub fn prompts_handle(&self) -> Arc<Mutex<Vec<String>>> {
        self.prompts.clone()
    }
}

#[async_trait]
impl TextGenerationService for ScriptedLlm {
    async fn generate_text(&self, prompt: &str) -> PortResult<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop())
            .unwrap_or_else(|| Err(PortError::Unexpected("script exhausted".to_string())))
    }
}

//=========================================================================================
// Image lookup
//=========================================================================================

#[derive(Default)]
pub struct FakeLookup {
    pages: HashMap<String, Option<String>>,
    searches: HashMap<String, Vec<String>>,
    delay: Option<Duration>,
}

impl FakeLookup {
    /// A page named `title`, with a thumbnail when `thumbnail` is set.
    pub fn with_page(mut self, title: &str, thumbnail: Option<&str>) -> Self {
        self.pages
            .insert(title.to_string(), thumbnail.map(str::to_string));
        self
    }

    pub fn with_search(mut self, query: &str, titles: &[&str]) -> Self {
        self.searches.insert(
            query.to_string(),
            titles.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn wait(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ImageLookupService for FakeLookup {
    async fn page_summary(&self, title: &str) -> PortResult<Option<PageSummary>> {
        self.wait().await;
        Ok(self.pages.get(title).map(|thumbnail| PageSummary {
            title: title.to_string(),
            extract: Some(format!("About {}", title)),
            thumbnail_url: thumbnail.clone(),
        }))
    }

    async fn search_titles(&self, query: &str, limit: usize) -> PortResult<Vec<String>> {
        self.wait().await;
        Ok(self
            .searches
            .get(query)
            .map(|titles| titles.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

//=========================================================================================
// Speech
//=========================================================================================

#[derive(Debug, Clone)]
pub struct TtsCall {
    pub text: String,
    pub started: Instant,
}

/// Records every synthesis request with its start time.
#[derive(Default)]
pub struct RecordingTts {
    calls: Mutex<Vec<TtsCall>>,
    delay: Option<Duration>,
    failing_on: Option<String>,
}

impl RecordingTts {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    /// Fails every request whose text contains `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.failing_on = Some(needle.to_string());
        self
    }

    pub fn calls(&self) -> Vec<TtsCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextToSpeechService for RecordingTts {
    async fn generate_audio(&self, text: &str, _voice: &VoiceOptions) -> PortResult<Vec<u8>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(TtsCall {
                text: text.to_string(),
                started: Instant::now(),
            });
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failing_on
            .as_deref()
            .is_some_and(|needle| text.contains(needle))
        {
            return Err(PortError::Provider {
                status: 500,
                message: "voice unavailable".to_string(),
                retry_after: None,
            });
        }
        Ok(format!("mp3:{}", text).into_bytes())
    }
}

//=========================================================================================
// Media storage
//=========================================================================================

/// Pretends to be the CDN: images come back as `.webp` under the folder, audio
/// as `.mp3`. Public ids starting with `missing/` fail to delete.
#[derive(Default)]
pub struct FakeStorage {
    failing: HashSet<String>,
    audio_uploads: Mutex<Vec<(String, String)>>,
}

impl FakeStorage {
    pub fn failing_on(mut self, source_url: &str) -> Self {
        self.failing.insert(source_url.to_string());
        self
    }

    /// `(folder, public_id)` of every audio upload.
    pub fn audio_uploads(&self) -> Vec<(String, String)> {
        self.audio_uploads
            .lock()
            .map(|u| u.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MediaStorageService for FakeStorage {
    async fn upload_image(
        &self,
        source_url: &str,
        folder: &str,
        transform: &ImageTransform,
    ) -> PortResult<StoredImage> {
        if self.failing.contains(source_url) {
            return Err(PortError::Provider {
                status: 400,
                message: "unreachable source".to_string(),
                retry_after: None,
            });
        }
        let file = source_url.rsplit('/').next().unwrap_or(source_url);
        let stem = file.split('.').next().unwrap_or(file);
        let public_id = format!("{}/{}", folder, stem);
        Ok(StoredImage {
            url: format!(
                "https://cdn.test/image/upload/{}.{}",
                public_id, transform.format
            ),
            public_id,
            width: transform.width,
            height: transform.height,
        })
    }

    async fn upload_audio(
        &self,
        _audio: &[u8],
        folder: &str,
        public_id: &str,
        transform: &AudioTransform,
    ) -> PortResult<String> {
        if let Ok(mut uploads) = self.audio_uploads.lock() {
            uploads.push((folder.to_string(), public_id.to_string()));
        }
        Ok(format!(
            "https://cdn.test/video/upload/{}/{}.{}",
            folder, public_id, transform.codec
        ))
    }

    async fn delete_asset(&self, public_id: &str, _kind: AssetKind) -> PortResult<bool> {
        if public_id.starts_with("missing/") {
            return Err(PortError::NotFound(public_id.to_string()));
        }
        Ok(true)
    }
}

//=========================================================================================
// Events
//=========================================================================================

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<LessonEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<LessonEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ProgressPublisher for RecordingPublisher {
    async fn publish(&self, event: LessonEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

//=========================================================================================
// Database
//=========================================================================================

/// Delegates to an in-memory database but refuses writes to one status.
pub struct FlakyDatabase {
    inner: Arc<InMemoryDatabase>,
    rejected: LessonStatus,
}

impl FlakyDatabase {
    pub fn rejecting(inner: Arc<InMemoryDatabase>, rejected: LessonStatus) -> Self {
        Self { inner, rejected }
    }
}

#[async_trait]
impl DatabaseService for FlakyDatabase {
    async fn create_lesson(&self, lesson: NewLesson) -> PortResult<Lesson> {
        self.inner.create_lesson(lesson).await
    }

    async fn get_lesson(&self, lesson_id: LessonId) -> PortResult<Lesson> {
        self.inner.get_lesson(lesson_id).await
    }

    async fn list_lessons(&self, device_id: Option<&str>) -> PortResult<Vec<Lesson>> {
        self.inner.list_lessons(device_id).await
    }

    async fn update_lesson(&self, lesson_id: LessonId, patch: LessonPatch) -> PortResult<Lesson> {
        if patch.status == Some(self.rejected) {
            return Err(PortError::Conflict(format!(
                "lesson {} was modified concurrently",
                lesson_id
            )));
        }
        self.inner.update_lesson(lesson_id, patch).await
    }

    async fn get_profile_by_device(&self, device_id: &str) -> PortResult<Option<UserProfile>> {
        self.inner.get_profile_by_device(device_id).await
    }

    async fn upsert_profile(&self, profile: UserProfile) -> PortResult<UserProfile> {
        self.inner.upsert_profile(profile).await
    }

    async fn get_progress(
        &self,
        lesson_id: LessonId,
        device_id: &str,
    ) -> PortResult<Option<LessonProgress>> {
        self.inner.get_progress(lesson_id, device_id).await
    }

    async fn save_progress(&self, progress: LessonProgress) -> PortResult<LessonProgress> {
        self.inner.save_progress(progress).await
    }

    async fn list_progress(&self, device_id: &str) -> PortResult<Vec<LessonProgress>> {
        self.inner.list_progress(device_id).await
    }
}
