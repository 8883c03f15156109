//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and how the core services are
//! assembled from the configured adapters.

use crate::adapters::BroadcastPublisher;
use crate::config::Config;
use lesson_core::domain::VoiceOptions;
use lesson_core::ports::{
    DatabaseService, ImageLookupService, MediaStorageService, TextGenerationService,
    TextToSpeechService,
};
use lesson_core::{
    BackgroundJobs, ContentPlanner, LessonOrchestrator, MediaResolver, MediaStore, Narration,
    RetryPolicy, SpeechSynthesizer, StudyAssistant,
};
use std::sync::Arc;

/// The outbound adapters the core services run on.
pub struct Providers {
    /// Writes lesson plans.
    pub planner_llm: Arc<dyn TextGenerationService>,
    /// Writes Q&A sessions, quizzes and answers.
    pub study_llm: Arc<dyn TextGenerationService>,
    pub lookup: Arc<dyn ImageLookupService>,
    pub tts: Arc<dyn TextToSpeechService>,
    pub storage: Arc<dyn MediaStorageService>,
}

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub orchestrator: Arc<LessonOrchestrator>,
    pub study: Arc<StudyAssistant>,
    pub speech: SpeechSynthesizer,
    pub events: BroadcastPublisher,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        db: Arc<dyn DatabaseService>,
        providers: Providers,
        events: BroadcastPublisher,
    ) -> Self {
        let retry = RetryPolicy::default().with_max_attempts(config.planner_max_attempts);
        let store = MediaStore::new(providers.storage);
        let speech = SpeechSynthesizer::new(
            providers.tts,
            store.clone(),
            VoiceOptions::default(),
            Narration::default(),
            config.audio_batch_size,
        );

        let orchestrator = LessonOrchestrator::new(
            db.clone(),
            ContentPlanner::new(providers.planner_llm, retry.clone()),
            MediaResolver::new(providers.lookup),
            speech.clone(),
            store,
            Arc::new(events.clone()),
            BackgroundJobs::new(),
        );

        Self {
            db,
            config,
            orchestrator: Arc::new(orchestrator),
            study: Arc::new(StudyAssistant::new(providers.study_llm, retry)),
            speech,
            events,
        }
    }
}
