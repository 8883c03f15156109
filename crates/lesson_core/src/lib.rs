pub mod domain;
pub mod error;
pub mod jobs;
pub mod media;
pub mod memory;
pub mod orchestrator;
pub mod planner;
pub mod ports;
pub mod progress;
pub mod repair;
pub mod retry;
pub mod speech;
pub mod store;
pub mod study;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use domain::{
    AudioFiles, AudioSlot, Lesson, LessonContent, LessonEvent, LessonId, LessonPlan,
    LessonProgress, LessonStatus, UserProfile,
};
pub use error::{GenerationError, LessonError};
pub use jobs::BackgroundJobs;
pub use media::MediaResolver;
pub use orchestrator::LessonOrchestrator;
pub use planner::ContentPlanner;
pub use ports::{
    DatabaseService, ImageLookupService, MediaStorageService, PortError, PortResult,
    ProgressPublisher, TextGenerationService, TextToSpeechService,
};
pub use retry::RetryPolicy;
pub use speech::{Narration, SpeechSynthesizer};
pub use store::MediaStore;
pub use study::StudyAssistant;
