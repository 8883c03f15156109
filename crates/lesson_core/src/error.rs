//! crates/lesson_core/src/error.rs
//!
//! Errors raised by the core services.

use crate::domain::LessonId;
use crate::ports::PortError;

/// Why a single model call did not yield a usable answer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("Malformed model response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Port(#[from] PortError),
}

impl GenerationError {
    /// Parse failures and transient provider statuses are retried; nothing else is.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Malformed(_) => true,
            GenerationError::Port(e) => e.is_transient(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LessonError {
    /// The planner gave up, either after exhausting its attempts or on a
    /// non-retryable error.
    #[error("Generation failed after {attempts} attempt(s): {source}")]
    Generation {
        attempts: u32,
        source: GenerationError,
    },

    #[error("Speech synthesis failed: {0}")]
    Synthesis(PortError),

    #[error("Media storage failed: {0}")]
    Storage(PortError),

    #[error("Persistence error: {0}")]
    Persistence(PortError),

    #[error("Lesson {0} is already being generated")]
    AlreadyRunning(LessonId),
}
