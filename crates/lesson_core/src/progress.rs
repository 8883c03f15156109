//! crates/lesson_core/src/progress.rs
//!
//! Lesson progress updates and the spaced-review schedule.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{LessonId, LessonProgress};

/// Days until the next review, indexed by how many reviews were already done.
pub const REVIEW_INTERVALS_DAYS: [i64; 4] = [2, 7, 14, 30];

/// A learner-reported position in a lesson.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub current_section_index: Option<u32>,
    pub current_subsection_index: Option<u32>,
    pub completed_sections: Option<Vec<u32>>,
    pub is_completed: Option<bool>,
}

pub fn next_review_interval(review_count: u32) -> Duration {
    let index = (review_count as usize).min(REVIEW_INTERVALS_DAYS.len() - 1);
    Duration::days(REVIEW_INTERVALS_DAYS[index])
}

/// Applies `update` on top of `existing` (or a fresh record) and advances the
/// review schedule. A fresh record is due for review in two days.
pub fn apply_update(
    existing: Option<LessonProgress>,
    lesson_id: LessonId,
    device_id: &str,
    update: ProgressUpdate,
    now: DateTime<Utc>,
) -> LessonProgress {
    let mut progress = match existing {
        Some(progress) => {
            let mut progress = progress;
            progress.next_review_at = Some(now + next_review_interval(progress.review_count));
            progress.review_count += 1;
            progress.last_reviewed_at = Some(now);
            progress
        }
        None => LessonProgress {
            lesson_id,
            device_id: device_id.to_string(),
            current_section_index: 0,
            current_subsection_index: 0,
            completed_sections: Vec::new(),
            is_completed: false,
            last_reviewed_at: Some(now),
            next_review_at: Some(now + next_review_interval(0)),
            review_count: 0,
            created_at: now,
            updated_at: now,
        },
    };

    if let Some(section) = update.current_section_index {
        progress.current_section_index = section;
    }
    if let Some(subsection) = update.current_subsection_index {
        progress.current_subsection_index = subsection;
    }
    if let Some(mut completed) = update.completed_sections {
        completed.sort_unstable();
        completed.dedup();
        progress.completed_sections = completed;
    }
    if let Some(done) = update.is_completed {
        progress.is_completed = done;
    }
    progress.updated_at = now;
    progress
}
