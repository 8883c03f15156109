//! crates/lesson_core/src/jobs.rs
//!
//! Tracks detached generation work so that a lesson is never generated twice at
//! once and shutdown can wait for in-flight jobs.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::task::TaskTracker;
use tracing::{info, info_span, Instrument};

use crate::domain::LessonId;

#[derive(Clone, Default)]
pub struct BackgroundJobs {
    tracker: TaskTracker,
    active: Arc<Mutex<HashSet<LessonId>>>,
}

/// Exclusive right to generate one lesson. Released on drop.
#[derive(Debug)]
pub struct LessonClaim {
    lesson_id: LessonId,
    active: Arc<Mutex<HashSet<LessonId>>>,
}

impl LessonClaim {
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }
}

impl Drop for LessonClaim {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.lesson_id);
    }
}

fn lock(active: &Mutex<HashSet<LessonId>>) -> MutexGuard<'_, HashSet<LessonId>> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl BackgroundJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` when another job already holds the lesson.
    pub fn claim(&self, lesson_id: LessonId) -> Option<LessonClaim> {
        if !lock(&self.active).insert(lesson_id) {
            return None;
        }
        Some(LessonClaim {
            lesson_id,
            active: self.active.clone(),
        })
    }

    pub fn is_active(&self, lesson_id: LessonId) -> bool {
        lock(&self.active).contains(&lesson_id)
    }

    /// Runs `job` in the background inside a span naming the lesson and stage.
    pub fn spawn<F>(&self, lesson_id: LessonId, stage: &'static str, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let span = info_span!("lesson_job", lesson_id, stage);
        self.tracker.spawn(job.instrument(span));
    }

    /// Waits for every spawned job to finish. New jobs may be spawned afterwards.
    pub async fn drain(&self) {
        self.tracker.close();
        info!(pending = self.tracker.len(), "Waiting for background lesson jobs");
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn a_lesson_can_only_be_claimed_once() {
        let jobs = BackgroundJobs::new();
        let claim = jobs.claim(7).unwrap();
        assert!(jobs.claim(7).is_none());
        assert!(jobs.is_active(7));
        assert!(jobs.claim(8).is_some());

        drop(claim);
        assert!(!jobs.is_active(7));
        assert!(jobs.claim(7).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_spawned_jobs() {
        let jobs = BackgroundJobs::new();
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        let claim = jobs.claim(1).unwrap();

        jobs.spawn(1, "test", async move {
            let _claim = claim;
            tokio::time::sleep(Duration::from_secs(1)).await;
            flag.store(true, Ordering::SeqCst);
        });

        jobs.drain().await;
        assert!(done.load(Ordering::SeqCst));
        assert!(!jobs.is_active(1));
    }
}
