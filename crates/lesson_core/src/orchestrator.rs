//! crates/lesson_core/src/orchestrator.rs
//!
//! Drives progressive lesson generation.
//!
//! A lesson moves `draft → processing → plan_ready → intro_ready → ready`. The
//! first two stages run in the job that owns the lesson and leave the lesson
//! usable (plan, first images and the spoken introduction). The third stage is
//! detached and fills in the remaining images and audio. Every write re-reads
//! the stored content first and merges into it, so nothing written by an
//! earlier stage is lost.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::{
    AudioSlot, Lesson, LessonContent, LessonEvent, LessonId, LessonImage, LessonPatch, LessonPlan,
    LessonStatus, NewLesson, PlanSummary, UserProfile,
};
use crate::error::LessonError;
use crate::jobs::{BackgroundJobs, LessonClaim};
use crate::media::MediaResolver;
use crate::planner::ContentPlanner;
use crate::ports::{DatabaseService, ProgressPublisher};
use crate::speech::SpeechSynthesizer;
use crate::store::MediaStore;

pub struct LessonOrchestrator {
    db: Arc<dyn DatabaseService>,
    planner: ContentPlanner,
    resolver: MediaResolver,
    speech: SpeechSynthesizer,
    store: MediaStore,
    publisher: Arc<dyn ProgressPublisher>,
    jobs: BackgroundJobs,
}

impl LessonOrchestrator {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        planner: ContentPlanner,
        resolver: MediaResolver,
        speech: SpeechSynthesizer,
        store: MediaStore,
        publisher: Arc<dyn ProgressPublisher>,
        jobs: BackgroundJobs,
    ) -> Self {
        Self {
            db,
            planner,
            resolver,
            speech,
            store,
            publisher,
            jobs,
        }
    }

    pub fn jobs(&self) -> &BackgroundJobs {
        &self.jobs
    }

    //=========================================================================================
    // Entry Points
    //=========================================================================================

    /// Creates a lesson record and starts generating it in the background.
    ///
    /// The returned lesson is in `processing`. Generation failures are never
    /// returned here; they surface as error events and as the stored status.
    pub async fn create_lesson(
        self: &Arc<Self>,
        title: &str,
        device_id: Option<String>,
    ) -> Result<Lesson, LessonError> {
        let lesson = self
            .db
            .create_lesson(NewLesson::draft(title, device_id.clone()))
            .await
            .map_err(LessonError::Persistence)?;

        let profile = match device_id.as_deref() {
            Some(device_id) => match self.db.get_profile_by_device(device_id).await {
                Ok(profile) => profile,
                Err(e) => {
                    warn!(device_id, error = %e, "Could not load learner profile");
                    None
                }
            },
            None => None,
        };

        info!(lesson_id = lesson.id, title, has_profile = profile.is_some(), "Lesson created");
        self.start_generation(lesson.id, lesson.title.clone(), profile).await
    }

    /// Claims the lesson, marks it `processing` and runs the whole pipeline as a
    /// background job.
    pub async fn start_generation(
        self: &Arc<Self>,
        lesson_id: LessonId,
        title: String,
        profile: Option<UserProfile>,
    ) -> Result<Lesson, LessonError> {
        let claim = self
            .jobs
            .claim(lesson_id)
            .ok_or(LessonError::AlreadyRunning(lesson_id))?;
        let lesson = self.mark_processing(lesson_id).await?;

        let this = Arc::clone(self);
        self.jobs.spawn(lesson_id, "initial", async move {
            // The error has already been reported through the publisher.
            let _ = this.run_initial_stages(claim, &title, profile.as_ref()).await;
        });
        Ok(lesson)
    }

    /// Runs the first two stages to completion and detaches the third.
    /// Returns once the lesson is `intro_ready`, or with the error that rolled
    /// it back to `draft`.
    pub async fn generate(
        self: &Arc<Self>,
        lesson_id: LessonId,
        title: &str,
        profile: Option<&UserProfile>,
    ) -> Result<(), LessonError> {
        let claim = self
            .jobs
            .claim(lesson_id)
            .ok_or(LessonError::AlreadyRunning(lesson_id))?;
        self.mark_processing(lesson_id).await?;
        self.run_initial_stages(claim, title, profile).await
    }

    async fn mark_processing(&self, lesson_id: LessonId) -> Result<Lesson, LessonError> {
        self.db
            .update_lesson(lesson_id, LessonPatch::status(LessonStatus::Processing))
            .await
            .map_err(LessonError::Persistence)
    }

    async fn run_initial_stages(
        self: &Arc<Self>,
        claim: LessonClaim,
        title: &str,
        profile: Option<&UserProfile>,
    ) -> Result<(), LessonError> {
        let lesson_id = claim.lesson_id();
        match self.plan_and_introduce(lesson_id, title, profile).await {
            Ok(plan) => {
                self.spawn_remaining(claim, plan);
                Ok(())
            }
            Err(e) => {
                error!(lesson_id, error = %e, "Lesson generation failed, reverting to draft");
                if let Err(db_err) = self
                    .db
                    .update_lesson(lesson_id, LessonPatch::status(LessonStatus::Draft))
                    .await
                {
                    error!(lesson_id, error = %db_err, "Failed to revert lesson status");
                }
                self.publisher
                    .publish(LessonEvent::error(lesson_id, e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    fn spawn_remaining(self: &Arc<Self>, claim: LessonClaim, plan: LessonPlan) {
        let lesson_id = claim.lesson_id();
        let this = Arc::clone(self);
        self.jobs.spawn(lesson_id, "remaining", async move {
            let _claim = claim;
            match this.complete_lesson(lesson_id, &plan).await {
                Ok(content) => info!(
                    lesson_id,
                    images = content.image_count(),
                    audio = content.audio_files.len(),
                    "Lesson fully generated"
                ),
                Err(e) => {
                    error!(lesson_id, error = %e, "Background generation failed");
                    this.publisher
                        .publish(LessonEvent::error(lesson_id, e.to_string()))
                        .await;
                }
            }
        });
    }

    //=========================================================================================
    // Stages
    //=========================================================================================

    /// `processing → plan_ready → intro_ready`.
    async fn plan_and_introduce(
        &self,
        lesson_id: LessonId,
        title: &str,
        profile: Option<&UserProfile>,
    ) -> Result<LessonPlan, LessonError> {
        self.progress(lesson_id, 10, "Generating lesson plan").await;

        let mut plan = self.planner.generate_plan(title, profile).await?;
        plan.assign_section_ids();

        let first_queries: Vec<String> = match plan.sections.first() {
            Some(section) => section
                .subsections
                .iter()
                .map(|sub| sub.image_query.clone())
                .collect(),
            None => {
                warn!(lesson_id, "Lesson plan has no sections");
                Vec::new()
            }
        };
        let first_images = self.resolver.resolve_many(&first_queries).await;
        info!(
            lesson_id,
            found = first_images.iter().filter(|i| i.is_some()).count(),
            requested = first_images.len(),
            "First section images resolved"
        );

        let content = LessonContent::from_plan(&plan, |i, j| {
            if i == 0 {
                first_images.get(j).cloned().flatten()
            } else {
                None
            }
        });
        self.db
            .update_lesson(
                lesson_id,
                LessonPatch {
                    description: Some(plan.description.clone()),
                    plan: Some(PlanSummary::from(&plan)),
                    content: Some(content.clone()),
                    status: Some(LessonStatus::PlanReady),
                },
            )
            .await
            .map_err(LessonError::Persistence)?;
        self.progress(lesson_id, 30, "Plan ready, generating the introduction")
            .await;

        let intro_text = self.speech.intro_text(&plan.title, &plan.description);
        let intro_url = self
            .speech
            .synthesize_to_url(&intro_text, lesson_id, AudioSlot::Intro)
            .await?;

        let mut latest = self.current_content(lesson_id).await?.unwrap_or(content);
        latest.audio_files.insert(AudioSlot::Intro.key(), intro_url);
        self.db
            .update_lesson(lesson_id, LessonPatch::content(latest, LessonStatus::IntroReady))
            .await
            .map_err(LessonError::Persistence)?;
        self.progress(lesson_id, 50, "Introduction ready, you can start")
            .await;

        Ok(plan)
    }

    /// `intro_ready → ready`: remaining images, optimization and the rest of the audio.
    async fn complete_lesson(
        &self,
        lesson_id: LessonId,
        plan: &LessonPlan,
    ) -> Result<LessonContent, LessonError> {
        self.progress(lesson_id, 60, "Resolving images").await;

        let mut positions = Vec::new();
        let mut queries = Vec::new();
        for (i, section) in plan.sections.iter().enumerate().skip(1) {
            for (j, sub) in section.subsections.iter().enumerate() {
                positions.push((i, j));
                queries.push(sub.image_query.clone());
            }
        }
        let resolved = self.resolver.resolve_many(&queries).await;

        self.progress(lesson_id, 70, "Optimizing images").await;
        let found: Vec<((usize, usize), LessonImage)> = positions
            .into_iter()
            .zip(resolved)
            .filter_map(|(position, image)| image.map(|image| (position, image)))
            .collect();
        let originals: Vec<LessonImage> = found.iter().map(|(_, image)| image.clone()).collect();
        let optimized = self.store.optimize_many(&originals).await;

        let mut images: HashMap<(usize, usize), LessonImage> = found
            .into_iter()
            .zip(optimized)
            .map(|((position, mut image), stored)| {
                if let Some(stored) = stored {
                    image.url = stored.url;
                }
                (position, image)
            })
            .collect();
        info!(lesson_id, images = images.len(), "Remaining images attached");

        let mut content = LessonContent::from_plan(plan, |i, j| images.remove(&(i, j)));
        if let Some(current) = self.current_content(lesson_id).await? {
            content.merge_from(&current);
        }

        self.progress(lesson_id, 80, "Generating section audio").await;
        let pending: Vec<_> = self
            .speech
            .audio_tasks(&content)
            .into_iter()
            .filter(|task| !content.audio_files.contains_key(&task.slot.key()))
            .collect();
        let audio = self.speech.synthesize_tasks(lesson_id, pending).await;
        content.audio_files.extend(audio);

        if let Some(latest) = self.current_content(lesson_id).await? {
            content.merge_from(&latest);
        }
        self.db
            .update_lesson(lesson_id, LessonPatch::content(content.clone(), LessonStatus::Ready))
            .await
            .map_err(LessonError::Persistence)?;

        self.publisher
            .publish(LessonEvent::ready(lesson_id, content.clone()))
            .await;
        Ok(content)
    }

    //=========================================================================================
    // Helpers
    //=========================================================================================

    async fn current_content(&self, lesson_id: LessonId) -> Result<Option<LessonContent>, LessonError> {
        let lesson = self
            .db
            .get_lesson(lesson_id)
            .await
            .map_err(LessonError::Persistence)?;
        Ok(lesson.content)
    }

    async fn progress(&self, lesson_id: LessonId, percent: u8, message: &str) {
        info!(lesson_id, percent, "{}", message);
        self.publisher
            .publish(LessonEvent::progress(lesson_id, percent, message))
            .await;
    }
}
