//! crates/lesson_core/src/memory.rs
//!
//! A process-local `DatabaseService`, used when no database URL is configured
//! and throughout the tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::{
    Lesson, LessonId, LessonPatch, LessonProgress, LessonStatus, NewLesson, UserProfile,
};
use crate::ports::{DatabaseService, PortError, PortResult};

#[derive(Default)]
struct Tables {
    next_lesson_id: LessonId,
    lessons: HashMap<LessonId, Lesson>,
    status_history: HashMap<LessonId, Vec<LessonStatus>>,
    profiles: HashMap<String, UserProfile>,
    progress: HashMap<(LessonId, String), LessonProgress>,
}

#[derive(Default)]
pub struct InMemoryDatabase {
    tables: RwLock<Tables>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every status the lesson has been written with, oldest first.
    pub async fn status_history(&self, lesson_id: LessonId) -> Vec<LessonStatus> {
        self.tables
            .read()
            .await
            .status_history
            .get(&lesson_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DatabaseService for InMemoryDatabase {
    async fn create_lesson(&self, new: NewLesson) -> PortResult<Lesson> {
        let mut tables = self.tables.write().await;
        tables.next_lesson_id += 1;
        let now = Utc::now();
        let lesson = Lesson {
            id: tables.next_lesson_id,
            title: new.title,
            description: new.description,
            status: new.status,
            plan: new.plan,
            content: new.content,
            device_id: new.device_id,
            created_at: now,
            updated_at: now,
        };
        tables.status_history.insert(lesson.id, vec![lesson.status]);
        tables.lessons.insert(lesson.id, lesson.clone());
        Ok(lesson)
    }

    async fn get_lesson(&self, lesson_id: LessonId) -> PortResult<Lesson> {
        self.tables
            .read()
            .await
            .lessons
            .get(&lesson_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Lesson {} not found", lesson_id)))
    }

    async fn list_lessons(&self, device_id: Option<&str>) -> PortResult<Vec<Lesson>> {
        let tables = self.tables.read().await;
        let mut lessons: Vec<Lesson> = tables
            .lessons
            .values()
            .filter(|l| device_id.map_or(true, |d| l.device_id.as_deref() == Some(d)))
            .cloned()
            .collect();
        lessons.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(lessons)
    }

    async fn update_lesson(&self, lesson_id: LessonId, patch: LessonPatch) -> PortResult<Lesson> {
        let mut tables = self.tables.write().await;
        let lesson = tables
            .lessons
            .get_mut(&lesson_id)
            .ok_or_else(|| PortError::NotFound(format!("Lesson {} not found", lesson_id)))?;

        if let Some(description) = patch.description {
            lesson.description = Some(description);
        }
        if let Some(plan) = patch.plan {
            lesson.plan = Some(plan);
        }
        if let Some(content) = patch.content {
            lesson.content = Some(content);
        }
        if let Some(status) = patch.status {
            lesson.status = status;
        }
        lesson.updated_at = Utc::now();
        let updated = lesson.clone();

        if let Some(status) = patch.status {
            tables.status_history.entry(lesson_id).or_default().push(status);
        }
        Ok(updated)
    }

    async fn get_profile_by_device(&self, device_id: &str) -> PortResult<Option<UserProfile>> {
        Ok(self.tables.read().await.profiles.get(device_id).cloned())
    }

    async fn upsert_profile(&self, mut profile: UserProfile) -> PortResult<UserProfile> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.profiles.get(&profile.device_id) {
            profile.created_at = existing.created_at;
        }
        profile.updated_at = Utc::now();
        tables
            .profiles
            .insert(profile.device_id.clone(), profile.clone());
        Ok(profile)
    }

    async fn get_progress(
        &self,
        lesson_id: LessonId,
        device_id: &str,
    ) -> PortResult<Option<LessonProgress>> {
        Ok(self
            .tables
            .read()
            .await
            .progress
            .get(&(lesson_id, device_id.to_string()))
            .cloned())
    }

    async fn save_progress(&self, progress: LessonProgress) -> PortResult<LessonProgress> {
        let mut tables = self.tables.write().await;
        if !tables.lessons.contains_key(&progress.lesson_id) {
            return Err(PortError::NotFound(format!(
                "Lesson {} not found",
                progress.lesson_id
            )));
        }
        tables.progress.insert(
            (progress.lesson_id, progress.device_id.clone()),
            progress.clone(),
        );
        Ok(progress)
    }

    async fn list_progress(&self, device_id: &str) -> PortResult<Vec<LessonProgress>> {
        let tables = self.tables.read().await;
        let mut entries: Vec<LessonProgress> = tables
            .progress
            .values()
            .filter(|p| p.device_id == device_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProfileType;

    #[tokio::test]
    async fn patches_only_touch_the_given_fields() {
        let db = InMemoryDatabase::new();
        let lesson = db
            .create_lesson(NewLesson::draft("Tides", Some("d1".to_string())))
            .await
            .unwrap();

        db.update_lesson(
            lesson.id,
            LessonPatch {
                description: Some("Moon and sea".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let updated = db
            .update_lesson(lesson.id, LessonPatch::status(LessonStatus::Processing))
            .await
            .unwrap();

        assert_eq!(updated.description.as_deref(), Some("Moon and sea"));
        assert_eq!(updated.status, LessonStatus::Processing);
        assert_eq!(
            db.status_history(lesson.id).await,
            vec![LessonStatus::Draft, LessonStatus::Processing]
        );
    }

    #[tokio::test]
    async fn lessons_are_filtered_by_device() {
        let db = InMemoryDatabase::new();
        db.create_lesson(NewLesson::draft("A", Some("d1".to_string()))).await.unwrap();
        db.create_lesson(NewLesson::draft("B", Some("d2".to_string()))).await.unwrap();
        db.create_lesson(NewLesson::draft("C", None)).await.unwrap();

        assert_eq!(db.list_lessons(None).await.unwrap().len(), 3);
        let mine = db.list_lessons(Some("d1")).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "A");
    }

    #[tokio::test]
    async fn missing_lesson_is_not_found() {
        let db = InMemoryDatabase::new();
        assert!(matches!(db.get_lesson(42).await, Err(PortError::NotFound(_))));
        assert!(matches!(
            db.update_lesson(42, LessonPatch::default()).await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn upsert_keeps_the_creation_date() {
        let db = InMemoryDatabase::new();
        let first = db
            .upsert_profile(UserProfile::new("d1", ProfileType::Pupil))
            .await
            .unwrap();
        let mut changed = UserProfile::new("d1", ProfileType::Student);
        changed.specialty = Some("Physics".to_string());
        let second = db.upsert_profile(changed).await.unwrap();

        assert_eq!(second.created_at, first.created_at);
        let stored = db.get_profile_by_device("d1").await.unwrap().unwrap();
        assert_eq!(stored.profile_type, ProfileType::Student);
    }
}
