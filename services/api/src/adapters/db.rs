//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! The plan summary and the lesson content document are stored as JSONB.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lesson_core::domain::{
    Lesson, LessonContent, LessonId, LessonPatch, LessonProgress, LessonStatus, NewLesson,
    PlanSummary, ProfileType, UserProfile,
};
use lesson_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

const LESSON_COLUMNS: &str =
    "id, title, description, status, plan, content, device_id, created_at, updated_at";
const PROFILE_COLUMNS: &str = "device_id, profile_type, name, education_level, specialty, country, \
     institution_name, series, study_year, created_at, updated_at";
const PROGRESS_COLUMNS: &str = "lesson_id, device_id, current_section_index, current_subsection_index, \
     completed_sections, is_completed, last_reviewed_at, next_review_at, review_count, created_at, updated_at";

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct LessonRecord {
    id: i64,
    title: String,
    description: Option<String>,
    status: String,
    plan: Option<Json<PlanSummary>>,
    content: Option<Json<LessonContent>>,
    device_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl LessonRecord {
    fn to_domain(self) -> PortResult<Lesson> {
        let status = self
            .status
            .parse::<LessonStatus>()
            .map_err(PortError::Unexpected)?;
        Ok(Lesson {
            id: self.id,
            title: self.title,
            description: self.description,
            status,
            plan: self.plan.map(|Json(plan)| plan),
            content: self.content.map(|Json(content)| content),
            device_id: self.device_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ProfileRecord {
    device_id: String,
    profile_type: String,
    name: Option<String>,
    education_level: Option<String>,
    specialty: Option<String>,
    country: Option<String>,
    institution_name: Option<String>,
    series: Option<String>,
    study_year: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ProfileRecord {
    fn to_domain(self) -> UserProfile {
        UserProfile {
            device_id: self.device_id,
            profile_type: ProfileType::from(self.profile_type.as_str()),
            name: self.name,
            education_level: self.education_level,
            specialty: self.specialty,
            country: self.country,
            institution_name: self.institution_name,
            series: self.series,
            study_year: self.study_year,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ProgressRecord {
    lesson_id: i64,
    device_id: String,
    current_section_index: i32,
    current_subsection_index: i32,
    completed_sections: Json<Vec<u32>>,
    is_completed: bool,
    last_reviewed_at: Option<DateTime<Utc>>,
    next_review_at: Option<DateTime<Utc>>,
    review_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ProgressRecord {
    fn to_domain(self) -> LessonProgress {
        LessonProgress {
            lesson_id: self.lesson_id,
            device_id: self.device_id,
            current_section_index: self.current_section_index.max(0) as u32,
            current_subsection_index: self.current_subsection_index.max(0) as u32,
            completed_sections: self.completed_sections.0,
            is_completed: self.is_completed,
            last_reviewed_at: self.last_reviewed_at,
            next_review_at: self.next_review_at,
            review_count: self.review_count.max(0) as u32,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_lesson(&self, lesson: NewLesson) -> PortResult<Lesson> {
        let record = sqlx::query_as::<_, LessonRecord>(&format!(
            "INSERT INTO lessons (title, description, status, plan, content, device_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            LESSON_COLUMNS
        ))
        .bind(&lesson.title)
        .bind(&lesson.description)
        .bind(lesson.status.as_str())
        .bind(lesson.plan.map(Json))
        .bind(lesson.content.map(Json))
        .bind(&lesson.device_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn get_lesson(&self, lesson_id: LessonId) -> PortResult<Lesson> {
        let record = sqlx::query_as::<_, LessonRecord>(&format!(
            "SELECT {} FROM lessons WHERE id = $1",
            LESSON_COLUMNS
        ))
        .bind(lesson_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Lesson {} not found", lesson_id)),
            _ => PortError::Unexpected(e.to_string()),
        })?;
        record.to_domain()
    }

    async fn list_lessons(&self, device_id: Option<&str>) -> PortResult<Vec<Lesson>> {
        let records = sqlx::query_as::<_, LessonRecord>(&format!(
            "SELECT {} FROM lessons WHERE ($1::TEXT IS NULL OR device_id = $1) \
             ORDER BY created_at DESC, id DESC",
            LESSON_COLUMNS
        ))
        .bind(device_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(LessonRecord::to_domain).collect()
    }

    async fn update_lesson(&self, lesson_id: LessonId, patch: LessonPatch) -> PortResult<Lesson> {
        let record = sqlx::query_as::<_, LessonRecord>(&format!(
            "UPDATE lessons SET \
                description = COALESCE($2, description), \
                plan = COALESCE($3, plan), \
                content = COALESCE($4, content), \
                status = COALESCE($5, status), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            LESSON_COLUMNS
        ))
        .bind(lesson_id)
        .bind(patch.description)
        .bind(patch.plan.map(Json))
        .bind(patch.content.map(Json))
        .bind(patch.status.map(|s| s.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Lesson {} not found", lesson_id)),
            _ => PortError::Unexpected(e.to_string()),
        })?;
        record.to_domain()
    }

    async fn get_profile_by_device(&self, device_id: &str) -> PortResult<Option<UserProfile>> {
        let record = sqlx::query_as::<_, ProfileRecord>(&format!(
            "SELECT {} FROM user_profiles WHERE device_id = $1",
            PROFILE_COLUMNS
        ))
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(ProfileRecord::to_domain))
    }

    async fn upsert_profile(&self, profile: UserProfile) -> PortResult<UserProfile> {
        let record = sqlx::query_as::<_, ProfileRecord>(&format!(
            "INSERT INTO user_profiles (device_id, profile_type, name, education_level, specialty, \
                country, institution_name, series, study_year) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (device_id) DO UPDATE SET \
                profile_type = EXCLUDED.profile_type, name = EXCLUDED.name, \
                education_level = EXCLUDED.education_level, specialty = EXCLUDED.specialty, \
                country = EXCLUDED.country, institution_name = EXCLUDED.institution_name, \
                series = EXCLUDED.series, study_year = EXCLUDED.study_year, updated_at = NOW() \
             RETURNING {}",
            PROFILE_COLUMNS
        ))
        .bind(&profile.device_id)
        .bind(profile.profile_type.as_str())
        .bind(&profile.name)
        .bind(&profile.education_level)
        .bind(&profile.specialty)
        .bind(&profile.country)
        .bind(&profile.institution_name)
        .bind(&profile.series)
        .bind(&profile.study_year)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_progress(
        &self,
        lesson_id: LessonId,
        device_id: &str,
    ) -> PortResult<Option<LessonProgress>> {
        let record = sqlx::query_as::<_, ProgressRecord>(&format!(
            "SELECT {} FROM lesson_progress WHERE lesson_id = $1 AND device_id = $2",
            PROGRESS_COLUMNS
        ))
        .bind(lesson_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(ProgressRecord::to_domain))
    }

    async fn save_progress(&self, progress: LessonProgress) -> PortResult<LessonProgress> {
        let record = sqlx::query_as::<_, ProgressRecord>(&format!(
            "INSERT INTO lesson_progress (lesson_id, device_id, current_section_index, \
                current_subsection_index, completed_sections, is_completed, last_reviewed_at, \
                next_review_at, review_count, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (lesson_id, device_id) DO UPDATE SET \
                current_section_index = EXCLUDED.current_section_index, \
                current_subsection_index = EXCLUDED.current_subsection_index, \
                completed_sections = EXCLUDED.completed_sections, \
                is_completed = EXCLUDED.is_completed, \
                last_reviewed_at = EXCLUDED.last_reviewed_at, \
                next_review_at = EXCLUDED.next_review_at, \
                review_count = EXCLUDED.review_count, \
                updated_at = EXCLUDED.updated_at \
             RETURNING {}",
            PROGRESS_COLUMNS
        ))
        .bind(progress.lesson_id)
        .bind(&progress.device_id)
        .bind(progress.current_section_index as i32)
        .bind(progress.current_subsection_index as i32)
        .bind(Json(&progress.completed_sections))
        .bind(progress.is_completed)
        .bind(progress.last_reviewed_at)
        .bind(progress.next_review_at)
        .bind(progress.review_count as i32)
        .bind(progress.created_at)
        .bind(progress.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                PortError::NotFound(format!("Lesson {} not found", progress.lesson_id))
            }
            _ => PortError::Unexpected(e.to_string()),
        })?;
        Ok(record.to_domain())
    }

    async fn list_progress(&self, device_id: &str) -> PortResult<Vec<LessonProgress>> {
        let records = sqlx::query_as::<_, ProgressRecord>(&format!(
            "SELECT {} FROM lesson_progress WHERE device_id = $1 ORDER BY updated_at DESC",
            PROGRESS_COLUMNS
        ))
        .bind(device_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(ProgressRecord::to_domain).collect())
    }
}
