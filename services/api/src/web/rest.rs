//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the lesson endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{
    audio, learners,
    response::{device_id, lesson_error, port_error, Envelope, HandlerError},
    state::AppState,
    study,
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use lesson_core::domain::{
    ContentSection, ContentSubsection, Lesson, LessonContent, LessonId, LessonImage,
    LessonStatus, NewLesson, PlanSummary, PlanSummaryEntry,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, OpenApi, ToSchema};

pub const TITLE_MIN_CHARS: usize = 3;
pub const TITLE_MAX_CHARS: usize = 200;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        create_lesson_handler,
        create_test_lesson_handler,
        list_lessons_handler,
        get_lesson_handler,
        learners::upsert_profile_handler,
        learners::get_profile_handler,
        learners::list_progress_handler,
        learners::get_progress_handler,
        learners::update_progress_handler,
        study::generate_qa_handler,
        study::ask_handler,
        study::generate_quiz_handler,
        audio::stream_audio_handler,
        audio::audio_url_handler,
    ),
    components(
        schemas(
            CreateLessonRequest,
            LessonResponse,
            learners::ProfileRequest,
            learners::ProfileResponse,
            learners::ProgressRequest,
            learners::ProgressResponse,
            study::StudyRequest,
            study::AskRequest,
            study::AskResponse,
            audio::AudioRequest,
            audio::AudioUrlResponse,
        )
    ),
    tags(
        (name = "Lessons API", description = "Progressive lesson generation, study aids and narration.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateLessonRequest {
    pub title: String,
    /// Used when the `X-Device-Id` header is absent.
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Deserialize, IntoParams, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ListLessonsQuery {
    pub device_id: Option<String>,
}

/// A lesson as returned to clients. `content` is the full lesson document once
/// the plan is ready.
#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LessonResponse {
    pub id: LessonId,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = String, example = "intro_ready")]
    pub status: LessonStatus,
    #[schema(value_type = Object)]
    pub plan: Option<PlanSummary>,
    #[schema(value_type = Object)]
    pub content: Option<LessonContent>,
    pub device_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Lesson> for LessonResponse {
    fn from(lesson: Lesson) -> Self {
        Self {
            id: lesson.id,
            title: lesson.title,
            description: lesson.description,
            status: lesson.status,
            plan: lesson.plan,
            content: lesson.content,
            device_id: lesson.device_id,
            created_at: lesson.created_at,
            updated_at: lesson.updated_at,
        }
    }
}

fn validate_title(title: &str) -> Result<String, HandlerError> {
    let title = title.trim();
    let chars = title.chars().count();
    if !(TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&chars) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "title must be between {} and {} characters",
                TITLE_MIN_CHARS, TITLE_MAX_CHARS
            ),
        ));
    }
    Ok(title.to_string())
}

/// Fixed content used to exercise clients without calling any provider.
pub fn sample_content(title: &str) -> LessonContent {
    LessonContent {
        title: title.to_string(),
        description: format!("Cours complet sur {}", title),
        sections: vec![ContentSection {
            id: uuid::Uuid::new_v4().to_string(),
            title: "Introduction".to_string(),
            check_understanding: false,
            subsections: vec![ContentSubsection {
                title: format!("Qu'est-ce que {} ?", title),
                content: "Explication détaillée du concept...".to_string(),
                image_query: title.to_lowercase(),
                image: Some(LessonImage {
                    url: "https://upload.wikimedia.org/wikipedia/commons/thumb/6/6f/Earth_Eastern_Hemisphere.jpg/256px-Earth_Eastern_Hemisphere.jpg".to_string(),
                    title: "Image d'exemple".to_string(),
                    description: Some("Description de l'image".to_string()),
                }),
            }],
        }],
        conclusion: "En conclusion, nous avons appris...".to_string(),
        audio_files: Default::default(),
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Create a lesson and start generating it in the background.
///
/// Progress is pushed over `/ws`; the lesson becomes usable at `intro_ready`.
#[utoipa::path(
    post,
    path = "/api/v1/lessons",
    request_body = CreateLessonRequest,
    responses(
        (status = 201, description = "Lesson created, generation started", body = LessonResponse),
        (status = 400, description = "Invalid title"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("x-device-id" = Option<String>, Header, description = "The learner's device.")
    )
)]
pub async fn create_lesson_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateLessonRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let title = validate_title(&payload.title)?;
    let device = device_id(&headers).or(payload.device_id);

    let lesson = app_state
        .orchestrator
        .create_lesson(&title, device)
        .await
        .map_err(|e| lesson_error("Failed to create lesson", e))?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message(
            LessonResponse::from(lesson),
            "Lesson created, generation in progress",
        )),
    ))
}

/// Create a `ready` lesson with fixed sample content.
#[utoipa::path(
    post,
    path = "/api/v1/lessons/test",
    request_body = CreateLessonRequest,
    responses(
        (status = 201, description = "Sample lesson created", body = LessonResponse),
        (status = 400, description = "Invalid title")
    )
)]
pub async fn create_test_lesson_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateLessonRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let title = validate_title(&payload.title)?;
    let content = sample_content(&title);

    let lesson = app_state
        .db
        .create_lesson(NewLesson {
            title,
            description: Some(content.description.clone()),
            status: LessonStatus::Ready,
            plan: Some(PlanSummary {
                sections: content
                    .sections
                    .iter()
                    .map(|s| PlanSummaryEntry {
                        title: s.title.clone(),
                    })
                    .collect(),
            }),
            content: Some(content),
            device_id: device_id(&headers).or(payload.device_id),
        })
        .await
        .map_err(|e| port_error("Failed to create sample lesson", e))?;

    info!(lesson_id = lesson.id, "Sample lesson created");
    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message(
            LessonResponse::from(lesson),
            "Sample lesson created",
        )),
    ))
}

/// List lessons, newest first, optionally for one device.
#[utoipa::path(
    get,
    path = "/api/v1/lessons",
    params(
        ListLessonsQuery,
        ("x-device-id" = Option<String>, Header, description = "Takes precedence over the query.")
    ),
    responses(
        (status = 200, description = "Lessons", body = [LessonResponse])
    )
)]
pub async fn list_lessons_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListLessonsQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let device = device_id(&headers).or(query.device_id);
    let lessons = app_state
        .db
        .list_lessons(device.as_deref())
        .await
        .map_err(|e| port_error("Failed to list lessons", e))?;

    let lessons: Vec<LessonResponse> = lessons.into_iter().map(LessonResponse::from).collect();
    Ok(Json(Envelope::ok(lessons)))
}

/// Fetch one lesson with whatever content has been generated so far.
#[utoipa::path(
    get,
    path = "/api/v1/lessons/{id}",
    params(("id" = i64, Path, description = "Lesson id")),
    responses(
        (status = 200, description = "The lesson", body = LessonResponse),
        (status = 404, description = "Unknown lesson")
    )
)]
pub async fn get_lesson_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<LessonId>,
) -> Result<impl IntoResponse, HandlerError> {
    let lesson = app_state
        .db
        .get_lesson(id)
        .await
        .map_err(|e| port_error("Failed to load lesson", e))?;
    Ok(Json(Envelope::ok(LessonResponse::from(lesson))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_are_trimmed_and_bounded() {
        assert_eq!(validate_title("  Volcans ").unwrap(), "Volcans");
        assert!(validate_title("ab").is_err());
        assert!(validate_title(&"é".repeat(200)).is_ok());
        assert!(validate_title(&"x".repeat(201)).is_err());
    }

    #[test]
    fn sample_content_is_complete() {
        let content = sample_content("La Terre");
        assert_eq!(content.description, "Cours complet sur La Terre");
        assert_eq!(content.image_count(), 1);
        assert_eq!(content.sections[0].subsections[0].image_query, "la terre");
    }
}
