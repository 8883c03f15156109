//! services/api/src/web/study.rs
//!
//! Q&A sessions, quizzes and free questions about a lesson.

use crate::web::{
    response::{bad_request, device_id, lesson_error, port_error, Envelope, HandlerError},
    state::AppState,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use lesson_core::domain::{LessonContent, LessonId, UserProfile};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StudyRequest {
    pub lesson_id: LessonId,
    /// Defaults to the stored lesson title.
    pub title: Option<String>,
    /// Defaults to the stored lesson content.
    #[schema(value_type = Option<Object>)]
    pub content: Option<LessonContent>,
}

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub lesson_id: LessonId,
    pub question: String,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct AskResponse {
    pub success: bool,
    pub answer: String,
}

/// The requesting device's profile, if it has one. Lookup failures are logged
/// and treated as "no profile".
async fn load_profile(app_state: &AppState, headers: &HeaderMap) -> Option<UserProfile> {
    let device = device_id(headers)?;
    match app_state.db.get_profile_by_device(&device).await {
        Ok(profile) => profile,
        Err(e) => {
            warn!(device_id = %device, error = %e, "Could not load learner profile");
            None
        }
    }
}

/// Resolves the title and content to study, falling back to the stored lesson.
async fn study_material(
    app_state: &AppState,
    req: StudyRequest,
) -> Result<(String, LessonContent), HandlerError> {
    if let (Some(title), Some(content)) = (req.title.clone(), req.content.clone()) {
        return Ok((title, content));
    }
    let lesson = app_state
        .db
        .get_lesson(req.lesson_id)
        .await
        .map_err(|e| port_error("Failed to load lesson", e))?;
    let content = req
        .content
        .or(lesson.content)
        .ok_or_else(|| bad_request("Lesson content is not available yet"))?;
    Ok((req.title.unwrap_or(lesson.title), content))
}

/// Generate a Q&A session of eight items for a lesson.
#[utoipa::path(
    post,
    path = "/api/v1/qa/generate",
    request_body = StudyRequest,
    responses(
        (status = 201, description = "Q&A session generated"),
        (status = 400, description = "Lesson has no content yet"),
        (status = 404, description = "Unknown lesson"),
        (status = 502, description = "The model did not produce a usable session")
    )
)]
pub async fn generate_qa_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<StudyRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let lesson_id = payload.lesson_id;
    let profile = load_profile(&app_state, &headers).await;
    let (title, content) = study_material(&app_state, payload).await?;

    let session = app_state
        .study
        .generate_qa_session(lesson_id, &title, &content, profile.as_ref())
        .await
        .map_err(|e| lesson_error("Failed to generate Q&A session", e))?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(session))))
}

/// Answer a learner's question from the lesson content.
#[utoipa::path(
    post,
    path = "/api/v1/qa/ask",
    request_body = AskRequest,
    responses(
        (status = 200, description = "The answer", body = AskResponse),
        (status = 400, description = "Empty question or lesson without content"),
        (status = 404, description = "Unknown lesson")
    )
)]
pub async fn ask_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<AskRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(bad_request("question is required"));
    }
    let profile = load_profile(&app_state, &headers).await;
    let lesson = app_state
        .db
        .get_lesson(payload.lesson_id)
        .await
        .map_err(|e| port_error("Failed to load lesson", e))?;
    let content = lesson
        .content
        .ok_or_else(|| bad_request("Lesson content is not available yet"))?;

    let answer = app_state
        .study
        .answer_question(question, &content, profile.as_ref())
        .await;
    Ok(Json(AskResponse {
        success: true,
        answer,
    }))
}

/// Generate a five-question multiple-choice quiz for a lesson.
#[utoipa::path(
    post,
    path = "/api/v1/quiz/generate",
    request_body = StudyRequest,
    responses(
        (status = 201, description = "Quiz generated"),
        (status = 400, description = "Lesson has no content yet"),
        (status = 404, description = "Unknown lesson"),
        (status = 502, description = "The model did not produce a usable quiz")
    )
)]
pub async fn generate_quiz_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<StudyRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let lesson_id = payload.lesson_id;
    let profile = load_profile(&app_state, &headers).await;
    let (title, content) = study_material(&app_state, payload).await?;

    let quiz = app_state
        .study
        .generate_quiz(lesson_id, &title, &content, profile.as_ref())
        .await
        .map_err(|e| lesson_error("Failed to generate quiz", e))?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(quiz))))
}
