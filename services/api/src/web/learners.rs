//! services/api/src/web/learners.rs
//!
//! Learner profiles and per-lesson progress, both keyed by device id.

use crate::web::{
    response::{bad_request, device_id, port_error, require_device_id, Envelope, HandlerError},
    state::AppState,
};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use lesson_core::domain::{LessonId, LessonProgress, ProfileType, UserProfile};
use lesson_core::progress::{apply_update, ProgressUpdate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

//=========================================================================================
// Profiles
//=========================================================================================

/// Absent fields keep their stored value when the profile already exists.
#[derive(Deserialize, ToSchema, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    /// Used when the `X-Device-Id` header is absent.
    pub device_id: Option<String>,
    /// `pupil`, `student`, `professional` or the French labels.
    pub profile_type: Option<String>,
    pub name: Option<String>,
    pub education_level: Option<String>,
    pub specialty: Option<String>,
    pub country: Option<String>,
    pub institution_name: Option<String>,
    pub series: Option<String>,
    pub study_year: Option<String>,
}

#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub device_id: String,
    pub profile_type: String,
    pub name: Option<String>,
    pub education_level: Option<String>,
    pub specialty: Option<String>,
    pub country: Option<String>,
    pub institution_name: Option<String>,
    pub series: Option<String>,
    pub study_year: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserProfile> for ProfileResponse {
    fn from(p: UserProfile) -> Self {
        Self {
            device_id: p.device_id,
            profile_type: p.profile_type.to_string(),
            name: p.name,
            education_level: p.education_level,
            specialty: p.specialty,
            country: p.country,
            institution_name: p.institution_name,
            series: p.series,
            study_year: p.study_year,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

fn merge_profile(existing: Option<UserProfile>, device_id: String, req: ProfileRequest) -> UserProfile {
    let mut profile = existing.unwrap_or_else(|| UserProfile::new(device_id, ProfileType::Other));
    if let Some(kind) = req.profile_type.as_deref() {
        profile.profile_type = ProfileType::from(kind);
    }
    let fields = [
        (&mut profile.name, req.name),
        (&mut profile.education_level, req.education_level),
        (&mut profile.specialty, req.specialty),
        (&mut profile.country, req.country),
        (&mut profile.institution_name, req.institution_name),
        (&mut profile.series, req.series),
        (&mut profile.study_year, req.study_year),
    ];
    for (slot, value) in fields {
        if value.is_some() {
            *slot = value;
        }
    }
    profile
}

/// Create or update the profile of a device.
#[utoipa::path(
    post,
    path = "/api/v1/profiles",
    request_body = ProfileRequest,
    responses(
        (status = 201, description = "Profile created", body = ProfileResponse),
        (status = 200, description = "Profile updated", body = ProfileResponse),
        (status = 400, description = "No device id")
    )
)]
pub async fn upsert_profile_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(mut payload): Json<ProfileRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let device = device_id(&headers)
        .or_else(|| payload.device_id.take().filter(|d| !d.trim().is_empty()))
        .ok_or_else(|| bad_request("deviceId is required"))?;

    let existing = app_state
        .db
        .get_profile_by_device(&device)
        .await
        .map_err(|e| port_error("Failed to load profile", e))?;
    let created = existing.is_none();

    let saved = app_state
        .db
        .upsert_profile(merge_profile(existing, device, payload))
        .await
        .map_err(|e| port_error("Failed to save profile", e))?;

    info!(device_id = %saved.device_id, created, "Profile saved");
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(Envelope::ok(ProfileResponse::from(saved)))))
}

#[utoipa::path(
    get,
    path = "/api/v1/profiles/{device_id}",
    params(("device_id" = String, Path, description = "Device id")),
    responses(
        (status = 200, description = "The profile", body = ProfileResponse),
        (status = 404, description = "No profile for this device")
    )
)]
pub async fn get_profile_handler(
    State(app_state): State<Arc<AppState>>,
    Path(device): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let profile = app_state
        .db
        .get_profile_by_device(&device)
        .await
        .map_err(|e| port_error("Failed to load profile", e))?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Profile not found".to_string()))?;
    Ok(Json(Envelope::ok(ProfileResponse::from(profile))))
}

//=========================================================================================
// Progress
//=========================================================================================

/// `currentStep` and `completed` are accepted as older names of
/// `currentSectionIndex` and `isCompleted`; the newer names win.
#[derive(Deserialize, ToSchema, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    pub current_step: Option<u32>,
    pub current_section_index: Option<u32>,
    pub current_subsection_index: Option<u32>,
    pub completed_sections: Option<Vec<u32>>,
    pub completed: Option<bool>,
    pub is_completed: Option<bool>,
}

impl From<ProgressRequest> for ProgressUpdate {
    fn from(req: ProgressRequest) -> Self {
        Self {
            current_section_index: req.current_section_index.or(req.current_step),
            current_subsection_index: req.current_subsection_index,
            completed_sections: req.completed_sections,
            is_completed: req.is_completed.or(req.completed),
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub lesson_id: LessonId,
    pub device_id: String,
    pub current_step: u32,
    pub total_steps: usize,
    pub completed: bool,
    pub current_section_index: u32,
    pub current_subsection_index: u32,
    pub completed_sections: Vec<u32>,
    pub is_completed: bool,
    pub review_count: u32,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub next_review_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<LessonProgress> for ProgressResponse {
    fn from(p: LessonProgress) -> Self {
        Self {
            lesson_id: p.lesson_id,
            device_id: p.device_id,
            current_step: p.current_section_index,
            total_steps: p.completed_sections.len(),
            completed: p.is_completed,
            current_section_index: p.current_section_index,
            current_subsection_index: p.current_subsection_index,
            completed_sections: p.completed_sections,
            is_completed: p.is_completed,
            review_count: p.review_count,
            last_reviewed_at: p.last_reviewed_at,
            next_review_at: p.next_review_at,
            updated_at: Some(p.updated_at),
        }
    }
}

impl ProgressResponse {
    /// What a device that never opened the lesson sees.
    fn untouched(lesson_id: LessonId, device_id: String) -> Self {
        Self {
            lesson_id,
            device_id,
            current_step: 0,
            total_steps: 0,
            completed: false,
            current_section_index: 0,
            current_subsection_index: 0,
            completed_sections: Vec::new(),
            is_completed: false,
            review_count: 0,
            last_reviewed_at: None,
            next_review_at: None,
            updated_at: None,
        }
    }
}

/// Every lesson the device has progress on, most recently updated first.
#[utoipa::path(
    get,
    path = "/api/v1/progress",
    params(("x-device-id" = String, Header, description = "The learner's device.")),
    responses(
        (status = 200, description = "Progress records", body = [ProgressResponse]),
        (status = 400, description = "No device id")
    )
)]
pub async fn list_progress_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HandlerError> {
    let device = require_device_id(&headers)?;
    let entries = app_state
        .db
        .list_progress(&device)
        .await
        .map_err(|e| port_error("Failed to list progress", e))?;
    let entries: Vec<ProgressResponse> = entries.into_iter().map(ProgressResponse::from).collect();
    Ok(Json(Envelope::ok(entries)))
}

#[utoipa::path(
    get,
    path = "/api/v1/lessons/{id}/progress",
    params(
        ("id" = i64, Path, description = "Lesson id"),
        ("x-device-id" = String, Header, description = "The learner's device.")
    ),
    responses(
        (status = 200, description = "Progress, zeroed when the lesson was never opened", body = ProgressResponse),
        (status = 400, description = "No device id")
    )
)]
pub async fn get_progress_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(lesson_id): Path<LessonId>,
) -> Result<impl IntoResponse, HandlerError> {
    let device = require_device_id(&headers)?;
    let progress = app_state
        .db
        .get_progress(lesson_id, &device)
        .await
        .map_err(|e| port_error("Failed to load progress", e))?;

    let response = match progress {
        Some(progress) => ProgressResponse::from(progress),
        None => ProgressResponse::untouched(lesson_id, device),
    };
    Ok(Json(Envelope::ok(response)))
}

/// Record where the learner is and schedule the next review.
#[utoipa::path(
    put,
    path = "/api/v1/lessons/{id}/progress",
    request_body = ProgressRequest,
    params(
        ("id" = i64, Path, description = "Lesson id"),
        ("x-device-id" = String, Header, description = "The learner's device.")
    ),
    responses(
        (status = 200, description = "Updated progress", body = ProgressResponse),
        (status = 400, description = "No device id"),
        (status = 404, description = "Unknown lesson")
    )
)]
pub async fn update_progress_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(lesson_id): Path<LessonId>,
    Json(payload): Json<ProgressRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let device = require_device_id(&headers)?;
    let existing = app_state
        .db
        .get_progress(lesson_id, &device)
        .await
        .map_err(|e| port_error("Failed to load progress", e))?;

    let updated = apply_update(existing, lesson_id, &device, payload.into(), Utc::now());
    let saved = app_state
        .db
        .save_progress(updated)
        .await
        .map_err(|e| port_error("Failed to save progress", e))?;

    Ok(Json(Envelope::ok(ProgressResponse::from(saved))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_fields_the_request_leaves_out() {
        let mut stored = UserProfile::new("d1", ProfileType::Pupil);
        stored.series = Some("D".to_string());
        stored.country = Some("Cameroun".to_string());

        let merged = merge_profile(
            Some(stored),
            "d1".to_string(),
            ProfileRequest {
                profile_type: Some("Étudiant".to_string()),
                specialty: Some("Biologie".to_string()),
                ..Default::default()
            },
        );

        assert_eq!(merged.profile_type, ProfileType::Student);
        assert_eq!(merged.series.as_deref(), Some("D"));
        assert_eq!(merged.specialty.as_deref(), Some("Biologie"));
    }

    #[test]
    fn newer_progress_field_names_win() {
        let update = ProgressUpdate::from(ProgressRequest {
            current_step: Some(1),
            current_section_index: Some(3),
            completed: Some(true),
            ..Default::default()
        });
        assert_eq!(update.current_section_index, Some(3));
        assert_eq!(update.is_completed, Some(true));
    }
}
