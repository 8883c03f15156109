//! crates/lesson_core/src/domain.rs
//!
//! Defines the core data structures for the application.
//!
//! Records such as `Lesson` and `UserProfile` are independent of any database.
//! The lesson content document is itself a JSON document handed to clients, so its
//! types carry the serde attributes that fix its wire shape (camelCase keys).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type LessonId = i64;

/// Maps an audio slot key (see [`AudioSlot`]) to a playable URL.
pub type AudioFiles = BTreeMap<String, String>;

//=========================================================================================
// Lesson Record
//=========================================================================================

/// The lifecycle of a lesson record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    Draft,
    Processing,
    PlanReady,
    IntroReady,
    Ready,
}

impl LessonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonStatus::Draft => "draft",
            LessonStatus::Processing => "processing",
            LessonStatus::PlanReady => "plan_ready",
            LessonStatus::IntroReady => "intro_ready",
            LessonStatus::Ready => "ready",
        }
    }
}

impl fmt::Display for LessonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LessonStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(LessonStatus::Draft),
            "processing" => Ok(LessonStatus::Processing),
            "plan_ready" => Ok(LessonStatus::PlanReady),
            "intro_ready" => Ok(LessonStatus::IntroReady),
            "ready" => Ok(LessonStatus::Ready),
            other => Err(format!("unknown lesson status '{}'", other)),
        }
    }
}

/// A persisted lesson.
#[derive(Debug, Clone)]
pub struct Lesson {
    pub id: LessonId,
    pub title: String,
    pub description: Option<String>,
    pub status: LessonStatus,
    pub plan: Option<PlanSummary>,
    pub content: Option<LessonContent>,
    pub device_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The fields needed to insert a new lesson.
#[derive(Debug, Clone)]
pub struct NewLesson {
    pub title: String,
    pub description: Option<String>,
    pub status: LessonStatus,
    pub plan: Option<PlanSummary>,
    pub content: Option<LessonContent>,
    pub device_id: Option<String>,
}

impl NewLesson {
    /// A bare lesson that has not started generating yet.
    pub fn draft(title: impl Into<String>, device_id: Option<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: LessonStatus::Draft,
            plan: None,
            content: None,
            device_id,
        }
    }
}

/// A partial update of a lesson. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct LessonPatch {
    pub description: Option<String>,
    pub plan: Option<PlanSummary>,
    pub content: Option<LessonContent>,
    pub status: Option<LessonStatus>,
}

impl LessonPatch {
    pub fn status(status: LessonStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn content(content: LessonContent, status: LessonStatus) -> Self {
        Self {
            content: Some(content),
            status: Some(status),
            ..Default::default()
        }
    }
}

/// The lightweight plan stored next to the full content: section titles only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PlanSummary {
    pub sections: Vec<PlanSummaryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummaryEntry {
    pub title: String,
}

impl From<&LessonPlan> for PlanSummary {
    fn from(plan: &LessonPlan) -> Self {
        Self {
            sections: plan
                .sections
                .iter()
                .map(|s| PlanSummaryEntry {
                    title: s.title.clone(),
                })
                .collect(),
        }
    }
}

//=========================================================================================
// Lesson Plan (planner output, never persisted directly)
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPlan {
    pub title: String,
    pub description: String,
    pub sections: Vec<PlanSection>,
    #[serde(default)]
    pub conclusion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSection {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub check_understanding: bool,
    pub subsections: Vec<PlanSubsection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSubsection {
    pub title: String,
    pub content: String,
    pub image_query: String,
}

impl LessonPlan {
    /// Gives every section without an identifier a fresh UUID.
    pub fn assign_section_ids(&mut self) {
        for section in &mut self.sections {
            if section.id.as_deref().map_or(true, |id| id.trim().is_empty()) {
                section.id = Some(Uuid::new_v4().to_string());
            }
        }
    }
}

//=========================================================================================
// Lesson Content (the persisted, enriched document)
//=========================================================================================

/// An illustrative image attached to a subsection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonImage {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonContent {
    pub title: String,
    pub description: String,
    pub sections: Vec<ContentSection>,
    #[serde(default)]
    pub conclusion: String,
    #[serde(default)]
    pub audio_files: AudioFiles,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSection {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub check_understanding: bool,
    pub subsections: Vec<ContentSubsection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSubsection {
    pub title: String,
    pub content: String,
    pub image_query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<LessonImage>,
}

impl LessonContent {
    /// Builds a content document from a plan, asking `image_for(section, subsection)`
    /// for the image of each subsection. The audio map starts empty.
    pub fn from_plan<F>(plan: &LessonPlan, mut image_for: F) -> Self
    where
        F: FnMut(usize, usize) -> Option<LessonImage>,
    {
        let sections = plan
            .sections
            .iter()
            .enumerate()
            .map(|(i, section)| ContentSection {
                id: section
                    .id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                title: section.title.clone(),
                check_understanding: section.check_understanding,
                subsections: section
                    .subsections
                    .iter()
                    .enumerate()
                    .map(|(j, sub)| ContentSubsection {
                        title: sub.title.clone(),
                        content: sub.content.clone(),
                        image_query: sub.image_query.clone(),
                        image: image_for(i, j),
                    })
                    .collect(),
            })
            .collect();

        Self {
            title: plan.title.clone(),
            description: plan.description.clone(),
            sections,
            conclusion: plan.conclusion.clone(),
            audio_files: AudioFiles::new(),
        }
    }

    /// Folds a previously persisted document into this one without losing anything
    /// it already had: section ids, attached images, audio slots and any trailing
    /// sections missing here are carried over. Fields already set on `self` win.
    pub fn merge_from(&mut self, previous: &LessonContent) {
        for (i, prev_section) in previous.sections.iter().enumerate() {
            match self.sections.get_mut(i) {
                Some(section) => {
                    section.id = prev_section.id.clone();
                    section.check_understanding |= prev_section.check_understanding;
                    for (j, prev_sub) in prev_section.subsections.iter().enumerate() {
                        match section.subsections.get_mut(j) {
                            Some(sub) if sub.image.is_none() => sub.image = prev_sub.image.clone(),
                            Some(_) => {}
                            None => section.subsections.push(prev_sub.clone()),
                        }
                    }
                }
                None => self.sections.push(prev_section.clone()),
            }
        }

        for (slot, url) in &previous.audio_files {
            self.audio_files
                .entry(slot.clone())
                .or_insert_with(|| url.clone());
        }
    }

    pub fn image_count(&self) -> usize {
        self.sections
            .iter()
            .flat_map(|s| s.subsections.iter())
            .filter(|sub| sub.image.is_some())
            .count()
    }
}

/// The role of one audio asset inside a lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioSlot {
    Intro,
    SectionIntro(usize),
    Subsection(usize, usize),
    Conclusion,
}

impl AudioSlot {
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AudioSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSlot::Intro => f.write_str("intro"),
            AudioSlot::SectionIntro(i) => write!(f, "section_{}_intro", i),
            AudioSlot::Subsection(i, j) => write!(f, "section_{}_subsection_{}", i, j),
            AudioSlot::Conclusion => f.write_str("conclusion"),
        }
    }
}

//=========================================================================================
// Media
//=========================================================================================

/// An asset uploaded to the media CDN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub url: String,
    pub public_id: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Audio,
}

/// The transformation applied to every image uploaded to the CDN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTransform {
    pub width: u32,
    pub height: u32,
    pub crop: &'static str,
    pub quality: &'static str,
    pub format: &'static str,
}

impl Default for ImageTransform {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            crop: "fill",
            quality: "auto",
            format: "webp",
        }
    }
}

/// The transformation applied to every synthesized audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTransform {
    pub codec: &'static str,
    pub bit_rate: &'static str,
    pub sample_rate: u32,
}

impl Default for AudioTransform {
    fn default() -> Self {
        Self {
            codec: "mp3",
            bit_rate: "128k",
            sample_rate: 44_100,
        }
    }
}

/// Voice selection passed to the speech engine. Unset fields use the engine default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceOptions {
    pub language_code: Option<String>,
    pub voice_name: Option<String>,
}

//=========================================================================================
// Learners
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileType {
    Pupil,
    Student,
    Professional,
    Other,
}

impl ProfileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileType::Pupil => "pupil",
            ProfileType::Student => "student",
            ProfileType::Professional => "professional",
            ProfileType::Other => "other",
        }
    }
}

impl From<&str> for ProfileType {
    /// Accepts both the English identifiers and the French labels used by the app.
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "pupil" | "élève" | "eleve" => ProfileType::Pupil,
            "student" | "étudiant" | "etudiant" => ProfileType::Student,
            "professional" | "professionnel" => ProfileType::Professional,
            _ => ProfileType::Other,
        }
    }
}

impl fmt::Display for ProfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generation context for a learner, keyed by device.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub device_id: String,
    pub profile_type: ProfileType,
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

impl UserProfile {
    pub fn new(device_id: impl Into<String>, profile_type: ProfileType) -> Self {
        let now = Utc::now();
        Self {
            device_id: device_id.into(),
            profile_type,
            name: None,
            education_level: None,
            specialty: None,
            country: None,
            institution_name: None,
            series: None,
            study_year: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// How far a device has got through a lesson, plus its spaced-review schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonProgress {
    pub lesson_id: LessonId,
    pub device_id: String,
    pub current_section_index: u32,
    pub current_subsection_index: u32,
    pub completed_sections: Vec<u32>,
    pub is_completed: bool,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub next_review_at: Option<DateTime<Utc>>,
    pub review_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//=========================================================================================
// Progress Events
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Processing,
    Ready,
    Error,
}

/// A notification pushed to every client following a lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonEvent {
    pub lesson_id: LessonId,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<LessonContent>,
    pub timestamp: DateTime<Utc>,
}

impl LessonEvent {
    pub fn progress(lesson_id: LessonId, progress: u8, message: impl Into<String>) -> Self {
        Self {
            lesson_id,
            status: EventStatus::Processing,
            progress: Some(progress),
            message: Some(message.into()),
            data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn ready(lesson_id: LessonId, content: LessonContent) -> Self {
        Self {
            lesson_id,
            status: EventStatus::Ready,
            progress: Some(100),
            message: Some("Lesson generated successfully".to_string()),
            data: Some(content),
            timestamp: Utc::now(),
        }
    }

    pub fn error(lesson_id: LessonId, message: impl Into<String>) -> Self {
        Self {
            lesson_id,
            status: EventStatus::Error,
            progress: None,
            message: Some(message.into()),
            data: None,
            timestamp: Utc::now(),
        }
    }
}

//=========================================================================================
// Study Aids
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaItem {
    pub id: u32,
    pub question: String,
    pub answer: String,
    pub category: String,
    pub related_topics: Vec<String>,
    pub difficulty: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaSession {
    pub id: i64,
    pub lesson_id: LessonId,
    pub title: String,
    pub items: Vec<QaItem>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: u32,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer_index: usize,
    pub explanation: String,
    pub difficulty: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: i64,
    pub lesson_id: LessonId,
    pub title: String,
    pub questions: Vec<QuizQuestion>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(url: &str) -> LessonImage {
        LessonImage {
            url: url.to_string(),
            title: "t".to_string(),
            description: None,
        }
    }

    fn plan() -> LessonPlan {
        LessonPlan {
            title: "Water".to_string(),
            description: "The water cycle".to_string(),
            sections: vec![
                PlanSection {
                    title: "Evaporation".to_string(),
                    id: Some("s0".to_string()),
                    check_understanding: false,
                    subsections: vec![PlanSubsection {
                        title: "Heat".to_string(),
                        content: "The sun heats water.".to_string(),
                        image_query: "sun".to_string(),
                    }],
                },
                PlanSection {
                    title: "Rain".to_string(),
                    id: None,
                    check_understanding: false,
                    subsections: vec![PlanSubsection {
                        title: "Clouds".to_string(),
                        content: "Clouds form.".to_string(),
                        image_query: "cloud".to_string(),
                    }],
                },
            ],
            conclusion: "Water moves.".to_string(),
        }
    }

    #[test]
    fn slot_keys_follow_the_positional_naming() {
        assert_eq!(AudioSlot::Intro.key(), "intro");
        assert_eq!(AudioSlot::SectionIntro(2).key(), "section_2_intro");
        assert_eq!(AudioSlot::Subsection(2, 1).key(), "section_2_subsection_1");
        assert_eq!(AudioSlot::Conclusion.key(), "conclusion");
    }

    #[test]
    fn merge_keeps_previous_images_ids_and_audio() {
        let plan = plan();
        let previous = {
            let mut c = LessonContent::from_plan(&plan, |i, _| (i == 0).then(|| image("a.png")));
            c.audio_files.insert("intro".to_string(), "intro.mp3".to_string());
            c
        };

        let mut next = LessonContent::from_plan(&plan, |i, _| (i == 1).then(|| image("b.png")));
        next.audio_files
            .insert("conclusion".to_string(), "end.mp3".to_string());
        next.merge_from(&previous);

        assert_eq!(next.sections[0].id, "s0");
        assert_eq!(next.sections[1].id, previous.sections[1].id);
        assert_eq!(next.sections[0].subsections[0].image, Some(image("a.png")));
        assert_eq!(next.sections[1].subsections[0].image, Some(image("b.png")));
        assert_eq!(next.audio_files.get("intro").map(String::as_str), Some("intro.mp3"));
        assert_eq!(next.audio_files.get("conclusion").map(String::as_str), Some("end.mp3"));
    }

    #[test]
    fn merge_does_not_drop_sections_missing_from_the_new_document() {
        let plan = plan();
        let previous = LessonContent::from_plan(&plan, |_, _| None);
        let mut shorter = previous.clone();
        shorter.sections.truncate(1);

        shorter.merge_from(&previous);
        assert_eq!(shorter.sections.len(), 2);
    }

    #[test]
    fn content_serializes_with_camel_case_keys() {
        let content = LessonContent::from_plan(&plan(), |_, _| None);
        let json = serde_json::to_value(&content).unwrap();
        assert!(json.get("audioFiles").is_some());
        assert!(json["sections"][0]["subsections"][0].get("imageQuery").is_some());
        assert!(json["sections"][0].get("checkUnderstanding").is_some());
        assert!(json["sections"][0]["subsections"][0].get("image").is_none());
    }

    #[test]
    fn profile_type_accepts_french_labels() {
        assert_eq!(ProfileType::from("Élève"), ProfileType::Pupil);
        assert_eq!(ProfileType::from("Étudiant"), ProfileType::Student);
        assert_eq!(ProfileType::from("Professionnel"), ProfileType::Professional);
        assert_eq!(ProfileType::from("retired"), ProfileType::Other);
    }

    #[test]
    fn assign_section_ids_keeps_existing_ones() {
        let mut plan = plan();
        plan.assign_section_ids();
        assert_eq!(plan.sections[0].id.as_deref(), Some("s0"));
        assert!(plan.sections[1].id.is_some());
    }
}
