//! crates/lesson_core/src/planner.rs
//!
//! Asks the text model for a structured lesson plan and repairs its answer.

use std::sync::Arc;
use tracing::info;

use crate::domain::{LessonPlan, ProfileType, UserProfile};
use crate::error::{GenerationError, LessonError};
use crate::ports::TextGenerationService;
use crate::repair;
use crate::retry::RetryPolicy;

//=========================================================================================
// The Planner
//=========================================================================================

pub struct ContentPlanner {
    llm: Arc<dyn TextGenerationService>,
    retry: RetryPolicy,
}

impl ContentPlanner {
    pub fn new(llm: Arc<dyn TextGenerationService>, retry: RetryPolicy) -> Self {
        Self { llm, retry }
    }

    /// Produces a complete plan for `title`, tailored to `profile` when given.
    ///
    /// Every subsection of the result has a non-empty title, content and image
    /// query. Fails with `LessonError::Generation` once the retry budget is spent.
    pub async fn generate_plan(
        &self,
        title: &str,
        profile: Option<&UserProfile>,
    ) -> Result<LessonPlan, LessonError> {
        let prompt = plan_prompt(title, profile);

        let mut plan = self
            .retry
            .run("Lesson planning", |attempt| {
                let prompt = prompt.as_str();
                async move {
                    info!(attempt, title, "Requesting lesson plan");
                    let raw = self.llm.generate_text(prompt).await?;
                    repair::parse_lesson_plan(&raw)
                }
            })
            .await?;

        if plan.title.trim().is_empty() {
            plan.title = title.to_string();
        }
        if plan.description.trim().is_empty() {
            plan.description = format!("Lesson on {}", title);
        }

        info!(
            title = %plan.title,
            sections = plan.sections.len(),
            "Lesson plan ready"
        );
        Ok(plan)
    }
}

//=========================================================================================
// Prompts
//=========================================================================================

/// A one-line description of who the lesson is for, used in every prompt.
pub fn describe_audience(profile: Option<&UserProfile>) -> String {
    let Some(profile) = profile else {
        return "a general audience".to_string();
    };

    let mut parts = Vec::new();
    match profile.profile_type {
        ProfileType::Pupil => {
            parts.push("a school pupil".to_string());
            if let Some(level) = &profile.education_level {
                parts.push(format!("in {}", level));
            }
            if let Some(series) = &profile.series {
                parts.push(format!("(series {})", series));
            }
        }
        ProfileType::Student => {
            parts.push("a university student".to_string());
            if let Some(specialty) = &profile.specialty {
                parts.push(format!("in {}", specialty));
            }
            if let Some(year) = &profile.study_year {
                parts.push(format!("({})", year));
            }
            if let Some(institution) = &profile.institution_name {
                parts.push(format!("at {}", institution));
            }
        }
        ProfileType::Professional => {
            parts.push("a working professional".to_string());
            if let Some(specialty) = &profile.specialty {
                parts.push(format!("in {}", specialty));
            }
        }
        ProfileType::Other => parts.push("an adult learner".to_string()),
    }
    parts.push(format!(
        "(country: {})",
        profile.country.as_deref().unwrap_or("International")
    ));
    parts.join(" ")
}

fn plan_prompt(title: &str, profile: Option<&UserProfile>) -> String {
    format!(
        r#"You are an expert instructional designer familiar with national school curricula.
Design a lesson plan for the topic '{title}' aimed at {audience}.

Follow the official curriculum of the learner's country when one exists and use its
chapter and section names. If the topic is approximate, pick the closest official chapter.

Structure the lesson as an introduction, main sections, subsections for each section and
a conclusion. Every subsection MUST contain complete, detailed teaching content in its
"content" field, ready to be read by the learner. Never leave placeholder text.
Write the lesson in the learner's language (French unless the topic is clearly in another language).

Answer ONLY with a valid JSON object following exactly this schema:
{{
  "title": "Official lesson title",
  "description": "Introduction and objectives of the lesson",
  "sections": [
    {{
      "title": "Main section 1",
      "subsections": [
        {{
          "title": "Subsection 1.1",
          "content": "Full teaching text for this subsection.",
          "imageQuery": "Search term for an illustrative image"
        }}
      ]
    }}
  ],
  "conclusion": "Summary and next steps"
}}"#,
        title = title,
        audience = describe_audience(profile),
    )
}
