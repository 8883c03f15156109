//! crates/lesson_core/src/study.rs
//!
//! Question & answer sessions, quizzes and free-form questions about a lesson.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::{
    LessonContent, LessonId, ProfileType, QaItem, QaSession, Quiz, QuizQuestion, UserProfile,
};
use crate::error::{GenerationError, LessonError};
use crate::ports::TextGenerationService;
use crate::repair;
use crate::retry::RetryPolicy;

pub const QA_ITEM_COUNT: usize = 8;
pub const QUIZ_QUESTION_COUNT: usize = 5;
pub const QUIZ_OPTION_COUNT: usize = 4;

/// Returned by `answer_question` when the model cannot be reached.
pub const ANSWER_FALLBACK: &str = "Je ne peux pas répondre à cette question pour le moment. \
Veuillez consulter le contenu de la leçon ou reformuler votre question.";

pub struct StudyAssistant {
    llm: Arc<dyn TextGenerationService>,
    retry: RetryPolicy,
}

//=========================================================================================
// Raw model answers
//=========================================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQaSession {
    #[serde(default)]
    title: Option<String>,
    items: Vec<RawQaItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQaItem {
    question: String,
    answer: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    related_topics: Vec<String>,
    #[serde(default)]
    difficulty: Option<u8>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuiz {
    #[serde(default)]
    title: Option<String>,
    questions: Vec<RawQuizQuestion>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuizQuestion {
    question: String,
    options: Vec<String>,
    correct_answer_index: usize,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    difficulty: Option<u8>,
}

impl StudyAssistant {
    pub fn new(llm: Arc<dyn TextGenerationService>, retry: RetryPolicy) -> Self {
        Self { llm, retry }
    }

    pub async fn generate_qa_session(
        &self,
        lesson_id: LessonId,
        title: &str,
        content: &LessonContent,
        profile: Option<&UserProfile>,
    ) -> Result<QaSession, LessonError> {
        let prompt = qa_prompt(title, content, profile);
        let raw: RawQaSession = self.request_json("Q&A generation", &prompt).await?;

        let items: Vec<QaItem> = raw
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| QaItem {
                id: index as u32 + 1,
                question: item.question,
                answer: item.answer,
                category: item.category.unwrap_or_else(|| "general".to_string()),
                related_topics: item.related_topics,
                difficulty: item.difficulty.unwrap_or(2).clamp(1, 5),
            })
            .collect();

        info!(lesson_id, items = items.len(), "Q&A session generated");
        Ok(QaSession {
            id: Utc::now().timestamp_millis(),
            lesson_id,
            title: raw.title.unwrap_or_else(|| format!("Q&A : {}", title)),
            items,
            created_at: Utc::now(),
        })
    }

    pub async fn generate_quiz(
        &self,
        lesson_id: LessonId,
        title: &str,
        content: &LessonContent,
        profile: Option<&UserProfile>,
    ) -> Result<Quiz, LessonError> {
        let prompt = quiz_prompt(title, content, profile);
        let (quiz_title, questions) = self
            .retry
            .run("Quiz generation", |_| {
                let prompt = prompt.as_str();
                async move {
                    let raw = self.llm.generate_text(prompt).await?;
                    let quiz: RawQuiz = parse_answer(&raw)?;
                    validate_quiz(quiz)
                }
            })
            .await?;

        info!(lesson_id, questions = questions.len(), "Quiz generated");
        Ok(Quiz {
            id: Utc::now().timestamp_millis(),
            lesson_id,
            title: quiz_title.unwrap_or_else(|| format!("Quiz : {}", title)),
            questions,
            created_at: Utc::now(),
        })
    }

    /// Answers a learner's question from the lesson content. Never fails: when the
    /// model cannot answer, a fixed apology is returned instead.
    pub async fn answer_question(
        &self,
        question: &str,
        content: &LessonContent,
        profile: Option<&UserProfile>,
    ) -> String {
        let prompt = answer_prompt(question, content, profile);
        let result = self
            .retry
            .run("Question answering", |_| {
                let prompt = prompt.as_str();
                async move {
                    let answer = self.llm.generate_text(prompt).await?;
                    let answer = answer.trim();
                    if answer.is_empty() {
                        return Err(GenerationError::Malformed("empty answer".to_string()));
                    }
                    Ok(answer.to_string())
                }
            })
            .await;

        match result {
            Ok(answer) => answer,
            Err(e) => {
                error!(error = %e, "Could not answer question");
                ANSWER_FALLBACK.to_string()
            }
        }
    }

    async fn request_json<T>(&self, label: &str, prompt: &str) -> Result<T, LessonError>
    where
        T: for<'de> Deserialize<'de>,
    {
        self.retry
            .run(label, |_| async move {
                let raw = self.llm.generate_text(prompt).await?;
                parse_answer(&raw)
            })
            .await
    }
}

fn parse_answer<T>(raw: &str) -> Result<T, GenerationError>
where
    T: for<'de> Deserialize<'de>,
{
    let object = repair::parse_json_object(raw)?;
    serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| GenerationError::Malformed(e.to_string()))
}

fn validate_quiz(quiz: RawQuiz) -> Result<(Option<String>, Vec<QuizQuestion>), GenerationError> {
    let questions = quiz
        .questions
        .into_iter()
        .enumerate()
        .map(|(index, q)| {
            if q.options.len() < 2 || q.correct_answer_index >= q.options.len() {
                return Err(GenerationError::Malformed(format!(
                    "question {} has answer index {} for {} options",
                    index + 1,
                    q.correct_answer_index,
                    q.options.len()
                )));
            }
            Ok(QuizQuestion {
                id: index as u32 + 1,
                question: q.question,
                options: q.options,
                correct_answer_index: q.correct_answer_index,
                explanation: q.explanation,
                difficulty: q.difficulty.unwrap_or(2).clamp(1, 5),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if questions.is_empty() {
        return Err(GenerationError::Malformed("quiz has no questions".to_string()));
    }
    Ok((quiz.title, questions))
}

//=========================================================================================
// Prompts
//=========================================================================================

/// How answers should be pitched for the learner.
pub fn audience_guidance(profile: Option<&UserProfile>) -> String {
    let Some(profile) = profile else {
        return "Balance simplicity and depth; keep answers accessible but complete.".to_string();
    };
    let mut guidance = match profile.profile_type {
        ProfileType::Pupil => {
            "Audience: school pupil. Use simple questions, plain vocabulary and everyday examples; avoid jargon."
        }
        ProfileType::Student => {
            "Audience: university student. Go in depth with academic rigour and precise technical vocabulary."
        }
        ProfileType::Professional => {
            "Audience: professional. Focus on practical application and real use cases."
        }
        ProfileType::Other => {
            "Audience: general. Balance simplicity and depth with varied examples."
        }
    }
    .to_string();
    if let Some(level) = &profile.education_level {
        guidance.push_str(&format!(" Level: {}.", level));
    }
    if let Some(specialty) = &profile.specialty {
        guidance.push_str(&format!(" Field: {}.", specialty));
    }
    guidance
}

fn lesson_json(content: &LessonContent) -> String {
    serde_json::to_string_pretty(content).unwrap_or_default()
}

fn qa_prompt(title: &str, content: &LessonContent, profile: Option<&UserProfile>) -> String {
    format!(
        r#"Create a complete question & answer session for the lesson "{title}".
{guidance}

Lesson content:
{content}

Write exactly {count} varied questions covering every part of the lesson. Each item has a
category among "definition", "explanation", "example", "application", "comparison",
"history" and "general", a detailed answer of 100 to 200 words, a difficulty from 1 (easy)
to 5 (expert) and 2 or 3 related topics. Write in the language of the lesson.

Answer ONLY with valid JSON:
{{"title": "Q&A : {title}", "items": [{{"question": "...", "answer": "...", "category": "definition", "relatedTopics": ["..."], "difficulty": 2}}]}}"#,
        title = title,
        guidance = audience_guidance(profile),
        content = lesson_json(content),
        count = QA_ITEM_COUNT,
    )
}

fn quiz_prompt(title: &str, content: &LessonContent, profile: Option<&UserProfile>) -> String {
    format!(
        r#"Create a multiple-choice quiz for the lesson "{title}".
{guidance}

Lesson content:
{content}

Write exactly {count} questions, each with {options} options, exactly one of them correct,
the zero-based index of the correct option, a short explanation and a difficulty from 1 to 5.
Write in the language of the lesson.

Answer ONLY with valid JSON:
{{"title": "Quiz : {title}", "questions": [{{"question": "...", "options": ["...", "...", "...", "..."], "correctAnswerIndex": 0, "explanation": "...", "difficulty": 2}}]}}"#,
        title = title,
        guidance = audience_guidance(profile),
        content = lesson_json(content),
        count = QUIZ_QUESTION_COUNT,
        options = QUIZ_OPTION_COUNT,
    )
}

fn answer_prompt(question: &str, content: &LessonContent, profile: Option<&UserProfile>) -> String {
    format!(
        r#"You are an expert teacher. A learner asks this question about the lesson:
QUESTION: "{question}"

LESSON CONTENT:
{content}

{guidance}
Answer in 100 to 250 words, based on the lesson content. If the question is outside the
lesson, steer the learner back to the relevant part. Be kind and encouraging.
Answer with plain text only, no JSON."#,
        question = question,
        content = lesson_json(content),
        guidance = audience_guidance(profile),
    )
}
