//! services/api/tests/api_routes.rs
//!
//! Drives the full router against in-memory storage and scripted providers.

use api_lib::adapters::BroadcastPublisher;
use api_lib::config::Config;
use api_lib::web::{self, AppState, Providers};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use lesson_core::domain::{EventStatus, LessonStatus, NewLesson};
use lesson_core::memory::InMemoryDatabase;
use lesson_core::ports::DatabaseService;
use lesson_core::test_support::{FakeLookup, FakeStorage, RecordingTts, ScriptedLlm};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const VOLCANO_PLAN: &str = r#"{
  "title": "Les volcans",
  "description": "Comment naissent les volcans",
  "sections": [
    {"title": "Magma", "subsections": [
      {"title": "Origine", "content": "Le magma vient du manteau.", "imageQuery": "Magma"}
    ]},
    {"title": "Eruptions", "subsections": [
      {"title": "Types", "content": "Il existe plusieurs types d'eruptions.", "imageQuery": "Eruption"}
    ]}
  ],
  "conclusion": "Les volcans faconnent la Terre."
}"#;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    db: Arc<InMemoryDatabase>,
}

fn app(planner: ScriptedLlm, study: ScriptedLlm) -> TestApp {
    let db = Arc::new(InMemoryDatabase::new());
    let lookup = FakeLookup::default()
        .with_page("Magma", Some("https://img/magma.png"))
        .with_page("Eruption", Some("https://img/eruption.png"));

    let state = Arc::new(AppState::new(
        Arc::new(Config::default()),
        db.clone(),
        Providers {
            planner_llm: Arc::new(planner),
            study_llm: Arc::new(study),
            lookup: Arc::new(lookup),
            tts: Arc::new(RecordingTts::default()),
            storage: Arc::new(FakeStorage::default()),
        },
        BroadcastPublisher::default(),
    ));

    TestApp {
        router: web::router(state.clone()),
        state,
        db,
    }
}

fn idle_app() -> TestApp {
    app(ScriptedLlm::new(vec![]), ScriptedLlm::new(vec![]))
}

fn json_request(method: Method, uri: &str, device: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(device) = device {
        builder = builder.header("x-device-id", device);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, device: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(device) = device {
        builder = builder.header("x-device-id", device);
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

//=========================================================================================
// Lessons
//=========================================================================================

#[tokio::test]
async fn created_lesson_is_generated_in_the_background() {
    let app = app(
        ScriptedLlm::new(vec![Ok(VOLCANO_PLAN.to_string())]),
        ScriptedLlm::new(vec![]),
    );
    let mut events = app.state.events.subscribe();

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/lessons",
            Some("tablet-1"),
            json!({ "title": "Les volcans" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "processing");
    assert_eq!(body["data"]["deviceId"], "tablet-1");
    let id = body["data"]["id"].as_i64().unwrap();

    app.state.orchestrator.jobs().drain().await;

    let (status, body) = send(&app, get(&format!("/api/v1/lessons/{}", id), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ready");
    let content = &body["data"]["content"];
    assert_eq!(content["sections"].as_array().unwrap().len(), 2);
    assert!(content["audioFiles"]["intro"].is_string());
    assert!(content["audioFiles"]["section_1_subsection_0"].is_string());
    assert_eq!(
        content["sections"][0]["subsections"][0]["image"]["url"],
        "https://cdn.test/image/upload/lessons/magma.webp"
    );

    assert_eq!(
        app.db.status_history(id).await,
        vec![
            LessonStatus::Draft,
            LessonStatus::Processing,
            LessonStatus::PlanReady,
            LessonStatus::IntroReady,
            LessonStatus::Ready,
        ]
    );

    let mut last = None;
    while let Ok(event) = events.try_recv() {
        last = Some(event);
    }
    assert_eq!(last.map(|e| e.status), Some(EventStatus::Ready));
}

#[tokio::test]
async fn body_device_id_is_used_without_the_header() {
    let app = app(
        ScriptedLlm::new(vec![Ok(VOLCANO_PLAN.to_string())]),
        ScriptedLlm::new(vec![]),
    );
    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/lessons",
            None,
            json!({ "title": "Les volcans", "deviceId": "phone-9" }),
        ),
    )
    .await;
    app.state.orchestrator.jobs().drain().await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["deviceId"], "phone-9");
}

#[tokio::test]
async fn short_titles_are_rejected() {
    let app = idle_app();
    let (status, _) = send(
        &app,
        json_request(Method::POST, "/api/v1/lessons", None, json!({ "title": " a " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.db.list_lessons(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn sample_lessons_are_ready_and_listed_per_device() {
    let app = idle_app();
    for (title, device) in [("La Terre", "d1"), ("La Lune", "d2")] {
        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/api/v1/lessons/test",
                Some(device),
                json!({ "title": title }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "ready");
        assert_eq!(body["data"]["plan"]["sections"][0]["title"], "Introduction");
    }

    let (_, all) = send(&app, get("/api/v1/lessons", None)).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 2);

    let (_, mine) = send(&app, get("/api/v1/lessons?deviceId=d2", None)).await;
    let mine = mine["data"].as_array().unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["title"], "La Lune");
}

#[tokio::test]
async fn unknown_lesson_is_not_found() {
    let app = idle_app();
    let (status, _) = send(&app, get("/api/v1/lessons/999", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

//=========================================================================================
// Profiles & progress
//=========================================================================================

#[tokio::test]
async fn profiles_are_created_then_merged() {
    let app = idle_app();
    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/profiles",
            None,
            json!({ "deviceId": "d1", "profileType": "élève", "series": "D", "country": "Cameroun" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["profileType"], "pupil");

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/profiles",
            None,
            json!({ "deviceId": "d1", "educationLevel": "Terminale" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["series"], "D");
    assert_eq!(body["data"]["educationLevel"], "Terminale");

    let (status, _) = send(&app, get("/api/v1/profiles/d1", None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, get("/api/v1/profiles/nobody", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn progress_requires_a_device_and_schedules_reviews() {
    let app = idle_app();
    let (_, lesson) = send(
        &app,
        json_request(Method::POST, "/api/v1/lessons/test", None, json!({ "title": "La Terre" })),
    )
    .await;
    let id = lesson["data"]["id"].as_i64().unwrap();
    let uri = format!("/api/v1/lessons/{}/progress", id);

    let (status, _) = send(&app, json_request(Method::PUT, &uri, None, json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, get(&uri, Some("d1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["currentStep"], 0);
    assert_eq!(body["data"]["completed"], false);

    let (status, body) = send(
        &app,
        json_request(
            Method::PUT,
            &uri,
            Some("d1"),
            json!({ "currentStep": 1, "completedSections": [0] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["currentSectionIndex"], 1);
    assert_eq!(body["data"]["reviewCount"], 0);

    let (_, body) = send(
        &app,
        json_request(Method::PUT, &uri, Some("d1"), json!({ "isCompleted": true })),
    )
    .await;
    assert_eq!(body["data"]["reviewCount"], 1);
    assert_eq!(body["data"]["isCompleted"], true);
    assert_eq!(body["data"]["completedSections"], json!([0]));

    let (_, listed) = send(&app, get("/api/v1/progress", Some("d1"))).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn progress_on_an_unknown_lesson_is_not_found() {
    let app = idle_app();
    let (status, _) = send(
        &app,
        json_request(
            Method::PUT,
            "/api/v1/lessons/404/progress",
            Some("d1"),
            json!({ "currentStep": 1 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

//=========================================================================================
// Study aids
//=========================================================================================

#[tokio::test]
async fn questions_are_answered_from_the_stored_lesson() {
    let app = app(
        ScriptedLlm::new(vec![]),
        ScriptedLlm::new(vec![Ok("  La Terre tourne autour du Soleil.  ".to_string())]),
    );
    let (_, lesson) = send(
        &app,
        json_request(Method::POST, "/api/v1/lessons/test", None, json!({ "title": "La Terre" })),
    )
    .await;
    let id = lesson["data"]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/qa/ask",
            None,
            json!({ "lessonId": id, "question": "Que fait la Terre ?" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "La Terre tourne autour du Soleil.");
}

#[tokio::test]
async fn quiz_is_generated_for_a_lesson() {
    let quiz = json!({
        "title": "Quiz : La Terre",
        "questions": [{
            "question": "Combien de temps dure une rotation ?",
            "options": ["1 heure", "24 heures", "1 an", "1 mois"],
            "correctAnswerIndex": 1,
            "explanation": "Une journee dure 24 heures."
        }]
    });
    let app = app(
        ScriptedLlm::new(vec![]),
        ScriptedLlm::new(vec![Ok(quiz.to_string())]),
    );
    let (_, lesson) = send(
        &app,
        json_request(Method::POST, "/api/v1/lessons/test", None, json!({ "title": "La Terre" })),
    )
    .await;
    let id = lesson["data"]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/api/v1/quiz/generate", None, json!({ "lessonId": id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["lessonId"], id);
    assert_eq!(body["data"]["questions"][0]["correctAnswerIndex"], 1);
    assert_eq!(body["data"]["questions"][0]["difficulty"], 2);
}

#[tokio::test]
async fn study_aids_need_lesson_content() {
    let app = idle_app();
    let lesson = app
        .db
        .create_lesson(NewLesson::draft("Vide", None))
        .await
        .unwrap();

    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/qa/generate",
            None,
            json!({ "lessonId": lesson.id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

//=========================================================================================
// Audio
//=========================================================================================

#[tokio::test]
async fn audio_stream_returns_mpeg_bytes() {
    let app = idle_app();
    let response = app
        .router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/audio/stream",
            None,
            json!({ "text": "Bonjour" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"mp3:Bonjour");
}

#[tokio::test]
async fn audio_url_stores_the_file() {
    let app = idle_app();
    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/audio/url",
            None,
            json!({ "text": "Bonjour", "voice": "nova" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let url = body["data"]["audioUrl"].as_str().unwrap();
    assert!(url.starts_with("https://cdn.test/video/upload/lessons/audio/stream_"));
    assert_eq!(body["data"]["voice"], "nova");
}

#[tokio::test]
async fn empty_audio_text_is_rejected() {
    let app = idle_app();
    let (status, _) = send(
        &app,
        json_request(Method::POST, "/api/v1/audio/stream", None, json!({ "text": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
