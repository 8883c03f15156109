pub mod audio;
pub mod learners;
pub mod protocol;
pub mod response;
pub mod rest;
pub mod state;
pub mod study;
pub mod ws_handler;

pub use rest::ApiDoc;
pub use state::{AppState, Providers};
pub use ws_handler::ws_handler;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Builds the complete application: REST routes under `/api/v1`, the `/ws`
/// progress socket and the Swagger UI.
pub fn router(app_state: Arc<AppState>) -> Router {
    let cors = cors_layer(&app_state.config.cors_origin);

    let api_routes = Router::new()
        .route(
            "/lessons",
            post(rest::create_lesson_handler).get(rest::list_lessons_handler),
        )
        .route("/lessons/test", post(rest::create_test_lesson_handler))
        .route("/lessons/{id}", get(rest::get_lesson_handler))
        .route(
            "/lessons/{id}/progress",
            get(learners::get_progress_handler).put(learners::update_progress_handler),
        )
        .route("/progress", get(learners::list_progress_handler))
        .route("/profiles", post(learners::upsert_profile_handler))
        .route("/profiles/{device_id}", get(learners::get_profile_handler))
        .route("/qa/generate", post(study::generate_qa_handler))
        .route("/qa/ask", post(study::ask_handler))
        .route("/quiz/generate", post(study::generate_quiz_handler))
        .route("/audio/stream", post(audio::stream_audio_handler))
        .route("/audio/url", post(audio::audio_url_handler));

    let app_router = Router::new()
        .nest("/api/v1", api_routes)
        .route("/ws", get(ws_handler))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    Router::new()
        .merge(app_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static(response::DEVICE_ID_HEADER),
        ]);
    match origin.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin).allow_credentials(true),
        Err(_) => {
            warn!(origin, "CORS_ORIGIN is not a valid header value, cross-origin requests are refused");
            layer
        }
    }
}
