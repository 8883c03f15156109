//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        tts::{parse_model, parse_voice},
        BroadcastPublisher, CloudinaryAdapter, CloudinaryCredentials, DbAdapter,
        GeminiTextAdapter, OpenAiTextAdapter, OpenAiTtsAdapter, WikipediaAdapter,
    },
    config::{Config, ConfigError, LlmProvider},
    error::ApiError,
    web::{self, AppState, Providers},
};
use async_openai::{config::OpenAIConfig, Client};
use lesson_core::memory::InMemoryDatabase;
use lesson_core::ports::{DatabaseService, TextGenerationService};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    let db: Arc<dyn DatabaseService> = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = DbAdapter::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(db_adapter)
        }
        None => {
            warn!("DATABASE_URL is not set, lessons are kept in memory only");
            Arc::new(InMemoryDatabase::new())
        }
    };

    // --- 3. Initialize Service Adapters ---
    let openai_client = config
        .openai_api_key
        .as_ref()
        .map(|key| Client::with_config(OpenAIConfig::new().with_api_key(key)));

    let planner_llm: Arc<dyn TextGenerationService> = match config.llm_provider {
        LlmProvider::Gemini => Arc::new(GeminiTextAdapter::new(
            Config::require(&config.gemini_api_key, "GEMINI_API_KEY")?.to_string(),
            config.gemini_model.clone(),
        )?),
        LlmProvider::OpenAi => {
            let client = openai_client
                .clone()
                .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;
            Arc::new(OpenAiTextAdapter::new(client, config.qa_model.clone()))
        }
    };

    let study_llm: Arc<dyn TextGenerationService> = match &openai_client {
        Some(client) => Arc::new(OpenAiTextAdapter::new(client.clone(), config.qa_model.clone())),
        None => planner_llm.clone(),
    };

    let tts_voice = parse_voice(&config.tts_voice).ok_or_else(|| {
        ApiError::Internal(format!(
            "Invalid TTS voice specified in config: '{}'",
            config.tts_voice
        ))
    })?;
    let tts_adapter = Arc::new(OpenAiTtsAdapter::new(
        openai_client
            .clone()
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?,
        parse_model(&config.tts_model),
        tts_voice,
    ));

    let storage_adapter = Arc::new(CloudinaryAdapter::new(CloudinaryCredentials {
        cloud_name: Config::require(&config.cloudinary_cloud_name, "CLOUDINARY_CLOUD_NAME")?
            .to_string(),
        api_key: Config::require(&config.cloudinary_api_key, "CLOUDINARY_API_KEY")?.to_string(),
        api_secret: Config::require(&config.cloudinary_api_secret, "CLOUDINARY_API_SECRET")?
            .to_string(),
    })?);

    let lookup_adapter = Arc::new(WikipediaAdapter::new(&config.wikipedia_lang)?);

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(
        config.clone(),
        db,
        Providers {
            planner_llm,
            study_llm,
            lookup: lookup_adapter,
            tts: tts_adapter,
            storage: storage_adapter,
        },
        BroadcastPublisher::default(),
    ));
    let orchestrator = app_state.orchestrator.clone();

    // --- 5. Create the Web Router ---
    let app = web::router(app_state);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Waiting for running lesson jobs to finish...");
    orchestrator.jobs().drain().await;
    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for the shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
