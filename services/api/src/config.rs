//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which provider writes lesson plans.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
    OpenAi,
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(LlmProvider::Gemini),
            "openai" => Ok(LlmProvider::OpenAi),
            other => Err(format!("'{}' is not one of gemini, openai", other)),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Without a database URL the service keeps everything in memory.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub llm_provider: LlmProvider,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub openai_api_key: Option<String>,
    pub qa_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub wikipedia_lang: String,
    pub cloudinary_cloud_name: Option<String>,
    pub cloudinary_api_key: Option<String>,
    pub cloudinary_api_secret: Option<String>,
    pub audio_batch_size: usize,
    pub planner_max_attempts: u32,
    pub cors_origin: String,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database_url: None,
            log_level: Level::INFO,
            llm_provider: LlmProvider::Gemini,
            gemini_api_key: None,
            gemini_model: "gemini-2.5-flash".to_string(),
            openai_api_key: None,
            qa_model: "gpt-4o".to_string(),
            tts_model: "tts-1-hd".to_string(),
            tts_voice: "alloy".to_string(),
            wikipedia_lang: "fr".to_string(),
            cloudinary_cloud_name: None,
            cloudinary_api_key: None,
            cloudinary_api_secret: None,
            audio_batch_size: 5,
            planner_max_attempts: 5,
            cors_origin: "http://localhost:3000".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables, falling back to the
    /// values of `Config::default()`.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        let defaults = Config::default();

        // --- Server and Database Settings ---
        let bind_address = parsed_var("BIND_ADDRESS", defaults.bind_address)?;

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Providers (keys are optional until an adapter needs them) ---
        let llm_provider = parsed_var("LLM_PROVIDER", defaults.llm_provider)?;

        // --- Generation Settings ---
        let audio_batch_size = parsed_var("AUDIO_BATCH_SIZE", defaults.audio_batch_size)?;
        if audio_batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "AUDIO_BATCH_SIZE".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let planner_max_attempts =
            parsed_var("PLANNER_MAX_ATTEMPTS", defaults.planner_max_attempts)?.max(1);

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            llm_provider,
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            gemini_model: var_or("GEMINI_MODEL", &defaults.gemini_model),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            qa_model: var_or("QA_MODEL", &defaults.qa_model),
            tts_model: var_or("TTS_MODEL", &defaults.tts_model),
            tts_voice: var_or("TTS_VOICE", &defaults.tts_voice),
            wikipedia_lang: var_or("WIKIPEDIA_LANG", &defaults.wikipedia_lang),
            cloudinary_cloud_name: std::env::var("CLOUDINARY_CLOUD_NAME").ok(),
            cloudinary_api_key: std::env::var("CLOUDINARY_API_KEY").ok(),
            cloudinary_api_secret: std::env::var("CLOUDINARY_API_SECRET").ok(),
            audio_batch_size,
            planner_max_attempts,
            cors_origin: var_or("CORS_ORIGIN", &defaults.cors_origin),
        })
    }

    /// Returns `value`, or a `MissingVar` error naming `var`.
    pub fn require<'a>(value: &'a Option<String>, var: &str) -> Result<&'a str, ConfigError> {
        value
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar(var.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_parse_case_insensitively() {
        assert_eq!("Gemini".parse::<LlmProvider>(), Ok(LlmProvider::Gemini));
        assert_eq!("openai".parse::<LlmProvider>(), Ok(LlmProvider::OpenAi));
        assert!("claude".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn require_names_the_missing_variable() {
        let missing: Option<String> = None;
        let err = Config::require(&missing, "GEMINI_API_KEY").unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
        assert_eq!(
            Config::require(&Some("k".to_string()), "GEMINI_API_KEY").unwrap(),
            "k"
        );
    }
}
