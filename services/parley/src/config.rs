use gemini_realtime::{GEMINI_LIVE_URL, types::ResponseModality};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub gemini_api_key: SecretString,
    pub live_endpoint: String,
    pub live_model: String,
    pub response_modality: ResponseModality,
    pub voice_name: Option<String>,
    pub system_instruction_path: Option<PathBuf>,
    pub providers_path: PathBuf,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;

        let live_endpoint =
            std::env::var("LIVE_ENDPOINT").unwrap_or_else(|_| GEMINI_LIVE_URL.to_string());
        let live_model = std::env::var("LIVE_MODEL")
            .unwrap_or_else(|_| "models/gemini-2.0-flash-exp".to_string());

        let modality_str =
            std::env::var("RESPONSE_MODALITY").unwrap_or_else(|_| "audio".to_string());
        let response_modality = match modality_str.to_lowercase().as_str() {
            "audio" => ResponseModality::Audio,
            "text" => ResponseModality::Text,
            _ => {
                return Err(ConfigError::InvalidValue(
                    "RESPONSE_MODALITY".to_string(),
                    format!("'{}' is not one of audio, text", modality_str),
                ));
            }
        };

        let voice_name = std::env::var("VOICE_NAME").ok().filter(|v| !v.is_empty());
        let system_instruction_path = std::env::var("SYSTEM_INSTRUCTION_PATH")
            .ok()
            .map(PathBuf::from);
        let providers_path = std::env::var("PROVIDERS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./mcp_servers.json"));

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            gemini_api_key,
            live_endpoint,
            live_model,
            response_modality,
            voice_name,
            system_instruction_path,
            providers_path,
            log_level,
        })
    }
}

/// Reads the system instruction file, if one is configured.
pub fn load_system_instruction(path: Option<&Path>) -> anyhow::Result<Option<String>> {
    use anyhow::Context;

    let Some(path) = path else {
        return Ok(None);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read system instruction {}", path.display()))?;
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}
