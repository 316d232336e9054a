use std::path::PathBuf;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";
const DEFAULT_DB_PATH: &str = "data/aba_forecast.sqlite";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-20241022";
const DEFAULT_OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
const DEFAULT_MAX_TOKENS: i64 = 1024;
const DEFAULT_HISTORY_LIMIT: i64 = 6;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub backend_url: String,
    pub db_path: PathBuf,
    pub bind_addr: String,
    pub anthropic_url: String,
    pub anthropic_model: String,
    pub max_tokens: u32,
    pub openweather_url: String,
    pub history_limit: usize,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub openweather_api_key: Option<String>,
}

impl Settings {
    /// Defaults, then `ABA_*` variables, then the provider keys the
    /// deployment already exports (`ANTHROPIC_API_KEY`, `OPENWEATHER_API_KEY`).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(
            Environment::with_prefix("ABA"),
            std::env::var("ANTHROPIC_API_KEY").ok(),
            std::env::var("OPENWEATHER_API_KEY").ok(),
        )
    }

    fn load_from(
        env: Environment,
        anthropic_api_key: Option<String>,
        openweather_api_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("backend_url", DEFAULT_BACKEND_URL)?
            .set_default("db_path", DEFAULT_DB_PATH)?
            .set_default("bind_addr", DEFAULT_BIND_ADDR)?
            .set_default("anthropic_url", DEFAULT_ANTHROPIC_URL)?
            .set_default("anthropic_model", DEFAULT_ANTHROPIC_MODEL)?
            .set_default("max_tokens", DEFAULT_MAX_TOKENS)?
            .set_default("openweather_url", DEFAULT_OPENWEATHER_URL)?
            .set_default("history_limit", DEFAULT_HISTORY_LIMIT)?
            .add_source(env)
            .set_override_option("anthropic_api_key", anthropic_api_key.filter(|k| !k.is_empty()))?
            .set_override_option("openweather_api_key", openweather_api_key.filter(|k| !k.is_empty()))?
            .build()?
            .try_deserialize()
    }
}
