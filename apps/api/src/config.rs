use std::path::PathBuf;

use anyhow::{Context, Result};

const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 900;
const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider_url: String,
    pub provider_model: String,
    /// Key pool; one is picked per request.
    pub provider_keys: Vec<String>,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
    pub require_facts: bool,
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// Replaces the built-in fact database when set.
    pub facts_path: Option<PathBuf>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, e.g. a map in tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| {
            get(key).with_context(|| format!("Required environment variable '{key}' is not set"))
        };

        let mut provider_keys = vec![require("PROVIDER_KEY")?];
        provider_keys.extend(["PROVIDER_KEY_2", "PROVIDER_KEY_3"].into_iter().filter_map(get));

        let cors_origins = get("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let max_output_tokens = get("MAX_OUTPUT_TOKENS")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS);

        let temperature = match get("PROVIDER_TEMPERATURE") {
            Some(v) => v
                .parse::<f32>()
                .context("PROVIDER_TEMPERATURE must be a number")?,
            None => DEFAULT_TEMPERATURE,
        };

        Ok(Config {
            provider_url: require("PROVIDER_URL")?,
            provider_model: require("PROVIDER_MODEL")?,
            provider_keys,
            cors_origins,
            require_facts: get("REQUIRE_FACTS").is_some_and(|v| v.eq_ignore_ascii_case("true")),
            max_output_tokens,
            temperature,
            facts_path: get("FACTS_PATH").map(PathBuf::from),
            port: get("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}
