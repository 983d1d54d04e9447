use anyhow::{Context, Result};
use mealrec_recommend::RecommendConfig;
use mealrec_scoring::http::{DEFAULT_REQUEST_TIMEOUT, DEFAULT_SCORING_MODEL, DEFAULT_SCORING_URL};
use mealrec_scoring::HttpScoringConfig;
use std::path::Path;
use std::time::Duration;

pub const ENV_SCORING_URL: &str = "MEALREC_SCORING_URL";
pub const ENV_SCORING_MODEL: &str = "MEALREC_SCORING_MODEL";
pub const ENV_SCORING_API_KEY: &str = "MEALREC_SCORING_API_KEY";
pub const ENV_SCORING_TIMEOUT_MS: &str = "MEALREC_SCORING_TIMEOUT_MS";

/// Defaults, then the TOML file, then environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<RecommendConfig> {
    let mut config = match path {
        Some(path) => RecommendConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RecommendConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    Ok(config)
}

fn string_from_env(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn duration_from_env_ms(var: &str) -> Option<Duration> {
    string_from_env(var)
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

/// Command-line values win over the environment.
pub fn scoring_config(url: Option<String>, model: Option<String>) -> HttpScoringConfig {
    HttpScoringConfig {
        url: url
            .or_else(|| string_from_env(ENV_SCORING_URL))
            .unwrap_or_else(|| DEFAULT_SCORING_URL.to_string()),
        model: model
            .or_else(|| string_from_env(ENV_SCORING_MODEL))
            .unwrap_or_else(|| DEFAULT_SCORING_MODEL.to_string()),
        api_key: string_from_env(ENV_SCORING_API_KEY),
        request_timeout: duration_from_env_ms(ENV_SCORING_TIMEOUT_MS)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
    }
}
