//! Runtime settings read from the environment (and an optional `.env` file).

use thiserror::Error;

use crate::llm::provider::openai::{DEFAULT_API_BASE, DEFAULT_MODEL};

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u64 = 1000;
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

const LOG_LEVELS: [&str; 6] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR", "OFF"];

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),
    #[error("Invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub openai_api_key: String,
    pub openai_api_base: String,
    pub model_name: String,
    pub temperature: f64,
    pub max_tokens: u64,
    pub debug_mode: bool,
    pub log_level: String,
    pub tavily_api_key: Option<String>,
}

impl Settings {
    /// Load `.env` if present, then read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset.
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let openai_api_key =
            get("OPENAI_API_KEY").ok_or_else(|| ConfigError::Missing("OPENAI_API_KEY".into()))?;

        let temperature = match get("TEMPERATURE") {
            Some(value) => parse_temperature(&value)?,
            None => DEFAULT_TEMPERATURE,
        };

        let max_tokens = match get("MAX_TOKENS") {
            Some(value) => parse_max_tokens(&value)?,
            None => DEFAULT_MAX_TOKENS,
        };

        let debug_mode = match get("DEBUG_MODE") {
            Some(value) => parse_bool("DEBUG_MODE", &value)?,
            None => false,
        };

        let log_level = match get("LOG_LEVEL") {
            Some(value) => parse_log_level(&value)?,
            None => DEFAULT_LOG_LEVEL.to_owned(),
        };

        Ok(Self {
            openai_api_key,
            openai_api_base: get("OPENAI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_owned()),
            model_name: get("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            temperature,
            max_tokens,
            debug_mode,
            log_level,
            tavily_api_key: get("TAVILY_API_KEY"),
        })
    }

    pub fn effective_log_level(&self) -> &str {
        if self.debug_mode {
            "DEBUG"
        } else {
            &self.log_level
        }
    }
}

fn invalid(var: &str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var: var.to_owned(),
        value: value.to_owned(),
        reason: reason.into(),
    }
}

fn parse_temperature(value: &str) -> Result<f64, ConfigError> {
    let temperature: f64 = value
        .trim()
        .parse()
        .map_err(|e| invalid("TEMPERATURE", value, format!("{e}")))?;
    if !(0.0..=2.0).contains(&temperature) {
        return Err(invalid("TEMPERATURE", value, "must be between 0 and 2"));
    }
    Ok(temperature)
}

fn parse_max_tokens(value: &str) -> Result<u64, ConfigError> {
    let max_tokens: u64 = value
        .trim()
        .parse()
        .map_err(|e| invalid("MAX_TOKENS", value, format!("{e}")))?;
    if max_tokens == 0 {
        return Err(invalid("MAX_TOKENS", value, "must be greater than 0"));
    }
    Ok(max_tokens)
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(var, value, "expected true/false")),
    }
}

fn parse_log_level(value: &str) -> Result<String, ConfigError> {
    let level = value.trim().to_uppercase();
    if LOG_LEVELS.contains(&level.as_str()) {
        Ok(level)
    } else {
        Err(invalid(
            "LOG_LEVEL",
            value,
            format!("expected one of {}", LOG_LEVELS.join(", ")),
        ))
    }
}
