use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{config::Settings, llm::CompletionError, tool::ToolError};

pub mod workflow_agent;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Completion error: {0}")]
    CompletionError(#[from] CompletionError),
    #[error("No choice found")]
    NoChoiceFound,
    #[error("Tool {0} not found")]
    ToolNotFound(String),
    #[error("Tool error: {0}")]
    ToolError(#[from] ToolError),

    #[cfg(test)]
    #[error("Test error: {0}")]
    TestError(String),
}

/// Per-call overrides; `None` falls back to the agent configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

#[derive(Clone)]
pub struct AgentConfigBuilder {
    config: AgentConfig,
}

impl AgentConfigBuilder {
    pub fn agent_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u64) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    pub fn retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.config.retry_attempts = retry_attempts;
        self
    }

    pub fn build(self) -> AgentConfig {
        self.config
    }
}

/// Agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    /// `None` uses the model's own default.
    pub model: Option<String>,
    pub temperature: f64,
    pub max_tokens: u64,
    /// Total completion attempts per request, at least one is always made.
    pub retry_attempts: u32,
}

impl AgentConfig {
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder {
            config: AgentConfig::default(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            ..Self::default()
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: "Agent".to_owned(),
            model: None,
            temperature: 0.7,
            max_tokens: 1000,
            retry_attempts: 3,
        }
    }
}

/// The single LLM entry point every workflow talks to.
pub trait Agent: Send + Sync {
    /// Generate a response for `prompt`, applying per-call overrides.
    fn generate(
        &self,
        prompt: String,
        options: GenerationOptions,
    ) -> BoxFuture<Result<String, AgentError>>;

    /// Generate a response with the agent's configured defaults.
    fn generate_response(&self, prompt: String) -> BoxFuture<Result<String, AgentError>> {
        self.generate(prompt, GenerationOptions::default())
    }

    /// Get agent name
    fn name(&self) -> String;
}
