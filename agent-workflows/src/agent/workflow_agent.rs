use std::{ops::Deref, sync::Arc};

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::{
    llm::{
        self, CompletionError,
        completion::{Message, ToolResult, UserContent},
        request::{CompletionRequest, CompletionResponse, ToolDefinition},
    },
    log_llm, log_tool,
    tool::{Tool, ToolDyn},
};

use super::{Agent, AgentConfig, AgentError, GenerationOptions};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. You have access to a search tool, but only use it when you need current information or when you're not confident about facts. For general knowledge, common questions, or creative tasks like jokes or stories, respond directly without using the tool.";

pub struct WorkflowAgentBuilder<M>
where
    M: llm::Model + Send + Sync,
{
    model: M,
    config: AgentConfig,
    system_prompt: String,
    tools: Vec<ToolDefinition>,
    tools_impl: DashMap<String, Arc<dyn ToolDyn>>,
}

impl<M> WorkflowAgentBuilder<M>
where
    M: llm::Model + Send + Sync,
{
    pub fn new_with_model(model: M) -> Self {
        Self {
            model,
            config: AgentConfig::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            tools: vec![],
            tools_impl: DashMap::new(),
        }
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn add_tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.push(Tool::definition(&tool));
        self.tools_impl
            .insert(Tool::name(&tool), Arc::new(tool) as Arc<dyn ToolDyn>);
        self
    }

    pub fn build(self) -> WorkflowAgent<M> {
        WorkflowAgent {
            model: self.model,
            config: self.config,
            system_prompt: self.system_prompt,
            tools: self.tools,
            tools_impl: self.tools_impl,
        }
    }

    // Configuration methods

    pub fn agent_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
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
}

/// An [`Agent`] backed by a completion [`llm::Model`] that may call tools.
///
/// When the model answers with tool calls, every call is executed, the results
/// are sent back and a second completion (without tools) produces the answer.
pub struct WorkflowAgent<M>
where
    M: llm::Model + Send + Sync,
{
    model: M,
    config: AgentConfig,
    system_prompt: String,
    tools: Vec<ToolDefinition>,
    tools_impl: DashMap<String, Arc<dyn ToolDyn>>,
}

impl<M> WorkflowAgent<M>
where
    M: llm::Model + Send + Sync,
    M::RawCompletionResponse: Send,
{
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name.clone()).collect()
    }

    async fn complete_with_retry(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse<M::RawCompletionResponse>, AgentError> {
        let attempts = self.config.retry_attempts.max(1);
        let mut last_error = None;
        for attempt in 0..attempts {
            match self.model.completion(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::error!(
                        "Agent {} attempt {}/{} failed: {}",
                        self.config.name,
                        attempt + 1,
                        attempts,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| CompletionError::Other("No completion attempt made".to_owned()))
            .into())
    }

    async fn call_tool(&self, name: &str, arguments: &serde_json::Value) -> Result<String, AgentError> {
        let tool = Arc::clone(
            self.tools_impl
                .get(name)
                .ok_or_else(|| AgentError::ToolNotFound(name.to_owned()))?
                .deref(),
        );

        log_tool!(info, self.config.name, name, "calling with {}", arguments);
        let result = tool.call(arguments.to_string()).await;
        if let Err(e) = &result {
            log_tool!(error, self.config.name, name, "failed: {}", e);
        }
        Ok(result?)
    }
}

impl<M> Agent for WorkflowAgent<M>
where
    M: llm::Model + Send + Sync,
    M::RawCompletionResponse: Send,
{
    fn generate(
        &self,
        prompt: String,
        options: GenerationOptions,
    ) -> BoxFuture<Result<String, AgentError>> {
        Box::pin(async move {
            let model = options.model.or_else(|| self.config.model.clone());
            let temperature = options.temperature.unwrap_or(self.config.temperature);
            let max_tokens = options.max_tokens.unwrap_or(self.config.max_tokens);
            let model_label = model
                .clone()
                .unwrap_or_else(|| self.model.model_name().to_owned());

            log_llm!(
                debug,
                self.config.name,
                model_label,
                "prompt of {} chars",
                prompt.len()
            );

            let request = CompletionRequest {
                prompt: Message::user(prompt.clone()),
                system_prompt: Some(self.system_prompt.clone()),
                chat_history: vec![],
                tools: self.tools.clone(),
                model: model.clone(),
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
            };

            let response = self.complete_with_retry(request).await?;
            let tool_calls = response
                .tool_calls()
                .into_iter()
                .cloned()
                .collect::<Vec<_>>();

            if tool_calls.is_empty() {
                log_llm!(info, self.config.name, model_label, "Responding without tools");
                return response
                    .text()
                    .map(str::to_owned)
                    .ok_or(AgentError::NoChoiceFound);
            }

            log_llm!(info, self.config.name, model_label, "Using search tool");
            let assistant_message = Message::Assistant {
                content: response.choice,
            };

            let mut tool_results = Vec::with_capacity(tool_calls.len());
            for tool_call in tool_calls {
                let output = self
                    .call_tool(&tool_call.function.name, &tool_call.function.arguments)
                    .await?;
                tool_results.push(UserContent::ToolResult(ToolResult {
                    id: tool_call.id,
                    content: output,
                }));
            }

            let follow_up = CompletionRequest {
                prompt: Message::User {
                    content: tool_results,
                },
                system_prompt: Some(self.system_prompt.clone()),
                chat_history: vec![Message::user(prompt), assistant_message],
                tools: vec![],
                model,
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
            };

            let response = self.complete_with_retry(follow_up).await?;
            response
                .text()
                .map(str::to_owned)
                .ok_or(AgentError::NoChoiceFound)
        })
    }

    fn name(&self) -> String {
        self.config.name.clone()
    }
}
