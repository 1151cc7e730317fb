use serde::{Deserialize, Serialize};

use super::completion::{AssistantContent, Message};

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: Message,
    pub system_prompt: Option<String>,
    pub chat_history: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    /// Overrides the provider's default model for this request only.
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Contents of the first choice returned by the provider, in order:
/// the text (if any) followed by every tool call.
#[derive(Debug, Clone)]
pub struct CompletionResponse<T> {
    pub choice: Vec<AssistantContent>,
    pub raw_response: T,
}

impl<T> CompletionResponse<T> {
    pub fn text(&self) -> Option<&str> {
        self.choice.iter().find_map(|content| match content {
            AssistantContent::Text(text) => Some(text.text.as_str()),
            AssistantContent::ToolCall(_) => None,
        })
    }

    pub fn tool_calls(&self) -> Vec<&super::completion::ToolCall> {
        self.choice
            .iter()
            .filter_map(|content| match content {
                AssistantContent::ToolCall(tool_call) => Some(tool_call),
                AssistantContent::Text(_) => None,
            })
            .collect()
    }
}
