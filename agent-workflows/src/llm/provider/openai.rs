use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessage,
        ChatCompletionRequestToolMessageContent, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, ChatCompletionTool, ChatCompletionToolArgs,
        ChatCompletionToolType, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
        FunctionCall, FunctionObjectArgs,
    },
};
use futures::future::BoxFuture;

use crate::{
    agent::workflow_agent::WorkflowAgentBuilder,
    config::Settings,
    llm::{
        CompletionError, Model,
        completion::{AssistantContent, Message, UserContent},
        request::{CompletionRequest, CompletionResponse, ToolDefinition},
    },
};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Clone)]
pub struct OpenAI {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAI {
    pub fn new<S: Into<String>>(api_key: S) -> Result<Self, CompletionError> {
        Self::from_url(DEFAULT_API_BASE.to_owned(), api_key.into())
    }

    pub fn from_url<S: Into<String>>(base_url: S, api_key: S) -> Result<Self, CompletionError> {
        let config = OpenAIConfig::new()
            .with_api_base(base_url)
            .with_api_key(api_key);
        let http_client = reqwest::ClientBuilder::new()
            .user_agent("agent-workflows")
            .build()?;
        let client = Client::with_config(config).with_http_client(http_client);
        Ok(Self {
            client,
            model: DEFAULT_MODEL.to_owned(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, CompletionError> {
        let openai = Self::from_url(
            settings.openai_api_base.as_str(),
            settings.openai_api_key.as_str(),
        )?;
        Ok(openai.set_model(&settings.model_name))
    }

    pub fn set_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = model.into();
        self
    }

    pub fn agent_builder(&self) -> WorkflowAgentBuilder<Self> {
        WorkflowAgentBuilder::new_with_model(self.clone())
    }
}

impl Model for OpenAI {
    type RawCompletionResponse = CreateChatCompletionResponse;

    fn completion(
        &self,
        request: CompletionRequest,
    ) -> BoxFuture<Result<CompletionResponse<Self::RawCompletionResponse>, CompletionError>> {
        Box::pin(async move {
            let mut msgs: Vec<ChatCompletionRequestMessage> = Vec::new();

            if let Some(system_prompt) = request.system_prompt {
                msgs.push(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(system_prompt)
                        .build()?
                        .into(),
                );
            }

            for message in request.chat_history {
                msgs.extend(to_openai_messages(message)?);
            }
            msgs.extend(to_openai_messages(request.prompt)?);

            let mut create_request_builder = CreateChatCompletionRequestArgs::default();
            if let Some(max_tokens) = request.max_tokens {
                let max_tokens = u32::try_from(max_tokens)
                    .map_err(|e| CompletionError::Request(Box::new(e)))?;
                create_request_builder.max_tokens(max_tokens);
            }
            if let Some(temperature) = request.temperature {
                create_request_builder.temperature(temperature as f32);
            }
            if !request.tools.is_empty() {
                let tools = request
                    .tools
                    .into_iter()
                    .map(to_openai_tool)
                    .collect::<Result<Vec<_>, _>>()?;
                create_request_builder.tools(tools);
            }
            let model = request.model.unwrap_or_else(|| self.model.clone());
            let create_request = create_request_builder
                .model(model)
                .messages(msgs)
                .build()?;

            tracing::debug!(
                "OpenAI Create Request: {}",
                serde_json::to_string_pretty(&create_request).unwrap_or_default()
            );

            let raw_response = self.client.chat().create(create_request).await?;

            tracing::debug!(
                "OpenAI response: {}",
                serde_json::to_string_pretty(&raw_response).unwrap_or_default()
            );

            CompletionResponse::try_from(raw_response)
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn to_openai_tool(tool: ToolDefinition) -> Result<ChatCompletionTool, CompletionError> {
    let function = FunctionObjectArgs::default()
        .name(tool.name)
        .description(tool.description)
        .parameters(tool.parameters)
        .build()?;
    Ok(ChatCompletionToolArgs::default()
        .r#type(ChatCompletionToolType::Function)
        .function(function)
        .build()?)
}

fn to_openai_messages(
    message: Message,
) -> Result<Vec<ChatCompletionRequestMessage>, CompletionError> {
    match message {
        Message::User { content } => {
            let mut texts = Vec::new();
            let mut msgs = Vec::new();
            for content in content {
                match content {
                    UserContent::Text(text) => texts.push(text.text),
                    UserContent::ToolResult(tool_result) => msgs.push(
                        ChatCompletionRequestToolMessage {
                            tool_call_id: tool_result.id,
                            content: ChatCompletionRequestToolMessageContent::Text(
                                tool_result.content,
                            ),
                        }
                        .into(),
                    ),
                }
            }

            if !texts.is_empty() {
                msgs.push(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(ChatCompletionRequestUserMessageContent::Text(
                            texts.join("\n"),
                        ))
                        .build()?
                        .into(),
                );
            }

            if msgs.is_empty() {
                return Err(CompletionError::Request(
                    "User message must have at least one content".into(),
                ));
            }
            Ok(msgs)
        }
        Message::Assistant { content } => {
            let (texts, tool_calls) = content.into_iter().fold(
                (Vec::new(), Vec::new()),
                |(mut texts, mut tools), content| {
                    match content {
                        AssistantContent::Text(text) => texts.push(text.text),
                        AssistantContent::ToolCall(tool_call) => tools.push(tool_call),
                    }
                    (texts, tools)
                },
            );

            if texts.is_empty() && tool_calls.is_empty() {
                return Err(CompletionError::Request(
                    "Assistant message must have at least one content".into(),
                ));
            }

            let mut message_builder = ChatCompletionRequestAssistantMessageArgs::default();
            if !texts.is_empty() {
                message_builder.content(ChatCompletionRequestAssistantMessageContent::Text(
                    texts.join("\n"),
                ));
            }
            if !tool_calls.is_empty() {
                let tool_calls = tool_calls
                    .into_iter()
                    .map(|tool_call| ChatCompletionMessageToolCall {
                        id: tool_call.id,
                        r#type: ChatCompletionToolType::Function,
                        function: FunctionCall {
                            name: tool_call.function.name,
                            arguments: tool_call.function.arguments.to_string(),
                        },
                    })
                    .collect::<Vec<_>>();
                message_builder.tool_calls(tool_calls);
            }

            Ok(vec![message_builder.build()?.into()])
        }
    }
}

impl From<async_openai::error::OpenAIError> for CompletionError {
    fn from(error: async_openai::error::OpenAIError) -> Self {
        match error {
            async_openai::error::OpenAIError::Reqwest(e) => e.into(),
            async_openai::error::OpenAIError::ApiError(api_error) => {
                CompletionError::Provider(api_error.to_string())
            }
            async_openai::error::OpenAIError::InvalidArgument(e) => {
                CompletionError::Request(e.into())
            }
            other => CompletionError::Other(other.to_string()),
        }
    }
}

impl TryFrom<CreateChatCompletionResponse> for CompletionResponse<CreateChatCompletionResponse> {
    type Error = CompletionError;

    fn try_from(response: CreateChatCompletionResponse) -> Result<Self, Self::Error> {
        let choice = response
            .choices
            .first()
            .ok_or_else(|| CompletionError::Response("Response contains no choices".to_owned()))?;

        let mut contents = Vec::new();
        if let Some(text) = choice.message.content.as_ref().filter(|text| !text.is_empty()) {
            contents.push(AssistantContent::text(text.clone()));
        }
        for tool_call in choice.message.tool_calls.iter().flatten() {
            let arguments = serde_json::from_str(&tool_call.function.arguments).map_err(|e| {
                CompletionError::Response(format!(
                    "Invalid arguments for tool call {}: {e}",
                    tool_call.function.name
                ))
            })?;
            contents.push(AssistantContent::tool_call(
                tool_call.id.clone(),
                tool_call.function.name.clone(),
                arguments,
            ));
        }

        Ok(Self {
            choice: contents,
            raw_response: response,
        })
    }
}
