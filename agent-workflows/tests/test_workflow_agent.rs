//! Tests for the LLM-backed workflow agent: completion requests, tool calls and retries.

use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex},
};

use futures::future::{self, BoxFuture};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use agent_workflows::{
    Agent, AgentConfig, AgentError, GenerationOptions,
    agent::workflow_agent::WorkflowAgentBuilder,
    llm::{
        CompletionError, Model,
        completion::{AssistantContent, Message, UserContent},
        request::{CompletionRequest, CompletionResponse, ToolDefinition},
    },
    tool::Tool,
};

type Reply = Result<Vec<AssistantContent>, String>;

/// A model that answers from a fixed script and records every request.
#[derive(Clone, Default)]
struct ScriptedModel {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            requests: Arc::default(),
        }
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Model for ScriptedModel {
    type RawCompletionResponse = ();

    fn completion(
        &self,
        request: CompletionRequest,
    ) -> BoxFuture<Result<CompletionResponse<()>, CompletionError>> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_owned()));

        Box::pin(future::ready(
            reply
                .map(|choice| CompletionResponse {
                    choice,
                    raw_response: (),
                })
                .map_err(CompletionError::Provider),
        ))
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EchoArgs {
    text: String,
}

#[derive(Debug, Serialize)]
struct EchoOutput {
    echoed: String,
}

#[derive(Debug, thiserror::Error)]
#[error("echo failed")]
struct EchoError;

struct EchoTool;

impl Tool for EchoTool {
    type Error = EchoError;
    type Args = EchoArgs;
    type Output = EchoOutput;

    const NAME: &'static str = "echo";

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_owned(),
            description: "Echo the input".to_owned(),
            parameters: serde_json::to_value(schemars::schema_for!(EchoArgs)).unwrap(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        Ok(EchoOutput {
            echoed: args.text.to_uppercase(),
        })
    }
}

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn text(reply: &str) -> Reply {
    Ok(vec![AssistantContent::text(reply)])
}

#[tokio::test]
async fn test_plain_response_uses_config() {
    let model = ScriptedModel::new(vec![text("Hello there")]);
    let agent = WorkflowAgentBuilder::new_with_model(model.clone())
        .agent_name("Greeter")
        .temperature(0.2)
        .max_tokens(50)
        .system_prompt("Be brief.")
        .build();

    let response = agent.generate_response("Hi".to_owned()).await.unwrap();
    assert_eq!(response, "Hello there");
    assert_eq!(agent.name(), "Greeter");

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].system_prompt.as_deref(), Some("Be brief."));
    assert_eq!(requests[0].temperature, Some(0.2));
    assert_eq!(requests[0].max_tokens, Some(50));
    assert_eq!(requests[0].model, None);
    assert!(requests[0].tools.is_empty());
}

#[tokio::test]
async fn test_generation_options_override_config() {
    let model = ScriptedModel::new(vec![text("ok")]);
    let config = AgentConfig::builder().model("gpt-4o-mini").build();
    let agent = WorkflowAgentBuilder::new_with_model(model.clone())
        .config(config)
        .build();

    let options = GenerationOptions {
        model: Some("gpt-4o".to_owned()),
        temperature: Some(0.0),
        max_tokens: None,
    };
    agent.generate("Hi".to_owned(), options).await.unwrap();

    let request = &model.requests()[0];
    assert_eq!(request.model.as_deref(), Some("gpt-4o"));
    assert_eq!(request.temperature, Some(0.0));
    assert_eq!(request.max_tokens, Some(1000));
}

#[tokio::test]
async fn test_tool_call_round_trip() {
    let model = ScriptedModel::new(vec![
        Ok(vec![AssistantContent::tool_call(
            "call_1",
            "echo",
            json!({"text": "quiet"}),
        )]),
        text("The tool said QUIET"),
    ]);
    let agent = WorkflowAgentBuilder::new_with_model(model.clone())
        .add_tool(EchoTool)
        .build();
    assert_eq!(agent.tool_names(), vec!["echo"]);

    let response = agent.generate_response("Shout quiet".to_owned()).await.unwrap();
    assert_eq!(response, "The tool said QUIET");

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.len(), 1);

    let follow_up = &requests[1];
    assert!(follow_up.tools.is_empty());
    assert_eq!(follow_up.chat_history.len(), 2);
    assert_eq!(follow_up.chat_history[0], Message::user("Shout quiet"));
    let Message::User { content } = &follow_up.prompt else {
        panic!("tool results are sent as a user message");
    };
    match &content[0] {
        UserContent::ToolResult(result) => {
            assert_eq!(result.id, "call_1");
            assert_eq!(result.content, r#"{"echoed":"QUIET"}"#);
        }
        other => panic!("unexpected content {other:?}"),
    }
}

#[tokio::test]
async fn test_tool_usage_is_logged() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let model = ScriptedModel::new(vec![
        Ok(vec![AssistantContent::tool_call(
            "call_1",
            "echo",
            json!({"text": "hi"}),
        )]),
        text("done"),
        text("plain"),
    ]);
    let agent = WorkflowAgentBuilder::new_with_model(model)
        .agent_name("Logger")
        .add_tool(EchoTool)
        .build();

    agent.generate_response("use the tool".to_owned()).await.unwrap();
    let after_tool_call = logs.contents();
    assert!(after_tool_call.contains("[Logger] LLM: scripted-model - Using search tool"));
    assert!(!after_tool_call.contains("Responding without tools"));

    agent.generate_response("just answer".to_owned()).await.unwrap();
    assert!(logs.contents().contains("[Logger] LLM: scripted-model - Responding without tools"));
}

#[tokio::test]
async fn test_unknown_tool_is_an_error() {
    let model = ScriptedModel::new(vec![Ok(vec![AssistantContent::tool_call(
        "call_1",
        "missing",
        json!({}),
    )])]);
    let agent = WorkflowAgentBuilder::new_with_model(model).build();

    let result = agent.generate_response("Hi".to_owned()).await;
    assert!(matches!(result, Err(AgentError::ToolNotFound(name)) if name == "missing"));
}

#[tokio::test]
async fn test_retries_until_success() {
    let model = ScriptedModel::new(vec![
        Err("overloaded".to_owned()),
        Err("overloaded".to_owned()),
        text("finally"),
    ]);
    let agent = WorkflowAgentBuilder::new_with_model(model.clone())
        .retry_attempts(3)
        .build();

    assert_eq!(agent.generate_response("Hi".to_owned()).await.unwrap(), "finally");
    assert_eq!(model.requests().len(), 3);
}

#[tokio::test]
async fn test_retries_exhausted() {
    let model = ScriptedModel::new(vec![Err("first".to_owned()), Err("second".to_owned())]);
    let agent = WorkflowAgentBuilder::new_with_model(model.clone())
        .retry_attempts(2)
        .build();

    let result = agent.generate_response("Hi".to_owned()).await;
    match result {
        Err(AgentError::CompletionError(CompletionError::Provider(msg))) => assert_eq!(msg, "second"),
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_choice() {
    let model = ScriptedModel::new(vec![Ok(vec![])]);
    let agent = WorkflowAgentBuilder::new_with_model(model).build();

    let result = agent.generate_response("Hi".to_owned()).await;
    assert!(matches!(result, Err(AgentError::NoChoiceFound)));
}
