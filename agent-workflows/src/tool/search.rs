//! Web search through the Tavily API.

use schemars::{JsonSchema, r#gen::SchemaSettings};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::llm::request::ToolDefinition;

use super::Tool;

pub const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";
const MAX_RESULTS: u32 = 5;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Search provider returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// How thorough the search should be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    /// Faster, fewer sources
    #[default]
    Basic,
    /// More comprehensive
    Advanced,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// The search query
    pub query: String,
    /// The depth of search - basic is faster, advanced is more comprehensive
    #[serde(default)]
    pub search_depth: SearchDepth,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    search_depth: SearchDepth,
    include_answer: bool,
    include_raw_content: bool,
    max_results: u32,
}

#[derive(Clone)]
pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(api_key, TAVILY_SEARCH_URL)
    }

    pub fn with_endpoint(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }

    fn parameters() -> serde_json::Value {
        let schema = SchemaSettings::draft07()
            .with(|settings| settings.inline_subschemas = true)
            .into_generator()
            .into_root_schema_for::<SearchArgs>();
        let mut parameters =
            serde_json::to_value(schema).unwrap_or_else(|_| json!({ "type": "object" }));
        if let Some(object) = parameters.as_object_mut() {
            object.remove("$schema");
            object.remove("title");
        }
        parameters
    }
}

impl Tool for TavilySearch {
    type Error = SearchError;
    type Args = SearchArgs;
    type Output = serde_json::Value;

    const NAME: &'static str = "search";

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_owned(),
            description: "Search the web for real-time information about any topic. Only use this when you need up-to-date information or facts you're not confident about.".to_owned(),
            parameters: Self::parameters(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        tracing::info!(
            "Searching the web: {} ({:?})",
            args.query,
            args.search_depth
        );
        let request = SearchRequest {
            query: &args.query,
            search_depth: args.search_depth,
            include_answer: true,
            include_raw_content: false,
            max_results: MAX_RESULTS,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}
