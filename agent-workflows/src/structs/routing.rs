use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    agent::{Agent, AgentError},
    log_workflow,
    structs::utils::extract_json,
};

pub const UNROUTABLE_MESSAGE: &str = "I apologize, but I'm unable to properly categorize your request. Could you please rephrase or provide more details?";
pub const NO_SUITABLE_ROUTES_MESSAGE: &str = "No suitable routes found for your request.";
pub const UNPROCESSABLE_MESSAGE: &str =
    "I apologize, but I'm unable to properly process your request at this time.";

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteType {
    /// Only the top recommendation is considered.
    #[default]
    Single,
    /// Every recommendation above its threshold is answered.
    Multi,
    /// Recommendations are tried by route priority until one succeeds.
    Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub response_template: String,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default)]
    pub priority: i32,
}

fn default_confidence_threshold() -> f64 {
    0.5
}

impl RouteConfig {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        system_prompt: impl Into<String>,
        response_template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system_prompt: system_prompt.into(),
            response_template: response_template.into(),
            confidence_threshold: default_confidence_threshold(),
            priority: 0,
        }
    }

    pub fn confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRecommendation {
    pub name: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Deserialize)]
struct RoutingAnswer {
    #[serde(default)]
    routes: Vec<RouteRecommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouterResponse {
    Single(String),
    Multiple(Vec<String>),
}

/// Classifies an input with the LLM and answers it through the matching route.
pub struct WorkflowRouter {
    agent: Arc<dyn Agent>,
    route_type: RouteType,
    routes: Vec<RouteConfig>,
}

impl WorkflowRouter {
    pub fn new(agent: Arc<dyn Agent>, route_type: RouteType) -> Self {
        Self {
            agent,
            route_type,
            routes: Vec::new(),
        }
    }

    pub fn route_type(&self) -> RouteType {
        self.route_type
    }

    pub fn routes(&self) -> &[RouteConfig] {
        &self.routes
    }

    /// Registers a route, replacing any route with the same name in place.
    pub fn add_route(&mut self, route: RouteConfig) {
        match self.routes.iter_mut().find(|r| r.name == route.name) {
            Some(existing) => *existing = route,
            None => self.routes.push(route),
        }
    }

    fn route(&self, name: &str) -> Option<&RouteConfig> {
        self.routes.iter().find(|r| r.name == name)
    }

    /// The route for `recommendation` if it is known and confident enough.
    fn eligible_route(&self, recommendation: &RouteRecommendation) -> Option<&RouteConfig> {
        self.route(&recommendation.name)
            .filter(|route| recommendation.confidence >= route.confidence_threshold)
    }

    pub fn routing_prompt(&self, input: &str) -> String {
        let routes_desc = self
            .routes
            .iter()
            .map(|route| format!("- {}: {}", route.name, route.description))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Given the following input, determine the most appropriate routing(s).

Available routes:
{routes_desc}

Respond in the following JSON format:
{{
    "routes": [
        {{
            "name": "route_name",
            "confidence": 0.0 to 1.0,
            "reasoning": "brief explanation"
        }}
    ]
}}

Input text: {input}

Provide route recommendations in order of confidence."#
        )
    }

    /// Recommendations from the routing answer, empty when it cannot be parsed.
    pub fn parse_recommendations(response: &str) -> Vec<RouteRecommendation> {
        match extract_json::<RoutingAnswer>(response) {
            Ok(answer) => answer.routes,
            Err(e) => {
                log_workflow!(warn, "WorkflowRouter", "Error parsing route response: {}", e);
                vec![]
            }
        }
    }

    pub fn final_prompt(input: &str, route: &RouteConfig) -> String {
        format!(
            "{}\n\nUser Input: {}\n\n{}",
            route.system_prompt, input, route.response_template
        )
    }

    async fn respond(&self, input: &str, route: &RouteConfig) -> Result<String, AgentError> {
        log_workflow!(info, "WorkflowRouter", "routing to '{}'", route.name);
        self.agent
            .generate_response(Self::final_prompt(input, route))
            .await
    }

    pub async fn process_input(&self, input: &str) -> Result<RouterResponse, RoutingError> {
        let routing_response = self
            .agent
            .generate_response(self.routing_prompt(input))
            .await?;
        let recommendations = Self::parse_recommendations(&routing_response);

        if recommendations.is_empty() {
            return Ok(RouterResponse::Single(UNROUTABLE_MESSAGE.to_owned()));
        }

        match self.route_type {
            RouteType::Single => {
                if let Some(route) = self.eligible_route(&recommendations[0]) {
                    return Ok(RouterResponse::Single(self.respond(input, route).await?));
                }
            }
            RouteType::Multi => {
                let mut responses = Vec::new();
                for recommendation in &recommendations {
                    if let Some(route) = self.eligible_route(recommendation) {
                        responses.push(self.respond(input, route).await?);
                    }
                }
                if responses.is_empty() {
                    responses.push(NO_SUITABLE_ROUTES_MESSAGE.to_owned());
                }
                return Ok(RouterResponse::Multiple(responses));
            }
            RouteType::Priority => {
                let mut ordered = recommendations.iter().collect::<Vec<_>>();
                ordered.sort_by_key(|rec| {
                    std::cmp::Reverse(self.route(&rec.name).map_or(0, |route| route.priority))
                });

                for recommendation in ordered {
                    let Some(route) = self.eligible_route(recommendation) else {
                        continue;
                    };
                    match self.respond(input, route).await {
                        Ok(response) => return Ok(RouterResponse::Single(response)),
                        Err(e) => {
                            log_workflow!(warn, "WorkflowRouter", "handler {} failed: {}", route.name, e);
                        }
                    }
                }
            }
        }

        Ok(RouterResponse::Single(UNPROCESSABLE_MESSAGE.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::test_utils::{create_failing_agent, create_mock_agent, scripted_agent};

    const ROUTING_ANSWER: &str = r#"Here is my routing:
{"routes": [
    {"name": "sales", "confidence": 0.8, "reasoning": "pricing"},
    {"name": "technical_support", "confidence": 0.65, "reasoning": "maybe"},
    {"name": "unknown", "confidence": 0.99}
]}"#;

    fn router(route_type: RouteType, routing_answer: &'static str) -> WorkflowRouter {
        let agent = scripted_agent(move |prompt| {
            if prompt.starts_with("Given the following input") {
                Ok(routing_answer.to_owned())
            } else if prompt.starts_with("flaky") {
                Err(AgentError::TestError("handler down".to_owned()))
            } else {
                Ok(prompt.lines().next().unwrap_or_default().to_owned())
            }
        });

        let mut router = WorkflowRouter::new(agent, route_type);
        router.add_route(
            RouteConfig::new("technical_support", "Technical issues", "tech", "steps")
                .confidence_threshold(0.7)
                .priority(2),
        );
        router.add_route(
            RouteConfig::new("sales", "Pricing questions", "sales", "pricing")
                .confidence_threshold(0.6)
                .priority(1),
        );
        router
    }

    #[test]
    fn test_routing_prompt_lists_routes() {
        let router = router(RouteType::Single, ROUTING_ANSWER);
        let prompt = router.routing_prompt("How much is premium?");

        assert!(prompt.contains("- technical_support: Technical issues\n- sales: Pricing questions"));
        assert!(prompt.contains("Input text: How much is premium?"));
    }

    #[test]
    fn test_add_route_replaces_same_name() {
        let mut router = WorkflowRouter::new(create_mock_agent(""), RouteType::Single);
        router.add_route(RouteConfig::new("a", "first", "s", "t"));
        router.add_route(RouteConfig::new("b", "second", "s", "t"));
        router.add_route(RouteConfig::new("a", "replaced", "s", "t"));

        let names: Vec<_> = router.routes().iter().map(|r| r.description.as_str()).collect();
        assert_eq!(names, vec!["replaced", "second"]);
    }

    #[test]
    fn test_parse_recommendations_defaults_and_failures() {
        let recs = WorkflowRouter::parse_recommendations(ROUTING_ANSWER);
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[2].reasoning, "");

        let recs = WorkflowRouter::parse_recommendations(r#"{"routes": [{"name": "x"}]}"#);
        assert_eq!(recs[0].confidence, 0.0);

        assert!(WorkflowRouter::parse_recommendations("no json").is_empty());
        assert!(WorkflowRouter::parse_recommendations("{\"other\": 1}").is_empty());
    }

    #[tokio::test]
    async fn test_single_route() {
        let router = router(RouteType::Single, ROUTING_ANSWER);
        let response = router.process_input("How much?").await.unwrap();
        assert_eq!(response, RouterResponse::Single("sales".to_owned()));
    }

    #[tokio::test]
    async fn test_single_route_below_threshold() {
        let answer = r#"{"routes": [{"name": "technical_support", "confidence": 0.5}]}"#;
        let router = router(RouteType::Single, answer);
        let response = router.process_input("laptop").await.unwrap();
        assert_eq!(response, RouterResponse::Single(UNPROCESSABLE_MESSAGE.to_owned()));
    }

    #[tokio::test]
    async fn test_multi_route() {
        let answer = r#"{"routes": [
            {"name": "technical_support", "confidence": 0.9},
            {"name": "sales", "confidence": 0.7}
        ]}"#;
        let router = router(RouteType::Multi, answer);
        let response = router.process_input("laptop prices").await.unwrap();
        assert_eq!(
            response,
            RouterResponse::Multiple(vec!["tech".to_owned(), "sales".to_owned()])
        );

        let router = router_with_low_confidence();
        let response = router.process_input("anything").await.unwrap();
        assert_eq!(
            response,
            RouterResponse::Multiple(vec![NO_SUITABLE_ROUTES_MESSAGE.to_owned()])
        );
    }

    fn router_with_low_confidence() -> WorkflowRouter {
        router(
            RouteType::Multi,
            r#"{"routes": [{"name": "sales", "confidence": 0.1}]}"#,
        )
    }

    #[tokio::test]
    async fn test_priority_route_prefers_higher_priority() {
        let answer = r#"{"routes": [
            {"name": "sales", "confidence": 0.9},
            {"name": "technical_support", "confidence": 0.9}
        ]}"#;
        let router = router(RouteType::Priority, answer);
        let response = router.process_input("laptop").await.unwrap();
        assert_eq!(response, RouterResponse::Single("tech".to_owned()));
    }

    #[tokio::test]
    async fn test_priority_route_falls_through_on_failure() {
        let answer = r#"{"routes": [
            {"name": "flaky", "confidence": 0.9},
            {"name": "sales", "confidence": 0.9}
        ]}"#;
        let mut router = router(RouteType::Priority, answer);
        router.add_route(RouteConfig::new("flaky", "Always fails", "flaky", "").priority(10));

        let response = router.process_input("laptop").await.unwrap();
        assert_eq!(response, RouterResponse::Single("sales".to_owned()));
    }

    #[tokio::test]
    async fn test_unroutable_input() {
        let router = router(RouteType::Single, "I cannot decide");
        let response = router.process_input("???").await.unwrap();
        assert_eq!(response, RouterResponse::Single(UNROUTABLE_MESSAGE.to_owned()));
    }

    #[tokio::test]
    async fn test_routing_call_failure() {
        let router = WorkflowRouter::new(create_failing_agent("offline"), RouteType::Single);
        let result = router.process_input("hello").await;
        assert!(matches!(result, Err(RoutingError::Agent(_))));
    }
}
