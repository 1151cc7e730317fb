use std::{collections::BTreeMap, sync::Arc};

use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    agent::{Agent, AgentError},
    log_workflow,
    structs::utils::extract_json,
};

pub const DEFAULT_MAX_WORKERS: usize = 3;

#[derive(Debug, Error)]
pub enum ParallelizationError {
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
    #[error("Sections must be provided for sectioning parallelization")]
    MissingSections,
    #[error("Voting config must be provided for voting parallelization")]
    MissingVotingConfig,
    #[error("Voting config has no variations")]
    NoVariations,
    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParallelizationType {
    Sectioning,
    Voting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    #[default]
    Majority,
    Unanimous,
    Weighted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub system_prompt: String,
    pub task_prompt: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl Section {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        task_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            task_prompt: task_prompt.into(),
            weight: default_weight(),
        }
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingConfig {
    pub prompt: String,
    pub variations: Vec<String>,
    pub threshold: f64,
    #[serde(default)]
    pub aggregation_method: AggregationMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionResult {
    pub section_name: String,
    pub analysis: String,
    pub key_points: Vec<String>,
    pub confidence: f64,
    pub weight: f64,
}

#[derive(Debug, Deserialize)]
struct SectionAnswer {
    analysis: String,
    #[serde(default)]
    key_points: Vec<String>,
    confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteResult {
    pub variation: String,
    pub vote: bool,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Deserialize)]
struct VoteAnswer {
    vote: bool,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionAnalysis {
    pub analysis: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionAggregate {
    pub overall_confidence: f64,
    pub key_points: Vec<String>,
    pub detailed_analysis: BTreeMap<String, SectionAnalysis>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteAggregate {
    pub decision: bool,
    pub confidence: f64,
    pub vote_ratio: f64,
    pub detailed_votes: Vec<VoteResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParallelOutcome {
    Sections(SectionAggregate),
    Votes(VoteAggregate),
}

/// Σ(confidence · weight) / Σweight, 0.0 when the weights sum to zero.
pub fn weighted_confidence(results: &[SectionResult]) -> f64 {
    let total_weight: f64 = results.iter().map(|r| r.weight).sum();
    if total_weight == 0.0 {
        return 0.0;
    }
    results.iter().map(|r| r.confidence * r.weight).sum::<f64>() / total_weight
}

/// Key points of every section, first occurrence wins.
pub fn merge_key_points(results: &[SectionResult]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for point in results.iter().flat_map(|r| r.key_points.iter()) {
        if !merged.contains(point) {
            merged.push(point.clone());
        }
    }
    merged
}

/// Combine the votes into a decision. Empty input yields a negative decision.
pub fn aggregate_votes(results: &[VoteResult], config: &VotingConfig) -> VoteAggregate {
    let total = results.len();
    let positive = results.iter().filter(|r| r.vote).count();
    let total_confidence: f64 = results.iter().map(|r| r.confidence).sum();

    let (vote_ratio, confidence) = if total == 0 {
        (0.0, 0.0)
    } else {
        (
            positive as f64 / total as f64,
            total_confidence / total as f64,
        )
    };

    let decision = match config.aggregation_method {
        AggregationMethod::Majority => total > 0 && vote_ratio >= config.threshold,
        AggregationMethod::Unanimous => total > 0 && positive == total,
        AggregationMethod::Weighted => {
            let weighted_positive: f64 = results
                .iter()
                .filter(|r| r.vote)
                .map(|r| r.confidence)
                .sum();
            total_confidence > 0.0 && weighted_positive / total_confidence >= config.threshold
        }
    };

    VoteAggregate {
        decision,
        confidence,
        vote_ratio,
        detailed_votes: results.to_vec(),
    }
}

/// Fans a task out to several LLM calls and aggregates the answers.
pub struct ParallelProcessor {
    agent: Arc<dyn Agent>,
    parallel_type: ParallelizationType,
    max_workers: usize,
}

impl ParallelProcessor {
    pub fn new(agent: Arc<dyn Agent>, parallel_type: ParallelizationType) -> Self {
        Self {
            agent,
            parallel_type,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn parallel_type(&self) -> ParallelizationType {
        self.parallel_type
    }

    pub async fn process_section(
        &self,
        section: &Section,
        input: &str,
    ) -> Result<SectionResult, AgentError> {
        let prompt = format!(
            r#"{}

Input: {}

{}

Provide your response in JSON format with the following structure:
{{
    "analysis": "your detailed analysis",
    "key_points": ["list", "of", "key", "points"],
    "confidence": 0.0 to 1.0
}}"#,
            section.system_prompt, input, section.task_prompt
        );

        let response = self.agent.generate_response(prompt).await?;
        let result = match extract_json::<SectionAnswer>(&response) {
            Ok(answer) => SectionResult {
                section_name: section.name.clone(),
                analysis: answer.analysis,
                key_points: answer.key_points,
                confidence: answer.confidence,
                weight: section.weight,
            },
            Err(e) => {
                log_workflow!(warn, "ParallelProcessor", "error processing section {}: {}", section.name, e);
                SectionResult {
                    section_name: section.name.clone(),
                    analysis: "Error processing section".to_owned(),
                    key_points: vec![],
                    confidence: 0.0,
                    weight: section.weight,
                }
            }
        };
        Ok(result)
    }

    pub async fn process_vote(
        &self,
        base_prompt: &str,
        variation: &str,
        input: &str,
    ) -> Result<VoteResult, AgentError> {
        let prompt = format!(
            r#"{base_prompt}

Input to analyze: {input}

Specific focus: {variation}

Provide your response in JSON format with the following structure:
{{
    "vote": true/false,
    "confidence": 0.0 to 1.0,
    "reasoning": "explanation for your vote"
}}"#
        );

        let response = self.agent.generate_response(prompt).await?;
        let result = match extract_json::<VoteAnswer>(&response) {
            Ok(answer) => VoteResult {
                variation: variation.to_owned(),
                vote: answer.vote,
                confidence: answer.confidence,
                reasoning: answer.reasoning,
            },
            Err(e) => {
                log_workflow!(warn, "ParallelProcessor", "error processing vote for {}: {}", variation, e);
                VoteResult {
                    variation: variation.to_owned(),
                    vote: false,
                    confidence: 0.0,
                    reasoning: format!("Error processing vote: {e}"),
                }
            }
        };
        Ok(result)
    }

    pub async fn aggregate_sections(
        &self,
        results: &[SectionResult],
    ) -> Result<SectionAggregate, ParallelizationError> {
        let detailed_analysis = results
            .iter()
            .map(|r| {
                (
                    r.section_name.clone(),
                    SectionAnalysis {
                        analysis: r.analysis.clone(),
                        confidence: r.confidence,
                    },
                )
            })
            .collect();

        let summary_prompt = format!(
            "Based on the following analyses, provide a concise summary:\n\n{}\n\nProvide a coherent summary that integrates all perspectives.",
            serde_json::to_string_pretty(results)?
        );
        let summary = self.agent.generate_response(summary_prompt).await?;

        Ok(SectionAggregate {
            overall_confidence: weighted_confidence(results),
            key_points: merge_key_points(results),
            detailed_analysis,
            summary,
        })
    }

    pub async fn process(
        &self,
        input: &str,
        sections: Option<&[Section]>,
        voting: Option<&VotingConfig>,
    ) -> Result<ParallelOutcome, ParallelizationError> {
        match self.parallel_type {
            ParallelizationType::Sectioning => {
                let sections = sections
                    .filter(|s| !s.is_empty())
                    .ok_or(ParallelizationError::MissingSections)?;
                log_workflow!(info, "ParallelProcessor", "processing {} sections", sections.len());

                let results: Vec<SectionResult> = stream::iter(sections)
                    .map(|section| self.process_section(section, input))
                    .buffered(self.max_workers)
                    .try_collect()
                    .await?;

                Ok(ParallelOutcome::Sections(
                    self.aggregate_sections(&results).await?,
                ))
            }
            ParallelizationType::Voting => {
                let config = voting.ok_or(ParallelizationError::MissingVotingConfig)?;
                if config.variations.is_empty() {
                    return Err(ParallelizationError::NoVariations);
                }
                log_workflow!(info, "ParallelProcessor", "collecting {} votes", config.variations.len());

                let results: Vec<VoteResult> = stream::iter(&config.variations)
                    .map(|variation| self.process_vote(&config.prompt, variation, input))
                    .buffered(self.max_workers)
                    .try_collect()
                    .await?;

                Ok(ParallelOutcome::Votes(aggregate_votes(&results, config)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::Ordering, time::Duration};

    use super::*;
    use crate::structs::test_utils::{
        create_failing_agent, create_mock_agent, delayed_agent, scripted_agent,
    };

    fn section_result(name: &str, confidence: f64, weight: f64, points: &[&str]) -> SectionResult {
        SectionResult {
            section_name: name.to_owned(),
            analysis: format!("{name} analysis"),
            key_points: points.iter().map(|p| p.to_string()).collect(),
            confidence,
            weight,
        }
    }

    fn vote(vote: bool, confidence: f64) -> VoteResult {
        VoteResult {
            variation: "v".to_owned(),
            vote,
            confidence,
            reasoning: String::new(),
        }
    }

    fn voting_config(method: AggregationMethod, threshold: f64) -> VotingConfig {
        VotingConfig {
            prompt: "Moderate".to_owned(),
            variations: vec!["a".to_owned(), "b".to_owned(), "c".to_owned()],
            threshold,
            aggregation_method: method,
        }
    }

    #[test]
    fn test_weighted_confidence() {
        let results = vec![
            section_result("a", 0.9, 1.0, &[]),
            section_result("b", 0.5, 0.5, &[]),
        ];
        let expected = (0.9 + 0.25) / 1.5;
        assert!((weighted_confidence(&results) - expected).abs() < 1e-9);

        let zero = vec![section_result("a", 0.9, 0.0, &[])];
        assert_eq!(weighted_confidence(&zero), 0.0);
        assert_eq!(weighted_confidence(&[]), 0.0);
    }

    #[test]
    fn test_merge_key_points_keeps_first_occurrence() {
        let results = vec![
            section_result("a", 0.0, 1.0, &["clear", "accurate"]),
            section_result("b", 0.0, 1.0, &["engaging", "clear"]),
        ];
        assert_eq!(merge_key_points(&results), vec!["clear", "accurate", "engaging"]);
    }

    #[test]
    fn test_aggregate_votes_methods() {
        let votes = vec![vote(true, 0.9), vote(true, 0.3), vote(false, 0.8)];

        let majority = aggregate_votes(&votes, &voting_config(AggregationMethod::Majority, 0.6));
        assert!(majority.decision);
        assert!((majority.vote_ratio - 2.0 / 3.0).abs() < 1e-9);
        assert!((majority.confidence - 2.0 / 3.0).abs() < 1e-9);

        let unanimous = aggregate_votes(&votes, &voting_config(AggregationMethod::Unanimous, 0.0));
        assert!(!unanimous.decision);

        // 1.2 / 2.0 = 0.6
        let weighted = aggregate_votes(&votes, &voting_config(AggregationMethod::Weighted, 0.7));
        assert!(!weighted.decision);
        let weighted = aggregate_votes(&votes, &voting_config(AggregationMethod::Weighted, 0.5));
        assert!(weighted.decision);
        assert_eq!(weighted.detailed_votes.len(), 3);
    }

    #[test]
    fn test_aggregate_votes_zero_confidence() {
        let votes = vec![vote(true, 0.0), vote(true, 0.0)];
        let weighted = aggregate_votes(&votes, &voting_config(AggregationMethod::Weighted, 0.5));
        assert!(!weighted.decision);

        let empty = aggregate_votes(&[], &voting_config(AggregationMethod::Unanimous, 0.5));
        assert!(!empty.decision);
        assert_eq!(empty.vote_ratio, 0.0);
    }

    #[tokio::test]
    async fn test_process_section_fallback() {
        let processor =
            ParallelProcessor::new(create_mock_agent("not json"), ParallelizationType::Sectioning);
        let section = Section::new("tech", "You are an analyst.", "Analyze:").weight(0.8);

        let result = processor.process_section(&section, "content").await.unwrap();
        assert_eq!(result.section_name, "tech");
        assert_eq!(result.analysis, "Error processing section");
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.weight, 0.8);
    }

    #[tokio::test]
    async fn test_process_vote_fallback_reasoning() {
        let processor =
            ParallelProcessor::new(create_mock_agent("{\"vote\": \"maybe\"}"), ParallelizationType::Voting);

        let result = processor.process_vote("Moderate", "safety", "content").await.unwrap();
        assert!(!result.vote);
        assert_eq!(result.variation, "safety");
        assert!(result.reasoning.starts_with("Error processing vote: "));
    }

    #[tokio::test]
    async fn test_process_sectioning() {
        let agent = scripted_agent(|prompt| {
            if prompt.starts_with("Based on the following analyses") {
                Ok("overall summary".to_owned())
            } else if prompt.starts_with("Technical") {
                Ok(r#"{"analysis": "deep", "key_points": ["precise", "dense"], "confidence": 0.9}"#.to_owned())
            } else {
                Ok(r#"{"analysis": "readable", "key_points": ["dense"], "confidence": 0.6}"#.to_owned())
            }
        });
        let processor = ParallelProcessor::new(agent, ParallelizationType::Sectioning).max_workers(2);
        let sections = vec![
            Section::new("technical", "Technical analyst.", "Analyze:"),
            Section::new("readability", "Readability expert.", "Analyze:").weight(0.5),
        ];

        let outcome = processor.process("text", Some(&sections), None).await.unwrap();
        let ParallelOutcome::Sections(aggregate) = outcome else {
            panic!("expected a section aggregate");
        };
        assert_eq!(aggregate.summary, "overall summary");
        assert_eq!(aggregate.key_points, vec!["precise", "dense"]);
        assert!((aggregate.overall_confidence - 0.8).abs() < 1e-9);
        assert_eq!(aggregate.detailed_analysis["readability"].analysis, "readable");
    }

    #[tokio::test]
    async fn test_process_voting_keeps_variation_order() {
        let agent = scripted_agent(|prompt| {
            let positive = prompt.contains("Specific focus: safe");
            Ok(format!(r#"{{"vote": {positive}, "confidence": 0.5, "reasoning": "ok"}}"#))
        });
        let processor = ParallelProcessor::new(agent, ParallelizationType::Voting);
        let config = VotingConfig {
            prompt: "Moderate".to_owned(),
            variations: vec!["safe one".to_owned(), "harmful".to_owned(), "safe two".to_owned()],
            threshold: 0.6,
            aggregation_method: AggregationMethod::Majority,
        };

        let outcome = processor.process("text", None, Some(&config)).await.unwrap();
        let ParallelOutcome::Votes(aggregate) = outcome else {
            panic!("expected a vote aggregate");
        };
        let variations: Vec<_> = aggregate.detailed_votes.iter().map(|v| v.variation.as_str()).collect();
        assert_eq!(variations, vec!["safe one", "harmful", "safe two"]);
        assert!(aggregate.decision);
    }

    #[tokio::test]
    async fn test_process_requires_inputs() {
        let sectioning = ParallelProcessor::new(create_mock_agent(""), ParallelizationType::Sectioning);
        assert!(matches!(
            sectioning.process("x", Some(&[]), None).await,
            Err(ParallelizationError::MissingSections)
        ));

        let voting = ParallelProcessor::new(create_mock_agent(""), ParallelizationType::Voting);
        assert!(matches!(
            voting.process("x", None, None).await,
            Err(ParallelizationError::MissingVotingConfig)
        ));
        let mut config = voting_config(AggregationMethod::Majority, 0.5);
        config.variations.clear();
        assert!(matches!(
            voting.process("x", None, Some(&config)).await,
            Err(ParallelizationError::NoVariations)
        ));
    }

    #[tokio::test]
    async fn test_agent_failure_propagates() {
        let processor = ParallelProcessor::new(create_failing_agent("down"), ParallelizationType::Voting);
        let config = voting_config(AggregationMethod::Majority, 0.5);
        assert!(matches!(
            processor.process("x", None, Some(&config)).await,
            Err(ParallelizationError::Agent(_))
        ));
    }

    #[tokio::test]
    async fn test_votes_run_concurrently_up_to_max_workers() {
        let (agent, peak) = delayed_agent(Duration::from_millis(50), |_| {
            Ok(r#"{"vote": true, "confidence": 0.9, "reasoning": "fine"}"#.to_owned())
        });
        let processor = ParallelProcessor::new(agent, ParallelizationType::Voting).max_workers(2);
        let mut config = voting_config(AggregationMethod::Majority, 0.5);
        config.variations.push("d".to_owned());

        let outcome = processor.process("x", None, Some(&config)).await.unwrap();

        assert!(matches!(outcome, ParallelOutcome::Votes(_)));
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sections_run_concurrently() {
        let (agent, peak) = delayed_agent(Duration::from_millis(50), |_| {
            Ok(r#"{"analysis": "ok", "key_points": ["p"], "confidence": 0.8}"#.to_owned())
        });
        let processor =
            ParallelProcessor::new(agent, ParallelizationType::Sectioning).max_workers(3);
        let sections = vec![
            Section::new("a", "system a", "task a"),
            Section::new("b", "system b", "task b"),
            Section::new("c", "system c", "task c"),
        ];

        let outcome = processor.process("x", Some(&sections), None).await.unwrap();

        assert!(matches!(outcome, ParallelOutcome::Sections(_)));
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }
}
