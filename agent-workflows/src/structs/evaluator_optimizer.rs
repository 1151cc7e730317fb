use std::{collections::BTreeMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    agent::{Agent, AgentError},
    log_workflow,
    structs::utils::{ExtractJsonError, extract_json},
};

pub const DEFAULT_MAX_ITERATIONS: usize = 3;
pub const DEFAULT_TARGET_SCORE: f64 = 0.9;

#[derive(Debug, Error)]
pub enum EvaluatorOptimizerError {
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
    #[error("Failed to parse evaluation: {0}")]
    Evaluation(#[from] ExtractJsonError),
    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationType {
    Translation,
    Search,
    Writing,
    Code,
    #[default]
    Custom,
}

impl fmt::Display for EvaluationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvaluationType::Translation => "translation",
            EvaluationType::Search => "search",
            EvaluationType::Writing => "writing",
            EvaluationType::Code => "code",
            EvaluationType::Custom => "custom",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationCriteria {
    pub name: String,
    pub description: String,
    pub weight: f64,
    #[serde(default)]
    pub min_score: f64,
    #[serde(default = "default_max_score")]
    pub max_score: f64,
}

fn default_max_score() -> f64 {
    1.0
}

impl EvaluationCriteria {
    pub fn new(name: impl Into<String>, description: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            weight,
            min_score: 0.0,
            max_score: default_max_score(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub scores: BTreeMap<String, f64>,
    pub feedback: BTreeMap<String, String>,
    pub overall_score: f64,
    pub suggestions: Vec<String>,
    pub iteration: usize,
}

#[derive(Debug, Deserialize)]
struct EvaluationAnswer {
    scores: BTreeMap<String, f64>,
    #[serde(default)]
    feedback: BTreeMap<String, String>,
    overall_score: Option<f64>,
    #[serde(default)]
    suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub result: String,
    pub evaluation: EvaluationResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionImprovement {
    pub initial_score: f64,
    pub final_score: f64,
    pub improvement: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementSummary {
    pub criteria_improvements: BTreeMap<String, CriterionImprovement>,
    pub overall_improvement: f64,
    pub iterations_required: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub final_result: Option<String>,
    pub iterations: Vec<IterationRecord>,
    pub final_score: f64,
    pub improvement_summary: Option<ImprovementSummary>,
}

/// Weighted mean of the scores over `criteria`.
///
/// Criteria missing from `scores` contribute nothing to the numerator but still
/// count towards the total weight. Returns 0.0 when the weights sum to zero.
pub fn calculate_overall_score(criteria: &[EvaluationCriteria], scores: &BTreeMap<String, f64>) -> f64 {
    let total_weight: f64 = criteria.iter().map(|c| c.weight).sum();
    if total_weight == 0.0 {
        return 0.0;
    }
    let weighted_sum: f64 = criteria
        .iter()
        .filter_map(|c| scores.get(&c.name).map(|score| score * c.weight))
        .sum();
    weighted_sum / total_weight
}

pub fn improvement_summary(
    criteria: &[EvaluationCriteria],
    history: &[IterationRecord],
) -> Option<ImprovementSummary> {
    let first = &history.first()?.evaluation;
    let last = &history.last()?.evaluation;

    let criteria_improvements = criteria
        .iter()
        .filter_map(|c| {
            let initial_score = *first.scores.get(&c.name)?;
            let final_score = *last.scores.get(&c.name)?;
            Some((
                c.name.clone(),
                CriterionImprovement {
                    initial_score,
                    final_score,
                    improvement: final_score - initial_score,
                },
            ))
        })
        .collect();

    Some(ImprovementSummary {
        criteria_improvements,
        overall_improvement: last.overall_score - first.overall_score,
        iterations_required: history.len(),
    })
}

pub struct EvaluatorOptimizerBuilder {
    agent: Arc<dyn Agent>,
    eval_type: EvaluationType,
    criteria: Vec<EvaluationCriteria>,
    max_iterations: usize,
    target_score: f64,
}

impl EvaluatorOptimizerBuilder {
    pub fn eval_type(mut self, eval_type: EvaluationType) -> Self {
        self.eval_type = eval_type;
        self
    }

    pub fn add_criterion(mut self, criterion: EvaluationCriteria) -> Self {
        self.criteria.push(criterion);
        self
    }

    pub fn criteria(mut self, criteria: Vec<EvaluationCriteria>) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn target_score(mut self, target_score: f64) -> Self {
        self.target_score = target_score;
        self
    }

    pub fn build(self) -> EvaluatorOptimizer {
        EvaluatorOptimizer {
            agent: self.agent,
            eval_type: self.eval_type,
            criteria: self.criteria,
            max_iterations: self.max_iterations,
            target_score: self.target_score,
        }
    }
}

/// Generate, score against weighted criteria and refine until the target score.
pub struct EvaluatorOptimizer {
    agent: Arc<dyn Agent>,
    eval_type: EvaluationType,
    criteria: Vec<EvaluationCriteria>,
    max_iterations: usize,
    target_score: f64,
}

impl EvaluatorOptimizer {
    pub fn builder(agent: Arc<dyn Agent>) -> EvaluatorOptimizerBuilder {
        EvaluatorOptimizerBuilder {
            agent,
            eval_type: EvaluationType::default(),
            criteria: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            target_score: DEFAULT_TARGET_SCORE,
        }
    }

    pub fn criteria(&self) -> &[EvaluationCriteria] {
        &self.criteria
    }

    pub fn calculate_overall_score(&self, scores: &BTreeMap<String, f64>) -> f64 {
        calculate_overall_score(&self.criteria, scores)
    }

    fn format_criteria(&self) -> String {
        self.criteria
            .iter()
            .map(|c| format!("- {} (weight: {:?}): {}", c.name, c.weight, c.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn optimizer_prompt(
        &self,
        task: &str,
        previous: Option<(&str, &EvaluationResult)>,
    ) -> Result<String, serde_json::Error> {
        let mut prompt = format!(
            "Task: {task}\n\nEvaluation Type: {}\n\nCriteria to consider:\n{}",
            self.eval_type,
            self.format_criteria()
        );

        if let Some((previous_result, feedback)) = previous {
            prompt.push_str(&format!(
                "\n\nPrevious Result:\n{previous_result}\n\nFeedback Received:\n{}\n\nPlease improve the result based on the feedback while maintaining the original intent.\nFocus especially on areas with lower scores.\n",
                serde_json::to_string_pretty(feedback)?
            ));
        }

        Ok(prompt)
    }

    pub fn evaluator_prompt(&self, task: &str, result: &str) -> String {
        format!(
            r#"Evaluate the following result based on specified criteria.

Task: {task}
Evaluation Type: {}

Result to evaluate:
{result}

Criteria:
{}

Provide evaluation in JSON format:
{{
    "scores": {{
        "criteria_name": score (0.0 to 1.0)
    }},
    "feedback": {{
        "criteria_name": "detailed feedback"
    }},
    "overall_score": 0.0 to 1.0,
    "suggestions": [
        "specific improvement suggestions"
    ]
}}

Ensure feedback is specific and actionable."#,
            self.eval_type,
            self.format_criteria()
        )
    }

    /// Parse an evaluator answer, computing the weighted score when the
    /// evaluator left `overall_score` out.
    pub fn parse_evaluation(
        &self,
        response: &str,
        iteration: usize,
    ) -> Result<EvaluationResult, ExtractJsonError> {
        let answer: EvaluationAnswer = extract_json(response)?;
        let overall_score = answer
            .overall_score
            .unwrap_or_else(|| self.calculate_overall_score(&answer.scores));

        Ok(EvaluationResult {
            scores: answer.scores,
            feedback: answer.feedback,
            overall_score,
            suggestions: answer.suggestions,
            iteration,
        })
    }

    async fn evaluate(
        &self,
        task: &str,
        result: &str,
        iteration: usize,
    ) -> Result<EvaluationResult, EvaluatorOptimizerError> {
        let response = self
            .agent
            .generate_response(self.evaluator_prompt(task, result))
            .await?;
        Ok(self.parse_evaluation(&response, iteration)?)
    }

    async fn improve(
        &self,
        task: &str,
        previous: &str,
        evaluation: &EvaluationResult,
    ) -> Result<String, EvaluatorOptimizerError> {
        let prompt = self.optimizer_prompt(task, Some((previous, evaluation)))?;
        Ok(self.agent.generate_response(prompt).await?)
    }

    pub async fn optimize(&self, task: &str, initial_result: Option<String>) -> OptimizationReport {
        let mut current = initial_result.filter(|r| !r.is_empty());
        let mut history: Vec<IterationRecord> = Vec::new();

        for iteration in 1..=self.max_iterations {
            let result = match current.take() {
                Some(result) => result,
                None => {
                    let generated = match self.optimizer_prompt(task, None) {
                        Ok(prompt) => self.agent.generate_response(prompt).await.map_err(Into::into),
                        Err(e) => Err(EvaluatorOptimizerError::from(e)),
                    };
                    match generated {
                        Ok(result) => result,
                        Err(e) => {
                            log_workflow!(error, "EvaluatorOptimizer", "error in iteration {}: {}", iteration, e);
                            break;
                        }
                    }
                }
            };
            current = Some(result.clone());

            let evaluation = match self.evaluate(task, &result, iteration).await {
                Ok(evaluation) => evaluation,
                Err(e) => {
                    log_workflow!(error, "EvaluatorOptimizer", "error in iteration {}: {}", iteration, e);
                    break;
                }
            };
            log_workflow!(
                info,
                "EvaluatorOptimizer",
                "iteration {} scored {:.3}",
                iteration,
                evaluation.overall_score
            );

            let reached_target = evaluation.overall_score >= self.target_score;
            history.push(IterationRecord {
                iteration,
                result: result.clone(),
                evaluation,
            });

            if reached_target || iteration == self.max_iterations {
                break;
            }

            let Some(last) = history.last() else { break };
            match self.improve(task, &result, &last.evaluation).await {
                Ok(improved) => current = Some(improved),
                Err(e) => {
                    log_workflow!(error, "EvaluatorOptimizer", "error in iteration {}: {}", iteration, e);
                    break;
                }
            }
        }

        OptimizationReport {
            final_result: current,
            final_score: history
                .last()
                .map_or(0.0, |record| record.evaluation.overall_score),
            improvement_summary: improvement_summary(&self.criteria, &history),
            iterations: history,
        }
    }
}
