//! Prompt chaining: a task decomposed into dependent LLM calls.

use std::{collections::HashMap, sync::Arc};

use futures::future;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    agent::{Agent, AgentError},
    log_workflow,
};

pub const DEFAULT_MAX_ITERATIONS: usize = 3;

#[derive(Debug, Error)]
pub enum PromptChainError {
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
    #[error("Branch '{0}' not found in available branches")]
    BranchNotFound(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUp {
    pub prompt: String,
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelChainResult {
    pub base_response: String,
    pub follow_ups: Vec<FollowUp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathTaken {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalChainResult {
    pub initial_response: String,
    pub final_response: String,
    pub path_taken: PathTaken,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchingChainResult {
    pub initial_response: String,
    pub selected_branch: String,
    pub branch_responses: Vec<String>,
}

fn with_context(context: &str, prompt: &str) -> String {
    if context.is_empty() {
        prompt.to_owned()
    } else {
        format!("Context: {context}\n\nTask: {prompt}")
    }
}

/// Runs chains of prompts against a single agent.
pub struct PromptChainer {
    name: String,
    agent: Arc<dyn Agent>,
}

impl PromptChainer {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self {
            name: "PromptChainer".to_owned(),
            agent,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Each response becomes the context of the next prompt.
    pub async fn sequential_chain(
        &self,
        prompts: &[String],
        context: &str,
    ) -> Result<Vec<String>, PromptChainError> {
        log_workflow!(info, self.name, "sequential chain of {} prompts", prompts.len());
        let mut responses = Vec::with_capacity(prompts.len());
        let mut current_context = context.to_owned();

        for (step, prompt) in prompts.iter().enumerate() {
            let full_prompt = with_context(&current_context, prompt);
            let response = self.agent.generate_response(full_prompt).await?;
            log_workflow!(debug, self.name, "step {} complete", step + 1);
            current_context = response.clone();
            responses.push(response);
        }

        Ok(responses)
    }

    /// A base response, then every follow-up prompt run concurrently on top of it.
    pub async fn parallel_chain(
        &self,
        base_prompt: &str,
        follow_up_prompts: &[String],
    ) -> Result<ParallelChainResult, PromptChainError> {
        log_workflow!(
            info,
            self.name,
            "parallel chain with {} follow-ups",
            follow_up_prompts.len()
        );
        let base_response = self.agent.generate_response(base_prompt.to_owned()).await?;

        let responses = future::try_join_all(follow_up_prompts.iter().map(|prompt| {
            let full_prompt = format!("Based on this information:\n{base_response}\n\nTask: {prompt}");
            self.agent.generate_response(full_prompt)
        }))
        .await?;

        let follow_ups = follow_up_prompts
            .iter()
            .cloned()
            .zip(responses)
            .map(|(prompt, response)| FollowUp { prompt, response })
            .collect();

        Ok(ParallelChainResult {
            base_response,
            follow_ups,
        })
    }

    pub async fn conditional_chain<F>(
        &self,
        initial_prompt: &str,
        condition_check: F,
        success_prompt: &str,
        failure_prompt: &str,
    ) -> Result<ConditionalChainResult, PromptChainError>
    where
        F: Fn(&str) -> bool,
    {
        let initial_response = self
            .agent
            .generate_response(initial_prompt.to_owned())
            .await?;

        let (path_taken, next_prompt) = if condition_check(&initial_response) {
            (PathTaken::Success, success_prompt)
        } else {
            (PathTaken::Failure, failure_prompt)
        };
        log_workflow!(info, self.name, "conditional chain took {:?} path", path_taken);

        let full_prompt =
            format!("Based on the previous response: {initial_response}\n\nTask: {next_prompt}");
        let final_response = self.agent.generate_response(full_prompt).await?;

        Ok(ConditionalChainResult {
            initial_response,
            final_response,
            path_taken,
        })
    }

    /// Refine until `stop_condition(previous, new)` holds or `max_iterations`
    /// responses (including the initial one) have been produced.
    pub async fn iterative_refinement_chain<F>(
        &self,
        initial_prompt: &str,
        refinement_prompt: &str,
        max_iterations: usize,
        stop_condition: Option<F>,
    ) -> Result<Vec<String>, PromptChainError>
    where
        F: Fn(&str, &str) -> bool,
    {
        let mut current_response = self
            .agent
            .generate_response(initial_prompt.to_owned())
            .await?;
        let mut responses = vec![current_response.clone()];

        for iteration in 0..max_iterations.saturating_sub(1) {
            let full_prompt =
                format!("Previous response: {current_response}\n\nTask: {refinement_prompt}");
            let new_response = self.agent.generate_response(full_prompt).await?;
            responses.push(new_response.clone());

            if let Some(stop) = &stop_condition {
                if stop(&current_response, &new_response) {
                    log_workflow!(
                        info,
                        self.name,
                        "refinement stopped after iteration {}",
                        iteration + 2
                    );
                    break;
                }
            }

            current_response = new_response;
        }

        Ok(responses)
    }

    /// Select a branch from the initial response and run its prompts sequentially.
    ///
    /// Every branch step is framed with the previous response, even an empty one.
    pub async fn branching_chain<F>(
        &self,
        initial_prompt: &str,
        branches: &HashMap<String, Vec<String>>,
        branch_selector: F,
    ) -> Result<BranchingChainResult, PromptChainError>
    where
        F: Fn(&str) -> String,
    {
        let initial_response = self
            .agent
            .generate_response(initial_prompt.to_owned())
            .await?;
        let selected_branch = branch_selector(&initial_response);

        let prompts = branches
            .get(&selected_branch)
            .ok_or_else(|| PromptChainError::BranchNotFound(selected_branch.clone()))?;
        log_workflow!(info, self.name, "selected branch '{}'", selected_branch);

        let mut branch_responses = Vec::with_capacity(prompts.len());
        let mut current_context = initial_response.clone();
        for prompt in prompts {
            let full_prompt = format!("Context: {current_context}\n\nTask: {prompt}");
            let response = self.agent.generate_response(full_prompt).await?;
            current_context = response.clone();
            branch_responses.push(response);
        }

        Ok(BranchingChainResult {
            initial_response,
            selected_branch,
            branch_responses,
        })
    }
}
