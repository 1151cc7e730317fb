use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use futures::{StreamExt, stream};
use petgraph::{Graph, algo::toposort};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    agent::{Agent, AgentError},
    log_workflow,
    structs::utils::{ExtractJsonError, extract_json},
};

pub const DEFAULT_MAX_WORKERS: usize = 3;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
    #[error("Failed to parse task planning response: {0}")]
    PlanParse(ExtractJsonError),
    #[error("Duplicate subtask id: {0}")]
    DuplicateSubtask(String),
    #[error("Subtask {task} depends on unknown subtask {dependency}")]
    UnknownDependency { task: String, dependency: String },
    #[error("Circular dependency detected at subtask {0}")]
    CircularDependency(String),
    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Code,
    Research,
    Analysis,
    Synthesis,
}

impl TaskType {
    fn worker_instructions(&self) -> Option<&'static str> {
        match self {
            TaskType::Code => {
                Some("Provide code changes as git-style patches or complete file contents.")
            }
            TaskType::Research => Some("Provide sources, key findings, and confidence levels."),
            TaskType::Analysis => Some("Provide detailed analysis with supporting evidence."),
            TaskType::Synthesis => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub task_type: TaskType,
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub context: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dependencies: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub priority: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    pub result: Value,
    pub metadata: Map<String, Value>,
}

impl TaskResult {
    fn failed(task_id: &str, error: impl ToString) -> Self {
        let error = error.to_string();
        let mut metadata = Map::new();
        metadata.insert("error".to_owned(), Value::String(error.clone()));
        Self {
            task_id: task_id.to_owned(),
            status: TaskStatus::Failed,
            result: Value::String(error),
            metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    pub subtasks: Vec<SubTask>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkerAnswer {
    result: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationReport {
    pub final_result: String,
    /// In the order the subtasks finished, wave by wave.
    pub subtask_results: Vec<TaskResult>,
    pub task_breakdown: Option<String>,
}

/// Reject duplicate ids, dangling dependencies and dependency cycles.
pub fn validate_plan(subtasks: &[SubTask]) -> Result<(), OrchestratorError> {
    let mut graph = Graph::<&str, ()>::new();
    let mut nodes = HashMap::new();

    for subtask in subtasks {
        if nodes.contains_key(subtask.id.as_str()) {
            return Err(OrchestratorError::DuplicateSubtask(subtask.id.clone()));
        }
        nodes.insert(subtask.id.as_str(), graph.add_node(subtask.id.as_str()));
    }

    for subtask in subtasks {
        let target = nodes[subtask.id.as_str()];
        for dependency in &subtask.dependencies {
            let source = nodes.get(dependency.as_str()).ok_or_else(|| {
                OrchestratorError::UnknownDependency {
                    task: subtask.id.clone(),
                    dependency: dependency.clone(),
                }
            })?;
            graph.add_edge(*source, target, ());
        }
    }

    toposort(&graph, None)
        .map(|_| ())
        .map_err(|cycle| OrchestratorError::CircularDependency(graph[cycle.node_id()].to_string()))
}

/// Splits a task into typed subtasks and hands them to LLM workers.
pub struct OrchestratorSystem {
    agent: Arc<dyn Agent>,
    max_workers: usize,
}

impl OrchestratorSystem {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self {
            agent,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn planning_prompt(task: &str) -> String {
        format!(
            r#"As an orchestrator, break down the following task into subtasks.
Respond in JSON format with the following structure:
{{
    "subtasks": [
        {{
            "id": "unique_id",
            "task_type": "code|research|analysis|synthesis",
            "description": "detailed description",
            "context": {{"key": "value"}},
            "dependencies": ["dependency_task_ids"],
            "priority": 0-10
        }}
    ],
    "reasoning": "explanation of the breakdown"
}}

Task: {task}

Consider:
1. Dependencies between subtasks
2. Required context for each subtask
3. Priority of execution
"#
        )
    }

    pub fn worker_prompt(
        subtask: &SubTask,
        dependency_results: &[&TaskResult],
    ) -> Result<String, serde_json::Error> {
        let mut prompt = format!(
            "Complete the following subtask:\nDescription: {}\n\nContext:\n{}\n",
            subtask.description,
            serde_json::to_string_pretty(&subtask.context)?
        );

        if !dependency_results.is_empty() {
            prompt.push_str(&format!(
                "\nResults of the subtasks this one depends on:\n{}\n",
                serde_json::to_string_pretty(dependency_results)?
            ));
        }

        prompt.push_str(
            r#"
Provide your response in JSON format with:
{
    "result": "your detailed result",
    "confidence": 0.0 to 1.0,
    "metadata": {"key": "value"}
}
"#,
        );

        if let Some(instructions) = subtask.task_type.worker_instructions() {
            prompt.push('\n');
            prompt.push_str(instructions);
        }

        Ok(prompt)
    }

    pub fn synthesis_prompt(results: &[TaskResult]) -> Result<String, serde_json::Error> {
        let by_id = results
            .iter()
            .map(|r| Ok((r.task_id.clone(), serde_json::to_value(r)?)))
            .collect::<Result<Map<String, Value>, serde_json::Error>>()?;

        Ok(format!(
            r#"Synthesize the following subtask results into a coherent final response:

Results:
{}

Provide a comprehensive response that:
1. Integrates all subtask results
2. Resolves any conflicts
3. Presents a clear final solution
4. Includes relevant details from subtasks
"#,
            serde_json::to_string_pretty(&by_id)?
        ))
    }

    pub async fn plan(&self, task: &str) -> Result<TaskPlan, OrchestratorError> {
        let response = self
            .agent
            .generate_response(Self::planning_prompt(task))
            .await?;
        log_workflow!(debug, "OrchestratorSystem", "planning response: {}", response);

        let plan: TaskPlan = extract_json(&response).map_err(OrchestratorError::PlanParse)?;
        validate_plan(&plan.subtasks)?;
        Ok(plan)
    }

    /// Run one worker. Every failure is folded into a `Failed` result.
    async fn process_subtask(&self, subtask: &SubTask, dependency_results: Vec<&TaskResult>) -> TaskResult {
        let prompt = match Self::worker_prompt(subtask, &dependency_results) {
            Ok(prompt) => prompt,
            Err(e) => return TaskResult::failed(&subtask.id, e),
        };

        let response = match self.agent.generate_response(prompt).await {
            Ok(response) => response,
            Err(e) => {
                log_workflow!(error, "OrchestratorSystem", "worker {} failed: {}", subtask.id, e);
                return TaskResult::failed(&subtask.id, e);
            }
        };

        match extract_json::<WorkerAnswer>(&response) {
            Ok(answer) => TaskResult {
                task_id: subtask.id.clone(),
                status: TaskStatus::Completed,
                result: answer.result,
                metadata: answer.metadata,
            },
            Err(e) => {
                log_workflow!(warn, "OrchestratorSystem", "worker {} returned unusable output: {}", subtask.id, e);
                TaskResult::failed(&subtask.id, e)
            }
        }
    }

    /// Execute the subtasks in dependency waves.
    pub async fn execute_subtasks(
        &self,
        subtasks: &[SubTask],
    ) -> Result<Vec<TaskResult>, OrchestratorError> {
        validate_plan(subtasks)?;

        let mut pending: Vec<&SubTask> = subtasks.iter().collect();
        let mut finished: HashSet<&str> = HashSet::new();
        let mut results: Vec<TaskResult> = Vec::with_capacity(subtasks.len());

        while !pending.is_empty() {
            let (mut ready, waiting): (Vec<&SubTask>, Vec<&SubTask>) = pending
                .into_iter()
                .partition(|task| task.dependencies.iter().all(|dep| finished.contains(dep.as_str())));

            if ready.is_empty() {
                let stuck = waiting.first().map(|t| t.id.clone()).unwrap_or_default();
                return Err(OrchestratorError::CircularDependency(stuck));
            }
            ready.sort_by_key(|task| std::cmp::Reverse(task.priority));
            log_workflow!(info, "OrchestratorSystem", "running wave of {} subtasks", ready.len());

            let wave: Vec<TaskResult> = {
                let completed = &results;
                stream::iter(ready.iter().copied())
                    .map(|task| {
                        let dependency_results = completed
                            .iter()
                            .filter(|r| task.dependencies.contains(&r.task_id))
                            .collect();
                        self.process_subtask(task, dependency_results)
                    })
                    .buffered(self.max_workers)
                    .collect()
                    .await
            };

            finished.extend(ready.iter().map(|task| task.id.as_str()));
            results.extend(wave);
            pending = waiting;
        }

        Ok(results)
    }

    pub async fn process_task(&self, task: &str) -> Result<OrchestrationReport, OrchestratorError> {
        let plan = self.plan(task).await?;
        log_workflow!(info, "OrchestratorSystem", "executing {} subtasks", plan.subtasks.len());

        let subtask_results = self.execute_subtasks(&plan.subtasks).await?;

        let final_result = self
            .agent
            .generate_response(Self::synthesis_prompt(&subtask_results)?)
            .await?;

        Ok(OrchestrationReport {
            final_result,
            subtask_results,
            task_breakdown: plan.reasoning,
        })
    }
}
