//! Agentic workflow patterns over a single LLM-backed agent: prompt chaining,
//! routing, parallelization, orchestrator-workers and evaluator-optimizer.
pub mod agent;
pub mod config;
pub mod llm;
pub mod logging;
pub mod persistence;
pub mod structs;
pub mod tool;

// Re-export commonly used traits and types
pub use agent::{
    Agent, AgentConfig, AgentError, GenerationOptions,
    workflow_agent::{WorkflowAgent, WorkflowAgentBuilder},
};
pub use config::Settings;
pub use llm::provider::openai::OpenAI;
pub use structs::{
    evaluator_optimizer::EvaluatorOptimizer, orchestrator_workers::OrchestratorSystem,
    parallelization::ParallelProcessor, prompt_chaining::PromptChainer, routing::WorkflowRouter,
};
