pub mod evaluator_optimizer;
pub mod orchestrator_workers;
pub mod parallelization;
pub mod prompt_chaining;
pub mod routing;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
