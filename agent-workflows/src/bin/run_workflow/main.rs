//! Run one of the bundled workflow scenarios against an OpenAI-compatible API.

mod demos;

use std::{path::PathBuf, sync::Arc};

use agent_workflows::{
    Agent, AgentConfig, OpenAI, Settings, logging::init_logger, persistence::save_report,
    tool::search::TavilySearch,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
enum Example {
    PromptChaining,
    Routing,
    Parallelization,
    Orchestration,
    EvaluatorOptimizer,
}

impl Example {
    fn label(&self) -> &'static str {
        match self {
            Example::PromptChaining => "prompt_chaining",
            Example::Routing => "routing",
            Example::Parallelization => "parallelization",
            Example::Orchestration => "orchestration",
            Example::EvaluatorOptimizer => "evaluator_optimizer",
        }
    }
}

#[derive(Parser)]
#[command(name = "run-workflow")]
#[command(about = "Run specific example workflows.", long_about = None)]
#[command(version)]
struct Cli {
    /// The example workflow to run
    #[arg(value_enum, default_value_t = Example::PromptChaining)]
    example: Example,

    /// Override MODEL_NAME
    #[arg(long)]
    model: Option<String>,

    /// Also write the report as JSON into this directory
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn build_agent(settings: &Settings) -> Result<Arc<dyn Agent>> {
    let model = OpenAI::from_settings(settings).context("failed to create OpenAI client")?;
    let mut builder = model
        .agent_builder()
        .config(AgentConfig::from_settings(settings))
        .agent_name("WorkflowAgent");

    if let Some(key) = &settings.tavily_api_key {
        builder = builder.add_tool(TavilySearch::new(key.as_str()));
    } else {
        tracing::info!("TAVILY_API_KEY not set, running without the search tool");
    }

    let agent: Arc<dyn Agent> = Arc::new(builder.build());
    Ok(agent)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::from_env().context("invalid configuration")?;
    if let Some(model) = cli.model {
        settings.model_name = model;
    }
    init_logger(settings.effective_log_level());
    tracing::info!("Running {} with model {}", cli.example.label(), settings.model_name);

    let agent = build_agent(&settings)?;
    let (task, report) = match cli.example {
        Example::PromptChaining => demos::prompt_chaining(agent).await?,
        Example::Routing => demos::routing(agent).await?,
        Example::Parallelization => demos::parallelization(agent).await?,
        Example::Orchestration => demos::orchestration(agent).await?,
        Example::EvaluatorOptimizer => demos::evaluator_optimizer(agent).await?,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(dir) = cli.output_dir {
        let path = save_report(&dir, cli.example.label(), &task, &report).await?;
        println!("Report saved to {}", path.display());
    }

    Ok(())
}
