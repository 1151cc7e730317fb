use tracing_subscriber::EnvFilter;

const KNOWN_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence when it is set; otherwise `level` (e.g. `"INFO"`)
/// is used. Returns `false` if a global subscriber was already installed.
pub fn init_logger(level: &str) -> bool {
    let level = level.trim().to_lowercase();
    let fallback_used = !KNOWN_LEVELS.contains(&level.as_str());
    let level = if fallback_used { "info".to_owned() } else { level };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok();

    if fallback_used {
        tracing::warn!("Invalid log level, defaulting to INFO");
    }
    if installed {
        tracing::info!("agent-workflows logging initialized with level: {level}");
    }
    installed
}

/// Log a workflow event with the workflow name as context.
#[macro_export]
macro_rules! log_workflow {
    ($level:ident, $workflow:expr, $($arg:tt)*) => {
        tracing::$level!(
            workflow = %$workflow,
            "[Workflow: {}] {}",
            $workflow,
            format!($($arg)*)
        );
    };
}

/// Log an LLM interaction with agent and model as context.
#[macro_export]
macro_rules! log_llm {
    ($level:ident, $agent_name:expr, $model:expr, $($arg:tt)*) => {
        tracing::$level!(
            agent = %$agent_name,
            model = %$model,
            "[{}] LLM: {} - {}",
            $agent_name,
            $model,
            format!($($arg)*)
        );
    };
}

/// Log a tool execution with agent and tool as context.
#[macro_export]
macro_rules! log_tool {
    ($level:ident, $agent_name:expr, $tool_name:expr, $($arg:tt)*) => {
        tracing::$level!(
            agent = %$agent_name,
            tool = %$tool_name,
            "[{}] Tool: {} - {}",
            $agent_name,
            $tool_name,
            format!($($arg)*)
        );
    };
}
