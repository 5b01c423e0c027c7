//! Built-in agents and their wiring.
//!
//! The orchestrator owns the two specialists as nested-agent capabilities;
//! all three share one inference client and one tracer.

use std::sync::Arc;

use crate::agent::{InferenceClient, ProviderRegistry, ReActAgent};
use crate::config::Config;
use crate::observability::Tracer;
use crate::templates;
use crate::tools::{CommandTool, WebSearchTool};
use crate::Result;

const COMMAND_LINE_DESCRIPTION: &str = "Runs safe, non-interactive shell commands on the local machine. \
Good for inspecting files, running quick dev commands and collecting environment facts. \
Blocks sudo, rm -rf, dd, mkfs and fork bombs; output is capped at 4000 characters.";

const WEB_SEARCH_DESCRIPTION: &str = "Searches the web via DuckDuckGo and summarizes the results with their URLs.";

const ORCHESTRATOR_DESCRIPTION: &str =
    "The main assistant that coordinates and delegates tasks to specialized agents.";

fn base(
    name: &str,
    config: &Config,
    inference: &Arc<dyn InferenceClient>,
    tracer: &Arc<Tracer>,
) -> crate::agent::AgentBuilder {
    ReActAgent::builder(name, Arc::clone(inference), Arc::clone(tracer))
        .instructions(templates::load(&config.workspace, name))
        .response_format(config.response_format)
        .max_iterations(config.max_iterations)
        .history_limit(config.history_limit)
}

pub fn command_line_agent(
    config: &Config,
    inference: &Arc<dyn InferenceClient>,
    tracer: &Arc<Tracer>,
) -> ReActAgent {
    base("command_line_agent", config, inference, tracer)
        .description(COMMAND_LINE_DESCRIPTION)
        .tool(CommandTool::new(config.workspace.clone()))
        .build()
}

pub fn web_search_agent(
    config: &Config,
    inference: &Arc<dyn InferenceClient>,
    tracer: &Arc<Tracer>,
) -> ReActAgent {
    base("web_search_agent", config, inference, tracer)
        .description(WEB_SEARCH_DESCRIPTION)
        .tool(WebSearchTool::new())
        .build()
}

pub fn orchestrator(
    config: &Config,
    inference: &Arc<dyn InferenceClient>,
    tracer: &Arc<Tracer>,
) -> ReActAgent {
    base("orchestrator", config, inference, tracer)
        .description(ORCHESTRATOR_DESCRIPTION)
        .sub_agent(Arc::new(command_line_agent(config, inference, tracer)))
        .sub_agent(Arc::new(web_search_agent(config, inference, tracer)))
        .build()
}

/// Build the orchestrator with the configured provider and event log.
pub fn build(config: &Config) -> Result<(Arc<ReActAgent>, Arc<Tracer>)> {
    let inference = ProviderRegistry::create(config)?;
    let tracer = Arc::new(Tracer::from_config(&config.observability));
    let agent = Arc::new(orchestrator(config, &inference, &tracer));
    Ok((agent, tracer))
}
