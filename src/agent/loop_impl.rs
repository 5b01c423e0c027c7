//! ReAct loop - observe, think, plan, act
//!
//! Each iteration renders a prompt, asks the model for one structured
//! response and either returns it (`action = answer`) or runs the tool calls
//! it names and feeds the results back as the next user turn. Nothing inside
//! an iteration escapes it: a failing iteration becomes an error turn in the
//! history and the loop moves on. Running out of iterations yields a
//! synthetic answer, not an error.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use super::calls::parse_tool_calls;
use super::context::{PromptBuilder, DEFAULT_HISTORY_LIMIT};
use super::llm::InferenceClient;
use super::message::{ConversationHistory, Message};
use super::Agent;
use crate::observability::{EventFields, Tracer};
use crate::response::{get_instructions, Action, ResponseFormat, StructuredResponse};
use crate::tools::{Capability, ExecScope, Tool, ToolExecutor};
use crate::Result;

pub const DEFAULT_MAX_ITERATIONS: usize = 8;

const EXHAUSTED_OBSERVATION: &str = "Max iterations reached";
const EXHAUSTED_RESPONSE: &str = "I couldn't complete the task within the allowed iterations.";
/// Characters of a response kept in the assistant history line.
const HISTORY_PREVIEW_CHARS: usize = 120;

/// Builder for [`ReActAgent`].
pub struct AgentBuilder {
    name: String,
    description: String,
    instructions: String,
    inference: Arc<dyn InferenceClient>,
    tracer: Arc<Tracer>,
    capabilities: Vec<Capability>,
    response_format: ResponseFormat,
    max_iterations: usize,
    history_limit: usize,
}

impl AgentBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// System instructions placed at the top of every prompt.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        self.capabilities.push(Capability::function(tool));
        self
    }

    /// Register a nested agent, called with `{"query": ...}`.
    pub fn sub_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.capabilities.push(Capability::Agent(agent));
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn build(self) -> ReActAgent {
        let tools = ToolExecutor::new(self.capabilities);
        let prompt = PromptBuilder::new(
            self.instructions,
            tools.catalog(),
            get_instructions(self.response_format),
        )
        .with_history_limit(self.history_limit);

        ReActAgent {
            name: self.name,
            description: self.description,
            inference: self.inference,
            tracer: self.tracer,
            tools,
            prompt,
            response_format: self.response_format,
            max_iterations: self.max_iterations,
        }
    }
}

/// Agent running the bounded ReAct loop.
pub struct ReActAgent {
    name: String,
    description: String,
    inference: Arc<dyn InferenceClient>,
    tracer: Arc<Tracer>,
    tools: ToolExecutor,
    prompt: PromptBuilder,
    response_format: ResponseFormat,
    max_iterations: usize,
}

/// What one iteration decided.
enum Step {
    Answered(StructuredResponse),
    Continue,
}

impl ReActAgent {
    pub fn builder(
        name: impl Into<String>,
        inference: Arc<dyn InferenceClient>,
        tracer: Arc<Tracer>,
    ) -> AgentBuilder {
        AgentBuilder {
            name: name.into(),
            description: "A versatile AI agent.".to_string(),
            instructions: String::new(),
            inference,
            tracer,
            capabilities: Vec::new(),
            response_format: ResponseFormat::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn tools(&self) -> &ToolExecutor {
        &self.tools
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Run the loop for one query. Always returns a response.
    pub async fn invoke(&self, query: &str) -> StructuredResponse {
        let mut meta = Map::new();
        meta.insert("model_id".to_string(), Value::from(self.inference.model_id()));
        meta.insert("response_format".to_string(), Value::from(self.response_format.as_str()));

        self.tracer
            .trace_scope(&self.name, Some(query), meta, |trace_id| async move {
                self.run(query, &trace_id).await
            })
            .await
    }

    async fn run(&self, query: &str, trace_id: &str) -> StructuredResponse {
        let mut history = ConversationHistory::new();
        history.push(Message::user(query));
        info!("[{}] Starting loop: {}", self.name, query);

        for iteration in 1..=self.max_iterations {
            let prompt = self.prompt.render(&history, query);
            self.event(
                "iteration_start",
                trace_id,
                EventFields::new()
                    .meta("iteration", iteration)
                    .meta("prompt_chars", prompt.chars().count()),
            );
            debug!("[{}] Iteration {}/{}", self.name, iteration, self.max_iterations);

            match self.step(&prompt, iteration, trace_id, &mut history).await {
                Ok(Step::Answered(response)) => return response,
                Ok(Step::Continue) => {}
                Err(e) => {
                    error!("[{}] Iteration {} error: {}", self.name, iteration, e);
                    self.event(
                        "error",
                        trace_id,
                        EventFields::new()
                            .status("error")
                            .meta("iteration", iteration)
                            .meta("error", e.to_string()),
                    );
                    history.push(Message::user(format!("Error: {e}")));
                }
            }
        }

        info!("[{}] No answer after {} iterations", self.name, self.max_iterations);
        self.event(
            "exhausted",
            trace_id,
            EventFields::new()
                .status("exhausted")
                .message(EXHAUSTED_RESPONSE)
                .meta("iterations", self.max_iterations),
        );
        StructuredResponse {
            observation: EXHAUSTED_OBSERVATION.to_string(),
            action: Action::Answer,
            response: EXHAUSTED_RESPONSE.into(),
            ..StructuredResponse::default()
        }
    }

    async fn step(
        &self,
        prompt: &str,
        iteration: usize,
        trace_id: &str,
        history: &mut ConversationHistory,
    ) -> Result<Step> {
        let started = Instant::now();
        let raw = self.inference.generate(prompt, self.response_format).await?;
        let parsed = StructuredResponse::from_raw(raw);
        let duration_ms = started.elapsed().as_millis() as u64;

        let response_str = parsed.response.first();
        self.event(
            "model_end",
            trace_id,
            EventFields::new()
                .message(response_str.as_str())
                .meta("iteration", iteration)
                .meta("duration_ms", duration_ms)
                .meta("action", parsed.action.as_str()),
        );
        if !parsed.thinking.is_empty() {
            self.event(
                "thought",
                trace_id,
                EventFields::new()
                    .message(parsed.thinking.as_str())
                    .meta("iteration", iteration),
            );
        }

        let preview: String = response_str.chars().take(HISTORY_PREVIEW_CHARS).collect();
        history.push(Message::assistant(format!(
            "[action={}] {}",
            parsed.action, preview
        )));

        match parsed.action {
            Action::Answer => {
                self.event(
                    "answer",
                    trace_id,
                    EventFields::new()
                        .message(parsed.best_text())
                        .meta("iteration", iteration),
                );
                info!("[{}] Answered after {} iteration(s)", self.name, iteration);
                Ok(Step::Answered(parsed))
            }
            Action::Tool => {
                let observation = self
                    .run_tool_calls(&parsed, &response_str, iteration, trace_id)
                    .await;
                history.push(Message::user(format!("Result: {observation}")));
                Ok(Step::Continue)
            }
        }
    }

    async fn run_tool_calls(
        &self,
        parsed: &StructuredResponse,
        response_str: &str,
        iteration: usize,
        trace_id: &str,
    ) -> String {
        let calls = parse_tool_calls(&parsed.response);
        if calls.is_empty() {
            self.event(
                "tool_parse_error",
                trace_id,
                EventFields::new()
                    .message(response_str)
                    .meta("iteration", iteration),
            );
            return "Error: No valid tool call found in response".to_string();
        }

        let scope = ExecScope {
            tracer: &self.tracer,
            agent: &self.name,
            trace_id,
            iteration,
        };
        let mut observations = Vec::with_capacity(calls.len());
        for call in &calls {
            if !self.tools.has(&call.name) {
                observations.push(format!(
                    "{}: Tool not found. Available: {}",
                    call.name,
                    self.tools.available()
                ));
                continue;
            }
            let result = self.tools.execute(call, scope).await;
            observations.push(format!("{}: {}", call.name, result));
        }
        observations.join("\n")
    }

    fn event(&self, event_type: &str, trace_id: &str, fields: EventFields) {
        self.tracer
            .log_event(event_type, fields.agent(&self.name).trace_id(trace_id));
    }
}

#[async_trait]
impl Agent for ReActAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, query: &str) -> Result<StructuredResponse> {
        Ok(ReActAgent::invoke(self, query).await)
    }
}
