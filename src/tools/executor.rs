//! Tool executor - resolves and runs capabilities by name

use std::collections::HashMap;
use std::time::Instant;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::{debug, error, warn};

use super::Capability;
use crate::agent::ToolCall;
use crate::observability::{EventFields, Tracer};

/// Longest observation handed back to the model.
const MAX_RESULT_CHARS: usize = 4000;
/// Longest result echoed into a `tool_end` event message.
const TRACE_RESULT_CHARS: usize = 500;

/// Where a tool call happens, for its trace events.
#[derive(Debug, Clone, Copy)]
pub struct ExecScope<'a> {
    pub tracer: &'a Tracer,
    pub agent: &'a str,
    pub trace_id: &'a str,
    pub iteration: usize,
}

/// Name → capability map, built once.
#[derive(Debug, Default)]
pub struct ToolExecutor {
    capabilities: Vec<Capability>,
    index: HashMap<String, usize>,
}

impl ToolExecutor {
    /// Register capabilities in order. On a name collision the first one wins.
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        let mut executor = Self::default();
        for capability in capabilities {
            let name = capability.name().to_string();
            if executor.index.contains_key(&name) {
                warn!("Duplicate capability '{}' ignored; first registration wins", name);
                continue;
            }
            executor.index.insert(name, executor.capabilities.len());
            executor.capabilities.push(capability);
        }
        executor
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.index.get(name).map(|&i| &self.capabilities[i])
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.capabilities.iter().map(Capability::name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Comma-separated names, or `none`.
    pub fn available(&self) -> String {
        if self.is_empty() {
            "none".to_string()
        } else {
            self.names().join(", ")
        }
    }

    /// Prompt section describing every capability. Empty when none are registered.
    pub fn catalog(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let docs: Vec<String> = self
            .capabilities
            .iter()
            .map(|cap| {
                let description = match cap {
                    Capability::Function(_) => cap.description().lines().next().unwrap_or(""),
                    Capability::Agent(_) => cap.description(),
                };
                format!(
                    "## {}\n**Type**: {}\n**Description**:\n{}\n**Usage**: {}\n",
                    cap.name(),
                    cap.kind(),
                    description.trim(),
                    cap.usage()
                )
            })
            .collect();
        format!(
            "## AVAILABLE TOOLS\n\n{}\n\n## TOOL INVOCATION FORMAT\n\n\
             Use exact format: tool_name({{\"param\": \"value\"}})\n\
             For sub-agents: agent_name({{\"query\": \"task description\"}})\n",
            docs.join("\n")
        )
    }

    /// Run one call. Never fails: errors and panics come back as
    /// `Error executing <name>: ...` text.
    pub async fn execute(&self, call: &ToolCall, scope: ExecScope<'_>) -> String {
        let Some(capability) = self.get(&call.name) else {
            return format!("Tool not found. Available: {}", self.available());
        };

        scope.tracer.log_event(
            "tool_start",
            EventFields::new()
                .agent(scope.agent)
                .trace_id(scope.trace_id)
                .meta("tool", call.name.as_str())
                .meta("inputs", call.args.clone())
                .meta("iteration", scope.iteration),
        );
        debug!("Executing {} with {:?}", call.name, call.args);

        let started = Instant::now();
        let outcome = AssertUnwindSafe(capability.invoke(&call.args))
            .catch_unwind()
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let failure = match outcome {
            Ok(Ok(result)) => {
                scope.tracer.log_event(
                    "tool_end",
                    EventFields::new()
                        .agent(scope.agent)
                        .trace_id(scope.trace_id)
                        .message(clip(&result, TRACE_RESULT_CHARS))
                        .meta("tool", call.name.as_str())
                        .meta("duration_ms", duration_ms),
                );
                return cap_result(result);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => "tool panicked".to_string(),
        };

        let message = format!("Error executing {}: {}", call.name, failure);
        scope.tracer.log_event(
            "tool_error",
            EventFields::new()
                .agent(scope.agent)
                .trace_id(scope.trace_id)
                .status("error")
                .meta("tool", call.name.as_str())
                .meta("duration_ms", duration_ms)
                .meta("error", failure.as_str()),
        );
        error!("{}", message);
        message
    }
}

fn clip(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn cap_result(result: String) -> String {
    if result.chars().count() <= MAX_RESULT_CHARS {
        return result;
    }
    format!("{}\n...[truncated]", clip(&result, MAX_RESULT_CHARS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FunctionTool;
    use crate::Error;
    use serde_json::Map;

    fn tool(name: &'static str, reply: &'static str) -> Capability {
        Capability::function(FunctionTool::new(name, format!("{name} tool"), move |_| {
            Ok(reply.to_string())
        }))
    }

    fn call(name: &str) -> ToolCall {
        ToolCall::new(name, Map::new())
    }

    fn scope(tracer: &Tracer) -> ExecScope<'_> {
        ExecScope {
            tracer,
            agent: "tester",
            trace_id: "trc_test",
            iteration: 1,
        }
    }

    #[test]
    fn test_first_registration_wins() {
        let executor = ToolExecutor::new([tool("a", "first"), tool("b", "b"), tool("a", "second")]);
        assert_eq!(executor.names(), vec!["a", "b"]);
        assert!(executor.has("b"));
        assert!(!executor.has("c"));
    }

    #[tokio::test]
    async fn test_execute_traces_success() {
        let tracer = Tracer::in_memory();
        let executor = ToolExecutor::new([tool("a", "first"), tool("a", "second")]);
        let out = executor.execute(&call("a"), scope(&tracer)).await;
        assert_eq!(out, "first");

        let types: Vec<String> = tracer.read_recent(10).into_iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec!["tool_start", "tool_end"]);
        let end = &tracer.read_recent(1)[0];
        assert_eq!(end.message.as_deref(), Some("first"));
        assert!(end.duration_ms().is_some());
    }

    #[tokio::test]
    async fn test_execute_marks_failures() {
        let tracer = Tracer::in_memory();
        let failing = Capability::function(FunctionTool::new("fail", "Always fails", |_| {
            Err(Error::Tool("nope".to_string()))
        }));
        let executor = ToolExecutor::new([failing]);
        let out = executor.execute(&call("fail"), scope(&tracer)).await;
        assert_eq!(out, "Error executing fail: Tool error: nope");

        let last = &tracer.read_recent(1)[0];
        assert_eq!(last.event_type, "tool_error");
        assert_eq!(last.status.as_deref(), Some("error"));
        assert_eq!(last.meta_str("tool"), Some("fail"));
    }

    #[tokio::test]
    async fn test_unknown_tool_lists_available() {
        let tracer = Tracer::in_memory();
        let executor = ToolExecutor::new([tool("a", "x"), tool("b", "y")]);
        let out = executor.execute(&call("zzz"), scope(&tracer)).await;
        assert_eq!(out, "Tool not found. Available: a, b");
        assert!(tracer.read_recent(10).is_empty());
    }

    #[tokio::test]
    async fn test_long_results_are_capped() {
        let tracer = Tracer::in_memory();
        let long = Capability::function(FunctionTool::new("long", "Long output", |_| {
            Ok("z".repeat(MAX_RESULT_CHARS + 10))
        }));
        let executor = ToolExecutor::new([long]);
        let out = executor.execute(&call("long"), scope(&tracer)).await;
        assert!(out.ends_with("\n...[truncated]"));
        assert_eq!(out.chars().filter(|&c| c == 'z').count(), MAX_RESULT_CHARS);

        let end = &tracer.read_recent(1)[0];
        assert_eq!(end.message.as_ref().map(|m| m.chars().count()), Some(TRACE_RESULT_CHARS));
    }

    #[test]
    fn test_catalog_sections() {
        let executor = ToolExecutor::new([tool("web_search", "")]);
        let catalog = executor.catalog();
        assert!(catalog.starts_with("## AVAILABLE TOOLS"));
        assert!(catalog.contains("## web_search\n**Type**: Tool"));
        assert!(catalog.contains("## TOOL INVOCATION FORMAT"));
        assert!(catalog.contains(r#"tool_name({"param": "value"})"#));
        assert_eq!(ToolExecutor::default().catalog(), "");
    }
}
