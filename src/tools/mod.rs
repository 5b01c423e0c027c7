//! Tools module - agent capabilities
//!
//! A capability is anything an agent can call by name from a model
//! response: a plain [`Tool`] or a nested [`Agent`]. Both are invoked with
//! a JSON object of arguments and produce text.

mod executor;
mod shell;
mod web;

pub use executor::{ExecScope, ToolExecutor};
pub use shell::CommandTool;
pub use web::WebSearchTool;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::{json, Map, Value};

use crate::agent::Agent;
use crate::error::Error;
use crate::Result;

/// Tool trait - interface for all agent tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name used in call expressions
    fn name(&self) -> &str;

    /// Description of what the tool does
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    /// Execute the tool with given parameters
    async fn execute(&self, params: Value) -> Result<String>;
}

/// Something callable by name during tool-call resolution.
#[derive(Clone)]
pub enum Capability {
    Function(Arc<dyn Tool>),
    /// Invoked with `{"query": ...}`; runs its own loop with its own history.
    Agent(Arc<dyn Agent>),
}

impl Capability {
    pub fn function(tool: impl Tool + 'static) -> Self {
        Capability::Function(Arc::new(tool))
    }

    pub fn agent(agent: impl Agent + 'static) -> Self {
        Capability::Agent(Arc::new(agent))
    }

    pub fn name(&self) -> &str {
        match self {
            Capability::Function(tool) => tool.name(),
            Capability::Agent(agent) => agent.name(),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Capability::Function(tool) => tool.description(),
            Capability::Agent(agent) => agent.description(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Capability::Function(_) => "Tool",
            Capability::Agent(_) => "Sub-Agent",
        }
    }

    /// Example call expression shown to the model.
    pub fn usage(&self) -> String {
        match self {
            Capability::Agent(agent) => {
                format!(r#"{}({{"query": "your detailed task description"}})"#, agent.name())
            }
            Capability::Function(tool) => {
                let schema = tool.parameters();
                let example: Map<String, Value> = schema
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|props| {
                        props
                            .keys()
                            .map(|k| (k.clone(), Value::String("...".to_string())))
                            .collect()
                    })
                    .unwrap_or_default();
                let args = if example.is_empty() {
                    r#"{"key": "value"}"#.to_string()
                } else {
                    Value::Object(example).to_string()
                };
                format!("{}({})", tool.name(), args)
            }
        }
    }

    /// Run the capability. Nested agents return their best printable text.
    pub fn invoke<'a>(&'a self, args: &'a Map<String, Value>) -> BoxFuture<'a, Result<String>> {
        match self {
            Capability::Function(tool) => tool.execute(Value::Object(args.clone())),
            Capability::Agent(agent) => Box::pin(async move {
                let query = query_argument(args).ok_or_else(|| {
                    Error::Tool(format!("{} needs a 'query' argument", agent.name()))
                })?;
                let result = agent.invoke(&query).await?;
                Ok(result.best_text())
            }),
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind(), self.name())
    }
}

/// `query` when it is a non-empty string, else the first non-empty string argument.
fn query_argument(args: &Map<String, Value>) -> Option<String> {
    let non_empty = |v: &Value| {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    args.get("query")
        .and_then(non_empty)
        .or_else(|| args.values().find_map(non_empty))
}

type SyncFn = dyn Fn(&Map<String, Value>) -> Result<String> + Send + Sync;

/// Wraps a synchronous closure. Each call runs on the blocking pool so slow
/// functions do not stall the runtime.
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
    func: Arc<SyncFn>,
}

impl FunctionTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        func: impl Fn(&Map<String, Value>) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: json!({"type": "object", "properties": {}}),
            func: Arc::new(func),
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let args = match params {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("query".to_string(), other);
                map
            }
        };
        let func = Arc::clone(&self.func);
        tokio::task::spawn_blocking(move || func(&args))
            .await
            .map_err(|e| Error::Tool(format!("{} did not complete: {e}", self.name)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::StructuredResponse;

    struct EchoAgent;

    #[async_trait]
    impl Agent for EchoAgent {
        fn name(&self) -> &str {
            "echo_agent"
        }

        fn description(&self) -> &str {
            "Repeats the query"
        }

        async fn invoke(&self, query: &str) -> Result<StructuredResponse> {
            Ok(StructuredResponse::answer(format!("echo: {query}")))
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_function_capability_runs_closure() {
        let cap = Capability::function(FunctionTool::new("add", "Add a and b", |args| {
            let a = args.get("a").and_then(Value::as_i64).unwrap_or(0);
            let b = args.get("b").and_then(Value::as_i64).unwrap_or(0);
            Ok((a + b).to_string())
        }));
        assert_eq!(cap.kind(), "Tool");
        let out = cap.invoke(&args(json!({"a": 2, "b": 3}))).await.unwrap();
        assert_eq!(out, "5");
    }

    #[tokio::test]
    async fn test_function_panic_becomes_error() {
        let cap = Capability::function(FunctionTool::new("boom", "Panics", |_| panic!("kaboom")));
        assert!(cap.invoke(&Map::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_agent_capability_uses_query() {
        let cap = Capability::agent(EchoAgent);
        assert_eq!(cap.kind(), "Sub-Agent");
        let out = cap.invoke(&args(json!({"query": "hi"}))).await.unwrap();
        assert_eq!(out, "echo: hi");

        let out = cap.invoke(&args(json!({"task": "fallback"}))).await.unwrap();
        assert_eq!(out, "echo: fallback");

        assert!(cap.invoke(&Map::new()).await.is_err());
    }

    #[test]
    fn test_usage_from_schema() {
        let tool = FunctionTool::new("lookup", "Find things", |_| Ok(String::new())).with_parameters(
            json!({"type": "object", "properties": {"term": {"type": "string"}}}),
        );
        assert_eq!(Capability::function(tool).usage(), r#"lookup({"term":"..."})"#);

        let bare = FunctionTool::new("ping", "Ping", |_| Ok("pong".to_string()));
        assert_eq!(Capability::function(bare).usage(), r#"ping({"key": "value"})"#);

        assert_eq!(
            Capability::agent(EchoAgent).usage(),
            r#"echo_agent({"query": "your detailed task description"})"#
        );
    }
}
