//! Agent module - core agent logic.
//!
//! This module contains:
//! - Message and history types
//! - Inference client trait and implementations
//! - The ReAct loop ([`ReActAgent`])
//! - Prompt rendering
//! - Call-expression extraction
//!
//! # Adding a New Inference Provider
//!
//! See [`llm::ProviderRegistry`] for instructions.

mod calls;
mod context;
mod loop_impl;
mod message;

pub mod llm;

use async_trait::async_trait;

use crate::response::StructuredResponse;
use crate::Result;

pub use calls::parse_tool_calls;
pub use context::PromptBuilder;
pub use llm::{InferenceClient, OpenAiClient, ProviderRegistry};
pub use loop_impl::{AgentBuilder, ReActAgent};
pub use message::{ConversationHistory, Message, Role, ToolCall};

/// Anything that answers a query with a structured response.
///
/// The request queue drives an `Agent`, and a nested agent is registered as
/// a capability through this trait.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// Shown to parent agents in their tool catalog.
    fn description(&self) -> &str;

    async fn invoke(&self, query: &str) -> Result<StructuredResponse>;
}
