//! localagents - local LLM assistant core
//!
//! A ReAct agent loop over a structured-response parser, a closed set of
//! capabilities (functions and nested agents), a correlated event tracer and
//! a single-worker request queue in front of it all.

pub mod adapters;
pub mod agent;
pub mod agents;
pub mod config;
pub mod error;
pub mod observability;
pub mod queue;
pub mod response;
pub mod templates;
pub mod tools;
pub mod ui;

pub use error::{Error, Result};
