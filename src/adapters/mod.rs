//! Adapters module - user-facing front ends.
//!
//! Adapters never call an agent directly; they submit through the
//! [`RequestQueue`](crate::queue::RequestQueue) so every request is
//! serialized through one worker.
//!
//! # Supported Channels
//!
//! - **CLI** - Interactive and single-message command line interface

pub mod cli;

pub use cli::CliChannel;
