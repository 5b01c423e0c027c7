//! Wire types for the OpenAI-compatible Responses API.
//!
//! Only the fields the client reads are modelled; everything else in the
//! reply is ignored.

use serde::{Deserialize, Serialize};

/// `POST {base_url}/responses` body.
#[derive(Debug, Serialize)]
pub struct ResponsesRequest<'a> {
    pub model: &'a str,
    pub input: Vec<InputMessage<'a>>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct InputMessage<'a> {
    pub role: &'static str,
    pub content: Vec<InputContent<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputContent<'a> {
    InputText { text: &'a str },
}

/// Top-level reply.
#[derive(Debug, Default, Deserialize)]
pub struct ResponsesReply {
    #[serde(default)]
    pub output_text: Option<String>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputItem {
    #[serde(default)]
    pub content: Vec<OutputContent>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputContent {
    #[serde(default)]
    pub text: Option<OutputText>,
}

/// Some servers send `text` as a plain string, others as `{"value": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OutputText {
    Plain(String),
    Wrapped { value: String },
}

impl OutputText {
    pub fn as_str(&self) -> &str {
        match self {
            OutputText::Plain(text) => text,
            OutputText::Wrapped { value } => value,
        }
    }
}

/// Error body returned on non-2xx replies.
#[derive(Debug, Deserialize)]
pub struct ErrorReply {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
}
