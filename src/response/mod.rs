//! Structured model responses and their recovery from unreliable text.
//!
//! Every inference call yields one [`StructuredResponse`]. Models do not always
//! follow the requested encoding, so [`StructuredResponse::from_raw`] tries, in
//! order:
//!
//! 1. an already-typed value or a JSON mapping (validated directly),
//! 2. the first balanced `{...}` object embedded in the text,
//! 3. the line-structured `field: value` encoding (TOON),
//! 4. the trimmed text as the `response` field.
//!
//! The field table [`FIELDS`] is shared with [`get_instructions`] so the prompt
//! and the parser never disagree about field names or types.

mod instructions;
mod json;
mod toon;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Error;

pub use instructions::get_instructions;
pub use toon::{parse_bracket_list, strip_wrapping_quotes};

/// Shape of a schema field, as seen by the parser and the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    List,
    Action,
    TextOrList,
}

impl FieldKind {
    pub fn type_name(self) -> &'static str {
        match self {
            FieldKind::Text => "string",
            FieldKind::List => "list",
            FieldKind::Action => "\"tool\" | \"answer\"",
            FieldKind::TextOrList => "string | list",
        }
    }

    /// Whether a bracketed `[a, b]` value should become a list.
    pub fn accepts_list(self) -> bool {
        matches!(self, FieldKind::List | FieldKind::TextOrList)
    }
}

/// One declared field of the response schema.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
}

/// The response schema, in the order the model is asked to write it.
pub const FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "observation",
        kind: FieldKind::Text,
        description: "One short sentence about current context, key facts, or constraints.",
    },
    FieldSpec {
        name: "thinking",
        kind: FieldKind::Text,
        description: "In-depth reasoning and analysis. Must be safe to log.",
    },
    FieldSpec {
        name: "plan",
        kind: FieldKind::List,
        description: "0-3 short, concrete next steps. Use [] when obvious.",
    },
    FieldSpec {
        name: "action",
        kind: FieldKind::Action,
        description: "'tool' to invoke a tool, 'answer' to provide the final response.",
    },
    FieldSpec {
        name: "response",
        kind: FieldKind::TextOrList,
        description: "If action='tool': tool call(s). If action='answer': final response text.",
    },
];

/// Look up a declared field by name.
pub fn field(name: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|f| f.name == name)
}

/// What the model decided to do this iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Tool,
    #[default]
    Answer,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Tool => "tool",
            Action::Answer => "answer",
        }
    }

    /// Parse exactly `tool` or `answer`. Only surrounding whitespace is ignored.
    pub fn from_literal(value: &str) -> Option<Self> {
        match value.trim() {
            "tool" => Some(Action::Tool),
            "answer" => Some(Action::Answer),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `response` field: free text, or a list (e.g. several tool calls).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Text(String),
    List(Vec<String>),
}

impl Default for ResponseBody {
    fn default() -> Self {
        ResponseBody::Text(String::new())
    }
}

impl ResponseBody {
    /// All items joined by a single space, as the call extractor sees them.
    pub fn flatten(&self) -> String {
        match self {
            ResponseBody::Text(text) => text.clone(),
            ResponseBody::List(items) => items.join(" "),
        }
    }

    /// The first item (or the whole text) used for history and trace messages.
    pub fn first(&self) -> String {
        match self {
            ResponseBody::Text(text) => text.clone(),
            ResponseBody::List(items) => items.first().cloned().unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ResponseBody::Text(text) => text.trim().is_empty(),
            ResponseBody::List(items) => items.iter().all(|i| i.trim().is_empty()),
        }
    }
}

impl From<&str> for ResponseBody {
    fn from(text: &str) -> Self {
        ResponseBody::Text(text.to_string())
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self {
        ResponseBody::Text(text)
    }
}

/// Observe → think → plan → act, as produced by one inference call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredResponse {
    #[serde(default)]
    pub observation: String,
    #[serde(default)]
    pub thinking: String,
    #[serde(default)]
    pub plan: Vec<String>,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub response: ResponseBody,
}

/// Output of an inference call before parsing.
#[derive(Debug, Clone)]
pub enum RawResponse {
    Structured(StructuredResponse),
    Mapping(Map<String, Value>),
    Text(String),
}

impl From<StructuredResponse> for RawResponse {
    fn from(value: StructuredResponse) -> Self {
        RawResponse::Structured(value)
    }
}

impl From<Map<String, Value>> for RawResponse {
    fn from(value: Map<String, Value>) -> Self {
        RawResponse::Mapping(value)
    }
}

impl From<String> for RawResponse {
    fn from(value: String) -> Self {
        RawResponse::Text(value)
    }
}

impl From<&str> for RawResponse {
    fn from(value: &str) -> Self {
        RawResponse::Text(value.to_string())
    }
}

impl From<Value> for RawResponse {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => RawResponse::Mapping(map),
            Value::String(text) => RawResponse::Text(text),
            other => RawResponse::Text(other.to_string()),
        }
    }
}

/// Encoding the model is asked to answer in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    Json,
    #[default]
    Toon,
}

impl ResponseFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseFormat::Json => "json",
            ResponseFormat::Toon => "toon",
        }
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ResponseFormat::Json),
            "toon" | "line" | "lines" => Ok(ResponseFormat::Toon),
            other => Err(Error::Config(format!("Unknown response format: {other}"))),
        }
    }
}

/// Why a mapping could not be turned into a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl StructuredResponse {
    /// A final answer with no reasoning attached.
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            response: ResponseBody::Text(text.into()),
            ..Self::default()
        }
    }

    /// Recover a response from whatever the model produced. Never fails.
    pub fn from_raw(raw: impl Into<RawResponse>) -> Self {
        match raw.into() {
            RawResponse::Structured(value) => value,
            RawResponse::Mapping(map) => Self::from_mapping(&map),
            RawResponse::Text(text) => Self::from_text(&text),
        }
    }

    /// Validate a mapping directly; invalid values are repaired rather than rejected.
    pub fn from_mapping(map: &Map<String, Value>) -> Self {
        match Self::from_fields(map) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Mapping failed validation ({}), repairing", e);
                let repaired = repair(map);
                Self::from_fields(&repaired).unwrap_or_default()
            }
        }
    }

    fn from_text(raw: &str) -> Self {
        if let Some(parsed) = Self::try_json(raw) {
            return parsed;
        }

        let data = toon::parse_toon(raw);
        if !data.is_empty() {
            match Self::from_fields(&data) {
                Ok(parsed) => return parsed,
                Err(e) => debug!("Line-structured parse rejected: {}", e),
            }
        }

        Self::answer(raw.trim()).normalized()
    }

    fn try_json(raw: &str) -> Option<Self> {
        let candidate = json::extract_json_object(raw)?;
        let value: Value = serde_json::from_str(candidate).ok()?;
        let map = value.as_object()?;
        if !map.keys().any(|k| field(k).is_some()) {
            return None;
        }
        match Self::from_fields(map) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                debug!("JSON object failed validation ({}), repairing", e);
                Self::from_fields(&repair(map)).ok()
            }
        }
    }

    /// Strict field-by-field conversion followed by normalization.
    pub(crate) fn from_fields(data: &Map<String, Value>) -> Result<Self, FieldError> {
        let mut out = Self::default();

        if let Some(value) = data.get("observation") {
            out.observation = text_field("observation", value)?;
        }
        if let Some(value) = data.get("thinking") {
            out.thinking = text_field("thinking", value)?;
        }
        if let Some(value) = data.get("plan") {
            out.plan = list_field("plan", value)?;
        }
        if let Some(value) = data.get("action") {
            out.action = match value {
                Value::Null => Action::default(),
                Value::String(s) => Action::from_literal(s).ok_or_else(|| FieldError {
                    field: "action",
                    reason: format!("expected 'tool' or 'answer', got {s:?}"),
                })?,
                other => {
                    return Err(FieldError {
                        field: "action",
                        reason: format!("expected a string, got {other}"),
                    })
                }
            };
        }
        if let Some(value) = data.get("response") {
            out.response = match value {
                Value::Null => ResponseBody::default(),
                Value::String(s) => ResponseBody::Text(s.clone()),
                Value::Array(items) => ResponseBody::List(string_items("response", items)?),
                other => {
                    return Err(FieldError {
                        field: "response",
                        reason: format!("expected a string or list, got {other}"),
                    })
                }
            };
        }

        Ok(out.normalized())
    }

    /// Strip one layer of wrapping quotes from every string value.
    fn normalized(mut self) -> Self {
        self.observation = strip_wrapping_quotes(&self.observation);
        self.thinking = strip_wrapping_quotes(&self.thinking);
        self.plan = self.plan.iter().map(|s| strip_wrapping_quotes(s)).collect();
        self.response = match self.response {
            ResponseBody::Text(text) => ResponseBody::Text(strip_wrapping_quotes(&text)),
            ResponseBody::List(items) => {
                ResponseBody::List(items.iter().map(|s| strip_wrapping_quotes(s)).collect())
            }
        };
        self
    }

    /// Line-structured encoding, readable back by [`from_raw`](Self::from_raw).
    pub fn to_toon(&self) -> String {
        let response = match &self.response {
            ResponseBody::Text(text) => format!("response: {text}"),
            ResponseBody::List(items) => toon_list("response", items),
        };
        format!(
            "observation: {}\n\nthinking: {}\n\n{}\n\naction: {}\n\n{}",
            self.observation,
            self.thinking,
            toon_list("plan", &self.plan),
            self.action,
            response
        )
    }

    /// Minified JSON encoding.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Always-printable text: the response, else thinking, else observation,
    /// else the whole value as JSON.
    pub fn best_text(&self) -> String {
        let response = self.response.flatten();
        let best = [response.as_str(), self.thinking.as_str(), self.observation.as_str()]
            .into_iter()
            .map(str::trim)
            .find(|text| !text.is_empty())
            .map(str::to_string);
        best.unwrap_or_else(|| self.to_json())
    }
}

/// `name: [a, b]`, or one `name[i]: item` line per item when an item would
/// not survive bracket splitting.
fn toon_list(name: &str, items: &[String]) -> String {
    let bracket_safe = items
        .iter()
        .all(|item| !item.contains(|c| ",()[]{}\n".contains(c)));
    if bracket_safe {
        return format!("{name}: [{}]", items.join(", "));
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{name}[{i}]: {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn text_field(name: &'static str, value: &Value) -> Result<String, FieldError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        other => Err(FieldError {
            field: name,
            reason: format!("expected a string, got {other}"),
        }),
    }
}

fn list_field(name: &'static str, value: &Value) -> Result<Vec<String>, FieldError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => string_items(name, items),
        Value::String(s) => Ok(toon::coerce_list(s)),
        other => Err(FieldError {
            field: name,
            reason: format!("expected a list, got {other}"),
        }),
    }
}

fn string_items(name: &'static str, items: &[Value]) -> Result<Vec<String>, FieldError> {
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            other => Err(FieldError {
                field: name,
                reason: format!("list items must be strings, got {other}"),
            }),
        })
        .collect()
}

/// Make every known field representable: scalars become strings and an
/// unrecognised action is corrected the same way the line parser does it.
fn repair(map: &Map<String, Value>) -> Map<String, Value> {
    fn stringify(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    let mut data = Map::new();
    for spec in FIELDS {
        let Some(value) = map.get(spec.name) else {
            continue;
        };
        let repaired = match (spec.kind, value) {
            (_, Value::Null) => Value::Null,
            (FieldKind::List | FieldKind::TextOrList, Value::Array(items)) => {
                Value::Array(items.iter().map(|i| Value::String(stringify(i))).collect())
            }
            (FieldKind::Text | FieldKind::Action, Value::Array(items)) => Value::String(
                items.iter().map(stringify).collect::<Vec<_>>().join("\n"),
            ),
            (_, other) => Value::String(stringify(other)),
        };
        data.insert(spec.name.to_string(), repaired);
    }
    toon::correct_action(&mut data);
    data
}
