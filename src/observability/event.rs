//! Trace event records and size capping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Suffix appended to capped strings.
pub const TRUNCATION_SUFFIX: &str = "...";

/// One entry of the observability log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub id: String,
    /// Process-wide, strictly increasing.
    pub seq: u64,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl TraceEvent {
    /// `meta.duration_ms`, when the event carries one.
    pub fn duration_ms(&self) -> Option<u64> {
        self.meta.get("duration_ms").and_then(Value::as_u64)
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(Value::as_str)
    }

    pub(crate) fn new_id() -> String {
        let hex = Uuid::new_v4().simple().to_string();
        format!("evt_{}", &hex[..12])
    }
}

/// Optional parts of an event, filled in by the caller.
#[derive(Debug, Clone, Default)]
pub struct EventFields {
    pub agent: Option<String>,
    pub trace_id: Option<String>,
    pub status: Option<String>,
    pub message: Option<String>,
    pub meta: Map<String, Value>,
}

impl EventFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// Explicit trace id. Without one the ambient id of the current call chain is used.
    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta.extend(meta);
        self
    }
}

/// Cap `text` at `max_len` characters, ending with [`TRUNCATION_SUFFIX`].
///
/// `max_len == 0` disables capping. Caps too small to hold the suffix cut
/// without it. Applying it twice gives the same result as applying it once.
pub fn truncate(text: &str, max_len: usize) -> String {
    if max_len == 0 || text.chars().count() <= max_len {
        return text.to_string();
    }
    if max_len <= TRUNCATION_SUFFIX.len() {
        return text.chars().take(max_len).collect();
    }
    let keep = max_len.saturating_sub(TRUNCATION_SUFFIX.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_SUFFIX);
    out
}

/// Recursively cap every string inside a metadata value.
pub fn sanitize(value: &Value, max_len: usize) -> Value {
    match value {
        Value::String(s) => Value::String(truncate(s, max_len)),
        Value::Array(items) => Value::Array(items.iter().map(|v| sanitize(v, max_len)).collect()),
        Value::Object(map) => Value::Object(sanitize_map(map, max_len)),
        other => other.clone(),
    }
}

pub fn sanitize_map(map: &Map<String, Value>, max_len: usize) -> Map<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), sanitize(v, max_len)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_is_idempotent() {
        let long = "x".repeat(50);
        let once = truncate(&long, 10);
        assert_eq!(once, format!("{}...", "x".repeat(7)));
        assert_eq!(truncate(&once, 10), once);

        let tiny = truncate(&long, 2);
        assert_eq!(truncate(&tiny, 2), tiny);
    }

    #[test]
    fn test_truncate_never_exceeds_small_caps() {
        for cap in 1..=TRUNCATION_SUFFIX.len() + 1 {
            let once = truncate("abcdefgh", cap);
            assert!(once.chars().count() <= cap, "cap {cap} gave {once:?}");
            assert_eq!(truncate(&once, cap), once);
        }
        assert_eq!(truncate("abcdef", 2), "ab");
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("abcdef", 4), "a...");
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        let text = "héllo wörld";
        assert_eq!(truncate(text, 11), text);
        assert_eq!(truncate(text, 8), "héllo...");
    }

    #[test]
    fn test_zero_disables_capping() {
        let long = "y".repeat(5000);
        assert_eq!(truncate(&long, 0), long);
    }

    #[test]
    fn test_sanitize_recurses() {
        let value = json!({
            "inputs": {"query": "abcdefghij"},
            "list": ["abcdefghij", 3, true],
            "n": 12
        });
        let capped = sanitize(&value, 6);
        assert_eq!(capped["inputs"]["query"], json!("abc..."));
        assert_eq!(capped["list"], json!(["abc...", 3, true]));
        assert_eq!(capped["n"], json!(12));
        assert_eq!(sanitize(&capped, 6), capped);
    }

    #[test]
    fn test_event_serializes_ts_and_type() {
        let event = TraceEvent {
            id: TraceEvent::new_id(),
            seq: 1,
            timestamp: Utc::now(),
            event_type: "answer".to_string(),
            agent: Some("orchestrator".to_string()),
            trace_id: None,
            status: None,
            message: None,
            meta: Map::new(),
        };
        let line = serde_json::to_value(&event).unwrap();
        assert_eq!(line["type"], json!("answer"));
        assert!(line.get("ts").is_some());
        assert!(line.get("meta").is_none());
        assert!(event.id.starts_with("evt_") && event.id.len() == 16);

        let back: TraceEvent = serde_json::from_value(line).unwrap();
        assert_eq!(back, event);
    }
}
