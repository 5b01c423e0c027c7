//! Extraction of `name({json})` call expressions from response text.
//!
//! Kept as a standalone pure function so a stricter grammar can replace it
//! without touching the loop.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::message::ToolCall;
use crate::response::ResponseBody;

fn call_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)(\w+)\s*\(\s*(\{.*?\})\s*\)").expect("call pattern is valid")
    })
}

/// Find every `tool_name({...})` in the response, in order of appearance.
///
/// List responses are joined with spaces first. An argument that is not a
/// JSON object becomes `{"query": <raw argument text>}`; the call is kept.
pub fn parse_tool_calls(response: &ResponseBody) -> Vec<ToolCall> {
    let text = response.flatten();
    call_pattern()
        .captures_iter(&text)
        .map(|caps| {
            let raw_args = &caps[2];
            let args = match serde_json::from_str::<Value>(raw_args) {
                Ok(Value::Object(map)) => map,
                _ => {
                    let mut map = Map::new();
                    map.insert("query".to_string(), Value::String(raw_args.to_string()));
                    map
                }
            };
            ToolCall::new(&caps[1], args)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_call() {
        let calls = parse_tool_calls(&r#"web_search({"query": "rust 1.80"})"#.into());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "web_search");
        assert_eq!(calls[0].args["query"], json!("rust 1.80"));
    }

    #[test]
    fn test_nested_object_argument() {
        let calls = parse_tool_calls(&r#"configure({"opts": {"depth": 2}}) then stop"#.into());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args["opts"], json!({"depth": 2}));
    }

    #[test]
    fn test_invalid_json_degenerates_to_query() {
        let calls = parse_tool_calls(&"lookup({not json})".into());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "lookup");
        assert_eq!(calls[0].args["query"], json!("{not json}"));
    }

    #[test]
    fn test_list_response_is_flattened() {
        let body = ResponseBody::List(vec![
            r#"a({"x": 1})"#.to_string(),
            r#"b({"y": 2})"#.to_string(),
        ]);
        let names: Vec<_> = parse_tool_calls(&body).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_no_calls_in_prose() {
        assert!(parse_tool_calls(&"I will search (later) for it".into()).is_empty());
    }
}
