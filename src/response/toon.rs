//! Line-structured (`field: value`) response parsing.

use serde_json::{Map, Value};

use super::{field, Action};

/// Keys models commonly write instead of a declared field.
const ALIASES: &[(&str, &str)] = &[("tool", "response")];

/// Remove exactly one layer of matching `"` or `'` around a value.
///
/// Values without wrapping quotes are returned unchanged, including any
/// surrounding whitespace.
pub fn strip_wrapping_quotes(value: &str) -> String {
    let text = value.trim();
    let bytes = text.as_bytes();
    if bytes.len() >= 2 && bytes[0] == bytes[bytes.len() - 1] && matches!(bytes[0], b'"' | b'\'') {
        return text[1..text.len() - 1].to_string();
    }
    value.to_string()
}

/// Split `[a, b(c, d), e]` on top-level commas. `None` when not bracketed.
pub fn parse_bracket_list(value: &str) -> Option<Vec<String>> {
    let value = value.trim();
    if !(value.starts_with('[') && value.ends_with(']')) || value.len() < 2 {
        return None;
    }
    let inner = value[1..value.len() - 1].trim();
    if inner.is_empty() {
        return Some(Vec::new());
    }

    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth: usize = 0;
    for ch in inner.chars() {
        match ch {
            '(' | '{' | '[' => {
                depth += 1;
                current.push(ch);
            }
            ')' | '}' | ']' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                items.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        items.push(current.trim().to_string());
    }
    Some(items)
}

/// Turn a string into list items: bracket notation first, else one item per
/// non-empty line with bullet or numbering markers removed.
pub(crate) fn coerce_list(value: &str) -> Vec<String> {
    if let Some(items) = parse_bracket_list(value) {
        return items;
    }
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| strip_list_marker(line).to_string())
        .collect()
}

/// `1. x`, `- x` and `* x` all become `x`.
fn strip_list_marker(line: &str) -> &str {
    let line = line.trim_start();
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 && line[digits..].starts_with('.') {
        return line[digits + 1..].trim();
    }
    if let Some(rest) = line.strip_prefix('-').or_else(|| line.strip_prefix('*')) {
        return rest.trim();
    }
    line.trim()
}

/// Normalize a raw key: drop bullets, numbering and bold markers, lowercase.
fn clean_key(raw: &str) -> String {
    let key = raw.trim();
    let key = key.trim_start_matches(['-', '*']).trim_start();
    let digits = key.chars().take_while(char::is_ascii_digit).count();
    let key = if digits > 0 && key[digits..].starts_with('.') {
        key[digits + 1..].trim_start()
    } else {
        key
    };
    key.trim_matches('*').trim().to_lowercase()
}

/// Split `name[idx]` into its parts.
fn indexed_key(key: &str) -> Option<(&str, usize)> {
    let open = key.find('[')?;
    let inner = key[open + 1..].strip_suffix(']')?;
    let base = &key[..open];
    if base.is_empty() || !base.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    let idx = inner.parse().ok()?;
    Some((base, idx))
}

/// The declared field a cleaned key refers to, if any.
fn resolve_key(key: &str) -> Option<String> {
    let key = ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, target)| *target)
        .unwrap_or(key);

    if field(key).is_some() {
        return Some(key.to_string());
    }
    match indexed_key(key) {
        Some((base, _)) if field(base).is_some_and(|f| f.kind.accepts_list()) => {
            Some(key.to_string())
        }
        _ => None,
    }
}

/// Two-pass parse: locate field lines, then give each field every line up to
/// the next field line.
pub(crate) fn parse_toon(text: &str) -> Map<String, Value> {
    let lines: Vec<&str> = text.lines().collect();

    let mut starts: Vec<(usize, String, String)> = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let Some((raw_key, inline)) = line.trim().split_once(':') else {
            continue;
        };
        if let Some(name) = resolve_key(&clean_key(raw_key)) {
            starts.push((idx, name, inline.trim().to_string()));
        }
    }

    let mut data = Map::new();
    for (i, (start, name, inline)) in starts.iter().enumerate() {
        let end = starts.get(i + 1).map(|s| s.0).unwrap_or(lines.len());
        let mut parts: Vec<&str> = Vec::new();
        if !inline.is_empty() {
            parts.push(inline);
        }
        parts.extend(&lines[start + 1..end]);
        let value = parts.join("\n").trim().to_string();
        set_value(&mut data, name, value);
    }

    correct_action(&mut data);
    data
}

fn set_value(data: &mut Map<String, Value>, key: &str, value: String) {
    if let Some((base, idx)) = indexed_key(key) {
        let slot = data
            .entry(base.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(items) = slot {
            while items.len() <= idx {
                items.push(Value::String(String::new()));
            }
            items[idx] = Value::String(value);
        }
        return;
    }

    let accepts_list = field(key).is_some_and(|f| f.kind.accepts_list());
    match parse_bracket_list(&value) {
        Some(items) if accepts_list => {
            data.insert(
                key.to_string(),
                Value::Array(items.into_iter().map(Value::String).collect()),
            );
        }
        _ => {
            data.insert(key.to_string(), Value::String(value));
        }
    }
}

/// Force an unrecognised action to `tool`. If the bad value looks like a call
/// expression and no response was captured, it becomes the response.
pub(crate) fn correct_action(data: &mut Map<String, Value>) {
    let Some(Value::String(action)) = data.get("action") else {
        return;
    };
    let action = action.trim().to_string();
    if action.is_empty() {
        return;
    }
    if let Some(literal) = Action::from_literal(&action) {
        data.insert("action".to_string(), Value::String(literal.as_str().to_string()));
        return;
    }

    let looks_like_call = action.contains('(') || action.contains('{');
    let has_response = match data.get("response") {
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        _ => false,
    };
    if looks_like_call && !has_response {
        data.insert("response".to_string(), Value::String(action));
    }
    data.insert("action".to_string(), Value::String("tool".to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracket_list_respects_nesting() {
        let items = parse_bracket_list(r#"[search({"q": "a, b"}), read(x, y), done]"#).unwrap();
        assert_eq!(items, vec![r#"search({"q": "a, b"})"#, "read(x, y)", "done"]);
        assert_eq!(parse_bracket_list("[]"), Some(vec![]));
        assert_eq!(parse_bracket_list("not a list"), None);
    }

    #[test]
    fn test_clean_key_strips_decoration() {
        assert_eq!(clean_key("**Thinking**"), "thinking");
        assert_eq!(clean_key("- plan"), "plan");
        assert_eq!(clean_key("2. Action"), "action");
    }

    #[test]
    fn test_multiline_values() {
        let text = "thinking: first line\nsecond line\n\nplan: [a, b]\naction: answer\nresponse: Hello\nthere";
        let data = parse_toon(text);
        assert_eq!(data["thinking"], Value::String("first line\nsecond line".to_string()));
        assert_eq!(data["response"], Value::String("Hello\nthere".to_string()));
        assert_eq!(data["plan"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_indexed_keys_extend_list() {
        let text = "plan[2]: third\nplan[0]: first\naction: answer";
        let data = parse_toon(text);
        assert_eq!(data["plan"], serde_json::json!(["first", "", "third"]));
    }

    #[test]
    fn test_tool_alias_maps_to_response() {
        let data = parse_toon("action: tool\ntool: web_search({\"query\": \"x\"})");
        assert_eq!(data["response"], Value::String(r#"web_search({"query": "x"})"#.to_string()));
    }

    #[test]
    fn test_unknown_keys_stay_in_previous_value() {
        let data = parse_toon("response: Summary\nNote: keep this line");
        assert_eq!(data["response"], Value::String("Summary\nNote: keep this line".to_string()));
    }

    #[test]
    fn test_action_must_be_exact_literal() {
        let data = parse_toon("action:  answer \nresponse: 4");
        assert_eq!(data["action"], Value::String("answer".to_string()));

        let data = parse_toon("action: Answer\nresponse: 4");
        assert_eq!(data["action"], Value::String("tool".to_string()));
        assert_eq!(data["response"], Value::String("4".to_string()));

        let data = parse_toon("action: answer\nbecause I know it\nresponse: 4");
        assert_eq!(data["action"], Value::String("tool".to_string()));
    }

    #[test]
    fn test_action_with_call_on_second_line_becomes_tool() {
        let data = parse_toon("action: answer\nweb_search({\"query\": \"x\"})");
        assert_eq!(data["action"], Value::String("tool".to_string()));
        assert_eq!(
            data["response"],
            Value::String("answer\nweb_search({\"query\": \"x\"})".to_string())
        );
    }

    #[test]
    fn test_strip_wrapping_quotes() {
        assert_eq!(strip_wrapping_quotes("\"x\""), "x");
        assert_eq!(strip_wrapping_quotes("'x'"), "x");
        assert_eq!(strip_wrapping_quotes("\"x'"), "\"x'");
        assert_eq!(strip_wrapping_quotes("\""), "\"");
    }
}
