//! Locating a JSON object inside free text.

/// Return the first balanced top-level `{...}` span.
///
/// Braces inside JSON string literals do not count towards the depth, and a
/// stray `}` before any `{` is ignored.
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| &text[s..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_first_object() {
        let text = r#"noise {"a": {"b": 1}} tail {"c": 2}"#;
        assert_eq!(extract_json_object(text), Some(r#"{"a": {"b": 1}}"#));
    }

    #[test]
    fn test_braces_inside_strings_ignored() {
        let text = r#"{"response": "use } carefully", "action": "answer"}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn test_unbalanced_returns_none() {
        assert_eq!(extract_json_object("} {\"a\": 1"), None);
        assert_eq!(extract_json_object("plain text"), None);
    }
}
