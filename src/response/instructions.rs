//! Prompt text describing the response schema to the model.

use super::{FieldKind, ResponseFormat, FIELDS};

/// Instructions teaching the model the expected output shape.
pub fn get_instructions(format: ResponseFormat) -> String {
    let fields_doc = FIELDS
        .iter()
        .map(|f| format!("- **{}** ({}): {}", f.name, f.kind.type_name(), f.description))
        .collect::<Vec<_>>()
        .join("\n");

    match format {
        ResponseFormat::Json => format!(
            "## RESPONSE FORMAT\n\n\
             Respond with a single JSON object containing these fields:\n\n\
             {fields_doc}\n\n\
             The \"action\" value must be exactly \"tool\" or exactly \"answer\".\n\
             For a tool call, set \"action\" to \"tool\" and put the call in \"response\" as \
             tool_name({{\"key\": \"value\"}}).\n\n\
             Important: Output ONLY the JSON object, no markdown fences.\n"
        ),
        ResponseFormat::Toon => toon_instructions(&fields_doc),
    }
}

fn toon_instructions(fields_doc: &str) -> String {
    let names = FIELDS.iter().map(|f| f.name).collect::<Vec<_>>().join(", ");
    let example = FIELDS
        .iter()
        .map(|f| match (f.name, f.kind) {
            ("action", _) => "action: answer".to_string(),
            ("response", _) => "response: <final answer OR tool call>".to_string(),
            (name, FieldKind::List) => format!("{name}: [step one, step two]"),
            (name, _) => format!("{name}: <your {name} here>"),
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "## RESPONSE FORMAT\n\n\
         Respond with EXACTLY these fields, in this order, each starting on its own line.\n\
         Write every field as `field_name: value` and leave a blank line between fields.\n\
         The ONLY valid field names are: {names}.\n\n\
         ### Field descriptions\n\n{fields_doc}\n\n\
         ### Rules\n\n\
         1. Field names are lowercase, followed by a colon and a space, then the value.\n\
         2. A value may continue on the following lines; never repeat the field name.\n\
         3. List fields use bracket notation: [item1, item2].\n\
         4. No markdown bold (**), bullets (-) or other decoration on field names.\n\
         5. Use no field names other than the ones listed above.\n\
         6. CRITICAL: 'action' is EXACTLY the word 'tool' or EXACTLY the word 'answer'. \
         A tool name in 'action' (for example 'action: web_search') is ALWAYS WRONG.\n\
         7. CRITICAL: to call a tool, write 'action: tool' and put the whole call in \
         'response' as tool_name({{\"key\": \"value\"}}).\n\n\
         ### Correct vs Wrong\n\n\
         CORRECT:\n```\naction: tool\n\nresponse: web_search({{\"query\": \"latest Rust release\"}})\n```\n\n\
         WRONG (never do this):\n```\naction: web_search\n\nresponse: web_search({{\"query\": \"latest Rust release\"}})\n```\n\n\
         ### Full Example\n\n```\n{example}\n```\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::StructuredResponse;

    #[test]
    fn test_instructions_name_every_field() {
        for format in [ResponseFormat::Json, ResponseFormat::Toon] {
            let text = get_instructions(format);
            for f in FIELDS {
                assert!(text.contains(f.name), "{format} instructions miss {}", f.name);
            }
            assert!(text.contains("\"key\": \"value\""));
        }
    }

    #[test]
    fn test_toon_example_parses_back() {
        let text = get_instructions(ResponseFormat::Toon);
        let example = text
            .rsplit("```\n")
            .nth(1)
            .expect("example block present");
        let parsed = StructuredResponse::from_raw(example);
        assert_eq!(parsed.plan, vec!["step one", "step two"]);
        assert_eq!(parsed.response.flatten(), "<final answer OR tool call>");
    }
}
