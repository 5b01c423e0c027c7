//! Prompt rendering.
//!
//! A prompt is a fixed sequence of sections separated by blank lines:
//! system instructions, time context, recent history, the capability
//! catalog, the response-format instructions and the current request.
//! Empty sections are left out.

use chrono::{Local, SecondsFormat, Utc};

use super::message::ConversationHistory;

/// Messages of history included in a prompt unless configured otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Static prompt parts of one agent, rendered against its live history.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_instructions: String,
    tools_instructions: String,
    response_instructions: String,
    history_limit: usize,
}

impl PromptBuilder {
    pub fn new(
        system_instructions: impl Into<String>,
        tools_instructions: impl Into<String>,
        response_instructions: impl Into<String>,
    ) -> Self {
        Self {
            system_instructions: system_instructions.into(),
            tools_instructions: tools_instructions.into(),
            response_instructions: response_instructions.into(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn render(&self, history: &ConversationHistory, user_input: &str) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(6);

        if !self.system_instructions.trim().is_empty() {
            parts.push(self.system_instructions.trim().to_string());
        }
        parts.push(time_context());
        if let Some(history) = self.format_history(history) {
            parts.push(history);
        }
        if !self.tools_instructions.is_empty() {
            parts.push(self.tools_instructions.clone());
        }
        parts.push(self.response_instructions.clone());
        parts.push(format!("## CURRENT REQUEST\n\n{user_input}"));

        parts.join("\n\n")
    }

    /// `## CONVERSATION HISTORY` with the last `history_limit` messages, numbered from 1.
    fn format_history(&self, history: &ConversationHistory) -> Option<String> {
        let recent = history.recent(self.history_limit);
        if recent.is_empty() {
            return None;
        }
        let mut lines = vec!["## CONVERSATION HISTORY".to_string(), String::new()];
        lines.extend(recent.iter().enumerate().map(|(i, msg)| {
            format!(
                "{}. [{}]: {}",
                i + 1,
                msg.role.as_str().to_uppercase(),
                msg.content
            )
        }));
        Some(lines.join("\n"))
    }
}

fn time_context() -> String {
    let local = Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
    let utc = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    format!("## CONTEXT\nCurrent local time: {local}\nCurrent UTC time: {utc}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::Message;

    fn builder() -> PromptBuilder {
        PromptBuilder::new("You are a tester.", "## AVAILABLE TOOLS\n\n...", "## RESPONSE FORMAT")
    }

    #[test]
    fn test_section_order() {
        let mut history = ConversationHistory::new();
        history.push(Message::user("What is 2+2?"));
        let prompt = builder().render(&history, "What is 2+2?");

        let positions: Vec<usize> = [
            "You are a tester.",
            "## CONTEXT",
            "## CONVERSATION HISTORY",
            "## AVAILABLE TOOLS",
            "## RESPONSE FORMAT",
            "## CURRENT REQUEST",
        ]
        .iter()
        .map(|s| prompt.find(s).unwrap_or_else(|| panic!("missing {s}")))
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(prompt.contains("1. [USER]: What is 2+2?"));
        assert!(prompt.ends_with("## CURRENT REQUEST\n\nWhat is 2+2?"));
    }

    #[test]
    fn test_empty_sections_skipped() {
        let prompt = PromptBuilder::new("", "", "## RESPONSE FORMAT")
            .render(&ConversationHistory::new(), "hi");
        assert!(prompt.starts_with("## CONTEXT"));
        assert!(!prompt.contains("## CONVERSATION HISTORY"));
        assert!(!prompt.contains("## AVAILABLE TOOLS"));
    }

    #[test]
    fn test_history_window() {
        let mut history = ConversationHistory::new();
        for i in 0..30 {
            history.push(Message::assistant(format!("turn {i}")));
        }
        let prompt = builder().with_history_limit(5).render(&history, "next");
        assert!(prompt.contains("1. [ASSISTANT]: turn 25"));
        assert!(prompt.contains("5. [ASSISTANT]: turn 29"));
        assert!(!prompt.contains("turn 24"));
    }
}
