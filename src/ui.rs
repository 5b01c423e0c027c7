use colored::*;
use terminal_size::{terminal_size, Height, Width};

use crate::observability::TraceEvent;

/// Characters of a live answer or tool message shown before eliding.
const LIVE_PREVIEW_CHARS: usize = 160;

pub fn print_header(model_id: &str, response_format: &str) {
    let (width, _) = terminal_size().unwrap_or((Width(80), Height(24)));
    let width = width.0 as usize;

    let line = "─".repeat(width);
    println!("{}", line.black().bold());

    let name = "localagents".yellow().bold();
    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();
    println!("  {} {}", name, version);

    let info = format!("  {}  •  {}", model_id, response_format).cyan();
    println!("{}", info);

    if let Ok(path) = std::env::current_dir() {
        let path_str = path.to_string_lossy().black().bold();
        println!("  {}", path_str);
    }

    println!("{}", line.black().bold());
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "❌".red().bold(), msg.red());
}

pub fn print_thinking(msg: &str) {
    println!("  {} {}...", "∴".magenta(), msg);
}

fn preview(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let mut short: String = first_line.chars().take(LIVE_PREVIEW_CHARS).collect();
    if first_line.chars().count() > LIVE_PREVIEW_CHARS || text.trim().lines().count() > 1 {
        short.push('…');
    }
    short
}

/// One-line step feedback for a trace event, or `None` for events the
/// REPL does not surface.
pub fn live_line(event: &TraceEvent) -> Option<String> {
    let agent = event.agent.as_deref().unwrap_or("?");
    let iteration = event.meta.get("iteration").and_then(|v| v.as_u64());
    let text = match event.event_type.as_str() {
        "iteration_start" => format!("{} step {}", agent, iteration.unwrap_or(0)),
        "thought" => format!("{} thinks: {}", agent, preview(event.message.as_deref()?)),
        "tool_start" => format!("{} → {}", agent, event.meta_str("tool")?),
        "tool_error" => format!(
            "{} ✗ {}: {}",
            agent,
            event.meta_str("tool").unwrap_or("?"),
            event.meta_str("error").unwrap_or("failed")
        ),
        "agent_end" => format!("{} done", agent),
        "error" => format!("{} error: {}", agent, event.meta_str("error").unwrap_or("unknown")),
        "exhausted" => format!("{} gave up after {} steps", agent, event.meta.get("iterations")?),
        _ => return None,
    };
    Some(text)
}

/// Print [`live_line`] output in the REPL's dim style.
pub fn print_live_event(event: &TraceEvent) {
    if let Some(line) = live_line(event) {
        let styled = match event.event_type.as_str() {
            "tool_error" | "error" | "exhausted" => line.red(),
            "tool_start" => line.cyan(),
            _ => line.black().bold(),
        };
        println!("  {} {}", "∴".magenta(), styled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::{EventFields, Tracer};

    fn event(event_type: &str, fields: EventFields) -> TraceEvent {
        Tracer::in_memory()
            .log_event(event_type, fields.agent("orchestrator"))
            .unwrap()
    }

    #[test]
    fn test_live_lines() {
        let e = event("iteration_start", EventFields::new().meta("iteration", 2));
        assert_eq!(live_line(&e).unwrap(), "orchestrator step 2");

        let e = event("tool_start", EventFields::new().meta("tool", "web_search_agent"));
        assert_eq!(live_line(&e).unwrap(), "orchestrator → web_search_agent");

        let e = event("model_end", EventFields::new().message("x"));
        assert!(live_line(&e).is_none());
    }

    #[test]
    fn test_preview_elides_multiline() {
        assert_eq!(preview("one line"), "one line");
        assert_eq!(preview("first\nsecond"), "first…");
        assert_eq!(preview(&"x".repeat(200)).chars().count(), LIVE_PREVIEW_CHARS + 1);
    }
}
