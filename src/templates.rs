//! System instruction templates.
//!
//! Templates are embedded at compile time from the `prompts/` directory.
//! A file at `<workspace>/prompts/<name>.md` replaces the embedded one.

use std::path::Path;

use tracing::debug;

/// Orchestrator instructions
pub const ORCHESTRATOR: &str = include_str!("../prompts/orchestrator.md");

/// Command line agent instructions
pub const COMMAND_LINE_AGENT: &str = include_str!("../prompts/command_line_agent.md");

/// Web search agent instructions
pub const WEB_SEARCH_AGENT: &str = include_str!("../prompts/web_search_agent.md");

/// All template names and their content
pub const TEMPLATES: &[(&str, &str)] = &[
    ("orchestrator", ORCHESTRATOR),
    ("command_line_agent", COMMAND_LINE_AGENT),
    ("web_search_agent", WEB_SEARCH_AGENT),
];

/// Embedded template by name.
pub fn builtin(name: &str) -> Option<&'static str> {
    TEMPLATES
        .iter()
        .find(|(template, _)| *template == name)
        .map(|(_, content)| *content)
}

/// Instructions for `name`: the workspace override if readable and
/// non-empty, else the embedded template, else an empty string.
pub fn load(workspace: &Path, name: &str) -> String {
    let path = workspace.join("prompts").join(format!("{name}.md"));
    match std::fs::read_to_string(&path) {
        Ok(content) if !content.trim().is_empty() => {
            debug!("Using prompt override {:?}", path);
            content
        }
        _ => builtin(name).unwrap_or_default().to_string(),
    }
}

/// Create all template files in the workspace's `prompts/` directory.
/// Only creates files that don't already exist.
pub fn bootstrap_workspace(workspace: &Path) -> std::io::Result<()> {
    let dir = workspace.join("prompts");
    std::fs::create_dir_all(&dir)?;
    for (name, content) in TEMPLATES {
        let path = dir.join(format!("{name}.md"));
        if !path.exists() {
            std::fs::write(&path, content)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_have_headers() {
        assert!(ORCHESTRATOR.starts_with("# Orchestrator"));
        assert!(COMMAND_LINE_AGENT.contains("execute_command"));
        assert!(WEB_SEARCH_AGENT.contains("web_search"));
    }

    #[test]
    fn test_load_prefers_workspace_override() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load(dir.path(), "orchestrator"), ORCHESTRATOR);

        std::fs::create_dir_all(dir.path().join("prompts")).unwrap();
        std::fs::write(dir.path().join("prompts/orchestrator.md"), "Be brief.").unwrap();
        assert_eq!(load(dir.path(), "orchestrator"), "Be brief.");
        assert_eq!(load(dir.path(), "unknown"), "");
    }

    #[test]
    fn test_bootstrap_keeps_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let prompts = dir.path().join("prompts");
        std::fs::create_dir_all(&prompts).unwrap();
        std::fs::write(prompts.join("web_search_agent.md"), "custom").unwrap();

        bootstrap_workspace(dir.path()).unwrap();
        assert_eq!(std::fs::read_to_string(prompts.join("web_search_agent.md")).unwrap(), "custom");
        assert_eq!(
            std::fs::read_to_string(prompts.join("command_line_agent.md")).unwrap(),
            COMMAND_LINE_AGENT
        );
    }
}
