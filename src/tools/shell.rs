//! Shell tool - execute commands behind a deny-list

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, warn};

use super::Tool;
use crate::error::Error;
use crate::Result;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const MAX_OUTPUT_CHARS: usize = 4000;

fn deny_list() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)\brm\s+-(rf|fr)\b",
            r"(?i)\bdd\b",
            r"(?i)\bmkfs\b",
            r"(?i)\bformat\b",
            r"(?i)\b(shutdown|reboot|halt)\b",
            r":\s*\(\s*\)\s*\{",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Why `command` must not run, if it must not.
fn blocked_reason(command: &str, allow_sudo: bool) -> Option<&'static str> {
    let uses_sudo = command
        .split(|c: char| c.is_whitespace() || matches!(c, ';' | '&' | '|'))
        .any(|token| token.eq_ignore_ascii_case("sudo"));
    if uses_sudo && !allow_sudo {
        return Some("sudo is not allowed");
    }
    if deny_list().iter().any(|rx| rx.is_match(command)) {
        return Some("command matches the deny-list");
    }
    None
}

/// Run a non-interactive shell command
pub struct CommandTool {
    workspace: PathBuf,
}

impl CommandTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for CommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Execute a safe, non-interactive shell command and return its output"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "cwd": {
                    "type": "string",
                    "description": "Working directory (optional, defaults to workspace)"
                },
                "timeout": {
                    "type": "number",
                    "description": "Timeout in seconds (default 10)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let command = ["command", "inputs", "query"]
            .iter()
            .find_map(|key| params.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Tool("Missing 'command' parameter".to_string()))?;

        let allow_sudo = params
            .get("allow_sudo")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if let Some(reason) = blocked_reason(command, allow_sudo) {
            warn!("Refusing to run '{}': {}", command, reason);
            return Err(Error::Tool(format!("unsafe to run ({reason})")));
        }

        let cwd = params
            .get("cwd")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.workspace.clone());
        let timeout = params
            .get("timeout")
            .and_then(Value::as_u64)
            .filter(|&t| t > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        debug!("Running '{}' in {} (timeout {}s)", command, cwd.display(), timeout);
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&cwd)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(Duration::from_secs(timeout), child)
            .await
            .map_err(|_| Error::Tool(format!("Command timed out after {timeout}s")))?
            .map_err(|e| Error::Tool(format!("Failed to execute command: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let text = if !stdout.trim().is_empty() {
            stdout
        } else {
            stderr
        };

        if text.trim().is_empty() {
            return Ok(format!(
                "(no output, exit code {})",
                output.status.code().unwrap_or(-1)
            ));
        }
        Ok(cap_output(&text))
    }
}

fn cap_output(text: &str) -> String {
    if text.chars().count() <= MAX_OUTPUT_CHARS {
        return text.to_string();
    }
    let kept: String = text.chars().take(MAX_OUTPUT_CHARS).collect();
    format!("{kept}\n...[truncated]")
}
