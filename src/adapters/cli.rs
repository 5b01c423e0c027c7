//! CLI adapter - interactive and single-message command line interface.
//!
//! Every message goes through the [`RequestQueue`]. In interactive mode the
//! stdin reader runs on its own OS thread and submits with
//! [`RequestQueue::submit_threadsafe`], so the runtime never blocks on input.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use colored::*;
use serde_json::{Map, Value};
use tracing::debug;

use crate::agent::Message;
use crate::observability::Tracer;
use crate::queue::{extract_response, RequestQueue};
use crate::ui;
use crate::{Error, Result};

/// CLI channel for agent sessions.
pub struct CliChannel {
    queue: Arc<RequestQueue>,
    tracer: Arc<Tracer>,
}

fn cli_metadata() -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("source".to_string(), Value::from("cli"));
    metadata
}

enum Input {
    Exit,
    Clear,
    Skip,
    Message(String),
}

fn classify(line: &str) -> Input {
    let input = line.trim();
    if input.is_empty() {
        return Input::Skip;
    }
    match input.to_lowercase().as_str() {
        "exit" | "quit" | "q" => Input::Exit,
        "/clear" => Input::Clear,
        _ => Input::Message(input.to_string()),
    }
}

impl CliChannel {
    pub fn new(queue: Arc<RequestQueue>, tracer: Arc<Tracer>) -> Self {
        Self { queue, tracer }
    }

    /// Run a single message and return the printable answer.
    pub async fn run_once(&self, message: &str) -> Result<String> {
        let result = self.queue.submit(message, cli_metadata()).await?;
        Ok(extract_response(&result))
    }

    /// Run the interactive REPL until EOF or an exit command.
    pub async fn run_interactive(&self) -> Result<()> {
        let sink = self.tracer.register_sink(ui::print_live_event);
        let queue = Arc::clone(&self.queue);

        let reader = std::thread::Builder::new()
            .name("cli-stdin".to_string())
            .spawn(move || repl(&queue))?;
        let outcome = tokio::task::spawn_blocking(move || reader.join())
            .await
            .map_err(|e| Error::Other(format!("REPL task failed: {}", e)))?;

        self.tracer.unregister_sink(sink);
        match outcome {
            Ok(result) => result,
            Err(_) => Err(Error::Other("REPL thread panicked".to_string())),
        }
    }
}

/// Blocking read-submit-print loop. History lives on this thread.
fn repl(queue: &RequestQueue) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut history: Vec<Message> = Vec::new();

    loop {
        print!("\n{} ", ">".blue().bold());
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            break;
        }

        let input = match classify(&line) {
            Input::Skip => continue,
            Input::Exit => {
                println!("Goodbye! 👋");
                break;
            }
            Input::Clear => {
                history.clear();
                ui::print_step("History cleared");
                continue;
            }
            Input::Message(input) => input,
        };

        let reply = queue
            .submit_threadsafe(&input, cli_metadata(), &history)
            .and_then(|handle| handle.wait());
        match reply {
            Ok(result) => {
                let answer = extract_response(&result);
                println!("\n{}: {}", "Agent".green().bold(), answer);
                history.push(Message::user(input));
                history.push(Message::assistant(answer));
            }
            Err(e) => {
                debug!("Request failed: {}", e);
                eprintln!("\n{}: {}", "Error".red().bold(), e);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::ScriptedInference;
    use crate::agent::ReActAgent;

    #[test]
    fn test_classify_input() {
        assert!(matches!(classify("   "), Input::Skip));
        assert!(matches!(classify("QUIT\n"), Input::Exit));
        assert!(matches!(classify("/clear"), Input::Clear));
        assert!(matches!(classify(" hello \n"), Input::Message(m) if m == "hello"));
    }

    #[tokio::test]
    async fn test_run_once_goes_through_queue() {
        let tracer = Arc::new(Tracer::in_memory());
        let inference = Arc::new(ScriptedInference::new(vec![
            "thinking: easy\naction: answer\nresponse: Hello there",
        ]));
        let agent = Arc::new(ReActAgent::builder("orchestrator", inference, tracer.clone()).build());
        let queue = Arc::new(RequestQueue::new(agent).unwrap());

        let channel = CliChannel::new(queue.clone(), tracer);
        assert_eq!(channel.run_once("hi").await.unwrap(), "Hello there");
        assert!(queue.is_running());
        assert!(channel.run_once("").await.is_err());
    }
}
