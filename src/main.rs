//! localagents CLI entry point

use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use localagents::adapters::CliChannel;
use localagents::config::{self, Config};
use localagents::observability::{self, EventStore, JsonlEventStore, TraceEvent};
use localagents::queue::RequestQueue;
use localagents::ui;

#[derive(Parser)]
#[command(name = "localagents")]
#[command(about = "Local LLM assistant with a ReAct agent loop and traced tool use")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config and prompt templates
    Init,

    /// Show configuration and provider status
    Status,

    /// Chat with the orchestrator
    Chat {
        /// Message to send; omit for interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List recorded traces
    Traces {
        /// Most recent traces to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Show every event of one trace
    Trace {
        /// Trace id (trc_...)
        id: String,
    },

    /// Aggregate statistics over the event log
    Stats,

    /// Show the last events of the log
    Tail {
        #[arg(default_value_t = 20)]
        n: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Ctrl+C twice within 3 seconds exits
    let exit_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let r = exit_flag.clone();
    ctrlc::set_handler(move || {
        if r.load(std::sync::atomic::Ordering::SeqCst) {
            println!("\n👋 Bye!");
            std::process::exit(0);
        } else {
            println!("\n⚠️  Press Ctrl+C again to exit");
            r.store(true, std::sync::atomic::Ordering::SeqCst);

            let r2 = r.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_secs(3));
                r2.store(false, std::sync::atomic::Ordering::SeqCst);
            });
        }
    })
    .ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let config = config::init()?;
            ui::print_success(&format!("Config written to {:?}", config::config_path()));
            ui::print_step(&format!("Workspace: {:?}", config.workspace));
            ui::print_step("Chat: localagents chat -m \"Hello!\"");
        }

        Commands::Status => {
            let config = config::load()?;
            print_status(&config);
        }

        Commands::Chat { message } => {
            let config = config::load()?;
            run_chat(&config, message).await?;
        }

        Commands::Traces { limit } => {
            let events = load_events()?;
            let traces = observability::list_traces(&events);
            if traces.is_empty() {
                ui::print_step("No traces recorded yet");
            }
            let skip = traces.len().saturating_sub(limit);
            for summary in &traces[skip..] {
                println!("{}", observability::format_trace_summary(summary));
            }
        }

        Commands::Trace { id } => {
            let events = load_events()?;
            let trace = observability::show_trace(&events, &id);
            if trace.is_empty() {
                ui::print_warning(&format!("No events for trace {}", id));
            }
            for event in &trace {
                println!("{}", observability::format_event(event));
            }
        }

        Commands::Stats => {
            let events = load_events()?;
            println!("{}", observability::format_stats(&observability::stats(&events)));
        }

        Commands::Tail { n } => {
            let events = load_events()?;
            for event in observability::tail(&events, n) {
                println!("{}", observability::format_event(&event));
            }
        }
    }

    Ok(())
}

fn print_status(config: &Config) {
    let settings = localagents::agent::llm::resolve_provider(&config.model_id, |name| {
        std::env::var(name).ok()
    });
    println!("localagents status\n");
    println!("Workspace: {:?}", config.workspace);
    println!("Model: {}", config.model_id);
    println!("Provider: {}", settings.provider);
    println!(
        "Endpoint: {}",
        config.base_url.as_deref().unwrap_or(&settings.base_url)
    );
    let has_key = config.api_key.is_some() || settings.api_key.is_some();
    println!("API key: {}", if has_key { "✓" } else { "not set" });
    println!("Response format: {}", config.response_format);
    println!("Max iterations: {}", config.max_iterations);
    println!(
        "Observability: {} ({:?})",
        if config.observability.enabled { "on" } else { "off" },
        config.observability.log_path
    );
}

async fn run_chat(config: &Config, message: Option<String>) -> Result<()> {
    let (agent, tracer) = localagents::agents::build(config)?;
    let queue = Arc::new(RequestQueue::new(agent)?);
    let channel = CliChannel::new(Arc::clone(&queue), tracer);

    if let Some(msg) = message {
        let answer = channel.run_once(&msg).await?;
        println!("\n{}", answer);
    } else {
        ui::print_header(&config.model_id, config.response_format.as_str());
        println!("  Interactive mode (exit, quit or Ctrl+D to leave, /clear resets history)");
        channel.run_interactive().await?;
    }

    queue.stop().await;
    Ok(())
}

fn load_events() -> Result<Vec<TraceEvent>> {
    let config = config::load()?;
    let store = JsonlEventStore::new(&config.observability.log_path);
    store
        .load_all()
        .with_context(|| format!("reading {:?}", config.observability.log_path))
}
