//! cadence - plan/action/observe agent CLI

mod config;
mod input;
mod prompt;
mod session;
mod tools;
mod utils;

use anyhow::{Context, bail};
use cadence_agent::{Agent, AgentConfig, AgentEvent, Checkpointer, ToolRegistry, TurnController};
use cadence_ai::providers::openai::{OpenAIClient, RetryConfig};
use cadence_ai::{Model, Provider, models};
use clap::Parser;
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::{Config, DEFAULT_MAX_STEPS};
use crate::input::{Interrupts, LineReader};
use crate::session::FileCheckpointer;
use crate::tools::{CommandPolicy, CommandTool, ConfirmMode, StdinApprover, WeatherTool};

/// cadence - an assistant that plans, calls tools and observes before answering
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to use (default: gpt-4.1)
    #[arg(short, long)]
    model: Option<String>,

    /// Provider (openai, ollama, groq, openrouter, custom)
    #[arg(short, long)]
    provider: Option<String>,

    /// Chat Completions base URL, overriding the provider default
    #[arg(long)]
    base_url: Option<String>,

    /// Most model calls one turn may make
    #[arg(long)]
    max_steps: Option<u32>,

    /// Run in non-interactive mode with a single prompt
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Resume (or start) a checkpointed thread by ID
    #[arg(short, long)]
    thread: Option<String>,

    /// List checkpointed threads
    #[arg(long)]
    sessions: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Program execute_command may run (repeatable)
    #[arg(long = "allow", value_name = "PROGRAM")]
    allow: Vec<String>,

    /// When to ask before running a command
    #[arg(long, value_enum)]
    confirm: Option<ConfirmMode>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.verbose || std::env::var_os("RUST_LOG").is_some() {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("cadence=debug,cadence_agent=debug,cadence_ai=debug")
        });
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }

    let code = match run(args).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    io::stdout().flush().ok();
    // The stdin reader may still be parked in a blocking read
    std::process::exit(code);
}

async fn run(args: Args) -> anyhow::Result<()> {
    // Initialize config and exit
    if args.init_config {
        let path = Config::init().context("creating config")?;
        println!("Config file at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    let checkpointer = Arc::new(FileCheckpointer::new(FileCheckpointer::threads_dir()));

    // List threads and exit
    if args.sessions {
        return list_sessions(&checkpointer).await;
    }

    // Merge config with CLI args (CLI takes precedence)
    let cfg = Config::load();

    let provider = args
        .provider
        .as_deref()
        .or(cfg.provider.as_deref())
        .map(|id| {
            Provider::from_id(id).with_context(|| {
                format!("Unknown provider '{}' (expected openai, ollama, groq, openrouter or custom)", id)
            })
        })
        .transpose()?;

    let model_id = args
        .model
        .or(cfg.model.clone())
        .unwrap_or_else(|| models::DEFAULT_MODEL_ID.to_string());

    let mut model = models::resolve(provider, &model_id);
    if let Some(base_url) = args.base_url.or(cfg.base_url.clone()) {
        model = model.with_base_url(base_url);
    }

    let client = build_client(&cfg, &model)?;

    let lines = LineReader::stdin();
    let mut interrupts = Interrupts::listen();

    // Tools
    let mut allow = cfg.commands.allow.clone();
    allow.extend(args.allow);
    let confirm = args.confirm.or(cfg.commands.confirm).unwrap_or_default();
    let tools = ToolRegistry::new()
        .with(Arc::new(WeatherTool::new()))
        .with(Arc::new(CommandTool::new(
            CommandPolicy::new(allow, confirm),
            Arc::new(StdinApprover::new(lines.clone())),
        )));

    let system_prompt = cfg
        .system_prompt()
        .unwrap_or_else(|| prompt::build_system_prompt(&tools));

    let max_steps = args.max_steps.or(cfg.max_steps).unwrap_or(DEFAULT_MAX_STEPS);
    let config = AgentConfig::try_new(model.clone(), max_steps)?.with_system_prompt(system_prompt);
    let controller = Arc::new(TurnController::new(config, Arc::new(client), tools));

    let thread_id = args
        .thread
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    let mut agent = Agent::resume(controller, thread_id, checkpointer).await?;

    // Non-interactive mode
    if let Some(command) = args.command {
        return run_command(&mut agent, &command, &mut interrupts).await;
    }

    run_interactive(&mut agent, &model, &lines, &mut interrupts).await
}

fn build_client(cfg: &Config, model: &Model) -> anyhow::Result<OpenAIClient> {
    let api_key = cfg.get_api_key(model.provider.id());

    let client = match (api_key, model.provider.api_key_env_var()) {
        (Some(key), _) => OpenAIClient::new(key),
        (None, None) => OpenAIClient::without_auth(),
        (None, Some(var)) => {
            bail!(
                "No API key found for {}. Set it with: export {}=your-key (or add it to the config file: cadence --init-config)",
                model.provider.name(),
                var
            );
        }
    };

    let retries = cfg.retries.unwrap_or(0);
    Ok(client.with_retry_config(RetryConfig {
        max_retries: retries,
        ..Default::default()
    }))
}

/// Print turn commentary until the turn's terminal event
fn spawn_event_printer(agent: &Agent) -> JoinHandle<()> {
    let mut receiver = agent.controller().subscribe();
    let is_tty = io::stderr().is_terminal();

    tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            let terminal = event.is_terminal();
            match event {
                AgentEvent::Plan { content } => {
                    println!("[plan] {}", content);
                }
                AgentEvent::Observe { content } => {
                    println!("[observe] {}", content);
                }
                AgentEvent::ToolExecutionStart {
                    tool_name, input, ..
                } => {
                    print!("[{} {}...", tool_name, utils::preview(&input, 60));
                    io::stdout().flush().ok();
                }
                AgentEvent::ToolExecutionEnd {
                    observation,
                    is_error,
                    ..
                } => {
                    if is_error {
                        println!(" error]");
                        println!("  {}", utils::preview(&observation, 80));
                    } else {
                        println!(" {}]", utils::preview(&observation, 60));
                    }
                }
                AgentEvent::Output { content } => {
                    println!("\n{}", content);
                }
                AgentEvent::TurnEnd { model_calls, usage } => {
                    // Stats go to stderr so they don't interfere with piped output
                    if is_tty {
                        eprintln!(
                            "[{} model calls | {} in, {} out]",
                            model_calls, usage.prompt_tokens, usage.completion_tokens
                        );
                    }
                }
                _ => {}
            }
            if terminal {
                break;
            }
        }
    })
}

/// Let the printer drain, then stop it
async fn finish_printer(mut handle: JoinHandle<()>) {
    let _ = tokio::time::timeout(Duration::from_millis(500), &mut handle).await;
    handle.abort();
}

async fn run_command(
    agent: &mut Agent,
    command: &str,
    interrupts: &mut Interrupts,
) -> anyhow::Result<()> {
    let printer = spawn_event_printer(agent);

    let result = tokio::select! {
        result = agent.prompt(command) => result.map(|_| ()).map_err(anyhow::Error::from),
        _ = interrupts.next() => Err(anyhow::anyhow!("Interrupted")),
    };

    finish_printer(printer).await;
    result
}

async fn run_interactive(
    agent: &mut Agent,
    model: &Model,
    lines: &LineReader,
    interrupts: &mut Interrupts,
) -> anyhow::Result<()> {
    if io::stderr().is_terminal() {
        eprintln!("cadence ({}) thread: {}", model.id, agent.thread_id());
        if !agent.messages().is_empty() {
            eprintln!("Resumed {} messages", agent.messages().len());
        }
        eprintln!("Commands: /history, /clear, /exit");
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = interrupts.next() => {
                eprintln!();
                break;
            }
        };
        // EOF
        let Some(input) = line else {
            break;
        };

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/exit" | "/quit" => break,
            "/clear" => {
                agent.clear().await?;
                println!("Cleared conversation.\n");
                continue;
            }
            "/history" => {
                print_history(agent);
                continue;
            }
            _ if input.starts_with('/') => {
                println!("Unknown command: {}", input);
                println!("Commands: /history, /clear, /exit\n");
                continue;
            }
            _ => {}
        }

        let printer = spawn_event_printer(agent);

        tokio::select! {
            result = agent.prompt(input) => {
                if let Err(e) = result {
                    eprintln!("Error: {}", e);
                }
            }
            _ = interrupts.next() => {
                eprintln!("\n[Interrupted]");
            }
        }

        finish_printer(printer).await;
        println!();
    }

    Ok(())
}

fn print_history(agent: &Agent) {
    let messages = agent.messages();
    if messages.is_empty() {
        println!("No messages yet.\n");
        return;
    }
    for (i, msg) in messages.iter().enumerate() {
        let label = match msg.step() {
            Some(step) => format!("{}/{}", msg.role().as_str(), step),
            None => msg.role().as_str().to_string(),
        };
        println!("  {:>3}: [{}] {}", i, label, utils::preview(msg.content(), 70));
    }
    println!();
}

async fn list_sessions(checkpointer: &FileCheckpointer) -> anyhow::Result<()> {
    let threads = checkpointer.list().await?;
    if threads.is_empty() {
        println!("No saved threads found.");
        println!("Threads are stored in: {}", checkpointer.dir().display());
        return Ok(());
    }

    println!("Saved threads:\n");
    println!("{:<34} {:<18} Msgs", "ID", "Updated");
    println!("{}", "-".repeat(60));
    for t in threads {
        println!(
            "{:<34} {:<18} {}",
            t.thread_id,
            t.updated_at_display(),
            t.message_count
        );
    }
    println!("\nResume with: cadence --thread <id>");
    Ok(())
}
