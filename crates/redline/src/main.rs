//! Run one agent turn against a project directory and print its diff.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Ask for a change in the current directory
//! redline --prompt "Add a doc comment to every public fn in src/lib.rs"
//!
//! # Another project, with files already open in the editor
//! redline --workdir ../app --open src/main.rs --open Cargo.toml \
//!   --prompt "Bump the edition to 2024"
//!
//! # Prompt from stdin, verbose logging
//! echo "Delete the unused helpers module" | redline -vv
//! ```
//!
//! Ctrl-C aborts the turn; the diff of whatever completed is still printed.

use clap::Parser;
use redline::prelude::*;
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Run one agent turn and print the unified diff of its file changes.
///
/// Reads the API key from the OPENROUTER_KEY environment variable.
#[derive(Parser)]
#[command(name = "redline", version)]
struct Cli {
    /// Project root the file tools operate in.
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// Prompt to send. Read from stdin when omitted.
    #[arg(long)]
    prompt: Option<String>,

    /// Model to use for completions.
    #[arg(long, default_value = redline::DEFAULT_MODEL)]
    model: String,

    /// Maximum model rounds in the turn.
    #[arg(long, default_value_t = redline::agent::DEFAULT_MAX_ROUNDS)]
    max_rounds: u32,

    /// Maximum tokens per model response.
    #[arg(long, default_value_t = 8192)]
    max_tokens: u32,

    /// Sampling temperature.
    #[arg(long, default_value_t = 0.0)]
    temperature: f32,

    /// OpenAI-compatible chat completions endpoint.
    #[arg(long, default_value = redline::OPENROUTER_URL)]
    base_url: String,

    /// Retries for transient failures establishing the stream.
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Treat a file as open in the editor (counts as already read).
    /// Repeatable.
    #[arg(long = "open")]
    open: Vec<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, String> {
    let workdir = std::fs::canonicalize(&cli.workdir)
        .map_err(|e| format!("cannot open workdir '{}': {e}", cli.workdir.display()))?;
    let prompt = read_prompt(cli.prompt.as_deref())?;

    let store = Arc::new(LocalFileStore::new());
    let open_files = Arc::new(OpenFiles::new());
    for path in &cli.open {
        let content = store
            .read(&workdir, path)
            .await?
            .ok_or_else(|| format!("--open file not found: '{path}'"))?;
        open_files.open(path, content);
    }

    let config = SessionConfig::new(cli.model)
        .with_credential(std::env::var("OPENROUTER_KEY").ok())
        .with_max_rounds(cli.max_rounds)
        .with_max_tokens(cli.max_tokens)
        .with_temperature(cli.temperature)
        .with_retries(cli.retries);

    let handler = CompositeEventHandler::new()
        .with_if(cli.verbose > 0, LoggingHandler)
        .with(FnEventHandler::new(print_event));

    let client = Arc::new(OpenRouterClient::new()?.with_url(cli.base_url));
    let mut session = Session::new(client, store, workdir, config)
        .with_open_files(open_files)
        .with_event_handler(Arc::new(handler));

    let abort = session.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    let summary = session.send(&prompt).await.map_err(|e| e.to_string())?;
    println!();
    if cli.verbose > 0 {
        eprintln!(
            "Tokens: {} prompt, {} completion over {} round(s)",
            summary.usage.prompt_tokens.unwrap_or(0),
            summary.usage.completion_tokens.unwrap_or(0),
            summary.rounds_used
        );
    }

    if session.change_set_count() > 0 {
        println!("{}", session.diff_text());
    } else {
        eprintln!("{}", session.diff_text());
    }

    Ok(match summary.state {
        TurnState::Completed => {
            if summary.round_limit_reached {
                eprintln!(
                    "Stopped after {} rounds (round limit).",
                    summary.rounds_used
                );
            }
            ExitCode::SUCCESS
        }
        TurnState::Canceled => {
            eprintln!("Canceled.");
            ExitCode::from(130)
        }
        _ => {
            if let Some(error) = session.last_error() {
                eprintln!("Error: {error}");
            }
            ExitCode::FAILURE
        }
    })
}

/// Stream assistant text to stdout and tool activity to stderr.
fn print_event(event: &TurnEvent<'_>) {
    match event {
        TurnEvent::TextDelta(text) => {
            print!("{text}");
            let _ = io::stdout().flush();
        }
        TurnEvent::ToolResult { name, ok, output, .. } => {
            if *ok {
                eprintln!("  [{name}] ok");
            } else {
                eprintln!("  [{name}] {output}");
            }
        }
        _ => {}
    }
}

fn read_prompt(flag: Option<&str>) -> Result<String, String> {
    if let Some(prompt) = flag {
        return Ok(prompt.to_string());
    }
    if io::stdin().is_terminal() {
        return Err("provide --prompt or pipe a prompt on stdin".to_string());
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| format!("failed to read stdin: {e}"))?;
    Ok(buf)
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("redline={level}")));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}
