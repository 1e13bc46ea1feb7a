use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use helpdesk_core::markup::{self, LineKind, Segment};
use helpdesk_core::{ChatRole, ChatUpdate, Config, Conversation, HelpdeskClient};
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "helpdesk")]
#[command(about = "Chat with the IT helpdesk assistant", version)]
struct Cli {
    /// Helpdesk endpoint URL (overrides the config file)
    #[arg(long, global = true, env = "HELPDESK_ENDPOINT")]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question and print the answer
    Ask {
        /// Your question
        question: String,
        /// Wait for the full answer and print it formatted
        #[arg(short, long)]
        render: bool,
    },
    /// Show the effective configuration, or change it
    Config {
        /// Save a new default endpoint
        #[arg(long)]
        set_endpoint: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().unwrap_or_else(|error| {
        eprintln!("{}: {:#}", "Ignoring unreadable config".yellow(), error);
        Config::new()
    });
    let endpoint = config.resolve_endpoint(cli.endpoint.as_deref());

    match cli.command {
        None => {
            init_logging(true)?;
            let client = HelpdeskClient::from_config(&config, &endpoint)?;
            run_tui(client).await
        }
        Some(Commands::Ask { question, render }) => {
            init_logging(false)?;
            let client = HelpdeskClient::from_config(&config, &endpoint)?;
            ask_once(&client, &question, render, &mut io::stdout()).await
        }
        Some(Commands::Config { set_endpoint }) => show_config(&config, &endpoint, set_endpoint),
    }
}

/// Log to stderr, or to a file when the TUI owns the terminal.
fn init_logging(to_file: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if to_file {
        let path = log_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Could not open log file {}", path.display()))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .with_target(true)
            .init();
    }
    Ok(())
}

fn log_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| anyhow!("Could not determine data directory"))?;

    Ok(data_dir.join("helpdesk").join("helpdesk.log"))
}

async fn run_tui(client: HelpdeskClient) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut app = App::new(client);
    let mut events = EventHandler::new();

    let result = run_loop(&mut terminal, &mut app, &mut events).await;

    app.abort_query();
    tui::restore()?;
    result
}

async fn run_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    let sender = events.sender();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event, &sender)?,
            None => break,
        }
    }

    Ok(())
}

/// Run one turn, writing the answer to `out`. Fails when the turn failed.
async fn ask_once<W: Write>(
    client: &HelpdeskClient,
    question: &str,
    render: bool,
    out: &mut W,
) -> Result<()> {
    let mut conversation = Conversation::new();
    let request = conversation.submit(question)?;

    client
        .run_turn(&request, |update| {
            if !render {
                if let ChatUpdate::Chunk(text) | ChatUpdate::Reply { content: text, .. } = &update {
                    if let Err(error) = write!(out, "{}", text).and_then(|()| out.flush()) {
                        tracing::warn!(%error, "could not write answer chunk");
                    }
                }
            }
            conversation.apply(update);
        })
        .await;

    let answer = conversation
        .messages()
        .iter()
        .rev()
        .find(|m| m.role == ChatRole::Assistant);

    if let Some(answer) = answer {
        if render {
            write_rendered(out, &answer.content)?;
        } else {
            writeln!(out)?;
        }
        if let Some(source) = &answer.source {
            writeln!(out, "{}", format!("Source: {}", source).dimmed())?;
        }
    }

    if let Some(error) = conversation.last_error() {
        return Err(anyhow!("{}", error));
    }
    Ok(())
}

fn write_rendered<W: Write>(out: &mut W, text: &str) -> io::Result<()> {
    for line in markup::render(text) {
        let mut rendered = String::new();
        if line.kind == LineKind::Bullet {
            rendered.push_str(&"  • ".yellow().to_string());
        }
        for segment in &line.segments {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Bold(text) => rendered.push_str(&text.bold().to_string()),
                Segment::Italic(text) => rendered.push_str(&text.italic().to_string()),
                Segment::Link { text, url } => {
                    rendered.push_str(&format!("{} ({})", text.underline().blue(), url.dimmed()));
                }
            }
        }
        writeln!(out, "{}", rendered)?;
    }
    Ok(())
}

fn show_config(config: &Config, endpoint: &str, set_endpoint: Option<String>) -> Result<()> {
    if let Some(new_endpoint) = set_endpoint {
        Config::save_endpoint(&new_endpoint)?;
        println!("{} {}", "Saved endpoint:".green(), new_endpoint.bold());
        return Ok(());
    }

    println!("{}", "Helpdesk configuration".bold().blue());
    println!("{}", "=".repeat(30).dimmed());
    println!("  config file:     {}", Config::get_config_path()?.display());
    println!("  endpoint:        {}", endpoint.green());
    println!("  connect timeout: {}s", config.connect_timeout_secs());
    println!("  log file:        {}", log_path()?.display());
    Ok(())
}
