use std::{
    io::Write as _,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use client_core::{
    ClientError, ClientEvent, HttpObjectStore, HttpRagBackend, MissingObjectStore,
    MissingRagBackend, ObjectStore, RagBackend, SessionController,
};
use shared::{
    domain::{PendingFile, Role},
    protocol::PurgeEmbeddingsQuery,
};
use storage::Storage;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, normalize_database_url, Settings};

#[derive(Parser, Debug)]
#[command(name = "docchat", about = "Chat with your PDF documents")]
struct Cli {
    /// Settings file; defaults to ./docchat.toml when present.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current session token, creating one if needed.
    Session,
    /// Tear down the current session and start a fresh one.
    Reset,
    /// Upload and index a PDF into the current session.
    Upload { file: PathBuf },
    /// Ask one question against the current session.
    Ask { query: String },
    /// Interactive conversation.
    Chat,
    /// Delete stored embeddings on the backend.
    Purge(PurgeArgs),
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct PurgeArgs {
    /// Purge everything indexed for the current session.
    #[arg(long)]
    session: bool,
    /// Purge everything indexed before this RFC 3339 timestamp.
    #[arg(long, value_name = "RFC3339")]
    before: Option<DateTime<Utc>>,
}

#[derive(Debug, PartialEq, Eq)]
enum ChatCommand<'a> {
    Empty,
    Quit,
    Reset,
    Upload(&'a str),
    Ask(&'a str),
    Unknown(&'a str),
}

struct App {
    controller: Arc<SessionController>,
    backend: Arc<dyn RagBackend>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;
    let app = build_app(&settings).await?;
    spawn_event_logger(&app.controller);

    run_command(&app, cli.command).await
}

/// A standalone `reset` skips `initialize()` so a fresh install never creates a token only to
/// tear it down.
async fn run_command(app: &App, command: Command) -> Result<()> {
    if !matches!(command, Command::Reset) {
        app.controller.initialize().await?;
    }
    let seen = app.controller.conversation().await.len();

    match command {
        Command::Session => {
            if let Some(token) = app.controller.session_token().await {
                println!("{token}");
            }
        }
        Command::Reset => {
            let outcome = app.controller.reset().await;
            print_new_entries(&app.controller, seen).await;
            println!("{}", outcome?);
        }
        Command::Upload { file } => {
            let file = pending_file(&file).await?;
            let outcome = app.controller.upload(file).await;
            print_new_entries(&app.controller, seen).await;
            outcome?;
        }
        Command::Ask { query } => {
            let outcome = app.controller.ask(&query).await;
            print_new_entries(&app.controller, seen).await;
            outcome?;
        }
        Command::Chat => run_chat(&app.controller).await?,
        Command::Purge(args) => {
            let query = match (args.session, args.before) {
                (_, Some(before)) => PurgeEmbeddingsQuery::older_than(before),
                _ => {
                    let token = app
                        .controller
                        .session_token()
                        .await
                        .ok_or(ClientError::SessionNotInitialized)?;
                    PurgeEmbeddingsQuery::for_session(token)
                }
            };
            let message = app.backend.purge_embeddings(&query).await?;
            println!("{}", message.as_deref().unwrap_or("Embeddings deleted."));
        }
    }

    Ok(())
}

async fn build_app(settings: &Settings) -> Result<App> {
    let database_url = normalize_database_url(&settings.database_url);
    let storage = Storage::new(&database_url)
        .await
        .with_context(|| format!("failed to open client storage '{database_url}'"))?;
    storage
        .health_check()
        .await
        .with_context(|| format!("client storage '{database_url}' is not usable"))?;

    let object_store: Arc<dyn ObjectStore> = match settings
        .storage_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
    {
        Some(url) => Arc::new(HttpObjectStore::new(
            url,
            settings.storage_bucket.clone(),
            settings.storage_api_key.clone(),
        )?),
        None => {
            warn!("config: storage_url is not set; uploads will fail");
            Arc::new(MissingObjectStore)
        }
    };

    let backend_url = settings.backend_url.trim();
    let backend: Arc<dyn RagBackend> = if backend_url.is_empty() {
        warn!("config: backend_url is not set; uploads and queries will fail");
        Arc::new(MissingRagBackend)
    } else {
        Arc::new(HttpRagBackend::new(backend_url))
    };

    info!(
        "config: backend={backend_url} bucket={} database={database_url}",
        settings.storage_bucket
    );
    let controller = SessionController::new(Arc::new(storage), object_store, Arc::clone(&backend));
    Ok(App {
        controller,
        backend,
    })
}

fn spawn_event_logger(controller: &SessionController) {
    let mut events = controller.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ClientEvent::IngestionPhaseChanged { session, phase }) => {
                    debug!("ingest: phase={phase:?} session={session}")
                }
                Ok(ClientEvent::SessionReset { previous, current }) => {
                    let previous = previous.map(|token| token.to_string()).unwrap_or_default();
                    info!("session: reset previous={previous} current={current}")
                }
                Ok(ClientEvent::ViewChanged(view)) => debug!("view: now={view:?}"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("events: lagged skipped={skipped}"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn run_chat(controller: &Arc<SessionController>) -> Result<()> {
    let mut seen = print_new_entries(controller, 0).await;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_chat_line(&line) {
            ChatCommand::Empty => continue,
            ChatCommand::Quit => break,
            ChatCommand::Reset => {
                match controller.reset().await {
                    Ok(_) => seen = 0,
                    Err(err) => warn!("chat: reset failed: {err}"),
                }
            }
            ChatCommand::Upload(path) => match pending_file(Path::new(path)).await {
                Ok(file) => {
                    if let Err(err) = controller.upload(file).await {
                        debug!("chat: upload failed: {err}");
                    }
                }
                Err(err) => println!("{err:#}"),
            },
            ChatCommand::Ask(text) => {
                if let Err(err) = controller.ask(text).await {
                    println!("{}", err.user_message());
                }
            }
            ChatCommand::Unknown(line) => {
                println!("Unknown command '{line}'. Use /upload <path>, /reset or /quit.")
            }
        }
        seen = print_new_entries(controller, seen).await;
    }
    Ok(())
}

fn parse_chat_line(line: &str) -> ChatCommand<'_> {
    let line = line.trim();
    if line.is_empty() {
        return ChatCommand::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return ChatCommand::Ask(line);
    };
    let (name, arg) = rest
        .split_once(char::is_whitespace)
        .map(|(name, arg)| (name, arg.trim()))
        .unwrap_or((rest, ""));
    match name {
        "quit" | "exit" => ChatCommand::Quit,
        "reset" => ChatCommand::Reset,
        "upload" if !arg.is_empty() => ChatCommand::Upload(arg),
        _ => ChatCommand::Unknown(line),
    }
}

/// Prints assistant entries past `seen` and returns the new conversation length.
async fn print_new_entries(controller: &SessionController, seen: usize) -> usize {
    let conversation = controller.conversation().await;
    for entry in conversation.iter().skip(seen) {
        if entry.role == Role::Assistant {
            println!("{}", entry.content);
        }
    }
    conversation.len()
}

async fn pending_file(path: &Path) -> Result<PendingFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mime_type = mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream");
    Ok(PendingFile::new(name, bytes, mime_type))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
