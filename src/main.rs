use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pagechat_core::{
    lifecycle, BackendClient, ChatPanel, Config, FileStore, KeyValueStore, MemoryStore, Relay,
    WireMessage,
};

mod app;
mod handler;
mod host;
mod logging;
mod tui;
mod ui;

use app::App;
use host::{validate_page_url, ActiveTab, TerminalSurface};

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "pagechat")]
#[command(about = "Chat with a RAG backend about a web page", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Backend base URL (overrides config and PAGECHAT_BACKEND_URL)
    #[arg(short, long, global = true)]
    backend: Option<String>,

    /// Page to ask about
    #[arg(short, long, global = true)]
    url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the chat panel (default)
    Chat,
    /// Ask a single question and print the answer
    Ask {
        /// Your question
        question: String,
    },
    /// Check that the backend is up
    Health,
    /// Reset the saved conversation to the greeting
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::configure_logging();

    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not load config, using defaults");
        Config::default()
    });
    if let Some(backend) = cli.backend {
        config.backend_url = backend;
    }

    let page_url = match cli.url.or_else(|| config.default_url.clone()) {
        Some(url) => Some(validate_page_url(&url).map_err(anyhow::Error::msg)?),
        None => None,
    };

    let store: Arc<dyn KeyValueStore> = match FileStore::open_default() {
        Ok(store) => {
            tracing::debug!(path = %store.path().display(), "using file store");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(error = %e, "no data directory, conversation will not be saved");
            Arc::new(MemoryStore::new())
        }
    };

    lifecycle::on_installed(&*store, &TerminalSurface);
    lifecycle::on_startup(&*store, &TerminalSurface);

    let backend = BackendClient::new(&config.backend_url);

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_tui(config, store, backend, page_url).await,
        Commands::Ask { question } => ask(&config, backend, &question, page_url).await,
        Commands::Health => health(&backend).await,
        Commands::Clear => {
            let mut panel = ChatPanel::mount(store);
            panel.clear();
            println!("Conversation cleared");
            Ok(())
        }
    }
}

async fn run_tui(
    config: Config,
    store: Arc<dyn KeyValueStore>,
    backend: BackendClient,
    page_url: Option<String>,
) -> Result<()> {
    let active_tab = ActiveTab::new(page_url);

    match tokio::time::timeout(HEALTH_PROBE_TIMEOUT, backend.health()).await {
        Ok(Ok(status)) if status.is_healthy() => {
            tracing::info!(service = ?status.service, "backend is healthy")
        }
        Ok(Ok(status)) => tracing::warn!(status = %status.status, "backend reports unhealthy"),
        Ok(Err(e)) => tracing::warn!(error = %e, url = %config.backend_url, "backend not reachable"),
        Err(_) => tracing::warn!(url = %config.backend_url, "backend health probe timed out"),
    }

    let relay = Relay::new(backend, active_tab.clone())
        .with_history_limit(config.history_limit)
        .spawn();

    let mut events = tui::EventHandler::new();
    let mut app = App::new(
        ChatPanel::mount(store),
        relay,
        events.sender(),
        active_tab,
        config.backend_url.clone(),
        config.typing_delay(),
    );

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event).await?,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    result
}

async fn ask(
    config: &Config,
    backend: BackendClient,
    question: &str,
    page_url: Option<String>,
) -> Result<()> {
    let question = question.trim();
    if question.is_empty() {
        bail!("Question is empty");
    }

    let relay = Relay::new(backend, ActiveTab::new(page_url)).with_history_limit(config.history_limit);
    let response = relay
        .handle_user_message(vec![WireMessage::new("user", question)])
        .await;

    match (response.content, response.error) {
        (Some(answer), _) if response.success => {
            println!("{}", answer);
            Ok(())
        }
        (_, Some(error)) => bail!("{} (backend: {})", error, config.backend_url),
        _ => bail!("Backend at {} gave no answer", config.backend_url),
    }
}

async fn health(backend: &BackendClient) -> Result<()> {
    let status = backend
        .health()
        .await
        .with_context(|| format!("Backend at {} is not reachable", backend.base_url()))?;

    let service = status.service.as_deref().unwrap_or("backend");
    if !status.is_healthy() {
        bail!("{} reports status '{}'", service, status.status);
    }
    println!("{} is {}", service, status.status);
    Ok(())
}
