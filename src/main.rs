use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

mod app;
mod backend;
mod book;
mod config;
mod handler;
mod logging;
mod selection;
mod transcript;
mod tui;
mod ui;

use app::App;
use book::Book;
use config::Config;
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "docent")]
#[command(about = "Terminal documentation reader with an embedded AI assistant")]
struct Cli {
    /// Directory of Markdown pages to read
    docs_dir: Option<PathBuf>,

    /// Base URL of the knowledge-base backend
    #[arg(long)]
    backend_url: Option<String>,

    /// Directory for log files
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|_| Config::new());

    let log_dir = cli.log_dir.clone().unwrap_or_else(default_log_dir);
    logging::init(&log_dir);

    // A docs directory given on the command line becomes the new default
    if let Some(dir) = &cli.docs_dir {
        config.docs_dir = Some(dir.clone());
        if let Err(err) = config.save() {
            tracing::warn!("failed to save config: {err}");
        }
    }

    let docs_dir = cli
        .docs_dir
        .or_else(|| config.docs_dir.clone())
        .unwrap_or_else(|| PathBuf::from("docs"));

    let backend_url = cli
        .backend_url
        .or_else(|| config.backend_url.clone())
        .unwrap_or_else(|| config::DEFAULT_BACKEND_URL.to_string());

    let request_timeout = Duration::from_secs(
        config
            .request_timeout_secs
            .unwrap_or(config::DEFAULT_TIMEOUT_SECS),
    );

    // Load the book before touching the terminal so load errors print normally
    let book = Book::load(&docs_dir)?;

    tracing::info!(
        docs_dir = %docs_dir.display(),
        backend_url = %backend_url,
        pages = book.pages().len(),
        "starting docent"
    );

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let mut app = App::new(book, &backend_url, request_timeout, events.sender());

    let result = run(&mut terminal, &mut events, &mut app).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut Tui, events: &mut EventHandler, app: &mut App) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        let Some(event) = events.next().await else {
            break;
        };
        handler::handle_event(app, event)?;

        // Collect any backend replies that finished while handling input
        app.poll_queries().await;
    }

    Ok(())
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("docent")
        .join("logs")
}
