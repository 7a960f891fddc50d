use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use shopez_core::{Config, Overrides, ShopClient, StalePolicy};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "shopez", version)]
#[command(about = "Terminal chat client for the Shop EZ AI shopping agent")]
struct Cli {
    /// Base URL of the agent service (serves /chat and /abort)
    #[arg(long, env = "SHOPEZ_BASE_URL")]
    base_url: Option<String>,

    /// User id sent with every message
    #[arg(long, env = "SHOPEZ_USER_ID")]
    user_id: Option<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Drop replies to messages sent before the last abort
    #[arg(long)]
    discard_stale: bool,

    /// Config file (defaults to <config dir>/shopez/config.json)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    init_config: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base_url.clone(),
            user_id: self.user_id.clone(),
            timeout_secs: self.timeout,
            discard_stale_responses: self.discard_stale,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?.apply(cli.overrides());

    if cli.init_config {
        let config_path = match &cli.config {
            Some(path) => path.clone(),
            None => Config::default_path()?,
        };
        config.save_to(&config_path)?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }

    let log_path = init_logging()?;
    tracing::info!(
        base_url = %config.base_url,
        user_id = %config.user_id,
        log = %log_path.display(),
        "starting shopez"
    );

    let client = ShopClient::from_config(&config).context("failed to build HTTP client")?;
    let stale_policy = if config.discard_stale_responses {
        StalePolicy::Discard
    } else {
        StalePolicy::Append
    };

    let events = EventHandler::new();
    let app = App::new(
        Arc::new(client),
        events.session_sender(),
        stale_policy,
        &config.base_url,
        &config.user_id,
    );

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, app, events).await;
    tui::restore()?;

    if let Err(e) = &result {
        tracing::error!(error = %e, "shopez exited with error");
    }
    result
}

async fn run(terminal: &mut Tui, mut app: App, mut events: EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(&mut app, event),
            None => break,
        }
    }
    Ok(())
}

/// Log to a file; the terminal belongs to the UI.
fn init_logging() -> Result<PathBuf> {
    let log_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("shopez");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create {}", log_dir.display()))?;

    let log_path = log_dir.join("shopez.log");
    let log_file = File::create(&log_path)
        .with_context(|| format!("failed to create {}", log_path.display()))?;

    let filter = EnvFilter::try_from_env("SHOPEZ_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info,shopez=debug,shopez_core=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(log_file)),
        )
        .init();

    Ok(log_path)
}
