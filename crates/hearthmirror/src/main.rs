use std::io::IsTerminal;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use hearthmirror::Command;
use hearthmirror::Config;
use hearthmirror::Document;
use hearthmirror::Engine;
use hearthmirror::LogLevel;
use hearthmirror::api::HttpDeviceApi;
use hearthmirror::channel::SocketIoChannel;
use hearthmirror::keys::spawn_key_reader;
use hearthmirror::render::Renderers;
use hearthmirror::terminal::CrlfWriter;
use hearthmirror::terminal::RawModeGuard;
use tokio::sync::mpsc;

/// Mirror the state of home devices in the terminal
#[derive(Debug, Parser)]
#[command(name = "hearthmirror", version)]
struct Cli {
    /// Path to the TOML config file; defaults are used if it does not exist
    #[arg(short, long, default_value = "hearthmirror.toml")]
    config: PathBuf,

    /// Override server.base_url (the push channel URL is derived from it)
    #[arg(short, long)]
    server: Option<String>,

    /// Override logging.level
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if let Some(server) = cli.server {
        config.server.base_url = server;
        config.server.socket_url = None;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.validate().context("invalid configuration")?;

    // Logs go to stderr so they do not interleave with the dashboard
    tracing_subscriber::fmt()
        .with_env_filter(config.logging.env_filter()?)
        .with_writer(|| CrlfWriter(std::io::stderr()))
        .init();

    tracing::info!("hearthmirror starting");
    tracing::info!("Server: {}", config.server.base_url);

    let socket_url = config.server.socket_url()?;
    tracing::info!("Push channel: {}", socket_url);

    let api = Arc::new(
        HttpDeviceApi::new(&config.server.base_url, config.poll.timeout())
            .context("creating HTTP client")?,
    );
    let channel = SocketIoChannel::spawn(socket_url, &config.channel);

    let interactive = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
    let raw_mode = RawModeGuard::new(interactive);

    let (commands_tx, commands_rx) = mpsc::channel(16);
    if raw_mode.is_active() {
        spawn_key_reader(commands_tx.clone());
        tracing::info!("Press Alt+S to resync all devices, q to quit");
    } else {
        tracing::info!("Not attached to a terminal, keyboard shortcuts disabled");
    }
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received shutdown signal");
                let _ = commands_tx.send(Command::Quit).await;
            }
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let mut engine =
        Engine::new(channel, api, Renderers::new(&config.flash)).with_presenter(present);
    engine.run(commands_rx, config.poll.interval()).await;
    drop(raw_mode);

    tracing::info!("hearthmirror shutdown complete");

    Ok(())
}

fn present(doc: &Document) {
    let mut stdout = CrlfWriter(std::io::stdout().lock());
    let _ = writeln!(stdout, "{}", doc.render_text());
    let _ = stdout.flush();
}
