//! relaychat-server - Accepts chat connections and relays messages

use anyhow::{Context, Result};
use clap::Parser;
use relaychat::config::Config;
use relaychat::history::{HistoryRecorder, JsonlHistorySink};
use relaychat::server::RelayServer;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "relaychat-server")]
#[command(about = "relaychat relay server")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "RELAYCHAT_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "RELAYCHAT_PORT")]
    port: Option<u16>,

    /// JSON-lines file to append chat history to
    #[arg(long, env = "RELAYCHAT_HISTORY")]
    history: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(history) = cli.history {
        config.history.path = Some(history);
    }

    let recorder = match &config.history.path {
        Some(path) => {
            let sink = JsonlHistorySink::open_with_retry(
                path,
                config.history.open_retries,
                config.history.retry_delay(),
            )
            .await
            .context("Could not open chat history")?;
            Some(HistoryRecorder::spawn(
                Arc::new(sink),
                config.history.queue_capacity,
            ))
        }
        None => {
            tracing::info!("Chat history disabled");
            None
        }
    };

    let server = RelayServer::bind(config.server, recorder).await?;
    server.run_until_ctrl_c().await?;

    Ok(())
}
