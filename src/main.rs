//! relaychat - Line-based terminal chat client

use anyhow::Result;
use clap::Parser;
use relaychat::client::ChatClient;
use relaychat::config::Config;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "relaychat")]
#[command(about = "Join a relaychat server from the terminal")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Server host
    #[arg(long, env = "RELAYCHAT_SERVER_HOST")]
    host: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Display name (prompted for when omitted)
    #[arg(short, long)]
    name: Option<String>,
}

fn prompt(name: &str) {
    print!("{}: ", name);
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Log to stderr at warn so the chat prompt stays readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(host) = cli.host {
        config.client.host = host;
    }
    if let Some(port) = cli.port {
        config.client.port = port;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let name = match cli.name {
        Some(name) => name,
        None => {
            print!("Please enter your name to join the chat: ");
            let _ = std::io::stdout().flush();
            lines.next_line().await?.unwrap_or_default()
        }
    };
    let name = match name.trim() {
        "" => format!("Guest-{}", std::process::id()),
        trimmed => trimmed.to_string(),
    };

    let client = ChatClient::connect_with_retry(
        &config.client.server_addr(),
        &name,
        config.client.connect_retries,
        config.client.retry_delay(),
    )
    .await?
    .with_max_message_size(config.client.max_message_size);
    println!("Connected to the chat server! Start typing to send messages.");

    let (mut reader, mut writer) = client.split();

    let prompt_name = name.clone();
    let mut receive_task = tokio::spawn(async move {
        loop {
            match reader.recv().await {
                Ok(Some(message)) => {
                    print!("\r{}\n", message);
                    prompt(&prompt_name);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Connection error: {}", e);
                    break;
                }
            }
        }
        println!("\rDisconnected from server.");
    });

    prompt(&name);
    loop {
        tokio::select! {
            _ = &mut receive_task => return Ok(()),

            line = lines.next_line() => {
                let Some(line) = line? else {
                    println!("\nDisconnecting...");
                    break;
                };
                if matches!(line.trim().to_lowercase().as_str(), "quit" | "exit") {
                    break;
                }
                writer.send(&line).await?;
                prompt(&name);
            }
        }
    }

    writer.close().await?;
    receive_task.abort();

    Ok(())
}
