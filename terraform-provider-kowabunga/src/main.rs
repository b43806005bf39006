//! Terraform Provider for Kowabunga
//!
//! Reads one JSON-RPC request per line on stdin and writes one response per
//! line on stdout. Requests are served concurrently; resource operations
//! serialize on the session lock.

use anyhow::Result;
use clap::Parser;
use std::io;
use std::sync::Arc;
use terraform_provider_kowabunga::KowabungaProvider;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Terraform Provider for Kowabunga
#[derive(Parser, Debug)]
#[command(name = "terraform-provider-kowabunga")]
#[command(about = "Terraform provider for the Kowabunga cloud platform")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TF_LOG")]
    log_level: Option<String>,
}

fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or("info").to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries the protocol, logs go to stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    tracing::info!("Starting Terraform Provider for Kowabunga");

    let provider = Arc::new(KowabungaProvider::new());
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = rx.recv().await {
            stdout.write_all(response.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, io::Error>(())
    });

    let mut requests = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let provider = Arc::clone(&provider);
        let tx = tx.clone();
        requests.spawn(async move {
            let response = provider.handle_request(&line).await;
            if tx.send(response).is_err() {
                tracing::error!("Failed to write response: output closed");
            }
        });

        // reap finished requests so the set does not grow unbounded
        while let Some(joined) = requests.try_join_next() {
            if let Err(e) = joined {
                tracing::error!("Request handler failed: {}", e);
            }
        }
    }

    while let Some(joined) = requests.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Request handler failed: {}", e);
        }
    }

    drop(tx);
    writer.await??;

    tracing::info!("Terraform Provider shutting down");
    Ok(())
}
