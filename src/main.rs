use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use execlog::prelude::*;
use execlog::util::logging;

/// Ship JSON-lines telemetry records to durable storage
#[derive(Parser, Debug)]
#[command(name = "execlog", version = execlog::VERSION)]
struct Args {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long)]
    config: PathBuf,

    /// Read records from this file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = CollectorConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    logging::init(&config.log_level);

    info!("execlog {} starting for host '{}'", execlog::VERSION, config.host_name);

    let collector = Collector::from_config(&config, Arc::new(LogSink))
        .await
        .context("Failed to start collector")?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, finishing up");
            interrupt.cancel();
        }
    });

    let collected = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            ship(&collector, BufReader::new(file), &cancel).await?
        }
        None => ship(&collector, BufReader::new(tokio::io::stdin()), &cancel).await?,
    };

    collector
        .flush(&CancellationToken::new())
        .await
        .context("Failed to flush collector")?;
    collector.shutdown().await.context("Failed to shut down collector")?;

    info!("Collected {} records", collected);
    Ok(())
}

/// Collect every well-formed line until EOF or cancellation
async fn ship<R>(collector: &Collector, reader: R, cancel: &CancellationToken) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut collected = 0;
    let mut line_number = 0;

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line.context("Failed to read input")?,
        };
        let Some(line) = line else { break };
        line_number += 1;

        if line.trim().is_empty() {
            continue;
        }

        let record: TelemetryRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping line {}: {}", line_number, e);
                continue;
            }
        };

        match collector.collect(record, cancel).await {
            Ok(()) => collected += 1,
            Err(LogError::Cancelled(_)) => break,
            Err(e) => return Err(e).context("Failed to collect record"),
        }
    }

    Ok(collected)
}
