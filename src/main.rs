//! `layerkit` daemon.
//!
//! Reads `TOPIC JSON` lines from stdin, feeds them to a [`PrinterContext`]
//! and writes every rendered request to stdout as `TOPIC JSON`. Two control
//! lines are understood besides topics: `ramp {..}` starts a speed ramp and
//! `cancel` cancels it. Lines starting with `#` are ignored.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use layerkit::{
    init_logging, Config, DdsPublisher, PrinterContext, RampRequest, SinkError, Transport,
    BUILD_DATE, VERSION,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(name = "layerkit")]
#[command(version, about, long_about = None)]
struct Opts {
    /// Configuration file (.toml or .json); defaults to the platform config dir
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Report layer 100 and speed 100% regardless of telemetry
    #[arg(long)]
    emulate: bool,
}

/// Writes requests to stdout, one per line
struct StdoutTransport;

impl Transport for StdoutTransport {
    fn publish_json(&self, topic: &str, json: &str) -> Result<(), SinkError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{} {}", topic, json)
            .and_then(|_| out.flush())
            .map_err(|e| SinkError::PublishFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

fn load_config(opts: &Opts) -> anyhow::Result<Config> {
    let mut config = match &opts.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => match Config::default_path() {
            Ok(path) if path.exists() => Config::load_from_file(&path)
                .with_context(|| format!("loading {}", path.display()))?,
            _ => Config::default(),
        },
    };
    if opts.emulate {
        config.device.emulating = true;
    }
    Ok(config)
}

fn handle_line(context: &PrinterContext, line: &str) {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return;
    }

    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match head {
        "cancel" => {
            if context.cancel_ramp().is_none() {
                tracing::info!("No speed ramp to cancel");
            }
        }
        "ramp" => match serde_json::from_str::<RampRequest>(rest.trim()) {
            Ok(request) => {
                if let Err(e) = context.start_ramp(request) {
                    tracing::warn!("Rejected ramp request: {}", e);
                }
            }
            Err(e) => tracing::warn!("Malformed ramp request: {}", e),
        },
        topic => match context.on_event(topic, rest.trim().as_bytes()) {
            Ok(0) => tracing::debug!("No handler for {}", topic),
            Ok(_) => {}
            Err(e) => tracing::warn!("{}", e),
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    let config = load_config(&opts)?;

    init_logging(&config.logging)?;
    tracing::info!("layerkit {} (built {})", VERSION, BUILD_DATE);

    let sink = Arc::new(DdsPublisher::new(StdoutTransport));
    let context = PrinterContext::new(config, sink);

    let mut events = context.dispatcher().receiver();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::trace!("Delivered {}: {}", event.topic, event.payload),
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!("Event observer skipped {} events", missed)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        handle_line(&context, &line);
    }

    tracing::info!("Input closed, shutting down");
    Ok(())
}
