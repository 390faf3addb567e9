//! CLI for spilink.
//!
//! Runs the transport against a simulated co-processor: stdin is the line
//! input source, stdout receives everything the peer sends back.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use spilink::{pump_lines, HandshakeLine, Link, LinkConfig, SimulatedPeer};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How long to wait for in-flight transfers after stdin closes.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "spilink", version, about = "Half-duplex SPI link over a simulated peer")]
struct Cli {
    /// TOML file overriding the link defaults
    #[arg(short, long, env = "SPILINK_CONFIG")]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Do not echo host transfers back from the peer
    #[arg(long)]
    no_echo: bool,

    /// Data the peer has queued for the host at startup
    #[arg(long)]
    greeting: Option<String>,

    /// Print final link statistics as JSON on stderr
    #[arg(long)]
    stats: bool,
}

impl Cli {
    fn log_filter(&self) -> EnvFilter {
        let level = if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        };
        // RUST_LOG wins over the flags.
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(cli.log_filter())
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => LinkConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LinkConfig::default(),
    };

    let line = HandshakeLine::new();
    let peer = SimulatedPeer::new();
    peer.attach(line.clone());
    peer.set_echo(!cli.no_echo);
    if let Some(greeting) = &cli.greeting {
        peer.offer(greeting.as_bytes());
    }

    let link = Link::spawn(&config, peer, line, tokio::io::stdout())
        .context("starting link")?;
    let producer = link.producer();

    tokio::select! {
        res = pump_lines(tokio::io::stdin(), &producer, config.input_block) => {
            let accepted = res.context("reading stdin")?;
            tracing::debug!(accepted, "input closed");
            if !link.wait_idle(DRAIN_TIMEOUT).await {
                tracing::warn!(mode = ?link.mode(), "link still busy at exit");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
        }
    }

    let stats = link.shutdown().await.context("stopping link")?;
    if cli.stats {
        eprintln!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Ok(())
}
