use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use spotguard::execution::{ExecutionCoordinator, TradeEvent};
use spotguard::{BotConfig, Tick};
use tracing_subscriber::EnvFilter;

/// Replay a JSON-lines tick stream through the execution coordinator
#[derive(Debug, Parser)]
#[command(name = "spotguard", version)]
struct Args {
    /// Config file (TOML/JSON/YAML); SPOTGUARD__* variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tick file, one JSON object per line
    #[arg(short, long)]
    ticks: PathBuf,

    /// Print events and the session summary as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    setup_logging();
    let args = Args::parse();

    let config = BotConfig::load(args.config.as_deref())?;

    tracing::info!("📊 Configuration:");
    tracing::info!("  Initial Balance: ${:.2}", config.initial_balance);
    tracing::info!("  Fee Rate: {}", config.fee_rate);
    tracing::info!("  Max Daily Loss: {}", config.risk.max_daily_loss);
    tracing::info!("  Max Trades/Day: {}", config.risk.max_trades);

    let file = File::open(&args.ticks)
        .with_context(|| format!("Failed to open tick file {}", args.ticks.display()))?;

    let mut coordinator = ExecutionCoordinator::from_config(&config);
    let mut skipped = 0usize;

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("Failed to read tick file")?;
        if line.trim().is_empty() {
            continue;
        }

        let tick: Tick = match serde_json::from_str(&line) {
            Ok(tick) => tick,
            Err(e) => {
                tracing::warn!("Skipping line {}: {}", index + 1, e);
                skipped += 1;
                continue;
            }
        };

        if !config.symbols.is_empty() && !config.symbols.contains(&tick.symbol) {
            continue;
        }

        match coordinator.on_tick_at(&tick.symbol, tick.signal, tick.price, tick.atr, Some(tick.timestamp)) {
            Ok(Some(event)) => report_event(&event, args.json)?,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Tick {} for {} rejected: {}", index + 1, tick.symbol, e);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        tracing::warn!("{} ticks skipped", skipped);
    }

    let snapshot = coordinator.snapshot();
    if !snapshot.open_positions.is_empty() {
        tracing::info!("{} positions still open at end of replay", snapshot.open_positions.len());
    }

    let metrics = coordinator.metrics();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        metrics.print_summary();
    }

    Ok(())
}

fn report_event(event: &TradeEvent, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    if let TradeEvent::Rejected { symbol, reason } = event {
        tracing::info!("⛔ {} entry rejected: {:?}", symbol, reason);
    }
    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spotguard=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
