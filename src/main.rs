use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scalpex::backtest::broker::SimBrokerConfig;
use scalpex::backtest::data::load_candles;
use scalpex::backtest::engine::BacktestEngine;
use scalpex::config::EngineConfig;
use scalpex::domain::symbol::SymbolSpec;

/// Replay a multi-timeframe scalping strategy over historical M1 candles.
#[derive(Parser, Debug)]
#[command(name = "scalpex", version, about)]
struct Args {
    /// CSV file with M1 candles (time,open,high,low,close,volume)
    #[arg(long)]
    data: PathBuf,

    /// Optional TOML config; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Starting account balance
    #[arg(long, default_value = "10000")]
    balance: Decimal,

    /// Simulated spread in broker points
    #[arg(long, default_value = "10")]
    spread_points: Decimal,

    /// Commission charged per lot on entry
    #[arg(long, default_value = "4")]
    commission: Decimal,

    /// Print the report as JSON instead of the plain-text summary
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let spec = SymbolSpec::fx_five_digit(&config.trading.symbol);
    let candles = load_candles(&args.data)?;

    let broker_config = SimBrokerConfig {
        initial_balance: args.balance,
        spread_points: args.spread_points,
        commission_per_lot: args.commission,
        ..SimBrokerConfig::default()
    };

    info!(
        "Starting backtest for {} with balance {}",
        spec.name, args.balance
    );
    let engine = BacktestEngine::new(config, spec, broker_config);
    let report = engine.run(&candles).await?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serializing report")?
        );
    } else {
        println!("{}", report);
    }
    Ok(())
}
