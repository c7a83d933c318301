//! Deterministic replay loop. Drives the same orchestrator the live path
//! uses, once per M1 bar, with a simulated clock derived from the data.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use tracing::info;

use crate::application::orchestrator::Orchestrator;
use crate::application::trade_manager::PricePoint;
use crate::backtest::broker::{SimBroker, SimBrokerConfig};
use crate::backtest::data::aggregate;
use crate::backtest::provider::BacktestIndicators;
use crate::backtest::statistics::BacktestReport;
use crate::config::EngineConfig;
use crate::domain::ports::{AccountStateSource, CommandSource, TradeEventSink};
use crate::domain::symbol::SymbolSpec;
use crate::domain::types::{Candle, Command, Timeframe, TradeEvent};

/// Command source fed by the engine itself (end-of-run close-all).
#[derive(Default)]
struct QueuedCommands {
    queue: VecDeque<Command>,
}

#[async_trait]
impl CommandSource for QueuedCommands {
    async fn poll(&mut self) -> Option<Command> {
        self.queue.pop_front()
    }
}

/// Collects every trade event for the final report.
#[derive(Default)]
struct RecordingSink {
    events: Vec<TradeEvent>,
}

impl RecordingSink {
    fn closed_profits(&self) -> Vec<Decimal> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TradeEvent::Closed { profit, .. } => Some(*profit),
                TradeEvent::PartiallyClosed { profit, .. } => Some(*profit),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl TradeEventSink for RecordingSink {
    async fn publish(&mut self, event: TradeEvent) -> anyhow::Result<()> {
        self.events.push(event);
        Ok(())
    }
}

pub struct BacktestEngine {
    config: EngineConfig,
    spec: SymbolSpec,
    broker_config: SimBrokerConfig,
}

impl BacktestEngine {
    pub fn new(config: EngineConfig, spec: SymbolSpec, broker_config: SimBrokerConfig) -> Self {
        BacktestEngine {
            config,
            spec,
            broker_config,
        }
    }

    /// Replay M1 candles through the full trading cycle and summarize the
    /// outcome. The confirmation and trend series are aggregated from the
    /// same M1 data, so the replay needs a single input file.
    pub async fn run(&self, m1: &[Candle]) -> anyhow::Result<BacktestReport> {
        anyhow::ensure!(!m1.is_empty(), "no candles to replay");

        let m5 = aggregate(m1, Timeframe::M5);
        let m15 = aggregate(m1, Timeframe::M15);
        let mut provider = BacktestIndicators::build(
            &self.config.indicators,
            &[
                (Timeframe::M1, m1),
                (Timeframe::M5, &m5),
                (Timeframe::M15, &m15),
            ],
        )?;

        let mut broker = SimBroker::new(self.spec.clone(), self.broker_config.clone());
        broker.set_market(m1[0].close);

        let start_date: NaiveDate = m1[0].time.date_naive();
        let initial = broker.snapshot().await;
        let initial_balance = initial.balance;
        let mut orchestrator =
            Orchestrator::new(self.config.clone(), self.spec.clone(), &initial, start_date)?;

        let mut events = RecordingSink::default();
        let mut commands = QueuedCommands::default();
        let mut equity_curve = Vec::with_capacity(m1.len());

        info!(
            "Backtest: replaying {} M1 bars ({} M5, {} M15)",
            m1.len(),
            m5.len(),
            m15.len()
        );

        for (i, bar) in m1.iter().enumerate() {
            provider.advance(bar.time);
            broker.set_market(bar.close);

            // Last bar: flatten everything so the report reflects realized
            // results only.
            if i + 1 == m1.len() {
                commands.queue.push_back(Command::CloseAll);
            }

            let point = PricePoint {
                price: bar.close,
                low: bar.low,
                high: bar.high,
                time: bar.time,
            };
            orchestrator
                .run_cycle(point, &provider, &mut broker, &mut events, &mut commands)
                .await;

            equity_curve.push(broker.equity());
        }

        let report = BacktestReport::compute(
            initial_balance,
            broker.balance(),
            m1.len(),
            &events.closed_profits(),
            &equity_curve,
        );
        info!("Backtest: finished, net profit {}", report.net_profit);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    /// Quiet, drifting market: enough bars to warm every series up, but no
    /// stochastic cross out of an extreme zone, so no entries.
    fn flat_m1(count: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let drift = Decimal::from(i as i64 % 5) * dec!(0.00005);
                let close = dec!(1.1000) + drift;
                Candle {
                    time: start + Duration::minutes(i as i64),
                    open: close - dec!(0.00002),
                    high: close + dec!(0.00008),
                    low: close - dec!(0.00010),
                    close,
                    volume: dec!(50),
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_flat_market_produces_no_trades() {
        let engine = BacktestEngine::new(
            EngineConfig::default(),
            SymbolSpec::fx_five_digit("EURUSD"),
            SimBrokerConfig::default(),
        );
        let report = engine.run(&flat_m1(600)).await.unwrap();
        assert_eq!(report.trades, 0);
        assert_eq!(report.final_balance, report.initial_balance);
        assert_eq!(report.bars_processed, 600);
    }

    #[tokio::test]
    async fn test_empty_input_is_an_error() {
        let engine = BacktestEngine::new(
            EngineConfig::default(),
            SymbolSpec::fx_five_digit("EURUSD"),
            SimBrokerConfig::default(),
        );
        assert!(engine.run(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_replay_is_deterministic() {
        let engine = BacktestEngine::new(
            EngineConfig::default(),
            SymbolSpec::fx_five_digit("EURUSD"),
            SimBrokerConfig::default(),
        );
        let data = flat_m1(400);
        let a = engine.run(&data).await.unwrap();
        let b = engine.run(&data).await.unwrap();
        assert_eq!(a.final_balance, b.final_balance);
        assert_eq!(a.trades, b.trades);
        assert_eq!(a.max_drawdown, b.max_drawdown);
    }
}
