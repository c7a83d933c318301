//! Per-bar cycle driver. Runs the components in a fixed order every cycle:
//! commands, account refresh and risk update, reconciliation, trade
//! management, admission gates, signal evaluation, entry. Cycles never
//! overlap; every external call is awaited to completion before the next
//! dependent step.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::application::risk_manager::RiskManager;
use crate::application::session::SessionGate;
use crate::application::signal_engine::SignalEngine;
use crate::application::trade_manager::{PricePoint, TradeManager};
use crate::config::EngineConfig;
use crate::domain::errors::ConfigError;
use crate::domain::ports::{CommandSource, IndicatorProvider, TradeEventSink, Venue};
use crate::domain::symbol::SymbolSpec;
use crate::domain::types::{
    AccountSnapshot, BotStatus, Command, SignalVerdict, StatusSnapshot, TradeEvent,
};

pub struct Orchestrator {
    symbol: String,
    signal_engine: SignalEngine,
    risk: RiskManager,
    trades: TradeManager,
    gate: SessionGate,
    paused: bool,
}

impl Orchestrator {
    /// Validates the configuration up front; a bad config means the instance
    /// never starts.
    pub fn new(
        config: EngineConfig,
        spec: SymbolSpec,
        initial: &AccountSnapshot,
        start_date: chrono::NaiveDate,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Orchestrator {
            symbol: spec.name.clone(),
            signal_engine: SignalEngine::new(
                config.indicators.clone(),
                config.trading.clone(),
                spec.clone(),
            ),
            risk: RiskManager::new(config.trading.clone(), spec.clone(), initial, start_date),
            trades: TradeManager::new(config.trading, spec),
            gate: SessionGate::new(config.sessions),
            paused: false,
        })
    }

    pub fn status(&self) -> BotStatus {
        if self.paused {
            BotStatus::Paused
        } else {
            self.risk.risk_status()
        }
    }

    pub fn risk(&self) -> &RiskManager {
        &self.risk
    }

    pub fn trades(&self) -> &TradeManager {
        &self.trades
    }

    /// One full cycle for one new bar (or tick).
    pub async fn run_cycle(
        &mut self,
        point: PricePoint,
        provider: &dyn IndicatorProvider,
        venue: &mut dyn Venue,
        events: &mut dyn TradeEventSink,
        commands: &mut dyn CommandSource,
    ) {
        let mut close_all_requested = false;
        let mut status_requested = false;
        // At most one command per cycle; the rest of a queue-backed source
        // waits for later cycles so no command is absorbed unseen.
        if let Some(command) = commands.poll().await {
            match command {
                Command::Pause => {
                    info!("Orchestrator: paused");
                    self.paused = true;
                }
                Command::Resume => {
                    info!("Orchestrator: resumed");
                    self.paused = false;
                }
                Command::CloseAll => close_all_requested = true,
                Command::StatusRequest => status_requested = true,
                Command::SetNewsBlock(active) => self.gate.set_news_block(active),
            }
        }

        let snapshot = venue.snapshot().await;
        self.risk.update(&snapshot, point.time.date_naive());

        let broker_ids = venue.open_position_ids(&self.symbol).await;
        self.trades.sync_with_account(&broker_ids);

        // Close-all preempts everything downstream of trade management.
        if close_all_requested {
            info!("Orchestrator: close-all command received");
            self.trades
                .close_all(point, &mut self.risk, venue, events)
                .await;
        } else {
            self.trades
                .manage(point, &mut self.risk, venue, events)
                .await;
        }

        if status_requested {
            self.publish_status(&snapshot, point.time, events).await;
        }

        if close_all_requested || self.paused {
            return;
        }

        if let Err(reason) = self.risk.can_trade() {
            debug!("Orchestrator: entries blocked: {}", reason);
            return;
        }
        if !self.gate.is_trading_allowed(point.time) {
            debug!("Orchestrator: outside session or news block active");
            return;
        }
        let spread = venue.spread_points(&self.symbol).await;
        if !self.risk.is_spread_acceptable(spread) {
            return;
        }

        match self.signal_engine.evaluate(provider, point.time) {
            SignalVerdict::Entry(signal) => {
                let lot = self
                    .risk
                    .calculate_lot_size(snapshot.balance, signal.stop_loss_pips);
                let signal = signal.with_lot(lot);
                match self
                    .trades
                    .open(&signal, point.time, &self.gate, &mut self.risk, venue, events)
                    .await
                {
                    Ok(id) => info!("Orchestrator: entered {} as {}", signal.direction, id),
                    Err(err) => warn!("Orchestrator: entry not taken: {}", err),
                }
            }
            SignalVerdict::NoTrade(reason) => {
                debug!("Orchestrator: no trade ({:?})", reason);
            }
            SignalVerdict::NotReady => {
                debug!("Orchestrator: indicators not ready");
            }
        }
    }

    async fn publish_status(
        &self,
        snapshot: &AccountSnapshot,
        time: DateTime<Utc>,
        events: &mut dyn TradeEventSink,
    ) {
        let state = self.risk.state();
        let event = TradeEvent::Status(StatusSnapshot {
            symbol: self.symbol.clone(),
            status: self.status(),
            balance: snapshot.balance,
            equity: snapshot.equity,
            open_positions: self.trades.open_count(),
            daily_operations: state.daily_operation_count,
            current_drawdown_pct: state.current_drawdown_pct,
            daily_drawdown_pct: state.daily_drawdown_pct,
            time,
        });
        if let Err(err) = events.publish(event).await {
            warn!("Orchestrator: status delivery failed: {}", err);
        }
    }
}
