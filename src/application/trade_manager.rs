//! Trade lifecycle state machine: entry admission, partial take-profit,
//! break-even protection and exits, for one symbol's set of positions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::risk_manager::RiskManager;
use crate::application::session::SessionGate;
use crate::config::TradingConfig;
use crate::domain::errors::OrderError;
use crate::domain::ports::{OrderExecutionSink, TradeEventSink};
use crate::domain::position::Position;
use crate::domain::symbol::SymbolSpec;
use crate::domain::types::{PositionId, RejectReason, Signal, TradeEvent};

/// Why an entry did not result in a position.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OpenError {
    #[error("entry rejected: {0}")]
    Rejected(RejectReason),
    #[error(transparent)]
    Order(#[from] OrderError),
}

/// Price context for one management pass. In live trading low and high are
/// simply the tick price; in replay they are the bar's extremes, so stop and
/// target touches inside the bar are not missed.
#[derive(Debug, Clone, Copy)]
pub struct PricePoint {
    pub price: Decimal,
    pub low: Decimal,
    pub high: Decimal,
    pub time: DateTime<Utc>,
}

impl PricePoint {
    pub fn tick(price: Decimal, time: DateTime<Utc>) -> Self {
        PricePoint {
            price,
            low: price,
            high: price,
            time,
        }
    }
}

pub struct TradeManager {
    config: TradingConfig,
    spec: SymbolSpec,
    positions: HashMap<PositionId, Position>,
}

impl TradeManager {
    pub fn new(config: TradingConfig, spec: SymbolSpec) -> Self {
        TradeManager {
            config,
            spec,
            positions: HashMap::new(),
        }
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| !p.is_closed())
    }

    pub fn open_count(&self) -> usize {
        self.open_positions().count()
    }

    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(&id)
    }

    pub fn has_open_position(&self, symbol: &str) -> bool {
        self.open_positions().any(|p| p.symbol == symbol)
    }

    /// Admit and execute an entry. Every gate is re-checked at the moment of
    /// the call; earlier cycle results are not trusted. On success exactly
    /// one open event is published and the daily operation counter moves
    /// exactly once.
    pub async fn open(
        &mut self,
        signal: &Signal,
        now: DateTime<Utc>,
        gate: &SessionGate,
        risk: &mut RiskManager,
        execution: &mut dyn OrderExecutionSink,
        events: &mut dyn TradeEventSink,
    ) -> Result<PositionId, OpenError> {
        if self.has_open_position(&signal.symbol) {
            return Err(OpenError::Rejected(RejectReason::PositionAlreadyOpen));
        }
        if gate.news_block_active() {
            return Err(OpenError::Rejected(RejectReason::NewsBlockActive));
        }
        if !gate.in_session(now) {
            return Err(OpenError::Rejected(RejectReason::OutsideSession));
        }
        risk.can_trade().map_err(OpenError::Rejected)?;
        if signal.lot_size <= Decimal::ZERO {
            return Err(OpenError::Rejected(RejectReason::ZeroVolume));
        }

        let fill = execution
            .open_market(
                &signal.symbol,
                signal.direction,
                signal.lot_size,
                signal.stop_loss,
                signal.take_profit_final,
                "scalpex",
            )
            .await?;

        let position = Position::from_fill(fill.position_id, signal, fill.fill_price, fill.volume, now);
        info!(
            "TradeManager: opened {} {} {} @ {} (sl {}, tp {})",
            position.id,
            position.direction,
            position.remaining_volume,
            position.open_price,
            position.current_stop_loss,
            position.current_take_profit
        );

        risk.record_operation();
        publish(
            events,
            TradeEvent::Opened {
                event_id: Uuid::new_v4(),
                position_id: position.id,
                symbol: position.symbol.clone(),
                direction: position.direction,
                volume: position.remaining_volume,
                price: position.open_price,
                stop_loss: position.current_stop_loss,
                take_profit: position.current_take_profit,
                time: now,
            },
        )
        .await;

        let id = position.id;
        self.positions.insert(id, position);
        Ok(id)
    }

    /// One management pass over every open position: exits first, then the
    /// partial take-profit, then pending break-even moves. Order errors on a
    /// single position are logged and do not stop the pass.
    pub async fn manage(
        &mut self,
        point: PricePoint,
        risk: &mut RiskManager,
        execution: &mut dyn OrderExecutionSink,
        events: &mut dyn TradeEventSink,
    ) {
        let ids: Vec<PositionId> = self
            .positions
            .iter()
            .filter(|(_, p)| !p.is_closed())
            .map(|(id, _)| *id)
            .collect();

        for id in ids {
            if let Err(err) = self.manage_one(id, point, risk, execution, events).await {
                warn!("TradeManager: managing {} failed: {}", id, err);
            }
        }

        self.positions.retain(|_, p| !p.is_closed());
    }

    async fn manage_one(
        &mut self,
        id: PositionId,
        point: PricePoint,
        risk: &mut RiskManager,
        execution: &mut dyn OrderExecutionSink,
        events: &mut dyn TradeEventSink,
    ) -> Result<(), OrderError> {
        let (stop_hit, tp_hit, stop_level, tp_level) = {
            let position = match self.positions.get(&id) {
                Some(p) => p,
                None => return Ok(()),
            };
            (
                position.stop_hit(point.low, point.high),
                position.take_profit_hit(point.low, point.high),
                position.current_stop_loss,
                position.current_take_profit,
            )
        };

        // A bar can straddle both levels; the stop wins as the conservative
        // assumption about intra-bar ordering.
        if stop_hit {
            return self
                .close_position(id, stop_level, "stop_loss", point.time, risk, execution, events)
                .await;
        }
        if tp_hit {
            return self
                .close_position(id, tp_level, "take_profit", point.time, risk, execution, events)
                .await;
        }

        // A partial close arms the break-even move but the stop itself only
        // moves on the following pass, so the two transitions stay one cycle
        // apart.
        if self
            .try_partial_close(id, point, risk, execution, events)
            .await?
        {
            return Ok(());
        }
        self.try_break_even(id, point, execution).await?;
        Ok(())
    }

    /// Returns `Ok(true)` when a partial close was executed this pass.
    async fn try_partial_close(
        &mut self,
        id: PositionId,
        point: PricePoint,
        risk: &mut RiskManager,
        execution: &mut dyn OrderExecutionSink,
        events: &mut dyn TradeEventSink,
    ) -> Result<bool, OrderError> {
        let close_volume = {
            let position = match self.positions.get(&id) {
                Some(p) => p,
                None => return Ok(false),
            };
            if !position.partial_due(point.price, self.config.rr_partial) {
                return Ok(false);
            }
            position.partial_close_volume(self.config.partial_close_percent, &self.spec)
        };
        let Some(close_volume) = close_volume else {
            return Ok(false);
        };

        let fill = execution.close_market(id, close_volume, point.price).await?;

        let position = match self.positions.get_mut(&id) {
            Some(p) => p,
            None => return Ok(false),
        };
        let profit = position.profit_for(fill.volume, fill.fill_price, &self.spec);
        position.apply_partial_close(fill.volume, profit);
        risk.record_close(profit);
        info!(
            "TradeManager: partial close {} {} @ {} for {}, remaining {}",
            id, fill.volume, fill.fill_price, profit, position.remaining_volume
        );

        let event = TradeEvent::PartiallyClosed {
            event_id: Uuid::new_v4(),
            position_id: id,
            symbol: position.symbol.clone(),
            closed_volume: fill.volume,
            remaining_volume: position.remaining_volume,
            price: fill.fill_price,
            profit,
            time: point.time,
        };
        publish(events, event).await;
        Ok(true)
    }

    async fn try_break_even(
        &mut self,
        id: PositionId,
        point: PricePoint,
        execution: &mut dyn OrderExecutionSink,
    ) -> Result<(), OrderError> {
        let buffer = self.spec.pips_to_price(self.config.break_even_buffer_pips);
        let (new_stop, take_profit) = {
            let position = match self.positions.get(&id) {
                Some(p) => p,
                None => return Ok(()),
            };
            if !position.break_even_due() {
                return Ok(());
            }
            if !position.break_even_applicable(point.price, buffer) {
                // Price too close to entry; retried next cycle.
                return Ok(());
            }
            (position.break_even_stop(buffer), position.current_take_profit)
        };

        execution.modify_stops(id, new_stop, take_profit).await?;

        if let Some(position) = self.positions.get_mut(&id) {
            position.apply_break_even(new_stop);
            info!("TradeManager: break-even set on {} at {}", id, new_stop);
        }
        Ok(())
    }

    async fn close_position(
        &mut self,
        id: PositionId,
        price: Decimal,
        reason: &str,
        time: DateTime<Utc>,
        risk: &mut RiskManager,
        execution: &mut dyn OrderExecutionSink,
        events: &mut dyn TradeEventSink,
    ) -> Result<(), OrderError> {
        let volume = {
            let position = match self.positions.get(&id) {
                Some(p) if !p.is_closed() => p,
                _ => return Ok(()),
            };
            position.remaining_volume
        };

        let fill = execution.close_market(id, volume, price).await?;

        let position = match self.positions.get_mut(&id) {
            Some(p) => p,
            None => return Ok(()),
        };
        let profit = position.profit_for(fill.volume, fill.fill_price, &self.spec);
        position.mark_closed(profit);
        risk.record_close(profit);
        info!(
            "TradeManager: closed {} @ {} ({}), profit {}",
            id, fill.fill_price, reason, profit
        );

        let event = TradeEvent::Closed {
            event_id: Uuid::new_v4(),
            position_id: id,
            symbol: position.symbol.clone(),
            volume: fill.volume,
            price: fill.fill_price,
            profit,
            reason: reason.to_string(),
            time,
        };
        publish(events, event).await;
        Ok(())
    }

    /// Close every open position at the observed price. Idempotent: already
    /// closed or vanished positions are skipped, and a failure on one
    /// position does not stop the rest.
    pub async fn close_all(
        &mut self,
        point: PricePoint,
        risk: &mut RiskManager,
        execution: &mut dyn OrderExecutionSink,
        events: &mut dyn TradeEventSink,
    ) {
        let ids: Vec<PositionId> = self
            .positions
            .iter()
            .filter(|(_, p)| !p.is_closed())
            .map(|(id, _)| *id)
            .collect();

        for id in ids {
            if let Err(err) = self
                .close_position(id, point.price, "close_all", point.time, risk, execution, events)
                .await
            {
                error!("TradeManager: close_all failed for {}: {}", id, err);
            }
        }
        self.positions.retain(|_, p| !p.is_closed());
    }

    /// Drop local positions the broker no longer reports (stop executed
    /// server-side, manual intervention). Logged, never fatal; realized
    /// profit for such closes is already reflected in the account balance.
    pub fn sync_with_account(&mut self, broker_ids: &[PositionId]) {
        let vanished: Vec<PositionId> = self
            .positions
            .keys()
            .filter(|id| !broker_ids.contains(id))
            .copied()
            .collect();
        for id in vanished {
            warn!("TradeManager: position {} closed externally, removing", id);
            self.positions.remove(&id);
        }
    }
}

async fn publish(events: &mut dyn TradeEventSink, event: TradeEvent) {
    if let Err(err) = events.publish(event).await {
        warn!("TradeManager: trade event delivery failed: {}", err);
    }
}
