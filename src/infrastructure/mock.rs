//! In-memory port implementations shared by unit and integration tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};

use crate::domain::errors::OrderError;
use crate::domain::ports::{
    AccountStateSource, CommandSource, IndicatorProvider, OrderExecutionSink, OrderFill,
    TradeEventSink,
};
use crate::domain::types::{
    AccountSnapshot, Command, Direction, IndicatorKind, PositionId, Timeframe, TradeEvent,
};

/// Indicator provider backed by explicitly seeded values.
#[derive(Debug, Default)]
pub struct MockIndicators {
    values: HashMap<(Timeframe, IndicatorKind, usize), f64>,
    not_ready: HashMap<Timeframe, bool>,
}

impl MockIndicators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, timeframe: Timeframe, indicator: IndicatorKind, shift: usize, value: f64) {
        self.values.insert((timeframe, indicator, shift), value);
    }

    pub fn set_ready(&mut self, timeframe: Timeframe, ready: bool) {
        self.not_ready.insert(timeframe, !ready);
    }
}

impl IndicatorProvider for MockIndicators {
    fn get(&self, timeframe: Timeframe, indicator: IndicatorKind, shift: usize) -> Option<f64> {
        self.values.get(&(timeframe, indicator, shift)).copied()
    }

    fn series_ready(&self, timeframe: Timeframe) -> bool {
        !self.not_ready.get(&timeframe).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedOpen {
    pub symbol: String,
    pub direction: Direction,
    pub volume: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

/// Execution sink that records every call and fills at a configurable price.
pub struct MockExecution {
    pub fill_price: Decimal,
    pub opens: Vec<RecordedOpen>,
    pub closes: Vec<(PositionId, Decimal)>,
    pub stop_modifications: Vec<(PositionId, Decimal, Decimal)>,
    pub next_error: Option<OrderError>,
    next_id: u64,
}

impl MockExecution {
    pub fn new(fill_price: Decimal) -> Self {
        MockExecution {
            fill_price,
            opens: Vec::new(),
            closes: Vec::new(),
            stop_modifications: Vec::new(),
            next_error: None,
            next_id: 1,
        }
    }
}

#[async_trait]
impl OrderExecutionSink for MockExecution {
    async fn open_market(
        &mut self,
        symbol: &str,
        direction: Direction,
        volume: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        _comment: &str,
    ) -> Result<OrderFill, OrderError> {
        if let Some(err) = self.next_error.take() {
            return Err(err);
        }
        self.opens.push(RecordedOpen {
            symbol: symbol.to_string(),
            direction,
            volume,
            stop_loss,
            take_profit,
        });
        let id = PositionId(self.next_id);
        self.next_id += 1;
        Ok(OrderFill {
            position_id: id,
            fill_price: self.fill_price,
            volume,
        })
    }

    async fn close_market(
        &mut self,
        position_id: PositionId,
        volume: Decimal,
        reference_price: Decimal,
    ) -> Result<OrderFill, OrderError> {
        if let Some(err) = self.next_error.take() {
            return Err(err);
        }
        self.closes.push((position_id, volume));
        Ok(OrderFill {
            position_id,
            fill_price: reference_price,
            volume,
        })
    }

    async fn modify_stops(
        &mut self,
        position_id: PositionId,
        stop_loss: Decimal,
        take_profit: Decimal,
    ) -> Result<(), OrderError> {
        if let Some(err) = self.next_error.take() {
            return Err(err);
        }
        self.stop_modifications
            .push((position_id, stop_loss, take_profit));
        Ok(())
    }
}

/// Account source returning a fixed snapshot.
pub struct MockAccount {
    pub snapshot: AccountSnapshot,
    pub spread_points: Decimal,
    pub open_ids: Vec<PositionId>,
}

impl MockAccount {
    pub fn with_balance(balance: Decimal) -> Self {
        MockAccount {
            snapshot: AccountSnapshot {
                balance,
                equity: balance,
                margin_used: Decimal::ZERO,
                free_margin: balance,
                floating_profit: Decimal::ZERO,
                open_position_count: 0,
            },
            spread_points: dec!(10),
            open_ids: Vec::new(),
        }
    }
}

#[async_trait]
impl AccountStateSource for MockAccount {
    async fn snapshot(&self) -> AccountSnapshot {
        self.snapshot.clone()
    }

    async fn spread_points(&self, _symbol: &str) -> Decimal {
        self.spread_points
    }

    async fn open_position_ids(&self, _symbol: &str) -> Vec<PositionId> {
        self.open_ids.clone()
    }
}

/// Execution and account state on one object, as a real venue adapter is.
pub struct MockVenue {
    pub execution: MockExecution,
    pub account: MockAccount,
}

impl MockVenue {
    pub fn with_balance(balance: Decimal) -> Self {
        MockVenue {
            execution: MockExecution::new(dec!(1.1000)),
            account: MockAccount::with_balance(balance),
        }
    }
}

#[async_trait]
impl OrderExecutionSink for MockVenue {
    async fn open_market(
        &mut self,
        symbol: &str,
        direction: Direction,
        volume: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        comment: &str,
    ) -> Result<OrderFill, OrderError> {
        self.execution
            .open_market(symbol, direction, volume, stop_loss, take_profit, comment)
            .await
    }

    async fn close_market(
        &mut self,
        position_id: PositionId,
        volume: Decimal,
        reference_price: Decimal,
    ) -> Result<OrderFill, OrderError> {
        self.execution
            .close_market(position_id, volume, reference_price)
            .await
    }

    async fn modify_stops(
        &mut self,
        position_id: PositionId,
        stop_loss: Decimal,
        take_profit: Decimal,
    ) -> Result<(), OrderError> {
        self.execution
            .modify_stops(position_id, stop_loss, take_profit)
            .await
    }
}

#[async_trait]
impl AccountStateSource for MockVenue {
    async fn snapshot(&self) -> AccountSnapshot {
        self.account.snapshot().await
    }

    async fn spread_points(&self, symbol: &str) -> Decimal {
        self.account.spread_points(symbol).await
    }

    async fn open_position_ids(&self, symbol: &str) -> Vec<PositionId> {
        self.account.open_position_ids(symbol).await
    }
}

/// Event sink capturing everything published; can be told to fail.
#[derive(Default)]
pub struct MockEvents {
    pub published: Vec<TradeEvent>,
    pub fail_next: bool,
}

impl MockEvents {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TradeEventSink for MockEvents {
    async fn publish(&mut self, event: TradeEvent) -> anyhow::Result<()> {
        if self.fail_next {
            self.fail_next = false;
            anyhow::bail!("sink unavailable");
        }
        self.published.push(event);
        Ok(())
    }
}

/// Command source draining a preloaded queue.
#[derive(Default)]
pub struct MockCommands {
    pub queue: VecDeque<Command>,
}

impl MockCommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.queue.push_back(command);
    }
}

#[async_trait]
impl CommandSource for MockCommands {
    async fn poll(&mut self) -> Option<Command> {
        self.queue.pop_front()
    }
}
