//! Collaborator traits at the edges of the engine.
//!
//! The indicator provider is synchronous (backed by in-memory series in
//! backtests); everything that crosses a process or network boundary is an
//! async trait so live adapters can await broker round-trips.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::errors::OrderError;
use crate::domain::types::{
    AccountSnapshot, Command, Direction, IndicatorKind, PositionId, Timeframe, TradeEvent,
};

/// Read-only access to indicator values by timeframe, indicator and bar shift.
///
/// Shift 0 is the forming bar, shift 1 the last closed bar. `None` means the
/// series has not accumulated enough history yet; callers treat it as
/// "no signal", never as an error.
pub trait IndicatorProvider {
    fn get(&self, timeframe: Timeframe, indicator: IndicatorKind, shift: usize) -> Option<f64>;

    /// True once every configured indicator on the timeframe has enough bars.
    fn series_ready(&self, timeframe: Timeframe) -> bool;
}

/// Outcome of a successful market order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFill {
    pub position_id: PositionId,
    pub fill_price: Decimal,
    pub volume: Decimal,
}

/// Order placement and position mutation against the broker (real or simulated).
#[async_trait]
pub trait OrderExecutionSink: Send + Sync {
    async fn open_market(
        &mut self,
        symbol: &str,
        direction: Direction,
        volume: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        comment: &str,
    ) -> Result<OrderFill, OrderError>;

    /// Close `volume` of the position at market. Closing the full remaining
    /// volume removes the position on the broker side. `reference_price` is
    /// the price the caller observed when deciding to close; simulated venues
    /// fill at it so replays stay deterministic, live venues ignore it.
    async fn close_market(
        &mut self,
        position_id: PositionId,
        volume: Decimal,
        reference_price: Decimal,
    ) -> Result<OrderFill, OrderError>;

    async fn modify_stops(
        &mut self,
        position_id: PositionId,
        stop_loss: Decimal,
        take_profit: Decimal,
    ) -> Result<(), OrderError>;
}

/// Fresh account state, queried once per cycle.
#[async_trait]
pub trait AccountStateSource: Send + Sync {
    async fn snapshot(&self) -> AccountSnapshot;

    /// Current spread in broker points for the symbol.
    async fn spread_points(&self, symbol: &str) -> Decimal;

    /// Broker-side position ids currently open for the symbol. Used to
    /// reconcile positions closed externally (stop hit server-side, manual
    /// intervention).
    async fn open_position_ids(&self, symbol: &str) -> Vec<PositionId>;
}

/// A trading venue is both an execution sink and an account state source.
/// Live adapters and the simulated broker implement both halves on one type,
/// so the cycle driver can hold them behind a single object.
pub trait Venue: OrderExecutionSink + AccountStateSource {}

impl<T: OrderExecutionSink + AccountStateSource> Venue for T {}

/// Best-effort outbound notifications. Failures are logged by the caller and
/// never block the trading cycle.
#[async_trait]
pub trait TradeEventSink: Send + Sync {
    async fn publish(&mut self, event: TradeEvent) -> anyhow::Result<()>;
}

/// Non-blocking source of external control commands.
#[async_trait]
pub trait CommandSource: Send + Sync {
    /// Returns the next pending command, or `None` when the queue is empty.
    async fn poll(&mut self) -> Option<Command>;
}
