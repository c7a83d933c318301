use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// +1 for Buy, -1 for Sell; used to place stops/targets on the correct side.
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Buy => Decimal::ONE,
            Direction::Sell => -Decimal::ONE,
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
}

impl Timeframe {
    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Indicator slots exposed by the Indicator Provider, per timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndicatorKind {
    EmaFast,
    EmaSlow,
    Rsi,
    StochK,
    StochD,
    Atr,
    Vwap,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One bar of OHLCV market data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Immutable entry proposal produced by the Signal Engine.
///
/// Constructed once per evaluation cycle when the full cascade succeeds,
/// consumed immediately by the orchestrator, never retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    pub symbol: String,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit_partial: Decimal,
    pub take_profit_final: Decimal,
    pub lot_size: Decimal,
    pub stop_loss_pips: Decimal,
    pub generated_at: DateTime<Utc>,
}

impl Signal {
    pub fn with_lot(mut self, lot_size: Decimal) -> Self {
        self.lot_size = lot_size;
        self
    }
}

/// Why the Signal Engine produced no entry this cycle.
///
/// "Analyzed, no trade" outcomes are distinct from "could not analyze"
/// (`SignalVerdict::NotReady`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoTradeReason {
    NoTrend,
    NotConfirmed,
    BelowVolatilityFloor,
    NoTrigger,
}

/// Outcome of one Signal Engine evaluation.
#[derive(Debug, Clone)]
pub enum SignalVerdict {
    Entry(Signal),
    NoTrade(NoTradeReason),
    /// Indicator history too short; a normal transient state, not an error.
    NotReady,
}

/// Most advanced lifecycle transition a position has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeState {
    Open,
    PartiallyClosed,
    BreakEven,
    Closed,
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Operational status reported by the Risk Manager / orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotStatus {
    Active,
    Paused,
    MaxDrawdownExceeded,
    DailyDrawdownExceeded,
    DailyOperationsExceeded,
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Why an entry was refused before reaching the execution sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    PositionAlreadyOpen,
    MaxDrawdownExceeded,
    DailyDrawdownExceeded,
    DailyOperationsExceeded,
    OutsideSession,
    NewsBlockActive,
    SpreadTooHigh,
    TradingDisabled,
    ZeroVolume,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::PositionAlreadyOpen => write!(f, "position already open for symbol"),
            RejectReason::MaxDrawdownExceeded => write!(f, "max drawdown exceeded"),
            RejectReason::DailyDrawdownExceeded => write!(f, "daily drawdown exceeded"),
            RejectReason::DailyOperationsExceeded => write!(f, "daily operations limit reached"),
            RejectReason::OutsideSession => write!(f, "outside trading session"),
            RejectReason::NewsBlockActive => write!(f, "news block active"),
            RejectReason::SpreadTooHigh => write!(f, "spread above configured maximum"),
            RejectReason::TradingDisabled => write!(f, "trading disabled for instrument"),
            RejectReason::ZeroVolume => write!(f, "computed volume is zero"),
        }
    }
}

/// Account state recomputed each cycle from the Account State Source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balance: Decimal,
    pub equity: Decimal,
    pub margin_used: Decimal,
    pub free_margin: Decimal,
    pub floating_profit: Decimal,
    pub open_position_count: usize,
}

/// External control commands, polled once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Pause,
    Resume,
    CloseAll,
    StatusRequest,
    SetNewsBlock(bool),
}

/// Periodic status snapshot pushed to the Trade Event Sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub symbol: String,
    pub status: BotStatus,
    pub balance: Decimal,
    pub equity: Decimal,
    pub open_positions: usize,
    pub daily_operations: u32,
    pub current_drawdown_pct: Decimal,
    pub daily_drawdown_pct: Decimal,
    pub time: DateTime<Utc>,
}

/// One-way notifications for the external trade-reporting sink.
///
/// Delivery is best-effort; failures never block the trading cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TradeEvent {
    Opened {
        event_id: Uuid,
        position_id: PositionId,
        symbol: String,
        direction: Direction,
        volume: Decimal,
        price: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        time: DateTime<Utc>,
    },
    PartiallyClosed {
        event_id: Uuid,
        position_id: PositionId,
        symbol: String,
        closed_volume: Decimal,
        remaining_volume: Decimal,
        price: Decimal,
        profit: Decimal,
        time: DateTime<Utc>,
    },
    Closed {
        event_id: Uuid,
        position_id: PositionId,
        symbol: String,
        volume: Decimal,
        price: Decimal,
        profit: Decimal,
        reason: String,
        time: DateTime<Utc>,
    },
    Status(StatusSnapshot),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_direction_sign() {
        assert_eq!(Direction::Buy.sign(), dec!(1));
        assert_eq!(Direction::Sell.sign(), dec!(-1));
        assert_eq!(Direction::Buy.opposite(), Direction::Sell);
    }

    #[test]
    fn test_timeframe_minutes_ordering() {
        assert!(Timeframe::M1.minutes() < Timeframe::M5.minutes());
        assert!(Timeframe::M5.minutes() < Timeframe::M15.minutes());
    }

    #[test]
    fn test_reject_reason_display() {
        let msg = RejectReason::DailyOperationsExceeded.to_string();
        assert!(msg.contains("daily operations"));
    }
}
