use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::types::{PositionId, RejectReason};

/// Failures surfaced by the order execution sink or during order validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrderError {
    #[error("Insufficient margin: required {required}, available {available}")]
    InsufficientMargin {
        required: Decimal,
        available: Decimal,
    },

    #[error("Invalid stops for {symbol}: sl={stop_loss}, tp={take_profit}")]
    InvalidStops {
        symbol: String,
        stop_loss: Decimal,
        take_profit: Decimal,
    },

    #[error("Trading disabled for symbol {symbol}")]
    TradingDisabled { symbol: String },

    #[error("Position {position_id} not found")]
    PositionNotFound { position_id: PositionId },

    #[error("Market closed for {symbol}")]
    MarketClosed { symbol: String },

    #[error("Order rejected: {reason}")]
    Rejected { reason: RejectReason },

    #[error("Invalid volume {volume} for {symbol} (min {min}, step {step})")]
    InvalidVolume {
        symbol: String,
        volume: Decimal,
        min: Decimal,
        step: Decimal,
    },
}

/// Configuration validation failures. Construction fails, the engine never
/// starts with a bad config.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid percentage for {field}: {value} (must be in (0, 100])")]
    InvalidPercent { field: &'static str, value: Decimal },

    #[error("Invalid pip distance for {field}: {value} (must be > 0)")]
    InvalidPips { field: &'static str, value: Decimal },

    #[error("Invalid risk/reward ratio: partial {partial} must be < final {final_rr}")]
    InvalidRiskReward { partial: Decimal, final_rr: Decimal },

    #[error("Invalid session window: start hour {start} must be < end hour {end}")]
    InvalidSessionWindow { start: u32, end: u32 },

    #[error("Invalid indicator period for {field}: {value} (must be >= 2)")]
    InvalidPeriod { field: &'static str, value: usize },

    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_error_display() {
        let err = OrderError::InsufficientMargin {
            required: dec!(500),
            available: dec!(120.5),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient margin: required 500, available 120.5"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidPercent {
            field: "risk_per_trade",
            value: dec!(150),
        };
        assert!(err.to_string().contains("risk_per_trade"));
    }
}
