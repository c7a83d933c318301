//! Engine configuration: validated plain structs with sensible defaults,
//! loadable from a TOML file for the backtest CLI.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;

use anyhow::Context;

use crate::domain::errors::ConfigError;

/// Indicator periods and thresholds for the three-timeframe cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,
    pub rsi_period: usize,
    /// Momentum bands for confirmation: Buy requires RSI in
    /// [buy_min, buy_max], Sell in [sell_min, sell_max], bounds inclusive.
    pub rsi_buy_min: f64,
    pub rsi_buy_max: f64,
    pub rsi_sell_min: f64,
    pub rsi_sell_max: f64,
    pub stoch_k_period: usize,
    pub stoch_slowing: usize,
    pub stoch_d_period: usize,
    pub stoch_oversold: f64,
    pub stoch_overbought: f64,
    pub atr_period: usize,
    /// Minimum M1 ATR in pips for a trigger to count; below this the market
    /// is treated as too quiet to scalp.
    pub atr_floor_pips: Decimal,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        IndicatorConfig {
            ema_fast_period: 9,
            ema_slow_period: 21,
            rsi_period: 14,
            rsi_buy_min: 40.0,
            rsi_buy_max: 70.0,
            rsi_sell_min: 30.0,
            rsi_sell_max: 60.0,
            stoch_k_period: 5,
            stoch_slowing: 3,
            stoch_d_period: 3,
            stoch_oversold: 20.0,
            stoch_overbought: 80.0,
            atr_period: 14,
            atr_floor_pips: dec!(3),
        }
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("ema_fast_period", self.ema_fast_period),
            ("ema_slow_period", self.ema_slow_period),
            ("rsi_period", self.rsi_period),
            ("stoch_k_period", self.stoch_k_period),
            ("stoch_d_period", self.stoch_d_period),
            ("atr_period", self.atr_period),
        ] {
            if value < 2 {
                return Err(ConfigError::InvalidPeriod { field, value });
            }
        }
        if self.ema_fast_period >= self.ema_slow_period {
            return Err(ConfigError::Invalid {
                field: "ema_fast_period",
                reason: format!(
                    "fast period {} must be shorter than slow period {}",
                    self.ema_fast_period, self.ema_slow_period
                ),
            });
        }
        if self.stoch_slowing < 1 {
            return Err(ConfigError::InvalidPeriod {
                field: "stoch_slowing",
                value: self.stoch_slowing,
            });
        }
        if self.atr_floor_pips <= Decimal::ZERO {
            return Err(ConfigError::InvalidPips {
                field: "atr_floor_pips",
                value: self.atr_floor_pips,
            });
        }
        Ok(())
    }
}

/// Risk limits, position sizing and trade management parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub symbol: String,
    pub stop_loss_pips: Decimal,
    pub rr_partial: Decimal,
    pub rr_final: Decimal,
    pub partial_close_percent: Decimal,
    pub break_even_buffer_pips: Decimal,
    pub risk_per_trade_pct: Decimal,
    pub max_drawdown_pct: Decimal,
    pub max_daily_drawdown_pct: Decimal,
    pub max_daily_operations: u32,
    pub max_spread_pips: Decimal,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            symbol: "EURUSD".to_string(),
            stop_loss_pips: dec!(12),
            rr_partial: dec!(2.0),
            rr_final: dec!(3.0),
            partial_close_percent: dec!(50),
            break_even_buffer_pips: dec!(2),
            risk_per_trade_pct: dec!(1.0),
            max_drawdown_pct: dec!(10.0),
            max_daily_drawdown_pct: dec!(5.0),
            max_daily_operations: 10,
            max_spread_pips: dec!(2.0),
        }
    }
}

impl TradingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("risk_per_trade_pct", self.risk_per_trade_pct),
            ("max_drawdown_pct", self.max_drawdown_pct),
            ("max_daily_drawdown_pct", self.max_daily_drawdown_pct),
            ("partial_close_percent", self.partial_close_percent),
        ] {
            if value <= Decimal::ZERO || value > Decimal::ONE_HUNDRED {
                return Err(ConfigError::InvalidPercent { field, value });
            }
        }
        for (field, value) in [
            ("stop_loss_pips", self.stop_loss_pips),
            ("break_even_buffer_pips", self.break_even_buffer_pips),
            ("max_spread_pips", self.max_spread_pips),
        ] {
            if value <= Decimal::ZERO {
                return Err(ConfigError::InvalidPips { field, value });
            }
        }
        if self.rr_partial <= Decimal::ZERO || self.rr_partial >= self.rr_final {
            return Err(ConfigError::InvalidRiskReward {
                partial: self.rr_partial,
                final_rr: self.rr_final,
            });
        }
        if self.max_daily_operations == 0 {
            return Err(ConfigError::Invalid {
                field: "max_daily_operations",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// One tradable window in server-local hours, half-open `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub name: String,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl SessionWindow {
    pub fn contains(&self, hour: u32) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub windows: Vec<SessionWindow>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            windows: vec![
                SessionWindow {
                    name: "London".to_string(),
                    start_hour: 8,
                    end_hour: 12,
                },
                SessionWindow {
                    name: "NewYork".to_string(),
                    start_hour: 13,
                    end_hour: 17,
                },
            ],
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for window in &self.windows {
            if window.start_hour >= window.end_hour || window.end_hour > 24 {
                return Err(ConfigError::InvalidSessionWindow {
                    start: window.start_hour,
                    end: window.end_hour,
                });
            }
        }
        Ok(())
    }
}

/// Top-level configuration bundle for one trading instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub trading: TradingConfig,
    pub indicators: IndicatorConfig,
    pub sessions: SessionConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.trading.validate()?;
        self.indicators.validate()?;
        self.sessions.validate()?;
        Ok(())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: EngineConfig = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("validating config file {}", path.display()))?;
        Ok(config)
    }
}
