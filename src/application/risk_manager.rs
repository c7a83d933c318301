//! Account-level gatekeeper: drawdown limits, daily operation budget,
//! spread acceptance and risk-based position sizing.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::TradingConfig;
use crate::domain::risk::{should_reset, DailyStats, RiskState};
use crate::domain::symbol::SymbolSpec;
use crate::domain::types::{AccountSnapshot, BotStatus, RejectReason};

pub struct RiskManager {
    config: TradingConfig,
    spec: SymbolSpec,
    state: RiskState,
    daily_stats: DailyStats,
}

impl RiskManager {
    pub fn new(
        config: TradingConfig,
        spec: SymbolSpec,
        initial: &AccountSnapshot,
        today: NaiveDate,
    ) -> Self {
        RiskManager {
            config,
            spec,
            state: RiskState::new(initial.balance, initial.equity, today),
            daily_stats: DailyStats::new(initial.balance),
        }
    }

    /// Refresh risk state from a fresh account snapshot. The lazy daily
    /// rollover runs first so every check in the same cycle sees the new
    /// day's reference points.
    pub fn update(&mut self, snapshot: &AccountSnapshot, today: NaiveDate) {
        if should_reset(self.state.daily_reset_date, today) {
            info!(
                "RiskManager: daily rollover {} -> {}, start balance {}",
                self.state.daily_reset_date, today, snapshot.balance
            );
            self.state.reset_daily(snapshot.balance, snapshot.equity, today);
            self.daily_stats.reset(snapshot.balance);
        }
        self.state.update_drawdowns(snapshot.balance, snapshot.equity);
        self.daily_stats.current_balance = snapshot.balance;
    }

    pub fn is_drawdown_exceeded(&self) -> bool {
        self.state.current_drawdown_pct >= self.config.max_drawdown_pct
    }

    pub fn is_daily_drawdown_exceeded(&self) -> bool {
        self.state.daily_drawdown_pct >= self.config.max_daily_drawdown_pct
    }

    pub fn is_daily_ops_exceeded(&self) -> bool {
        self.state.daily_operation_count >= self.config.max_daily_operations
    }

    /// Gate a prospective entry. Short-circuits in severity order so the
    /// surfaced reason is always the most serious violation.
    pub fn can_trade(&self) -> Result<(), RejectReason> {
        if self.is_drawdown_exceeded() {
            return Err(RejectReason::MaxDrawdownExceeded);
        }
        if self.is_daily_drawdown_exceeded() {
            return Err(RejectReason::DailyDrawdownExceeded);
        }
        if self.is_daily_ops_exceeded() {
            return Err(RejectReason::DailyOperationsExceeded);
        }
        Ok(())
    }

    /// Same checks as `can_trade`, mapped to a status value for reporting.
    pub fn risk_status(&self) -> BotStatus {
        if self.is_drawdown_exceeded() {
            BotStatus::MaxDrawdownExceeded
        } else if self.is_daily_drawdown_exceeded() {
            BotStatus::DailyDrawdownExceeded
        } else if self.is_daily_ops_exceeded() {
            BotStatus::DailyOperationsExceeded
        } else {
            BotStatus::Active
        }
    }

    /// Spread gate, evaluated fresh each cycle from broker points.
    pub fn is_spread_acceptable(&self, spread_points: Decimal) -> bool {
        let spread_pips = self.spec.points_to_pips(spread_points);
        let acceptable = spread_pips <= self.config.max_spread_pips;
        if !acceptable {
            warn!(
                "RiskManager: spread {} pips above maximum {}",
                spread_pips, self.config.max_spread_pips
            );
        }
        acceptable
    }

    /// Volume that puts `risk_per_trade_pct` of the balance at risk over the
    /// given stop distance. Clamped to contract bounds and floored to the
    /// lot step so realized risk never exceeds the intended amount.
    pub fn calculate_lot_size(&self, balance: Decimal, stop_loss_pips: Decimal) -> Decimal {
        if stop_loss_pips <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let risk_amount = balance * self.config.risk_per_trade_pct / Decimal::ONE_HUNDRED;
        let pip_value = self.spec.pip_value_per_lot();
        if pip_value <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let raw = risk_amount / (stop_loss_pips * pip_value);
        self.spec.normalize_volume(raw)
    }

    /// Count one opened trade against the daily budget.
    pub fn record_operation(&mut self) {
        self.state.daily_operation_count += 1;
    }

    /// Record one closing execution in the daily tallies.
    pub fn record_close(&mut self, profit: Decimal) {
        self.daily_stats.record_close(profit);
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn daily_stats(&self) -> &DailyStats {
        &self.daily_stats
    }
}
