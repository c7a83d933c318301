use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// True when the calendar date has advanced past the last reset.
///
/// Pure so live (wall clock) and backtest (simulated clock) call the same
/// code and cannot diverge.
pub fn should_reset(last_reset_date: NaiveDate, current_date: NaiveDate) -> bool {
    current_date > last_reset_date
}

/// Mutable per-process risk reference points.
///
/// `max_equity_seen` is the all-time high-water mark and never resets;
/// the `daily_*` fields roll over exactly once when the date advances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub max_equity_seen: Decimal,
    pub daily_start_balance: Decimal,
    pub daily_max_equity: Decimal,
    pub daily_operation_count: u32,
    pub current_drawdown_pct: Decimal,
    pub daily_drawdown_pct: Decimal,
    pub daily_reset_date: NaiveDate,
}

impl RiskState {
    pub fn new(balance: Decimal, equity: Decimal, date: NaiveDate) -> Self {
        RiskState {
            max_equity_seen: equity,
            daily_start_balance: balance,
            daily_max_equity: equity,
            daily_operation_count: 0,
            current_drawdown_pct: Decimal::ZERO,
            daily_drawdown_pct: Decimal::ZERO,
            daily_reset_date: date,
        }
    }

    /// Roll the daily reference points over to a new trading day.
    pub fn reset_daily(&mut self, balance: Decimal, equity: Decimal, date: NaiveDate) {
        self.daily_start_balance = balance;
        self.daily_max_equity = equity;
        self.daily_operation_count = 0;
        self.daily_drawdown_pct = Decimal::ZERO;
        self.daily_reset_date = date;
    }

    /// Recompute both drawdown percentages from fresh account values.
    /// Unrealized gains clamp to zero rather than going negative.
    pub fn update_drawdowns(&mut self, balance: Decimal, equity: Decimal) {
        if equity > self.max_equity_seen {
            self.max_equity_seen = equity;
        }
        if equity > self.daily_max_equity {
            self.daily_max_equity = equity;
        }

        self.current_drawdown_pct = if self.max_equity_seen > Decimal::ZERO {
            ((self.max_equity_seen - equity) / self.max_equity_seen * Decimal::ONE_HUNDRED)
                .max(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };

        self.daily_drawdown_pct = if self.daily_start_balance > Decimal::ZERO {
            ((self.daily_start_balance - balance) / self.daily_start_balance
                * Decimal::ONE_HUNDRED)
                .max(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };
    }
}

/// Per-day trade outcome tallies, reset together with the daily risk state.
///
/// `start_balance` is the balance at the day's first cycle and
/// `current_balance` follows the latest snapshot, so a status report can show
/// the day's travel without reaching into `RiskState`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub start_balance: Decimal,
    pub current_balance: Decimal,
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
}

impl DailyStats {
    pub fn new(start_balance: Decimal) -> Self {
        DailyStats {
            start_balance,
            current_balance: start_balance,
            ..DailyStats::default()
        }
    }

    /// Record one closing execution (full or partial).
    pub fn record_close(&mut self, profit: Decimal) {
        self.trades += 1;
        if profit >= Decimal::ZERO {
            self.wins += 1;
            self.gross_profit += profit;
        } else {
            self.losses += 1;
            self.gross_loss += -profit;
        }
    }

    pub fn net_profit(&self) -> Decimal {
        self.gross_profit - self.gross_loss
    }

    pub fn win_rate(&self) -> Decimal {
        if self.trades == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.wins) / Decimal::from(self.trades) * Decimal::ONE_HUNDRED
    }

    pub fn profit_factor(&self) -> Option<Decimal> {
        if self.gross_loss == Decimal::ZERO {
            return None;
        }
        Some(self.gross_profit / self.gross_loss)
    }

    pub fn expectancy(&self) -> Decimal {
        if self.trades == 0 {
            return Decimal::ZERO;
        }
        self.net_profit() / Decimal::from(self.trades)
    }

    pub fn reset(&mut self, start_balance: Decimal) {
        *self = DailyStats::new(start_balance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_should_reset_only_on_date_advance() {
        let monday = date(2024, 3, 4);
        assert!(!should_reset(monday, monday));
        assert!(should_reset(monday, date(2024, 3, 5)));
        // Clock skew backwards never triggers a reset.
        assert!(!should_reset(monday, date(2024, 3, 3)));
    }

    #[test]
    fn test_high_water_mark_never_decreases() {
        let mut state = RiskState::new(dec!(10000), dec!(10000), date(2024, 3, 4));
        state.update_drawdowns(dec!(10000), dec!(10500));
        assert_eq!(state.max_equity_seen, dec!(10500));
        state.update_drawdowns(dec!(10000), dec!(9800));
        assert_eq!(state.max_equity_seen, dec!(10500));
    }

    #[test]
    fn test_drawdown_scenario() {
        let mut state = RiskState::new(dec!(10000), dec!(10000), date(2024, 3, 4));
        state.update_drawdowns(dec!(10000), dec!(9400));
        assert_eq!(state.current_drawdown_pct, dec!(6.0));
    }

    #[test]
    fn test_daily_drawdown_clamped_at_zero() {
        let mut state = RiskState::new(dec!(10000), dec!(10000), date(2024, 3, 4));
        state.update_drawdowns(dec!(10300), dec!(10300));
        assert_eq!(state.daily_drawdown_pct, dec!(0));
        state.update_drawdowns(dec!(9700), dec!(9700));
        assert_eq!(state.daily_drawdown_pct, dec!(3.0));
    }

    #[test]
    fn test_daily_reset_keeps_high_water_mark() {
        let mut state = RiskState::new(dec!(10000), dec!(10000), date(2024, 3, 4));
        state.update_drawdowns(dec!(10000), dec!(11000));
        state.daily_operation_count = 7;
        state.reset_daily(dec!(10400), dec!(10400), date(2024, 3, 5));
        assert_eq!(state.max_equity_seen, dec!(11000));
        assert_eq!(state.daily_operation_count, 0);
        assert_eq!(state.daily_start_balance, dec!(10400));
        assert_eq!(state.daily_drawdown_pct, dec!(0));
    }

    #[test]
    fn test_daily_stats_accounting() {
        let mut stats = DailyStats::default();
        stats.record_close(dec!(24.0));
        stats.record_close(dec!(-12.0));
        stats.record_close(dec!(36.0));
        assert_eq!(stats.trades, 3);
        assert_eq!(stats.wins, 2);
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.net_profit(), dec!(48.0));
        assert_eq!(stats.profit_factor(), Some(dec!(5.0)));
        assert_eq!(stats.expectancy(), dec!(16.0));
    }

    #[test]
    fn test_win_rate_empty_day() {
        let stats = DailyStats::default();
        assert_eq!(stats.win_rate(), dec!(0));
        assert_eq!(stats.profit_factor(), None);
    }
}
