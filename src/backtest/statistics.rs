//! Summary statistics over a finished replay.

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Aggregate results of one backtest run. `trades` counts closing
/// executions, so a position exited in two parts contributes two entries,
/// mirroring the live daily statistics.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub initial_balance: Decimal,
    pub final_balance: Decimal,
    pub net_profit: Decimal,
    pub bars_processed: usize,
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate_pct: Decimal,
    pub profit_factor: Option<Decimal>,
    pub expectancy: Decimal,
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: Decimal,
}

impl BacktestReport {
    pub fn compute(
        initial_balance: Decimal,
        final_balance: Decimal,
        bars_processed: usize,
        closed_profits: &[Decimal],
        equity_curve: &[Decimal],
    ) -> Self {
        let mut wins = 0u32;
        let mut losses = 0u32;
        let mut gross_profit = Decimal::ZERO;
        let mut gross_loss = Decimal::ZERO;
        for &profit in closed_profits {
            if profit >= Decimal::ZERO {
                wins += 1;
                gross_profit += profit;
            } else {
                losses += 1;
                gross_loss += -profit;
            }
        }
        let trades = wins + losses;

        let win_rate_pct = if trades > 0 {
            Decimal::from(wins) / Decimal::from(trades) * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        let profit_factor = if gross_loss > Decimal::ZERO {
            Some(gross_profit / gross_loss)
        } else {
            None
        };
        let net_profit = gross_profit - gross_loss;
        let expectancy = if trades > 0 {
            net_profit / Decimal::from(trades)
        } else {
            Decimal::ZERO
        };

        let (max_drawdown, max_drawdown_pct) = max_drawdown(equity_curve);

        BacktestReport {
            initial_balance,
            final_balance,
            net_profit,
            bars_processed,
            trades,
            wins,
            losses,
            win_rate_pct,
            profit_factor,
            expectancy,
            max_drawdown,
            max_drawdown_pct,
        }
    }
}

/// Deepest peak-to-trough equity decline, absolute and as a percentage of
/// the peak.
fn max_drawdown(equity_curve: &[Decimal]) -> (Decimal, Decimal) {
    let mut peak = Decimal::MIN;
    let mut worst = Decimal::ZERO;
    let mut worst_pct = Decimal::ZERO;
    for &equity in equity_curve {
        if equity > peak {
            peak = equity;
        }
        let decline = peak - equity;
        if decline > worst {
            worst = decline;
            if peak > Decimal::ZERO {
                worst_pct = decline / peak * Decimal::ONE_HUNDRED;
            }
        }
    }
    (worst, worst_pct)
}

impl fmt::Display for BacktestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Backtest summary")?;
        writeln!(f, "  bars processed : {}", self.bars_processed)?;
        writeln!(f, "  balance        : {} -> {}", self.initial_balance, self.final_balance)?;
        writeln!(f, "  net profit     : {}", self.net_profit)?;
        writeln!(
            f,
            "  trades         : {} ({} wins / {} losses, {:.1}% win rate)",
            self.trades, self.wins, self.losses, self.win_rate_pct
        )?;
        match self.profit_factor {
            Some(pf) => writeln!(f, "  profit factor  : {:.2}", pf)?,
            None => writeln!(f, "  profit factor  : n/a (no losing trades)")?,
        }
        writeln!(f, "  expectancy     : {:.2}", self.expectancy)?;
        write!(
            f,
            "  max drawdown   : {} ({:.2}%)",
            self.max_drawdown, self.max_drawdown_pct
        )
    }
}
