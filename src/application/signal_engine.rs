//! Three-stage signal cascade: trend on the high timeframe, confirmation on
//! the middle one, trigger on the entry timeframe. Each stage gates the next
//! and every comparison that fires a signal is a strict inequality.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::{IndicatorConfig, TradingConfig};
use crate::domain::ports::IndicatorProvider;
use crate::domain::symbol::SymbolSpec;
use crate::domain::types::{
    Direction, IndicatorKind, NoTradeReason, Signal, SignalVerdict, Timeframe,
};

pub struct SignalEngine {
    indicators: IndicatorConfig,
    trading: TradingConfig,
    spec: SymbolSpec,
    trend_tf: Timeframe,
    confirm_tf: Timeframe,
    entry_tf: Timeframe,
}

impl SignalEngine {
    pub fn new(indicators: IndicatorConfig, trading: TradingConfig, spec: SymbolSpec) -> Self {
        SignalEngine {
            indicators,
            trading,
            spec,
            trend_tf: Timeframe::M15,
            confirm_tf: Timeframe::M5,
            entry_tf: Timeframe::M1,
        }
    }

    /// Run the full cascade once. Stateless between calls; all history lives
    /// in the indicator provider.
    pub fn evaluate(&self, provider: &dyn IndicatorProvider, now: DateTime<Utc>) -> SignalVerdict {
        for tf in [self.trend_tf, self.confirm_tf, self.entry_tf] {
            if !provider.series_ready(tf) {
                return SignalVerdict::NotReady;
            }
        }

        let direction = match self.trend_stage(provider) {
            Stage::Pass(direction) => direction,
            Stage::Blocked(reason) => return SignalVerdict::NoTrade(reason),
            Stage::Missing => return SignalVerdict::NotReady,
        };

        match self.confirmation_stage(provider, direction) {
            Stage::Pass(()) => {}
            Stage::Blocked(reason) => return SignalVerdict::NoTrade(reason),
            Stage::Missing => return SignalVerdict::NotReady,
        }

        match self.trigger_stage(provider, direction) {
            Stage::Pass(()) => {}
            Stage::Blocked(reason) => return SignalVerdict::NoTrade(reason),
            Stage::Missing => return SignalVerdict::NotReady,
        }

        match self.build_signal(provider, direction, now) {
            Some(signal) => SignalVerdict::Entry(signal),
            None => SignalVerdict::NotReady,
        }
    }

    /// EMA(fast) vs EMA(slow) on the last closed trend bar. A flat tie is a
    /// no-trade outcome, not an error.
    fn trend_stage(&self, provider: &dyn IndicatorProvider) -> Stage<Direction> {
        let Some(fast) = provider.get(self.trend_tf, IndicatorKind::EmaFast, 1) else {
            return Stage::Missing;
        };
        let Some(slow) = provider.get(self.trend_tf, IndicatorKind::EmaSlow, 1) else {
            return Stage::Missing;
        };

        if fast > slow {
            Stage::Pass(Direction::Buy)
        } else if fast < slow {
            Stage::Pass(Direction::Sell)
        } else {
            debug!("SignalEngine: flat trend, EMA fast == slow");
            Stage::Blocked(NoTradeReason::NoTrend)
        }
    }

    /// Middle timeframe must agree on EMA alignment, close vs VWAP, and an
    /// RSI momentum band (bounds inclusive).
    fn confirmation_stage(
        &self,
        provider: &dyn IndicatorProvider,
        direction: Direction,
    ) -> Stage<()> {
        let tf = self.confirm_tf;
        let values = [
            provider.get(tf, IndicatorKind::EmaFast, 1),
            provider.get(tf, IndicatorKind::EmaSlow, 1),
            provider.get(tf, IndicatorKind::Close, 1),
            provider.get(tf, IndicatorKind::Vwap, 1),
            provider.get(tf, IndicatorKind::Rsi, 1),
        ];
        let [Some(fast), Some(slow), Some(close), Some(vwap), Some(rsi)] = values else {
            return Stage::Missing;
        };

        let ema_ok = match direction {
            Direction::Buy => fast > slow,
            Direction::Sell => fast < slow,
        };
        let vwap_ok = match direction {
            Direction::Buy => close > vwap,
            Direction::Sell => close < vwap,
        };
        let rsi_ok = match direction {
            Direction::Buy => {
                rsi >= self.indicators.rsi_buy_min && rsi <= self.indicators.rsi_buy_max
            }
            Direction::Sell => {
                rsi >= self.indicators.rsi_sell_min && rsi <= self.indicators.rsi_sell_max
            }
        };

        if ema_ok && vwap_ok && rsi_ok {
            Stage::Pass(())
        } else {
            debug!(
                "SignalEngine: {} not confirmed (ema_ok={}, vwap_ok={}, rsi={:.1})",
                direction, ema_ok, vwap_ok, rsi
            );
            Stage::Blocked(NoTradeReason::NotConfirmed)
        }
    }

    /// Entry timeframe: ATR volatility floor, then a stochastic cross out of
    /// the oversold/overbought zone on the last two closed bars.
    fn trigger_stage(&self, provider: &dyn IndicatorProvider, direction: Direction) -> Stage<()> {
        let tf = self.entry_tf;
        let Some(atr) = provider.get(tf, IndicatorKind::Atr, 1) else {
            return Stage::Missing;
        };

        let floor = self
            .spec
            .pips_to_price(self.indicators.atr_floor_pips)
            .to_f64()
            .unwrap_or(f64::MAX);
        if atr < floor {
            debug!(
                "SignalEngine: ATR {:.6} below volatility floor {:.6}",
                atr, floor
            );
            return Stage::Blocked(NoTradeReason::BelowVolatilityFloor);
        }

        let values = [
            provider.get(tf, IndicatorKind::StochK, 1),
            provider.get(tf, IndicatorKind::StochK, 2),
            provider.get(tf, IndicatorKind::StochD, 1),
        ];
        let [Some(k_now), Some(k_prev), Some(d_now)] = values else {
            return Stage::Missing;
        };

        let crossed = match direction {
            Direction::Buy => {
                k_prev < self.indicators.stoch_oversold && k_now > k_prev && k_now > d_now
            }
            Direction::Sell => {
                k_prev > self.indicators.stoch_overbought && k_now < k_prev && k_now < d_now
            }
        };

        if crossed {
            Stage::Pass(())
        } else {
            Stage::Blocked(NoTradeReason::NoTrigger)
        }
    }

    /// Stops and targets from the configured pip distance; the lot size is
    /// filled in later by the risk manager.
    fn build_signal(
        &self,
        provider: &dyn IndicatorProvider,
        direction: Direction,
        now: DateTime<Utc>,
    ) -> Option<Signal> {
        let price = provider.get(self.entry_tf, IndicatorKind::Close, 0)?;
        let entry = Decimal::from_f64(price)?.round_dp(self.spec.digits);

        let stop_distance = self.spec.pips_to_price(self.trading.stop_loss_pips);
        let sign = direction.sign();

        Some(Signal {
            direction,
            symbol: self.spec.name.clone(),
            entry_price: entry,
            stop_loss: entry - sign * stop_distance,
            take_profit_partial: entry + sign * stop_distance * self.trading.rr_partial,
            take_profit_final: entry + sign * stop_distance * self.trading.rr_final,
            lot_size: Decimal::ZERO,
            stop_loss_pips: self.trading.stop_loss_pips,
            generated_at: now,
        })
    }
}

enum Stage<T> {
    Pass(T),
    Blocked(NoTradeReason),
    Missing,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::MockIndicators;
    use rust_decimal_macros::dec;

    fn engine() -> SignalEngine {
        SignalEngine::new(
            IndicatorConfig::default(),
            TradingConfig::default(),
            SymbolSpec::fx_five_digit("EURUSD"),
        )
    }

    /// A provider preloaded with values that satisfy every Buy stage.
    fn buy_setup() -> MockIndicators {
        let mut mock = MockIndicators::new();
        // Trend: M15 fast above slow.
        mock.set(Timeframe::M15, IndicatorKind::EmaFast, 1, 1.1010);
        mock.set(Timeframe::M15, IndicatorKind::EmaSlow, 1, 1.1000);
        // Confirmation: M5 aligned, close above VWAP, RSI in [40, 70].
        mock.set(Timeframe::M5, IndicatorKind::EmaFast, 1, 1.1008);
        mock.set(Timeframe::M5, IndicatorKind::EmaSlow, 1, 1.1002);
        mock.set(Timeframe::M5, IndicatorKind::Close, 1, 1.1009);
        mock.set(Timeframe::M5, IndicatorKind::Vwap, 1, 1.1004);
        mock.set(Timeframe::M5, IndicatorKind::Rsi, 1, 55.0);
        // Trigger: ATR over the 3-pip floor, stochastic cross from oversold.
        mock.set(Timeframe::M1, IndicatorKind::Atr, 1, 0.00045);
        mock.set(Timeframe::M1, IndicatorKind::StochK, 2, 15.0);
        mock.set(Timeframe::M1, IndicatorKind::StochK, 1, 28.0);
        mock.set(Timeframe::M1, IndicatorKind::StochD, 1, 22.0);
        mock.set(Timeframe::M1, IndicatorKind::Close, 0, 1.10100);
        mock
    }

    #[test]
    fn test_buy_scenario_produces_entry() {
        let verdict = engine().evaluate(&buy_setup(), Utc::now());
        let SignalVerdict::Entry(signal) = verdict else {
            panic!("expected an entry signal, got {:?}", verdict);
        };
        assert_eq!(signal.direction, Direction::Buy);
        assert_eq!(signal.entry_price, dec!(1.10100));
        // 12-pip stop, RR 2.0 / 3.0.
        assert_eq!(signal.stop_loss, dec!(1.09980));
        assert_eq!(signal.take_profit_partial, dec!(1.10340));
        assert_eq!(signal.take_profit_final, dec!(1.10460));
        assert!(
            (signal.take_profit_final - signal.entry_price).abs()
                > (signal.take_profit_partial - signal.entry_price).abs()
        );
    }

    #[test]
    fn test_rsi_outside_band_blocks_confirmation() {
        let mut mock = buy_setup();
        mock.set(Timeframe::M5, IndicatorKind::Rsi, 1, 72.0);
        let verdict = engine().evaluate(&mock, Utc::now());
        assert!(matches!(
            verdict,
            SignalVerdict::NoTrade(NoTradeReason::NotConfirmed)
        ));
    }

    #[test]
    fn test_rsi_band_bounds_inclusive() {
        let mut mock = buy_setup();
        mock.set(Timeframe::M5, IndicatorKind::Rsi, 1, 40.0);
        assert!(matches!(
            engine().evaluate(&mock, Utc::now()),
            SignalVerdict::Entry(_)
        ));
        mock.set(Timeframe::M5, IndicatorKind::Rsi, 1, 70.0);
        assert!(matches!(
            engine().evaluate(&mock, Utc::now()),
            SignalVerdict::Entry(_)
        ));
    }

    #[test]
    fn test_atr_below_floor_is_analyzed_no_trade() {
        let mut mock = buy_setup();
        mock.set(Timeframe::M1, IndicatorKind::Atr, 1, 0.0002);
        let verdict = engine().evaluate(&mock, Utc::now());
        assert!(matches!(
            verdict,
            SignalVerdict::NoTrade(NoTradeReason::BelowVolatilityFloor)
        ));
    }

    #[test]
    fn test_stochastic_equality_never_triggers() {
        let mut mock = buy_setup();
        // %K exactly at the oversold threshold on the prior bar.
        mock.set(Timeframe::M1, IndicatorKind::StochK, 2, 20.0);
        let verdict = engine().evaluate(&mock, Utc::now());
        assert!(matches!(
            verdict,
            SignalVerdict::NoTrade(NoTradeReason::NoTrigger)
        ));
    }

    #[test]
    fn test_flat_trend_aborts() {
        let mut mock = buy_setup();
        mock.set(Timeframe::M15, IndicatorKind::EmaFast, 1, 1.1000);
        mock.set(Timeframe::M15, IndicatorKind::EmaSlow, 1, 1.1000);
        let verdict = engine().evaluate(&mock, Utc::now());
        assert!(matches!(
            verdict,
            SignalVerdict::NoTrade(NoTradeReason::NoTrend)
        ));
    }

    #[test]
    fn test_not_ready_when_series_missing() {
        let mut mock = buy_setup();
        mock.set_ready(Timeframe::M15, false);
        assert!(matches!(
            engine().evaluate(&mock, Utc::now()),
            SignalVerdict::NotReady
        ));
    }

    #[test]
    fn test_sell_scenario() {
        let mut mock = MockIndicators::new();
        mock.set(Timeframe::M15, IndicatorKind::EmaFast, 1, 1.0990);
        mock.set(Timeframe::M15, IndicatorKind::EmaSlow, 1, 1.1000);
        mock.set(Timeframe::M5, IndicatorKind::EmaFast, 1, 1.0992);
        mock.set(Timeframe::M5, IndicatorKind::EmaSlow, 1, 1.0998);
        mock.set(Timeframe::M5, IndicatorKind::Close, 1, 1.0991);
        mock.set(Timeframe::M5, IndicatorKind::Vwap, 1, 1.0996);
        mock.set(Timeframe::M5, IndicatorKind::Rsi, 1, 45.0);
        mock.set(Timeframe::M1, IndicatorKind::Atr, 1, 0.0004);
        mock.set(Timeframe::M1, IndicatorKind::StochK, 2, 85.0);
        mock.set(Timeframe::M1, IndicatorKind::StochK, 1, 70.0);
        mock.set(Timeframe::M1, IndicatorKind::StochD, 1, 78.0);
        mock.set(Timeframe::M1, IndicatorKind::Close, 0, 1.09900);

        let verdict = engine().evaluate(&mock, Utc::now());
        let SignalVerdict::Entry(signal) = verdict else {
            panic!("expected a sell entry, got {:?}", verdict);
        };
        assert_eq!(signal.direction, Direction::Sell);
        assert_eq!(signal.stop_loss, dec!(1.10020));
        assert_eq!(signal.take_profit_partial, dec!(1.09660));
        assert_eq!(signal.take_profit_final, dec!(1.09540));
    }
}
