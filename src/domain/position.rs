use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::symbol::SymbolSpec;
use crate::domain::types::{Direction, PositionId, Signal, TradeState};

/// One open trade and its lifecycle bookkeeping.
///
/// The state field tracks the most advanced transition reached:
/// `Open -> PartiallyClosed -> BreakEven -> Closed`, with `Open -> Closed`
/// directly reachable when a stop or final target fires first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: String,
    pub direction: Direction,
    pub open_price: Decimal,
    pub current_stop_loss: Decimal,
    pub current_take_profit: Decimal,
    pub initial_volume: Decimal,
    pub remaining_volume: Decimal,
    pub opened_at: DateTime<Utc>,
    pub state: TradeState,
    pub partial_closed: bool,
    pub break_even_set: bool,
    pub realized_profit: Decimal,
}

impl Position {
    pub fn from_fill(
        id: PositionId,
        signal: &Signal,
        fill_price: Decimal,
        volume: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Position {
            id,
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            open_price: fill_price,
            current_stop_loss: signal.stop_loss,
            current_take_profit: signal.take_profit_final,
            initial_volume: volume,
            remaining_volume: volume,
            opened_at,
            state: TradeState::Open,
            partial_closed: false,
            break_even_set: false,
            realized_profit: Decimal::ZERO,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == TradeState::Closed
    }

    /// Price distance between entry and the *current* stop. The partial
    /// trigger is always recomputed from this, not from the original signal,
    /// because the stop may have moved since entry.
    pub fn stop_distance(&self) -> Decimal {
        (self.open_price - self.current_stop_loss).abs()
    }

    /// Level at which the partial take-profit fires.
    pub fn partial_trigger_price(&self, rr_partial: Decimal) -> Decimal {
        self.open_price + self.direction.sign() * self.stop_distance() * rr_partial
    }

    /// Has price crossed the partial trigger, for a position still eligible?
    pub fn partial_due(&self, price: Decimal, rr_partial: Decimal) -> bool {
        if self.partial_closed || self.is_closed() {
            return false;
        }
        let trigger = self.partial_trigger_price(rr_partial);
        match self.direction {
            Direction::Buy => price >= trigger,
            Direction::Sell => price <= trigger,
        }
    }

    /// Volume to close for a partial take-profit: `percent` of the remaining
    /// volume, floored to the lot step, reduced if necessary so the remainder
    /// stays at or above the minimum tradable size. Returns `None` when no
    /// valid partial amount exists (position too small to split).
    pub fn partial_close_volume(&self, percent: Decimal, spec: &SymbolSpec) -> Option<Decimal> {
        let desired = self.remaining_volume * percent / Decimal::ONE_HUNDRED;
        let desired = (desired / spec.volume_step).floor() * spec.volume_step;

        let max_closable = self.remaining_volume - spec.volume_min;
        let max_closable = (max_closable / spec.volume_step).floor() * spec.volume_step;

        let amount = desired.min(max_closable);
        if amount < spec.volume_step {
            warn!(
                "Position {}: remaining volume {} too small for partial close",
                self.id, self.remaining_volume
            );
            return None;
        }
        Some(amount)
    }

    /// Record a partial fill from the execution sink.
    pub fn apply_partial_close(&mut self, closed_volume: Decimal, profit: Decimal) {
        self.remaining_volume -= closed_volume;
        self.realized_profit += profit;
        self.partial_closed = true;
        if self.state == TradeState::Open {
            self.state = TradeState::PartiallyClosed;
        }
    }

    /// Desired protective stop after partial close: entry plus a small buffer
    /// on the profitable side.
    pub fn break_even_stop(&self, buffer: Decimal) -> Decimal {
        self.open_price + self.direction.sign() * buffer
    }

    /// Break-even is pending once a partial close has completed.
    pub fn break_even_due(&self) -> bool {
        self.partial_closed && !self.break_even_set && !self.is_closed()
    }

    /// The new stop must sit on the correct side of the current price;
    /// otherwise the modification would be rejected. Too-close price is a
    /// transient condition, retried next cycle.
    pub fn break_even_applicable(&self, price: Decimal, buffer: Decimal) -> bool {
        let new_stop = self.break_even_stop(buffer);
        match self.direction {
            Direction::Buy => price > new_stop,
            Direction::Sell => price < new_stop,
        }
    }

    pub fn apply_break_even(&mut self, new_stop: Decimal) {
        self.current_stop_loss = new_stop;
        self.break_even_set = true;
        self.state = TradeState::BreakEven;
    }

    /// Did the bar's range touch the stop-loss?
    pub fn stop_hit(&self, bar_low: Decimal, bar_high: Decimal) -> bool {
        match self.direction {
            Direction::Buy => bar_low <= self.current_stop_loss,
            Direction::Sell => bar_high >= self.current_stop_loss,
        }
    }

    /// Did the bar's range touch the final take-profit?
    pub fn take_profit_hit(&self, bar_low: Decimal, bar_high: Decimal) -> bool {
        match self.direction {
            Direction::Buy => bar_high >= self.current_take_profit,
            Direction::Sell => bar_low <= self.current_take_profit,
        }
    }

    /// Realized profit for closing `volume` at `exit_price`.
    pub fn profit_for(&self, volume: Decimal, exit_price: Decimal, spec: &SymbolSpec) -> Decimal {
        let pips = spec.price_to_pips((exit_price - self.open_price) * self.direction.sign());
        pips * spec.pip_value_per_lot() * volume
    }

    pub fn mark_closed(&mut self, profit: Decimal) {
        self.realized_profit += profit;
        self.remaining_volume = Decimal::ZERO;
        self.state = TradeState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn buy_position() -> Position {
        Position {
            id: PositionId(1),
            symbol: "EURUSD".to_string(),
            direction: Direction::Buy,
            open_price: dec!(1.1000),
            current_stop_loss: dec!(1.0988),
            current_take_profit: dec!(1.1036),
            initial_volume: dec!(0.10),
            remaining_volume: dec!(0.10),
            opened_at: Utc::now(),
            state: TradeState::Open,
            partial_closed: false,
            break_even_set: false,
            realized_profit: Decimal::ZERO,
        }
    }

    #[test]
    fn test_partial_trigger_from_current_stop_distance() {
        let pos = buy_position();
        // 12-pip stop, RR 2.0 -> trigger 24 pips above entry.
        assert_eq!(pos.partial_trigger_price(dec!(2.0)), dec!(1.1024));
        assert!(!pos.partial_due(dec!(1.1023), dec!(2.0)));
        assert!(pos.partial_due(dec!(1.1025), dec!(2.0)));
    }

    #[test]
    fn test_partial_trigger_tracks_moved_stop() {
        let mut pos = buy_position();
        pos.current_stop_loss = dec!(1.0994); // stop tightened to 6 pips
        assert_eq!(pos.partial_trigger_price(dec!(2.0)), dec!(1.1012));
    }

    #[test]
    fn test_partial_close_volume_half() {
        let pos = buy_position();
        let spec = SymbolSpec::fx_five_digit("EURUSD");
        assert_eq!(pos.partial_close_volume(dec!(50), &spec), Some(dec!(0.05)));
    }

    #[test]
    fn test_partial_close_keeps_minimum_remainder() {
        let mut pos = buy_position();
        pos.remaining_volume = dec!(0.02);
        let spec = SymbolSpec::fx_five_digit("EURUSD");
        // 50% of 0.02 is 0.01; remainder 0.01 == volume_min, allowed.
        assert_eq!(pos.partial_close_volume(dec!(50), &spec), Some(dec!(0.01)));

        pos.remaining_volume = dec!(0.01);
        // Nothing can be closed without dropping below the minimum.
        assert_eq!(pos.partial_close_volume(dec!(50), &spec), None);
    }

    #[test]
    fn test_partial_close_capped_by_minimum_remainder() {
        let mut pos = buy_position();
        pos.remaining_volume = dec!(0.03);
        let spec = SymbolSpec::fx_five_digit("EURUSD");
        // 90% of 0.03 would leave 0.003; cap so 0.01 stays open.
        assert_eq!(pos.partial_close_volume(dec!(90), &spec), Some(dec!(0.02)));
    }

    #[test]
    fn test_break_even_gating() {
        let mut pos = buy_position();
        assert!(!pos.break_even_due());

        pos.apply_partial_close(dec!(0.05), dec!(12.0));
        assert_eq!(pos.state, TradeState::PartiallyClosed);
        assert!(pos.break_even_due());

        let buffer = dec!(0.0002);
        assert_eq!(pos.break_even_stop(buffer), dec!(1.1002));
        // Price sitting below the would-be stop: transient no-op.
        assert!(!pos.break_even_applicable(dec!(1.1001), buffer));
        assert!(pos.break_even_applicable(dec!(1.1010), buffer));

        pos.apply_break_even(dec!(1.1002));
        assert_eq!(pos.state, TradeState::BreakEven);
        assert!(!pos.break_even_due());
    }

    #[test]
    fn test_stop_and_target_hits_sell() {
        let mut pos = buy_position();
        pos.direction = Direction::Sell;
        pos.current_stop_loss = dec!(1.1012);
        pos.current_take_profit = dec!(1.0964);
        assert!(pos.stop_hit(dec!(1.1005), dec!(1.1013)));
        assert!(!pos.stop_hit(dec!(1.1005), dec!(1.1011)));
        assert!(pos.take_profit_hit(dec!(1.0960), dec!(1.0990)));
    }

    #[test]
    fn test_profit_for_buy() {
        let pos = buy_position();
        let spec = SymbolSpec::fx_five_digit("EURUSD");
        // 24 pips on 0.05 lots at 1.0 per pip per lot.
        assert_eq!(
            pos.profit_for(dec!(0.05), dec!(1.1024), &spec),
            dec!(1.200)
        );
    }
}
