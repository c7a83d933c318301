//! Simulated venue: fills orders, charges spread and commission, and marks
//! equity to market. Implements the same ports a live broker adapter does,
//! so the cycle driver cannot tell the difference.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::errors::OrderError;
use crate::domain::ports::{AccountStateSource, OrderExecutionSink, OrderFill};
use crate::domain::symbol::SymbolSpec;
use crate::domain::types::{AccountSnapshot, Direction, PositionId};

#[derive(Debug, Clone)]
struct SimPosition {
    direction: Direction,
    volume: Decimal,
    open_price: Decimal,
    stop_loss: Decimal,
    take_profit: Decimal,
}

#[derive(Debug, Clone)]
pub struct SimBrokerConfig {
    pub initial_balance: Decimal,
    pub spread_points: Decimal,
    pub commission_per_lot: Decimal,
    pub margin_per_lot: Decimal,
}

impl Default for SimBrokerConfig {
    fn default() -> Self {
        SimBrokerConfig {
            initial_balance: dec!(10000),
            spread_points: dec!(10),
            commission_per_lot: dec!(4),
            margin_per_lot: dec!(1000),
        }
    }
}

pub struct SimBroker {
    spec: SymbolSpec,
    config: SimBrokerConfig,
    balance: Decimal,
    market_price: Decimal,
    positions: BTreeMap<PositionId, SimPosition>,
    next_ticket: u64,
}

impl SimBroker {
    pub fn new(spec: SymbolSpec, config: SimBrokerConfig) -> Self {
        let balance = config.initial_balance;
        SimBroker {
            spec,
            config,
            balance,
            market_price: Decimal::ZERO,
            positions: BTreeMap::new(),
            next_ticket: 1,
        }
    }

    /// Engine sets the market to the bar being replayed before each cycle.
    pub fn set_market(&mut self, price: Decimal) {
        self.market_price = price;
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn equity(&self) -> Decimal {
        self.balance + self.floating_profit()
    }

    fn floating_profit(&self) -> Decimal {
        self.positions
            .values()
            .map(|p| self.profit(p, p.volume, self.market_price))
            .sum()
    }

    fn profit(&self, position: &SimPosition, volume: Decimal, price: Decimal) -> Decimal {
        let pips = self
            .spec
            .price_to_pips((price - position.open_price) * position.direction.sign());
        pips * self.spec.pip_value_per_lot() * volume
    }

    fn margin_used(&self) -> Decimal {
        self.positions
            .values()
            .map(|p| p.volume * self.config.margin_per_lot)
            .sum()
    }
}

#[async_trait]
impl OrderExecutionSink for SimBroker {
    async fn open_market(
        &mut self,
        symbol: &str,
        direction: Direction,
        volume: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        _comment: &str,
    ) -> Result<OrderFill, OrderError> {
        if volume < self.spec.volume_min {
            return Err(OrderError::InvalidVolume {
                symbol: symbol.to_string(),
                volume,
                min: self.spec.volume_min,
                step: self.spec.volume_step,
            });
        }
        let required = volume * self.config.margin_per_lot;
        let available = self.equity() - self.margin_used();
        if required > available {
            return Err(OrderError::InsufficientMargin {
                required,
                available,
            });
        }

        // Buy orders fill at the ask; quote data carries bid prices.
        let spread = self.config.spread_points * self.spec.point;
        let fill_price = match direction {
            Direction::Buy => self.market_price + spread,
            Direction::Sell => self.market_price,
        };

        let wrong_side = match direction {
            Direction::Buy => stop_loss >= fill_price || take_profit <= fill_price,
            Direction::Sell => stop_loss <= fill_price || take_profit >= fill_price,
        };
        if wrong_side {
            return Err(OrderError::InvalidStops {
                symbol: symbol.to_string(),
                stop_loss,
                take_profit,
            });
        }

        self.balance -= volume * self.config.commission_per_lot;
        let id = PositionId(self.next_ticket);
        self.next_ticket += 1;
        self.positions.insert(
            id,
            SimPosition {
                direction,
                volume,
                open_price: fill_price,
                stop_loss,
                take_profit,
            },
        );
        debug!(
            "SimBroker: ticket {} {} {} @ {}",
            id, direction, volume, fill_price
        );
        Ok(OrderFill {
            position_id: id,
            fill_price,
            volume,
        })
    }

    async fn close_market(
        &mut self,
        position_id: PositionId,
        volume: Decimal,
        reference_price: Decimal,
    ) -> Result<OrderFill, OrderError> {
        let position = self
            .positions
            .get(&position_id)
            .cloned()
            .ok_or(OrderError::PositionNotFound { position_id })?;
        let volume = volume.min(position.volume);
        let profit = self.profit(&position, volume, reference_price);
        self.balance += profit;

        let remaining = position.volume - volume;
        if remaining <= Decimal::ZERO {
            self.positions.remove(&position_id);
        } else if let Some(entry) = self.positions.get_mut(&position_id) {
            entry.volume = remaining;
        }
        debug!(
            "SimBroker: closed {} of ticket {} @ {} for {}",
            volume, position_id, reference_price, profit
        );
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
        let position = self
            .positions
            .get_mut(&position_id)
            .ok_or(OrderError::PositionNotFound { position_id })?;
        position.stop_loss = stop_loss;
        position.take_profit = take_profit;
        Ok(())
    }
}

#[async_trait]
impl AccountStateSource for SimBroker {
    async fn snapshot(&self) -> AccountSnapshot {
        let floating = self.floating_profit();
        let margin = self.margin_used();
        AccountSnapshot {
            balance: self.balance,
            equity: self.balance + floating,
            margin_used: margin,
            free_margin: self.balance + floating - margin,
            floating_profit: floating,
            open_position_count: self.positions.len(),
        }
    }

    async fn spread_points(&self, _symbol: &str) -> Decimal {
        self.config.spread_points
    }

    async fn open_position_ids(&self, _symbol: &str) -> Vec<PositionId> {
        self.positions.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker() -> SimBroker {
        let mut b = SimBroker::new(
            SymbolSpec::fx_five_digit("EURUSD"),
            SimBrokerConfig::default(),
        );
        b.set_market(dec!(1.1000));
        b
    }

    #[tokio::test]
    async fn test_buy_fills_at_ask_and_charges_commission() {
        let mut b = broker();
        let fill = b
            .open_market(
                "EURUSD",
                Direction::Buy,
                dec!(0.10),
                dec!(1.0988),
                dec!(1.1036),
                "",
            )
            .await
            .unwrap();
        // 10 points of spread on a 5-digit quote.
        assert_eq!(fill.fill_price, dec!(1.10010));
        assert_eq!(b.balance(), dec!(10000) - dec!(0.4));
    }

    #[tokio::test]
    async fn test_rejects_stops_on_wrong_side() {
        let mut b = broker();
        let err = b
            .open_market(
                "EURUSD",
                Direction::Buy,
                dec!(0.10),
                dec!(1.1050),
                dec!(1.1100),
                "",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidStops { .. }));
    }

    #[tokio::test]
    async fn test_rejects_when_margin_exhausted() {
        let mut b = broker();
        let err = b
            .open_market(
                "EURUSD",
                Direction::Buy,
                dec!(50.0), // 50 lots x 1000 margin > 10000 equity
                dec!(1.0988),
                dec!(1.1036),
                "",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InsufficientMargin { .. }));
    }

    #[tokio::test]
    async fn test_partial_then_full_close_updates_balance() {
        let mut b = broker();
        let fill = b
            .open_market(
                "EURUSD",
                Direction::Sell,
                dec!(0.10),
                dec!(1.1012),
                dec!(1.0964),
                "",
            )
            .await
            .unwrap();
        let id = fill.position_id;
        let start = b.balance();

        // Sell from 1.1000, close half 20 pips lower.
        b.close_market(id, dec!(0.05), dec!(1.0980)).await.unwrap();
        assert_eq!(b.balance(), start + dec!(1.000));
        assert_eq!(b.open_position_ids("EURUSD").await, vec![id]);

        b.close_market(id, dec!(0.05), dec!(1.0980)).await.unwrap();
        assert!(b.open_position_ids("EURUSD").await.is_empty());

        let err = b.close_market(id, dec!(0.05), dec!(1.0980)).await.unwrap_err();
        assert!(matches!(err, OrderError::PositionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_equity_marks_open_position_to_market() {
        let mut b = broker();
        b.open_market(
            "EURUSD",
            Direction::Buy,
            dec!(0.10),
            dec!(1.0988),
            dec!(1.1036),
            "",
        )
        .await
        .unwrap();
        b.set_market(dec!(1.1011));
        // Entry at ask 1.1001, now 10 pips in profit on 0.10 lots.
        let snapshot = b.snapshot().await;
        assert_eq!(snapshot.floating_profit, dec!(1.000));
        assert_eq!(snapshot.equity, b.balance() + dec!(1.000));
    }
}
