use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Static contract specification for one tradable instrument.
///
/// All pip arithmetic in the engine goes through this type so that
/// fractional-pip brokers (3/5-digit quotes, where one pip is ten points)
/// and whole-pip brokers behave identically upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSpec {
    pub name: String,
    pub digits: u32,
    /// Smallest quote increment (10^-digits).
    pub point: Decimal,
    pub tick_size: Decimal,
    /// Account-currency value of one tick for one standard lot.
    pub tick_value: Decimal,
    pub volume_min: Decimal,
    pub volume_max: Decimal,
    pub volume_step: Decimal,
}

impl SymbolSpec {
    /// A typical 5-digit FX major (EURUSD-style) used as the default contract.
    pub fn fx_five_digit(name: &str) -> Self {
        SymbolSpec {
            name: name.to_string(),
            digits: 5,
            point: dec!(0.00001),
            tick_size: dec!(0.00001),
            tick_value: dec!(0.1),
            volume_min: dec!(0.01),
            volume_max: dec!(100.0),
            volume_step: dec!(0.01),
        }
    }

    /// One pip in price units. On 3- and 5-digit quotes a pip is ten points.
    pub fn pip_size(&self) -> Decimal {
        if self.digits == 3 || self.digits == 5 {
            self.point * dec!(10)
        } else {
            self.point
        }
    }

    pub fn pips_to_price(&self, pips: Decimal) -> Decimal {
        pips * self.pip_size()
    }

    pub fn price_to_pips(&self, distance: Decimal) -> Decimal {
        distance / self.pip_size()
    }

    /// Broker spreads are reported in points; normalize to pips.
    pub fn points_to_pips(&self, points: Decimal) -> Decimal {
        points * self.point / self.pip_size()
    }

    /// Account-currency value of one pip of movement for one lot.
    pub fn pip_value_per_lot(&self) -> Decimal {
        self.tick_value * self.pip_size() / self.tick_size
    }

    /// Clamp to the contract's volume bounds and floor to the lot step.
    /// Flooring only: sizing must never exceed the risk-derived volume.
    pub fn normalize_volume(&self, volume: Decimal) -> Decimal {
        let clamped = volume.clamp(self.volume_min, self.volume_max);
        let steps = (clamped / self.volume_step).floor();
        steps * self.volume_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pip_size_five_digit() {
        let spec = SymbolSpec::fx_five_digit("EURUSD");
        assert_eq!(spec.pip_size(), dec!(0.0001));
        assert_eq!(spec.pips_to_price(dec!(12)), dec!(0.0012));
        assert_eq!(spec.price_to_pips(dec!(0.0024)), dec!(24));
    }

    #[test]
    fn test_pip_size_whole_pip_broker() {
        let spec = SymbolSpec {
            digits: 4,
            point: dec!(0.0001),
            tick_size: dec!(0.0001),
            ..SymbolSpec::fx_five_digit("EURUSD")
        };
        assert_eq!(spec.pip_size(), dec!(0.0001));
    }

    #[test]
    fn test_points_to_pips() {
        let spec = SymbolSpec::fx_five_digit("EURUSD");
        // 14 points on a 5-digit quote is 1.4 pips.
        assert_eq!(spec.points_to_pips(dec!(14)), dec!(1.4));
    }

    #[test]
    fn test_pip_value_per_lot() {
        let spec = SymbolSpec::fx_five_digit("EURUSD");
        // 0.1 per tick, 10 ticks per pip.
        assert_eq!(spec.pip_value_per_lot(), dec!(1.0));
    }

    #[test]
    fn test_normalize_volume_floors_to_step() {
        let spec = SymbolSpec::fx_five_digit("EURUSD");
        assert_eq!(spec.normalize_volume(dec!(0.837)), dec!(0.83));
        assert_eq!(spec.normalize_volume(dec!(0.005)), dec!(0.01));
        assert_eq!(spec.normalize_volume(dec!(250)), dec!(100.00));
    }
}
