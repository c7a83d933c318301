//! Precomputed indicator series for deterministic replay.
//!
//! Every series is computed once over the full candle history, then exposed
//! through a per-timeframe cursor so shift semantics match live trading:
//! shift 0 is the bar the cursor points at (still forming), shift 1 the last
//! closed bar.

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use ta::indicators::{
    AverageTrueRange, ExponentialMovingAverage, RelativeStrengthIndex, SimpleMovingAverage,
};
use ta::{DataItem, Next};

use crate::config::IndicatorConfig;
use crate::domain::ports::IndicatorProvider;
use crate::domain::types::{Candle, IndicatorKind, Timeframe};

struct SeriesSet {
    times: Vec<DateTime<Utc>>,
    values: HashMap<IndicatorKind, Vec<Option<f64>>>,
    cursor: usize,
    /// First bar index at which every series holds a value.
    first_complete: usize,
}

pub struct BacktestIndicators {
    series: HashMap<Timeframe, SeriesSet>,
}

impl BacktestIndicators {
    pub fn build(
        config: &IndicatorConfig,
        frames: &[(Timeframe, &[Candle])],
    ) -> anyhow::Result<Self> {
        let mut series = HashMap::new();
        for (timeframe, candles) in frames {
            let set = compute_series(config, candles)
                .with_context(|| format!("computing {} indicator series", timeframe))?;
            series.insert(*timeframe, set);
        }
        Ok(BacktestIndicators { series })
    }

    /// Move every timeframe's cursor to the bar forming at `time`. Cursors
    /// only move forward; replay feeds times in order.
    pub fn advance(&mut self, time: DateTime<Utc>) {
        for set in self.series.values_mut() {
            while set.cursor + 1 < set.times.len() && set.times[set.cursor + 1] <= time {
                set.cursor += 1;
            }
        }
    }
}

impl IndicatorProvider for BacktestIndicators {
    fn get(&self, timeframe: Timeframe, indicator: IndicatorKind, shift: usize) -> Option<f64> {
        let set = self.series.get(&timeframe)?;
        if shift > set.cursor {
            return None;
        }
        set.values.get(&indicator)?.get(set.cursor - shift).copied()?
    }

    fn series_ready(&self, timeframe: Timeframe) -> bool {
        match self.series.get(&timeframe) {
            // Shift 2 must land on a complete bar.
            Some(set) => set.cursor >= set.first_complete + 2,
            None => false,
        }
    }
}

fn to_f64(value: rust_decimal::Decimal) -> anyhow::Result<f64> {
    value
        .to_f64()
        .ok_or_else(|| anyhow!("price {} not representable as f64", value))
}

fn compute_series(config: &IndicatorConfig, candles: &[Candle]) -> anyhow::Result<SeriesSet> {
    let n = candles.len();
    let mut ema_fast = ExponentialMovingAverage::new(config.ema_fast_period)
        .map_err(|e| anyhow!("ema fast: {:?}", e))?;
    let mut ema_slow = ExponentialMovingAverage::new(config.ema_slow_period)
        .map_err(|e| anyhow!("ema slow: {:?}", e))?;
    let mut rsi =
        RelativeStrengthIndex::new(config.rsi_period).map_err(|e| anyhow!("rsi: {:?}", e))?;
    let mut atr =
        AverageTrueRange::new(config.atr_period).map_err(|e| anyhow!("atr: {:?}", e))?;
    let mut stoch_slow =
        SimpleMovingAverage::new(config.stoch_slowing).map_err(|e| anyhow!("stoch: {:?}", e))?;
    let mut stoch_d =
        SimpleMovingAverage::new(config.stoch_d_period).map_err(|e| anyhow!("stoch d: {:?}", e))?;

    let mut closes: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut ema_fast_vals: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut ema_slow_vals: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut rsi_vals: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut atr_vals: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut stoch_k_vals: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut stoch_d_vals: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut vwap_vals: Vec<Option<f64>> = Vec::with_capacity(n);

    let mut fast_k_count = 0usize;
    let mut slow_k_count = 0usize;
    let mut vwap_day = None;
    let mut vwap_pv = 0.0_f64;
    let mut vwap_vol = 0.0_f64;

    for (i, candle) in candles.iter().enumerate() {
        let open = to_f64(candle.open)?;
        let high = to_f64(candle.high)?;
        let low = to_f64(candle.low)?;
        let close = to_f64(candle.close)?;
        let volume = to_f64(candle.volume)?;

        closes.push(Some(close));

        // Trend and momentum; values count as valid only once the full
        // period has been observed.
        let fast = ema_fast.next(close);
        let slow = ema_slow.next(close);
        let momentum = rsi.next(close);
        ema_fast_vals.push((i + 1 >= config.ema_fast_period).then_some(fast));
        ema_slow_vals.push((i + 1 >= config.ema_slow_period).then_some(slow));
        rsi_vals.push((i + 1 > config.rsi_period).then_some(momentum));

        let item = DataItem::builder()
            .open(open)
            .high(high)
            .low(low)
            .close(close)
            .volume(volume)
            .build()
            .map_err(|e| anyhow!("bar {} invalid for range indicators: {:?}", candle.time, e))?;
        let range = atr.next(&item);
        atr_vals.push((i + 1 > config.atr_period).then_some(range));

        // Stochastic: raw %K over the lookback window, smoothed by an SMA
        // into slow %K, smoothed again into %D.
        let mut k_value = None;
        let mut d_value = None;
        if i + 1 >= config.stoch_k_period {
            let window = &candles[i + 1 - config.stoch_k_period..=i];
            let hh = window
                .iter()
                .map(|c| c.high)
                .max()
                .map(to_f64)
                .transpose()?
                .unwrap_or(high);
            let ll = window
                .iter()
                .map(|c| c.low)
                .min()
                .map(to_f64)
                .transpose()?
                .unwrap_or(low);
            let raw_k = if hh > ll {
                (close - ll) / (hh - ll) * 100.0
            } else {
                50.0
            };
            let smoothed = stoch_slow.next(raw_k);
            fast_k_count += 1;
            if fast_k_count >= config.stoch_slowing {
                k_value = Some(smoothed);
                let d = stoch_d.next(smoothed);
                slow_k_count += 1;
                if slow_k_count >= config.stoch_d_period {
                    d_value = Some(d);
                }
            }
        }
        stoch_k_vals.push(k_value);
        stoch_d_vals.push(d_value);

        // Session VWAP: cumulative typical price x volume, reset each
        // trading day.
        let day = candle.time.date_naive();
        if vwap_day != Some(day) {
            vwap_day = Some(day);
            vwap_pv = 0.0;
            vwap_vol = 0.0;
        }
        let typical = (high + low + close) / 3.0;
        vwap_pv += typical * volume;
        vwap_vol += volume;
        let vwap = if vwap_vol > 0.0 {
            vwap_pv / vwap_vol
        } else {
            typical
        };
        vwap_vals.push(Some(vwap));
    }

    let values: HashMap<IndicatorKind, Vec<Option<f64>>> = HashMap::from([
        (IndicatorKind::Close, closes),
        (IndicatorKind::EmaFast, ema_fast_vals),
        (IndicatorKind::EmaSlow, ema_slow_vals),
        (IndicatorKind::Rsi, rsi_vals),
        (IndicatorKind::Atr, atr_vals),
        (IndicatorKind::StochK, stoch_k_vals),
        (IndicatorKind::StochD, stoch_d_vals),
        (IndicatorKind::Vwap, vwap_vals),
    ]);

    let first_complete = (0..n)
        .find(|&i| values.values().all(|v| v[i].is_some()))
        .unwrap_or(n);

    Ok(SeriesSet {
        times: candles.iter().map(|c| c.time).collect(),
        values,
        cursor: 0,
        first_complete,
    })
}
