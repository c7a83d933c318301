//! Historical candle loading and timeframe aggregation.

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Timelike, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::domain::types::{Candle, Timeframe};

#[derive(Debug, Deserialize)]
struct CandleRow {
    time: String,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

fn parse_time(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y.%m.%d %H:%M"))
        .with_context(|| format!("unrecognized timestamp {:?}", raw))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Load M1 candles from a `time,open,high,low,close,volume` CSV, sorted and
/// validated to be strictly increasing in time.
pub fn load_candles(path: &Path) -> anyhow::Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening candle file {}", path.display()))?;

    let mut candles = Vec::new();
    for (line, row) in reader.deserialize::<CandleRow>().enumerate() {
        let row = row.with_context(|| format!("parsing candle row {}", line + 1))?;
        candles.push(Candle {
            time: parse_time(&row.time)?,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }
    if candles.is_empty() {
        bail!("candle file {} contains no rows", path.display());
    }

    candles.sort_by_key(|c| c.time);
    for pair in candles.windows(2) {
        if pair[0].time == pair[1].time {
            bail!("duplicate candle timestamp {}", pair[0].time);
        }
    }

    info!(
        "Loaded {} candles from {} ({} .. {})",
        candles.len(),
        path.display(),
        candles[0].time,
        candles[candles.len() - 1].time
    );
    Ok(candles)
}

/// Bucket start for a timestamp on the given timeframe.
pub fn bucket_start(time: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    let minutes = timeframe.minutes();
    let since_midnight = i64::from(time.hour() * 60 + time.minute());
    let offset = since_midnight % minutes;
    time - Duration::minutes(offset)
        - Duration::seconds(i64::from(time.second()))
        - Duration::nanoseconds(i64::from(time.nanosecond()))
}

/// Aggregate M1 candles into a coarser timeframe. Partial buckets at the end
/// of the input are kept; they correspond to a still-forming bar.
pub fn aggregate(candles: &[Candle], timeframe: Timeframe) -> Vec<Candle> {
    let mut out: Vec<Candle> = Vec::new();
    for candle in candles {
        let start = bucket_start(candle.time, timeframe);
        match out.last_mut() {
            Some(current) if current.time == start => {
                current.high = current.high.max(candle.high);
                current.low = current.low.min(candle.low);
                current.close = candle.close;
                current.volume += candle.volume;
            }
            _ => out.push(Candle {
                time: start,
                open: candle.open,
                high: candle.high,
                low: candle.low,
                close: candle.close,
                volume: candle.volume,
            }),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn candle(h: u32, m: u32, open: Decimal, close: Decimal) -> Candle {
        Candle {
            time: Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap(),
            open,
            high: open.max(close) + dec!(0.0001),
            low: open.min(close) - dec!(0.0001),
            close,
            volume: dec!(100),
        }
    }

    #[test]
    fn test_bucket_start_alignment() {
        let t = Utc.with_ymd_and_hms(2024, 3, 4, 9, 13, 0).unwrap();
        assert_eq!(
            bucket_start(t, Timeframe::M5),
            Utc.with_ymd_and_hms(2024, 3, 4, 9, 10, 0).unwrap()
        );
        assert_eq!(
            bucket_start(t, Timeframe::M15),
            Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_aggregate_m1_to_m5() {
        let m1: Vec<Candle> = (0..10)
            .map(|i| {
                candle(
                    9,
                    i,
                    dec!(1.1000) + Decimal::from(i) * dec!(0.0001),
                    dec!(1.1001) + Decimal::from(i) * dec!(0.0001),
                )
            })
            .collect();
        let m5 = aggregate(&m1, Timeframe::M5);
        assert_eq!(m5.len(), 2);
        assert_eq!(m5[0].open, dec!(1.1000));
        assert_eq!(m5[0].close, dec!(1.1005));
        assert_eq!(m5[0].volume, dec!(500));
        assert_eq!(
            m5[1].time,
            Utc.with_ymd_and_hms(2024, 3, 4, 9, 5, 0).unwrap()
        );
    }

    #[test]
    fn test_aggregate_keeps_forming_tail() {
        let m1: Vec<Candle> = (0..7).map(|i| candle(9, i, dec!(1.1), dec!(1.1))).collect();
        let m5 = aggregate(&m1, Timeframe::M5);
        assert_eq!(m5.len(), 2);
        assert_eq!(m5[1].volume, dec!(200)); // only two M1 bars so far
    }
}
