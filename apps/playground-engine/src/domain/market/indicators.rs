//! Indicator overlay computed from bar closes.
//!
//! Names take the form `<kind>-<length>`: `sma-20`, `ema-9`, `rsi-14`.

use rust_decimal::prelude::ToPrimitive;

use super::candle::Candle;
use super::errors::CandleError;

/// A parsed indicator specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    /// Simple moving average of closes.
    Sma(usize),
    /// Exponential moving average of closes.
    Ema(usize),
    /// Wilder's relative strength index.
    Rsi(usize),
}

impl Indicator {
    /// Parse an indicator name.
    pub fn parse(name: &str) -> Result<Self, CandleError> {
        let unknown = || CandleError::UnknownIndicator(name.to_string());
        let (kind, length) = name.split_once('-').ok_or_else(unknown)?;
        let length: usize = length.parse().map_err(|_| unknown())?;
        if length == 0 {
            return Err(unknown());
        }

        match kind {
            "sma" => Ok(Self::Sma(length)),
            "ema" => Ok(Self::Ema(length)),
            "rsi" => Ok(Self::Rsi(length)),
            _ => Err(unknown()),
        }
    }

    /// Compute the series over `closes`. Warm-up slots are `None`.
    #[must_use]
    pub fn compute(self, closes: &[f64]) -> Vec<Option<f64>> {
        match self {
            Self::Sma(n) => sma(closes, n),
            Self::Ema(n) => ema(closes, n),
            Self::Rsi(n) => rsi(closes, n),
        }
    }
}

/// Overlay every named indicator onto `bars`, replacing previous values.
pub fn apply_indicators(bars: &mut [Candle], names: &[String]) -> Result<(), CandleError> {
    if names.is_empty() {
        return Ok(());
    }

    let closes: Vec<f64> = bars
        .iter()
        .map(|b| b.close.to_f64().unwrap_or(f64::NAN))
        .collect();

    for name in names {
        let series = Indicator::parse(name)?.compute(&closes);
        for (bar, value) in bars.iter_mut().zip(series) {
            match value {
                Some(v) => {
                    bar.indicators.insert(name.clone(), v);
                }
                None => {
                    bar.indicators.remove(name);
                }
            }
        }
    }

    Ok(())
}

fn sma(closes: &[f64], n: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    let mut sum = 0.0;
    for (i, close) in closes.iter().enumerate() {
        sum += close;
        if i >= n {
            sum -= closes[i - n];
        }
        if i + 1 >= n {
            out[i] = Some(sum / n as f64);
        }
    }
    out
}

fn ema(closes: &[f64], n: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if closes.len() < n {
        return out;
    }

    let k = 2.0 / (n as f64 + 1.0);
    let mut value = closes[..n].iter().sum::<f64>() / n as f64;
    out[n - 1] = Some(value);
    for i in n..closes.len() {
        value = (closes[i] - value).mul_add(k, value);
        out[i] = Some(value);
    }
    out
}

fn rsi(closes: &[f64], n: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if closes.len() <= n {
        return out;
    }

    let mut gain = 0.0;
    let mut loss = 0.0;
    for i in 1..=n {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            gain += change;
        } else {
            loss -= change;
        }
    }
    gain /= n as f64;
    loss /= n as f64;
    out[n] = Some(rsi_value(gain, loss));

    for i in (n + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let (up, down) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        gain = gain.mul_add((n - 1) as f64, up) / n as f64;
        loss = loss.mul_add((n - 1) as f64, down) / n as f64;
        out[i] = Some(rsi_value(gain, loss));
    }
    out
}

fn rsi_value(gain: f64, loss: f64) -> f64 {
    if loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + gain / loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    #[test]
    fn parses_names() {
        assert_eq!(Indicator::parse("sma-20").unwrap(), Indicator::Sma(20));
        assert_eq!(Indicator::parse("rsi-14").unwrap(), Indicator::Rsi(14));
        assert!(Indicator::parse("supertrend").is_err());
        assert!(Indicator::parse("sma-0").is_err());
        assert!(Indicator::parse("wma-3").is_err());
    }

    #[test]
    fn sma_has_warm_up() {
        let out = Indicator::Sma(2).compute(&[1.0, 3.0, 5.0]);
        assert_eq!(out, vec![None, Some(2.0), Some(4.0)]);
    }

    #[test]
    fn ema_seeds_with_sma() {
        let out = Indicator::Ema(2).compute(&[2.0, 4.0, 7.0]);
        assert_eq!(out[0], None);
        assert_eq!(out[1], Some(3.0));
        // 3 + (7 - 3) * 2/3
        assert!((out[2].unwrap() - 5.666_666_666_666_667).abs() < 1e-9);
    }

    #[test]
    fn rsi_of_monotonic_rise_is_100() {
        let out = Indicator::Rsi(2).compute(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(out[1], None);
        assert_eq!(out[2], Some(100.0));
        assert_eq!(out[3], Some(100.0));
    }

    #[test]
    fn overlay_writes_indicator_columns() {
        let start = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let mut bars: Vec<Candle> = [1, 3, 5]
            .iter()
            .enumerate()
            .map(|(i, c)| Candle::flat(start + Duration::minutes(i as i64), Decimal::from(*c)))
            .collect();

        apply_indicators(&mut bars, &["sma-2".to_string()]).unwrap();
        assert!(bars[0].indicators.is_empty());
        assert_eq!(bars[2].indicators.get("sma-2"), Some(&4.0));
    }
}
