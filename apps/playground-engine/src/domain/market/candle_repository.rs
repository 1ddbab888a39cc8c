//! Candle Repository
//!
//! Per-(instrument, period) append-only bar store with a forward-only cursor.
//!
//! Bars at or before the cursor are observable; bars after it are not. Bars
//! before the starting position are warm-up history: visible to `fetch` and
//! indicator computation, never emitted as new candles.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{EventQueue, Instrument};

use super::candle::{Candle, CandleEvent, Period};
use super::errors::CandleError;
use super::indicators::apply_indicators;

/// Time-ordered bars for one feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleRepository {
    symbol: Instrument,
    period: Period,
    bars: Vec<Candle>,
    indicators: Vec<String>,
    cursor: Option<usize>,
    starting_position: usize,
    history_in_days: u32,
}

impl CandleRepository {
    /// Create a repository positioned at `start_at`.
    ///
    /// The starting position is the first bar at or after `start_at`; the
    /// cursor starts on the last bar at or before it.
    pub fn new(
        symbol: Instrument,
        period: Period,
        mut bars: Vec<Candle>,
        indicators: Vec<String>,
        start_at: DateTime<Utc>,
        history_in_days: u32,
    ) -> Result<Self, CandleError> {
        ensure_increasing(&symbol, None, &bars)?;
        apply_indicators(&mut bars, &indicators)?;

        let starting_position = bars.partition_point(|b| b.timestamp < start_at);
        let cursor = bars.partition_point(|b| b.timestamp <= start_at).checked_sub(1);

        Ok(Self {
            symbol,
            period,
            bars,
            indicators,
            cursor,
            starting_position,
            history_in_days,
        })
    }

    /// Feed instrument.
    #[must_use]
    pub const fn symbol(&self) -> &Instrument {
        &self.symbol
    }

    /// Feed period.
    #[must_use]
    pub const fn period(&self) -> Period {
        self.period
    }

    /// Index of the first bar eligible to be emitted.
    #[must_use]
    pub const fn starting_position(&self) -> usize {
        self.starting_position
    }

    /// Index of the last observed bar.
    #[must_use]
    pub const fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Indicator names overlaid on every bar.
    #[must_use]
    pub fn indicators(&self) -> &[String] {
        &self.indicators
    }

    /// History window in days.
    #[must_use]
    pub const fn history_in_days(&self) -> u32 {
        self.history_in_days
    }

    /// Total stored bars, observed or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Returns true if the repository holds no bars.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// The last observed bar.
    #[must_use]
    pub fn current_candle(&self) -> Option<&Candle> {
        self.cursor.and_then(|i| self.bars.get(i))
    }

    /// Close of the last observed bar.
    #[must_use]
    pub fn latest_close(&self) -> Option<Decimal> {
        self.current_candle().map(|c| c.close)
    }

    /// Observed bars with `from ≤ timestamp ≤ to`, indicator columns included.
    pub fn fetch(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Candle>, CandleError> {
        if from > to {
            return Err(CandleError::InvalidRange { from, to });
        }

        if let Some(first) = self.bars.first() {
            let earliest = first.timestamp - Duration::days(i64::from(self.history_in_days));
            if from < earliest {
                return Err(CandleError::OutOfHistoryRange {
                    symbol: self.symbol.clone(),
                    from,
                    earliest,
                });
            }
        }

        let Some(cursor) = self.cursor else {
            return Ok(Vec::new());
        };

        let observed = &self.bars[..=cursor];
        let lo = observed.partition_point(|b| b.timestamp < from);
        let hi = observed.partition_point(|b| b.timestamp <= to);
        Ok(observed[lo..hi.max(lo)].to_vec())
    }

    /// First bar with `timestamp > t`.
    pub fn next_after(&self, t: DateTime<Utc>) -> Result<&Candle, CandleError> {
        let idx = self.bars.partition_point(|b| b.timestamp <= t);
        self.bars.get(idx).ok_or_else(|| CandleError::EndOfStream {
            symbol: self.symbol.clone(),
        })
    }

    /// Move the cursor to the last bar at or before `t` and return every
    /// newly crossed bar. Idempotent when `t` crosses no bar boundary.
    pub fn advance(&mut self, t: DateTime<Utc>) -> Vec<Candle> {
        let (from, to) = self.advance_range(t);
        let new_cursor = self.bars.partition_point(|b| b.timestamp <= t).checked_sub(1);
        if new_cursor <= self.cursor {
            return Vec::new();
        }

        let crossed = self.bars[from..to].to_vec();
        self.cursor = new_cursor;
        crossed
    }

    /// New-candle notification for a bar of this feed.
    #[must_use]
    pub fn event(&self, bar: Candle) -> CandleEvent {
        CandleEvent {
            symbol: self.symbol.clone(),
            period: self.period,
            bar,
        }
    }

    /// Append bars from a live feed and move the cursor onto them.
    ///
    /// Timestamps must strictly follow the last stored bar.
    pub fn append_bars(
        &mut self,
        bars: Vec<Candle>,
        queue: Option<&EventQueue<CandleEvent>>,
    ) -> Result<Vec<Candle>, CandleError> {
        if bars.is_empty() {
            return Ok(Vec::new());
        }

        ensure_increasing(&self.symbol, self.bars.last(), &bars)?;

        let first_new = self.bars.len();
        self.bars.extend(bars);
        apply_indicators(&mut self.bars, &self.indicators)?;

        let appended = self.bars[first_new..].to_vec();
        if let Some(queue) = queue {
            self.emit(&appended, queue)?;
        }
        self.cursor = Some(self.bars.len() - 1);
        Ok(appended)
    }

    fn advance_range(&self, t: DateTime<Utc>) -> (usize, usize) {
        let old_next = self.cursor.map_or(0, |c| c + 1);
        let to = self.bars.partition_point(|b| b.timestamp <= t);
        let from = old_next.max(self.starting_position).min(to);
        (from, to.max(from))
    }

    fn emit(&self, bars: &[Candle], queue: &EventQueue<CandleEvent>) -> Result<(), CandleError> {
        for bar in bars {
            queue.enqueue(self.event(bar.clone()))?;
        }
        Ok(())
    }
}

fn ensure_increasing(
    symbol: &Instrument,
    last: Option<&Candle>,
    bars: &[Candle],
) -> Result<(), CandleError> {
    let mut previous = last.map(|b| b.timestamp);
    for bar in bars {
        if let Some(prev) = previous {
            if bar.timestamp <= prev {
                return Err(CandleError::NonIncreasingTimestamp {
                    symbol: symbol.clone(),
                    previous: prev,
                    next: bar.timestamp,
                });
            }
        }
        previous = Some(bar.timestamp);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    /// Bars at t-1, t0, t1, t2 with closes 5, 10, 20, 30.
    fn repo() -> CandleRepository {
        let bars = vec![
            Candle::flat(t(-1), dec!(5)),
            Candle::flat(t(0), dec!(10)),
            Candle::flat(t(1), dec!(20)),
            Candle::flat(t(2), dec!(30)),
        ];
        CandleRepository::new(Instrument::new("AAPL"), Period::ONE_MINUTE, bars, vec![], t(0), 0)
            .unwrap()
    }

    #[test]
    fn starts_on_bar_at_start_time() {
        let repo = repo();
        assert_eq!(repo.starting_position(), 1);
        assert_eq!(repo.cursor(), Some(1));
        assert_eq!(repo.latest_close(), Some(dec!(10)));
    }

    #[test]
    fn advance_emits_crossed_bars_once() {
        let mut repo = repo();

        let emitted = repo.advance(t(1));
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].close, dec!(20));

        // Same time again: no boundary crossed.
        assert!(repo.advance(t(1)).is_empty());
        // Earlier time: cursor never rewinds.
        assert!(repo.advance(t(0)).is_empty());
        assert_eq!(repo.cursor(), Some(2));

        let event = repo.event(emitted[0].clone());
        assert_eq!(event.period, Period::ONE_MINUTE);
        assert_eq!(event.symbol, Instrument::new("AAPL"));
    }

    #[test]
    fn advance_emits_every_bar_between_cursors() {
        let mut repo = repo();
        let emitted = repo.advance(t(10));
        let closes: Vec<_> = emitted.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![dec!(20), dec!(30)]);
    }

    #[test]
    fn advance_is_not_bounded_by_queue_capacity() {
        let bars = (0..50).map(|m| Candle::flat(t(m), Decimal::from(m + 1))).collect();
        let mut repo =
            CandleRepository::new(Instrument::new("AAPL"), Period::ONE_MINUTE, bars, vec![], t(0), 0)
                .unwrap();
        assert_eq!(repo.advance(t(49)).len(), 49);
        assert_eq!(repo.latest_close(), Some(dec!(50)));
    }

    #[test]
    fn warm_up_bars_are_never_emitted() {
        let bars = vec![
            Candle::flat(t(-2), dec!(1)),
            Candle::flat(t(-1), dec!(2)),
            Candle::flat(t(1), dec!(3)),
        ];
        let mut repo =
            CandleRepository::new(Instrument::new("SPY"), Period::ONE_MINUTE, bars, vec![], t(0), 0)
                .unwrap();
        assert_eq!(repo.starting_position(), 2);
        assert_eq!(repo.cursor(), Some(1));

        let emitted = repo.advance(t(1));
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].close, dec!(3));
    }

    #[test]
    fn fetch_is_inclusive_and_clamped_to_cursor() {
        let repo = repo();
        let bars = repo.fetch(t(-1), t(2)).unwrap();
        // t1 and t2 are not yet observed.
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, dec!(5));
        assert_eq!(bars[1].close, dec!(10));

        let bars = repo.fetch(t(0), t(0)).unwrap();
        assert_eq!(bars.len(), 1);
    }

    #[test]
    fn fetch_out_of_history_range() {
        let repo = repo();
        let err = repo.fetch(t(-10), t(0)).unwrap_err();
        assert!(matches!(err, CandleError::OutOfHistoryRange { .. }));

        let err = repo.fetch(t(1), t(0)).unwrap_err();
        assert!(matches!(err, CandleError::InvalidRange { .. }));
    }

    #[test]
    fn next_after_and_end_of_stream() {
        let repo = repo();
        assert_eq!(repo.next_after(t(0)).unwrap().close, dec!(20));
        assert!(matches!(
            repo.next_after(t(2)),
            Err(CandleError::EndOfStream { .. })
        ));
    }

    #[test]
    fn rejects_unordered_bars() {
        let bars = vec![Candle::flat(t(1), dec!(1)), Candle::flat(t(1), dec!(2))];
        let err = CandleRepository::new(Instrument::new("X"), Period::ONE_MINUTE, bars, vec![], t(0), 0)
            .unwrap_err();
        assert!(matches!(err, CandleError::NonIncreasingTimestamp { .. }));
    }

    #[test]
    fn append_bars_enforces_order_and_notifies() {
        let mut repo = repo();
        let queue = EventQueue::new("candles", 16);

        let err = repo
            .append_bars(vec![Candle::flat(t(2), dec!(31))], Some(&queue))
            .unwrap_err();
        assert!(matches!(err, CandleError::NonIncreasingTimestamp { .. }));

        let appended = repo
            .append_bars(vec![Candle::flat(t(3), dec!(40))], Some(&queue))
            .unwrap();
        assert_eq!(appended.len(), 1);
        assert_eq!(repo.latest_close(), Some(dec!(40)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn indicators_are_overlaid_on_append() {
        let bars = vec![Candle::flat(t(0), dec!(1)), Candle::flat(t(1), dec!(3))];
        let mut repo = CandleRepository::new(
            Instrument::new("X"),
            Period::ONE_MINUTE,
            bars,
            vec!["sma-2".to_string()],
            t(0),
            0,
        )
        .unwrap();

        repo.append_bars(vec![Candle::flat(t(2), dec!(5))], None).unwrap();
        let bars = repo.fetch(t(0), t(2)).unwrap();
        assert_eq!(bars[2].indicators.get("sma-2"), Some(&4.0));
    }
}
