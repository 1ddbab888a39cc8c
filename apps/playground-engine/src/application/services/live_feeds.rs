//! Live candle feeds shared by live playgrounds.
//!
//! One repository per `(symbol, period)`. Appended bars are stored once and
//! fanned out to every subscribed playground's new-candles queue; the
//! playground picks them up on its next live tick.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::market::{Candle, CandleError, CandleEvent, CandleRepository, Period};
use crate::domain::shared::{EventQueue, Instrument, PlaygroundId};

struct LiveFeed {
    repository: CandleRepository,
    subscribers: Vec<(PlaygroundId, Arc<EventQueue<CandleEvent>>)>,
}

/// Registry of live feeds keyed by `(symbol, period)`.
#[derive(Default)]
pub struct LiveFeedRegistry {
    feeds: Mutex<HashMap<(Instrument, Period), LiveFeed>>,
}

impl LiveFeedRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a playground's queue to the feed matching `repository`.
    ///
    /// The first subscriber seeds the feed with its repository.
    pub fn subscribe(
        &self,
        playground_id: &PlaygroundId,
        repository: &CandleRepository,
        queue: Arc<EventQueue<CandleEvent>>,
    ) {
        let key = (repository.symbol().clone(), repository.period());
        let mut feeds = self.feeds.lock();
        let feed = feeds.entry(key).or_insert_with(|| LiveFeed {
            repository: repository.clone(),
            subscribers: Vec::new(),
        });
        if !feed.subscribers.iter().any(|(id, _)| id == playground_id) {
            feed.subscribers.push((playground_id.clone(), queue));
        }
    }

    /// Number of playgrounds subscribed to a feed.
    #[must_use]
    pub fn subscriber_count(&self, symbol: &Instrument, period: Period) -> usize {
        self.feeds
            .lock()
            .get(&(symbol.clone(), period))
            .map_or(0, |f| f.subscribers.len())
    }

    /// Store new bars and notify every subscriber.
    ///
    /// Returns the number of bars appended and of subscribers notified.
    pub fn append_bars(
        &self,
        symbol: &Instrument,
        period: Period,
        bars: Vec<Candle>,
    ) -> Result<(usize, usize), CandleError> {
        let mut feeds = self.feeds.lock();
        let feed = feeds
            .get_mut(&(symbol.clone(), period))
            .ok_or_else(|| CandleError::RepositoryNotFound {
                symbol: symbol.clone(),
                period_seconds: period.seconds(),
            })?;

        let appended = feed.repository.append_bars(bars, None)?;
        for (playground_id, queue) in &feed.subscribers {
            for bar in &appended {
                queue.enqueue(CandleEvent {
                    symbol: symbol.clone(),
                    period,
                    bar: bar.clone(),
                })?;
            }
            tracing::debug!(
                playground_id = %playground_id,
                symbol = %symbol,
                bars = appended.len(),
                "Live bars queued"
            );
        }

        Ok((appended.len(), feed.subscribers.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn repository(start: chrono::DateTime<Utc>) -> CandleRepository {
        CandleRepository::new(
            Instrument::new("AAPL"),
            Period::from_seconds(60).unwrap(),
            vec![Candle::flat(start, dec!(100))],
            Vec::new(),
            start,
            0,
        )
        .unwrap()
    }

    #[test]
    fn append_fans_out_to_subscribers() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let registry = LiveFeedRegistry::new();
        let first = Arc::new(EventQueue::new("new_candles", 8));
        let second = Arc::new(EventQueue::new("new_candles", 8));
        registry.subscribe(&PlaygroundId::new("l1"), &repository(start), Arc::clone(&first));
        registry.subscribe(&PlaygroundId::new("l2"), &repository(start), Arc::clone(&second));
        registry.subscribe(&PlaygroundId::new("l2"), &repository(start), Arc::clone(&second));

        let period = Period::from_seconds(60).unwrap();
        let bar = Candle::flat(start + Duration::minutes(1), dec!(101));
        let (appended, notified) = registry
            .append_bars(&Instrument::new("AAPL"), period, vec![bar])
            .unwrap();

        assert_eq!((appended, notified), (1, 2));
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first.dequeue().unwrap().bar.close, dec!(101));
    }

    #[test]
    fn stale_bars_are_refused() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let registry = LiveFeedRegistry::new();
        let queue = Arc::new(EventQueue::new("new_candles", 8));
        registry.subscribe(&PlaygroundId::new("l1"), &repository(start), Arc::clone(&queue));

        let period = Period::from_seconds(60).unwrap();
        let result = registry.append_bars(
            &Instrument::new("AAPL"),
            period,
            vec![Candle::flat(start, dec!(99))],
        );
        assert!(matches!(result, Err(CandleError::NonIncreasingTimestamp { .. })));
        assert!(queue.is_empty());
    }

    #[test]
    fn unknown_feed_is_not_found() {
        let registry = LiveFeedRegistry::new();
        let period = Period::from_seconds(60).unwrap();
        let result = registry.append_bars(&Instrument::new("MSFT"), period, Vec::new());
        assert!(matches!(result, Err(CandleError::RepositoryNotFound { .. })));
    }
}
