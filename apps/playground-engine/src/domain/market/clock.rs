//! Market-hour-aware playground clock.
//!
//! Without a calendar the clock runs continuously. With one, any time at or
//! past a session's close, or on a date the calendar does not list, skips to
//! the open of the next session.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::calendar::MarketCalendar;

/// Errors raised by the clock.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// `end_at` is not after `start_at`.
    #[error("clock end {end_at} must be after start {start_at}")]
    InvalidRange {
        /// Start of the run.
        start_at: DateTime<Utc>,
        /// End of the run.
        end_at: DateTime<Utc>,
    },
    /// Tick durations must be positive.
    #[error("tick duration must be positive, got {0}s")]
    NonPositiveDuration(i64),
}

/// Result of advancing (or previewing) the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockAdvance {
    /// Time before the advance.
    pub previous_time: DateTime<Utc>,
    /// Time after the advance.
    pub current_time: DateTime<Utc>,
    /// True when the advance crossed into a different session.
    pub session_boundary: bool,
    /// True when `current_time` reached `end_at`.
    pub is_backtest_complete: bool,
}

/// Playground clock: `{startAt, endAt?, currentTime, calendar}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    start_at: DateTime<Utc>,
    end_at: Option<DateTime<Utc>>,
    current_time: DateTime<Utc>,
    calendar: Option<MarketCalendar>,
}

impl Clock {
    /// Create a clock. An absent `end_at` means live (unbounded).
    ///
    /// The current time starts at `start_at`, moved forward to the first
    /// session's open when a calendar is supplied.
    pub fn new(
        start_at: DateTime<Utc>,
        end_at: Option<DateTime<Utc>>,
        calendar: Option<MarketCalendar>,
    ) -> Result<Self, ClockError> {
        if let Some(end_at) = end_at {
            if end_at <= start_at {
                return Err(ClockError::InvalidRange { start_at, end_at });
            }
        }

        let mut clock = Self {
            start_at,
            end_at,
            current_time: start_at,
            calendar,
        };
        clock.current_time = clock.align(start_at);
        Ok(clock)
    }

    /// Start of the run.
    #[must_use]
    pub const fn start_at(&self) -> DateTime<Utc> {
        self.start_at
    }

    /// End of the run, if bounded.
    #[must_use]
    pub const fn end_at(&self) -> Option<DateTime<Utc>> {
        self.end_at
    }

    /// Current time.
    #[must_use]
    pub const fn current_time(&self) -> DateTime<Utc> {
        self.current_time
    }

    /// Calendar, if the clock is market-hour aware.
    #[must_use]
    pub const fn calendar(&self) -> Option<&MarketCalendar> {
        self.calendar.as_ref()
    }

    /// Returns true for an unbounded (live) clock.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.end_at.is_none()
    }

    /// True iff `end_at` is set and the current time reached it.
    #[must_use]
    pub fn is_backtest_complete(&self) -> bool {
        self.is_expired_at(self.current_time)
    }

    /// True iff `end_at` is set and `t` is at or past it.
    #[must_use]
    pub fn is_expired_at(&self, t: DateTime<Utc>) -> bool {
        self.end_at.is_some_and(|end| t >= end)
    }

    /// Compute the advance by `d` without committing it.
    pub fn peek(&self, d: Duration) -> Result<ClockAdvance, ClockError> {
        if d <= Duration::zero() {
            return Err(ClockError::NonPositiveDuration(d.num_seconds()));
        }

        let raw = self.current_time + d;
        let next = match self.end_at {
            Some(end) if raw >= end => end,
            Some(end) => self.align(raw).min(end),
            None => self.align(raw),
        };

        Ok(ClockAdvance {
            previous_time: self.current_time,
            current_time: next,
            session_boundary: self.session_key(next) != self.session_key(self.current_time),
            is_backtest_complete: self.is_expired_at(next),
        })
    }

    /// Advance by `d`. Deterministic for a given start, end, calendar and
    /// duration sequence.
    pub fn tick(&mut self, d: Duration) -> Result<ClockAdvance, ClockError> {
        let advance = self.peek(d)?;
        self.apply(&advance);
        Ok(advance)
    }

    /// Commit an advance computed by [`Self::peek`].
    pub fn apply(&mut self, advance: &ClockAdvance) {
        self.current_time = advance.current_time;
    }

    /// Move the clock forward to `t` (live playgrounds follow wall time).
    /// Never moves backwards.
    pub fn sync_to(&mut self, t: DateTime<Utc>) {
        if t > self.current_time {
            self.current_time = t;
        }
    }

    fn align(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let Some(calendar) = &self.calendar else {
            return t;
        };

        match calendar.session_at(t) {
            Some(session) if t < session.market_open => session.market_open,
            Some(session) if t < session.market_close => t,
            Some(session) => calendar
                .next_session_after(session.date)
                .map_or(t, |next| next.market_open),
            None => calendar
                .next_session_after(t.date_naive())
                .map_or(t, |next| next.market_open),
        }
    }

    fn session_key(&self, t: DateTime<Utc>) -> Option<NaiveDate> {
        match &self.calendar {
            Some(calendar) => calendar.session_at(t).map(|s| s.date),
            None => Some(t.date_naive()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::calendar::{MarketSession, RegularHours};
    use chrono::{FixedOffset, NaiveTime, TimeZone};
    use proptest::prelude::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn calendar(dates: &[(i32, u32, u32)]) -> MarketCalendar {
        MarketCalendar::new(dates.iter().map(|&(y, m, d)| MarketSession {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            market_open: utc(y, m, d, 14, 30),
            market_close: utc(y, m, d, 21, 0),
        }))
        .unwrap()
    }

    #[test]
    fn starts_at_market_open() {
        let cal = calendar(&[(2021, 1, 12), (2021, 1, 13)]);
        let clock = Clock::new(utc(2021, 1, 12, 0, 0), Some(utc(2021, 1, 17, 0, 0)), Some(cal)).unwrap();
        assert_eq!(clock.current_time(), utc(2021, 1, 12, 14, 30));
    }

    #[test]
    fn advances_to_next_market_open_at_close() {
        let cal = calendar(&[(2021, 1, 12), (2021, 1, 13)]);
        let mut clock =
            Clock::new(utc(2021, 1, 12, 0, 0), Some(utc(2021, 1, 17, 0, 0)), Some(cal)).unwrap();

        clock.tick(Duration::hours(6)).unwrap();
        let advance = clock.tick(Duration::minutes(29)).unwrap();
        assert_eq!(advance.current_time, utc(2021, 1, 12, 20, 59));
        assert!(!advance.session_boundary);

        let advance = clock.tick(Duration::minutes(1)).unwrap();
        assert_eq!(advance.current_time, utc(2021, 1, 13, 14, 30));
        assert!(advance.session_boundary);
    }

    #[test]
    fn skips_holiday() {
        // Mon 2021-01-11 and Wed 2021-01-13; Tuesday is a holiday.
        let cal = calendar(&[(2021, 1, 11), (2021, 1, 13)]);
        let mut clock =
            Clock::new(utc(2021, 1, 11, 14, 30), Some(utc(2021, 1, 13, 21, 0)), Some(cal)).unwrap();

        clock.tick(Duration::hours(6)).unwrap();
        assert_eq!(clock.current_time(), utc(2021, 1, 11, 20, 30));

        let advance = clock.tick(Duration::hours(24)).unwrap();
        assert_eq!(advance.current_time, utc(2021, 1, 13, 14, 30));
        assert!(advance.session_boundary);
        assert!(!advance.is_backtest_complete);
    }

    #[test]
    fn clamps_to_end_and_completes() {
        let mut clock = Clock::new(utc(2021, 1, 1, 0, 0), Some(utc(2021, 1, 1, 0, 2)), None).unwrap();
        assert!(!clock.is_backtest_complete());

        clock.tick(Duration::minutes(1)).unwrap();
        let advance = clock.tick(Duration::minutes(5)).unwrap();
        assert_eq!(advance.current_time, utc(2021, 1, 1, 0, 2));
        assert!(advance.is_backtest_complete);
        assert!(clock.is_backtest_complete());
    }

    #[test]
    fn peek_does_not_commit() {
        let clock = Clock::new(utc(2021, 1, 1, 0, 0), None, None).unwrap();
        let advance = clock.peek(Duration::minutes(1)).unwrap();
        assert_eq!(advance.current_time, utc(2021, 1, 1, 0, 1));
        assert_eq!(clock.current_time(), utc(2021, 1, 1, 0, 0));
        assert!(clock.is_live());
    }

    #[test]
    fn rejects_invalid_inputs() {
        let start = utc(2021, 1, 1, 0, 0);
        assert!(matches!(
            Clock::new(start, Some(start), None),
            Err(ClockError::InvalidRange { .. })
        ));

        let mut clock = Clock::new(start, None, None).unwrap();
        assert_eq!(
            clock.tick(Duration::zero()),
            Err(ClockError::NonPositiveDuration(0))
        );
    }

    #[test]
    fn works_with_regular_hours_calendar() {
        let hours = RegularHours {
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            utc_offset: FixedOffset::west_opt(5 * 3600).unwrap(),
        };
        let cal = MarketCalendar::regular(
            NaiveDate::from_ymd_opt(2021, 1, 15).unwrap(),
            NaiveDate::from_ymd_opt(2021, 1, 19).unwrap(),
            &hours,
            &[],
        )
        .unwrap();
        let mut clock = Clock::new(utc(2021, 1, 15, 20, 0), None, Some(cal)).unwrap();

        // Friday 15:00 local + 2h lands after close: skip the weekend.
        clock.tick(Duration::hours(2)).unwrap();
        assert_eq!(clock.current_time(), utc(2021, 1, 18, 14, 30));
    }

    proptest! {
        #[test]
        fn ticks_are_deterministic_and_bounded(steps in prop::collection::vec(1i64..50_000, 1..40)) {
            let cal = calendar(&[(2021, 1, 11), (2021, 1, 13), (2021, 1, 14), (2021, 1, 15)]);
            let start = utc(2021, 1, 11, 14, 30);
            let end = utc(2021, 1, 15, 21, 0);
            let mut first = Clock::new(start, Some(end), Some(cal.clone())).unwrap();
            let mut second = Clock::new(start, Some(end), Some(cal)).unwrap();

            let mut previous = first.current_time();
            for seconds in steps {
                let a = first.tick(Duration::seconds(seconds)).unwrap();
                let b = second.tick(Duration::seconds(seconds)).unwrap();
                prop_assert_eq!(&a, &b);
                prop_assert!(a.current_time >= previous);
                prop_assert!(a.current_time <= end);
                previous = a.current_time;
            }
        }
    }
}
