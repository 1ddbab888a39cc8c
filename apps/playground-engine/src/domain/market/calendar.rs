//! Market calendar: trading date → session hours.

use std::collections::BTreeMap;
use std::ops::Bound;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Errors raised while building a calendar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalendarError {
    /// Session open is not strictly before close.
    #[error("session {date}: open {open} is not before close {close}")]
    InvalidSession {
        /// Trading date.
        date: NaiveDate,
        /// Market open.
        open: DateTime<Utc>,
        /// Market close.
        close: DateTime<Utc>,
    },
    /// The same date was listed twice.
    #[error("duplicate session for {0}")]
    DuplicateSession(NaiveDate),
    /// A local session time does not map to a single UTC instant.
    #[error("ambiguous local time {time} on {date}")]
    AmbiguousLocalTime {
        /// Trading date.
        date: NaiveDate,
        /// Local wall-clock time.
        time: NaiveTime,
    },
    /// Date range is inverted.
    #[error("calendar range {from}..={to} is empty")]
    EmptyRange {
        /// Range start.
        from: NaiveDate,
        /// Range end.
        to: NaiveDate,
    },
}

/// A single trading session, stored as UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSession {
    /// Trading date the session belongs to.
    pub date: NaiveDate,
    /// Market open (inclusive).
    pub market_open: DateTime<Utc>,
    /// Market close (exclusive).
    pub market_close: DateTime<Utc>,
}

impl MarketSession {
    /// Returns true if `t` is within `[market_open, market_close)`.
    #[must_use]
    pub fn is_between_market_hours(&self, t: DateTime<Utc>) -> bool {
        self.market_open <= t && t < self.market_close
    }
}

/// Regular trading hours used to generate a weekday calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegularHours {
    /// Local open time.
    pub open: NaiveTime,
    /// Local close time.
    pub close: NaiveTime,
    /// Exchange offset from UTC.
    pub utc_offset: FixedOffset,
}

/// Maps trading dates to their sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketCalendar {
    sessions: BTreeMap<NaiveDate, MarketSession>,
}

impl MarketCalendar {
    /// Build a calendar from explicit sessions.
    pub fn new(sessions: impl IntoIterator<Item = MarketSession>) -> Result<Self, CalendarError> {
        let mut map = BTreeMap::new();
        for session in sessions {
            if session.market_open >= session.market_close {
                return Err(CalendarError::InvalidSession {
                    date: session.date,
                    open: session.market_open,
                    close: session.market_close,
                });
            }
            if map.insert(session.date, session).is_some() {
                return Err(CalendarError::DuplicateSession(session.date));
            }
        }
        Ok(Self { sessions: map })
    }

    /// Build a Monday–Friday calendar over `from..=to`, skipping `holidays`.
    pub fn regular(
        from: NaiveDate,
        to: NaiveDate,
        hours: &RegularHours,
        holidays: &[NaiveDate],
    ) -> Result<Self, CalendarError> {
        if from > to {
            return Err(CalendarError::EmptyRange { from, to });
        }

        let mut sessions = Vec::new();
        let mut date = from;
        while date <= to {
            let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
            if !weekend && !holidays.contains(&date) {
                sessions.push(MarketSession {
                    date,
                    market_open: local_to_utc(date, hours.open, hours.utc_offset)?,
                    market_close: local_to_utc(date, hours.close, hours.utc_offset)?,
                });
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }

        Self::new(sessions)
    }

    /// Session for a trading date.
    #[must_use]
    pub fn session(&self, date: NaiveDate) -> Option<&MarketSession> {
        self.sessions.get(&date)
    }

    /// Session that `t` falls on.
    ///
    /// A session that contains `t` wins; otherwise the session listed under
    /// `t`'s UTC date.
    #[must_use]
    pub fn session_at(&self, t: DateTime<Utc>) -> Option<&MarketSession> {
        let date = t.date_naive();
        let previous = date.pred_opt().and_then(|d| self.sessions.get(&d));
        if let Some(session) = previous.filter(|s| s.is_between_market_hours(t)) {
            return Some(session);
        }
        self.sessions.get(&date)
    }

    /// First session strictly after `date`.
    #[must_use]
    pub fn next_session_after(&self, date: NaiveDate) -> Option<&MarketSession> {
        self.sessions
            .range((Bound::Excluded(date), Bound::Unbounded))
            .next()
            .map(|(_, s)| s)
    }

    /// Whether `t` is inside market hours of its day.
    ///
    /// `None` when `t`'s day is not in the calendar.
    #[must_use]
    pub fn is_between_market_hours(&self, t: DateTime<Utc>) -> Option<bool> {
        self.session_at(t).map(|s| s.is_between_market_hours(t))
    }

    /// Number of sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if the calendar has no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Iterate sessions in date order.
    pub fn sessions(&self) -> impl Iterator<Item = &MarketSession> {
        self.sessions.values()
    }
}

fn local_to_utc(
    date: NaiveDate,
    time: NaiveTime,
    offset: FixedOffset,
) -> Result<DateTime<Utc>, CalendarError> {
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|t| t.with_timezone(&Utc))
        .ok_or(CalendarError::AmbiguousLocalTime { date, time })
}
