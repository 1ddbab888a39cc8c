//! Runtime settings the use cases and the reconciler read.

use std::time::Duration;

use chrono::NaiveDate;

use crate::domain::market::{CalendarError, MarketCalendar, RegularHours};

/// Trading calendar applied to simulator clocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarSettings {
    /// Regular session hours.
    pub hours: RegularHours,
    /// Dates without a session.
    pub holidays: Vec<NaiveDate>,
}

impl CalendarSettings {
    /// Weekday calendar covering `from..=to`.
    pub fn calendar(&self, from: NaiveDate, to: NaiveDate) -> Result<MarketCalendar, CalendarError> {
        MarketCalendar::regular(from, to, &self.hours, &self.holidays)
    }
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Pause between broker order polls.
    pub poll_interval: Duration,
    /// Timeout applied to every broker call.
    pub broker_timeout: Duration,
    /// Capacity of every bounded queue.
    pub queue_capacity: usize,
    /// Interval between reconciler passes.
    pub commit_interval: Duration,
    /// Internal errors tolerated per cache entry before it is dropped.
    pub max_internal_errors: u32,
    /// Simulator calendar; `None` runs a continuous clock.
    pub calendar: Option<CalendarSettings>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            broker_timeout: Duration::from_secs(10),
            queue_capacity: 1024,
            commit_interval: Duration::from_millis(500),
            max_internal_errors: 3,
            calendar: None,
        }
    }
}
