//! Market calendar configuration for simulator clocks.

use chrono::{FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::application::CalendarSettings;
use crate::domain::market::RegularHours;

/// Calendar configuration. Disabled means a continuous 24h clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Apply the calendar.
    #[serde(default)]
    pub enabled: bool,
    /// Local session open, `HH:MM`.
    #[serde(default = "default_market_open")]
    pub market_open: String,
    /// Local session close, `HH:MM`.
    #[serde(default = "default_market_close")]
    pub market_close: String,
    /// Exchange offset from UTC, in minutes.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
    /// Dates without a session.
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            market_open: default_market_open(),
            market_close: default_market_close(),
            utc_offset_minutes: default_utc_offset_minutes(),
            holidays: Vec::new(),
        }
    }
}

impl CalendarConfig {
    /// Parsed session hours.
    pub fn hours(&self) -> Result<RegularHours, ConfigError> {
        let open = parse_time("calendar.market_open", &self.market_open)?;
        let close = parse_time("calendar.market_close", &self.market_close)?;
        let utc_offset = FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "calendar.utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            ))
        })?;
        Ok(RegularHours {
            open,
            close,
            utc_offset,
        })
    }

    /// Calendar settings, or `None` when disabled.
    pub fn settings(&self) -> Result<Option<CalendarSettings>, ConfigError> {
        if !self.enabled {
            return Ok(None);
        }
        Ok(Some(CalendarSettings {
            hours: self.hours()?,
            holidays: self.holidays.clone(),
        }))
    }
}

fn parse_time(field: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|e| ConfigError::ValidationError(format!("{field} must be HH:MM: {e}")))
}

fn default_market_open() -> String {
    "09:30".to_string()
}

fn default_market_close() -> String {
    "16:00".to_string()
}

const fn default_utc_offset_minutes() -> i32 {
    -300
}
