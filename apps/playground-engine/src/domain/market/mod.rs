//! Market Data Bounded Context
//!
//! Calendar, clock, bars, and the candle repositories that feed playgrounds.

pub mod calendar;
pub mod candle;
pub mod candle_repository;
pub mod clock;
pub mod errors;
pub mod indicators;

pub use calendar::{CalendarError, MarketCalendar, MarketSession, RegularHours};
pub use candle::{Candle, CandleEvent, Period};
pub use candle_repository::CandleRepository;
pub use clock::{Clock, ClockAdvance, ClockError};
pub use errors::CandleError;
