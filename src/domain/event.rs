// Event range domain model - the UTC span covered by a replay's frames
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outlook products run on a 12Z-to-12Z convective day.
pub const CONVECTIVE_DAY_OFFSET_HOURS: i64 = 12;

#[derive(Debug, Error, PartialEq)]
pub enum EventRangeError {
    #[error("event range start {start_ms} is after end {end_ms}")]
    Inverted { start_ms: i64, end_ms: i64 },
    #[error("timestamp {0} is outside the representable UTC range")]
    OutOfRange(i64),
}

/// Inclusive UTC millisecond bounds of the loaded event.
///
/// The pair is the identity of "which event is loaded"; two events with the
/// same number of frames but different bounds are different events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRange {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl EventRange {
    pub fn new(start_ms: i64, end_ms: i64) -> Result<Self, EventRangeError> {
        if start_ms > end_ms {
            return Err(EventRangeError::Inverted { start_ms, end_ms });
        }
        for ms in [start_ms, end_ms] {
            if DateTime::<Utc>::from_timestamp_millis(ms).is_none() {
                return Err(EventRangeError::OutOfRange(ms));
            }
        }
        Ok(Self { start_ms, end_ms })
    }

    pub fn start(&self) -> DateTime<Utc> {
        to_utc(self.start_ms)
    }

    pub fn end(&self) -> DateTime<Utc> {
        to_utc(self.end_ms)
    }

    /// Convective day the event starts in: the UTC date of `start - 12h`.
    pub fn convective_day(&self) -> NaiveDate {
        convective_day_of(self.start_ms)
    }

    /// Every UTC calendar day touched by the range, in order.
    pub fn calendar_days(&self) -> Vec<NaiveDate> {
        let last = self.end().date_naive();
        self.start()
            .date_naive()
            .iter_days()
            .take_while(|day| *day <= last)
            .collect()
    }

    /// Start and end dates widened by `days` on each side.
    pub fn widened_dates(&self, days: i64) -> (NaiveDate, NaiveDate) {
        let widen = Duration::days(days);
        (
            self.start().date_naive() - widen,
            self.end().date_naive() + widen,
        )
    }

    /// Sample instants from start to end spaced by `interval_ms`.
    ///
    /// The end instant is always the final sample and appears exactly once,
    /// even when it does not land on an interval boundary.
    pub fn sample_instants(&self, interval_ms: i64) -> Vec<i64> {
        let step = interval_ms.max(1);
        let mut instants = Vec::new();
        let mut t = self.start_ms;
        while t < self.end_ms {
            instants.push(t);
            t += step;
        }
        instants.push(self.end_ms);
        instants
    }
}

pub fn convective_day_of(ms: i64) -> NaiveDate {
    (to_utc(ms) - Duration::hours(CONVECTIVE_DAY_OFFSET_HOURS)).date_naive()
}

pub fn to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}
