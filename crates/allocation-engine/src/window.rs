//! Half-open date ranges and the clipping/splitting the engine performs on them.

use allocation_common::{AllocationError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// `[start, end)` with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(AllocationError::Configuration(format!(
                "window start ({start}) must be before window end ({end})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.duration().num_milliseconds() as f64 / 1_000.0
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Intersection with `[start, end)`, or `None` when the overlap is empty.
    pub fn intersect(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<TimeWindow> {
        let start = start.max(self.start);
        let end = end.min(self.end);
        (start < end).then_some(TimeWindow { start, end })
    }
}

/// Clips a history range to `window`. An open `end` is closed at the earlier
/// of `evaluation_instant` and the window end.
pub fn clip(
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    window: &TimeWindow,
    evaluation_instant: DateTime<Utc>,
) -> Option<TimeWindow> {
    let end = end.unwrap_or_else(|| evaluation_instant.min(window.end));
    window.intersect(start, end)
}

/// Partitions `window` into consecutive sub-windows of `interval`, the last one
/// truncated to the window end. No interval, or a non-positive one, yields the
/// whole window, as does one that overflows the calendar.
pub fn split(window: &TimeWindow, interval: Option<Duration>) -> Vec<TimeWindow> {
    let interval = match interval {
        Some(interval) if interval > Duration::zero() => interval,
        _ => return vec![*window],
    };

    let mut windows = Vec::new();
    let mut start = window.start;
    while start < window.end {
        let end = start
            .checked_add_signed(interval)
            .map_or(window.end, |end| end.min(window.end));
        windows.push(TimeWindow { start, end });
        start = end;
    }
    windows
}
