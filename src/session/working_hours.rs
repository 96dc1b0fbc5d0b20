//! Working-hours windows.
//!
//! A window is a clock range such as `10.15-16.40` or `22:00-06:00`; when
//! the end is before the start the window wraps past midnight. Both bounds
//! are inclusive. Each session draws a `time_delta` jitter that shifts "now"
//! backwards, which is the same as moving every window later by that amount.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, Local, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// One daily working window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkingWindow {
    start: NaiveTime,
    end: NaiveTime,
}

/// Result of a working-hours check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStatus {
    Inside,
    Outside {
        /// Seconds until the nearest window opens
        seconds_until_next: u64,
    },
}

impl WindowStatus {
    #[must_use]
    pub fn is_inside(&self) -> bool {
        matches!(self, Self::Inside)
    }

    /// Seconds to wait before the next window; zero when inside.
    #[must_use]
    pub fn wait_seconds(&self) -> u64 {
        match self {
            Self::Inside => 0,
            Self::Outside { seconds_until_next } => *seconds_until_next,
        }
    }
}

impl WorkingWindow {
    #[must_use]
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn start(&self) -> NaiveTime {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> NaiveTime {
        self.end
    }

    /// Whether the window wraps past midnight.
    #[must_use]
    pub fn is_overnight(&self) -> bool {
        self.end < self.start
    }

    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.is_overnight() {
            time >= self.start || time <= self.end
        } else {
            self.start <= time && time <= self.end
        }
    }

    /// Seconds from `time` forward to this window's start, wrapping at midnight.
    #[must_use]
    pub fn seconds_until_start(&self, time: NaiveTime) -> u64 {
        let diff = i64::from(self.start.num_seconds_from_midnight())
            - i64::from(time.num_seconds_from_midnight());
        diff.rem_euclid(SECONDS_PER_DAY) as u64
    }
}

fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let normalized = raw.trim().replace('.', ":");
    let (h, m) = match normalized.split_once(':') {
        Some((h, m)) => (h, m),
        None => (normalized.as_str(), "0"),
    };
    let hour: u32 = h.trim().parse().ok()?;
    let minute: u32 = m.trim().parse().ok()?;
    // "24:00" is accepted as the last second of the day.
    if hour == 24 && minute == 0 {
        return NaiveTime::from_hms_opt(23, 59, 59);
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

impl FromStr for WorkingWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("working hours '{s}' must look like 10.15-16.40"))?;
        let start = parse_clock(start).ok_or_else(|| format!("invalid start time in '{s}'"))?;
        let end = parse_clock(end).ok_or_else(|| format!("invalid end time in '{s}'"))?;
        Ok(Self { start, end })
    }
}

impl TryFrom<String> for WorkingWindow {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WorkingWindow> for String {
    fn from(window: WorkingWindow) -> Self {
        window.to_string()
    }
}

impl fmt::Display for WorkingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

/// Check the current local time against `windows`.
#[must_use]
pub fn inside_working_hours(windows: &[WorkingWindow], time_delta: Duration) -> WindowStatus {
    inside_working_hours_at(windows, Local::now().time(), time_delta)
}

/// Check `time` against `windows` after shifting it back by `time_delta`.
///
/// No windows means no restriction.
#[must_use]
pub fn inside_working_hours_at(
    windows: &[WorkingWindow],
    time: NaiveTime,
    time_delta: Duration,
) -> WindowStatus {
    if windows.is_empty() {
        return WindowStatus::Inside;
    }

    let (shifted, _) = time.overflowing_sub_signed(time_delta);
    if windows.iter().any(|w| w.contains(shifted)) {
        return WindowStatus::Inside;
    }

    let seconds_until_next = windows
        .iter()
        .map(|w| w.seconds_until_start(shifted))
        .min()
        .unwrap_or(0);
    WindowStatus::Outside { seconds_until_next }
}
