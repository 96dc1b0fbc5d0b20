//! Waits around sessions: the working-hours gate and the repeat interval.

use std::time::Duration;

use chrono::{Local, NaiveTime};
use indicatif::{ProgressBar, ProgressStyle};

use crate::session::{inside_working_hours_at, Interrupts, SleepOutcome, WorkingWindow};

/// Delay until the next session starts.
///
/// The drawn `repeat` interval is extended so the next session does not
/// wake up outside working hours.
#[must_use]
pub fn repeat_wait_at(
    windows: &[WorkingWindow],
    now: NaiveTime,
    time_delta: chrono::Duration,
    repeat: Duration,
) -> Duration {
    let repeat_secs = i64::try_from(repeat.as_secs()).unwrap_or(i64::MAX);
    let (wake, _) = now.overflowing_add_signed(chrono::Duration::seconds(repeat_secs));
    let extra = inside_working_hours_at(windows, wake, time_delta).wait_seconds();
    repeat + Duration::from_secs(extra)
}

/// `1h 05m 10s` style rendering.
#[must_use]
pub fn format_wait(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Sleep for `duration` with a spinner, returning early on an interrupt.
pub async fn wait_with_spinner(interrupts: &Interrupts, duration: Duration, message: &str) -> SleepOutcome {
    if duration.is_zero() {
        return interrupts.sleep(duration).await;
    }

    let resume_at = Local::now() + chrono::Duration::seconds(i64::try_from(duration.as_secs()).unwrap_or(0));
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]") {
        spinner.set_style(style);
    }
    spinner.set_message(format!(
        "{} ({}, until {})",
        message,
        format_wait(duration),
        resume_at.format("%H:%M:%S")
    ));
    spinner.enable_steady_tick(Duration::from_millis(250));

    let outcome = interrupts.sleep(duration).await;
    spinner.finish_and_clear();
    outcome
}
