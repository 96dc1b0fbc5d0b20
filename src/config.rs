//! Campaign configuration.
//!
//! One TOML file per account (`accounts/<username>/config.toml`) describes
//! the device, the working hours, the per-session limits and the ordered job
//! list. Numeric settings that should vary between sessions accept a range
//! such as `"100-150"`; a new value is drawn for every session.
//!
//! # Example TOML
//!
//! ```toml
//! username = "alice"
//! app_id = "com.instagram.android"
//! working_hours = ["10.15-16.40", "18.15-22.46"]
//! time_delta = "10-15"
//! repeat = "180-240"
//! total_sessions = -1
//!
//! [limits]
//! likes = "100-150"
//! total = "150-200"
//!
//! [interaction]
//! reinteract_after_hours = 72
//!
//! [[jobs]]
//! name = "blogger-followers"
//! kind = "active"
//! target = "somebody"
//! command = ["python3", "driver.py", "blogger-followers"]
//! ```

pub mod validation;

pub use validation::ValidationReport;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Duration;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::error::{CadenceError, Result};
use crate::jobs::JobKind;
use crate::session::{Limit, SessionLimits, WorkingWindow};

// ============================================================================
// Ranges
// ============================================================================

/// An inclusive integer range written as `"a-b"` or a bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RangeRepr", into = "String")]
pub struct ValueRange {
    min: u32,
    max: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RangeRepr {
    Number(u32),
    Text(String),
}

impl ValueRange {
    #[must_use]
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn fixed(value: u32) -> Self {
        Self::new(value, value)
    }

    #[must_use]
    pub fn min(&self) -> u32 {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }

    #[must_use]
    pub fn is_inverted(&self) -> bool {
        self.min > self.max
    }

    /// Draw a value uniformly from the range. Inverted bounds are swapped.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        let (lo, hi) = if self.is_inverted() {
            (self.max, self.min)
        } else {
            (self.min, self.max)
        };
        if lo == hi {
            lo
        } else {
            rng.gen_range(lo..=hi)
        }
    }
}

impl FromStr for ValueRange {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| format!("'{s}' is not a number or a range like 10-20"))
        };
        match s.split_once('-') {
            Some((lo, hi)) => Ok(Self::new(parse(lo)?, parse(hi)?)),
            None => parse(s).map(Self::fixed),
        }
    }
}

impl TryFrom<RangeRepr> for ValueRange {
    type Error = String;

    fn try_from(value: RangeRepr) -> std::result::Result<Self, Self::Error> {
        match value {
            RangeRepr::Number(n) => Ok(Self::fixed(n)),
            RangeRepr::Text(s) => s.parse(),
        }
    }
}

impl From<ValueRange> for String {
    fn from(range: ValueRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Per-session limit ranges. Absent means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    #[serde(default)]
    pub likes: Option<ValueRange>,
    #[serde(default)]
    pub watches: Option<ValueRange>,
    #[serde(default)]
    pub comments: Option<ValueRange>,
    #[serde(default)]
    pub follows: Option<ValueRange>,
    #[serde(default)]
    pub unfollows: Option<ValueRange>,
    #[serde(default)]
    pub pm: Option<ValueRange>,
    #[serde(default)]
    pub success: Option<ValueRange>,
    #[serde(default)]
    pub total: Option<ValueRange>,
    #[serde(default)]
    pub scraped: Option<ValueRange>,
}

impl LimitsConfig {
    /// Every configured range paired with its category.
    #[must_use]
    pub fn entries(&self) -> Vec<(Limit, ValueRange)> {
        [
            (Limit::Likes, self.likes),
            (Limit::Watches, self.watches),
            (Limit::Comments, self.comments),
            (Limit::Follows, self.follows),
            (Limit::Unfollows, self.unfollows),
            (Limit::Pm, self.pm),
            (Limit::Success, self.success),
            (Limit::Total, self.total),
            (Limit::Scraped, self.scraped),
        ]
        .into_iter()
        .filter_map(|(limit, range)| range.map(|r| (limit, r)))
        .collect()
    }

    /// Draw concrete limits for one session.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> SessionLimits {
        self.entries()
            .into_iter()
            .fold(SessionLimits::unlimited(), |limits, (limit, range)| {
                limits.with(limit, range.draw(rng))
            })
    }
}

/// Re-interaction thresholds. Absent means "never".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InteractionConfig {
    #[serde(default)]
    pub reinteract_after_hours: Option<f64>,
    #[serde(default)]
    pub unfollow_after_days: Option<f64>,
    #[serde(default)]
    pub recheck_after_hours: Option<f64>,
}

/// How to reach the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// `adb` executable name or path
    #[serde(default = "default_adb")]
    pub adb: String,
    /// Driver command printing the operator profile as JSON
    #[serde(default)]
    pub profile_command: Vec<String>,
    /// Driver command that navigates to the operator profile
    #[serde(default)]
    pub navigate_command: Vec<String>,
    /// Timeout for a single device or driver call
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_adb() -> String {
    "adb".to_string()
}

fn default_command_timeout() -> u64 {
    120
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb: default_adb(),
            profile_command: Vec::new(),
            navigate_command: Vec::new(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

/// One entry of the ordered job list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    pub name: String,
    #[serde(default)]
    pub kind: JobKind,
    /// Source the job works on (a blogger, a hashtag, a list file)
    #[serde(default)]
    pub target: Option<String>,
    /// External command run once per unit of work
    #[serde(default)]
    pub command: Vec<String>,
}

impl JobConfig {
    /// Target label used for per-target session counters.
    #[must_use]
    pub fn target_label(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.name)
    }
}

// ============================================================================
// Campaign configuration
// ============================================================================

/// Complete configuration of one account's campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CampaignConfig {
    pub username: String,
    #[serde(default = "default_app_id")]
    pub app_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub working_hours: Vec<WorkingWindow>,
    /// Minutes of per-session jitter applied to working hours
    #[serde(default)]
    pub time_delta: Option<ValueRange>,
    /// Minutes to sleep between sessions; absent runs a single session
    #[serde(default)]
    pub repeat: Option<ValueRange>,
    /// Number of sessions to run; absent or -1 is unlimited
    #[serde(default)]
    pub total_sessions: Option<i64>,
    #[serde(default)]
    pub shuffle_jobs: bool,
    /// Tally app crashes toward the crash counter
    #[serde(default)]
    pub count_app_crashes: bool,
    /// Crashes tolerated per session before it is stopped
    #[serde(default = "default_max_crashes")]
    pub max_crashes: u32,
    /// Seconds to wait between closing and reopening the app
    #[serde(default = "default_restart_wait")]
    pub restart_wait: ValueRange,
    /// Attempts to open the app at session start
    #[serde(default = "default_open_attempts")]
    pub open_attempts: u32,
    /// Turn the screen off after each session
    #[serde(default = "default_true")]
    pub screen_sleep: bool,
    #[serde(default)]
    pub pre_script: Option<PathBuf>,
    #[serde(default)]
    pub post_script: Option<PathBuf>,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub interaction: InteractionConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

fn default_app_id() -> String {
    "com.instagram.android".to_string()
}

fn default_max_crashes() -> u32 {
    5
}

fn default_restart_wait() -> ValueRange {
    ValueRange::new(3, 8)
}

fn default_open_attempts() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

impl CampaignConfig {
    /// Minimal configuration for `username` with no jobs.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            app_id: default_app_id(),
            device_id: None,
            working_hours: Vec::new(),
            time_delta: None,
            repeat: None,
            total_sessions: None,
            shuffle_jobs: false,
            count_app_crashes: false,
            max_crashes: default_max_crashes(),
            restart_wait: default_restart_wait(),
            open_attempts: default_open_attempts(),
            screen_sleep: true,
            pre_script: None,
            post_script: None,
            limits: LimitsConfig::default(),
            interaction: InteractionConfig::default(),
            device: DeviceConfig::default(),
            jobs: Vec::new(),
        }
    }

    /// Load a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::MissingFile`] if the file does not exist and
    /// [`CadenceError::Config`] if it cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CadenceError::MissingFile {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&content)
            .map_err(|e| CadenceError::config_with_path(e.to_string(), path.to_path_buf()))
    }

    /// Parse a configuration from TOML content.
    ///
    /// # Example
    ///
    /// ```
    /// use cadence::config::CampaignConfig;
    ///
    /// let config = CampaignConfig::parse(r#"
    /// username = "alice"
    /// repeat = "180-240"
    ///
    /// [limits]
    /// likes = 100
    /// "#).unwrap();
    /// assert_eq!(config.username, "alice");
    /// assert!(config.limits.likes.is_some());
    /// ```
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CadenceError::config(e.to_string()))
    }

    /// Handle on this configuration's account directory.
    #[must_use]
    pub fn account(&self, accounts_root: impl AsRef<Path>) -> Account {
        Account::new(accounts_root, &self.username)
    }

    /// Session budget; `None` is unlimited.
    #[must_use]
    pub fn session_budget(&self) -> Option<u32> {
        match self.total_sessions {
            Some(n) if n >= 0 => Some(u32::try_from(n).unwrap_or(u32::MAX)),
            _ => None,
        }
    }

    /// Whether another session may start after `sessions_done` sessions.
    #[must_use]
    pub fn can_repeat(&self, sessions_done: u32) -> bool {
        self.repeat.is_some() && self.session_budget().map_or(true, |max| sessions_done < max)
    }

    /// Draw this session's working-hours jitter.
    ///
    /// The magnitude comes from `time_delta` (minutes) plus up to 59
    /// seconds; the sign is random, so windows move either way.
    pub fn draw_time_delta<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let Some(range) = self.time_delta else {
            return Duration::zero();
        };
        let minutes = i64::from(range.draw(rng));
        let seconds = minutes * 60 + rng.gen_range(0..60);
        if rng.gen_bool(0.5) {
            Duration::seconds(seconds)
        } else {
            Duration::seconds(-seconds)
        }
    }

    /// Draw the sleep between two sessions.
    pub fn draw_repeat<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<std::time::Duration> {
        self.repeat
            .map(|range| std::time::Duration::from_secs(u64::from(range.draw(rng)) * 60))
    }

    /// Draw the wait before reopening the app after a crash.
    pub fn draw_restart_wait<R: Rng + ?Sized>(&self, rng: &mut R) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.restart_wait.draw(rng)))
    }

    /// Validate the configuration.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        validation::validate(self)
    }
}
