//! Session state, limits and working hours.
//!
//! A session is one bounded run from device wake-up to sleep. Its
//! [`SessionState`] collects every counter the limit checks need and is
//! appended to the account's session history when the session ends.
//!
//! # Architecture
//!
//! ```text
//! SessionState
//!   ├── identity: id, start_time, finish_time
//!   ├── per-target maps: total_interactions, successful_interactions,
//!   │                    total_followed, total_scraped
//!   ├── scalar counters: likes, watched, comments, pm, unfollowed
//!   ├── limits: SessionLimits (drawn once per session)
//!   ├── crashes: total_crashes / max_allowed_crashes
//!   └── profile / profile_end: operator counters for drift reporting
//! ```
//!
//! # Persistence
//!
//! [`SessionHistory`] owns `sessions.json`, an append-only array written
//! atomically in full after every append.

pub mod limits;
pub mod persistence;
pub mod signals;
pub mod working_hours;

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::ProfileCounts;
use crate::storage::records::timestamp;
use crate::storage::{self, InteractionUpdate};

pub use limits::{is_reached, Limit, LimitCheck, SessionLimits};
pub use persistence::SessionHistory;
pub use signals::{Interrupts, ResumePrompt, SleepOutcome, StdinResume};
pub use working_hours::{inside_working_hours, inside_working_hours_at, WindowStatus, WorkingWindow};

/// Counters and limits of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub id: Uuid,
    #[serde(default)]
    pub total_interactions: BTreeMap<String, u32>,
    #[serde(default)]
    pub successful_interactions: BTreeMap<String, u32>,
    #[serde(default)]
    pub total_followed: BTreeMap<String, u32>,
    #[serde(default)]
    pub total_scraped: BTreeMap<String, u32>,
    #[serde(default)]
    pub total_likes: u32,
    #[serde(default)]
    pub total_watched: u32,
    #[serde(default)]
    pub total_comments: u32,
    #[serde(default)]
    pub total_pm: u32,
    #[serde(default)]
    pub total_unfollowed: u32,
    #[serde(default)]
    pub total_crashes: u32,
    #[serde(default)]
    pub max_allowed_crashes: u32,
    #[serde(default)]
    pub limits: SessionLimits,
    #[serde(with = "timestamp::required")]
    pub start_time: NaiveDateTime,
    #[serde(default, with = "timestamp")]
    pub finish_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub profile: Option<ProfileCounts>,
    #[serde(default)]
    pub profile_end: Option<ProfileCounts>,
    /// Jobs started in this session, in order
    #[serde(default)]
    pub jobs: Vec<String>,
    /// Why the session ended early, if it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

impl SessionState {
    /// Start a new session now.
    #[must_use]
    pub fn new(limits: SessionLimits, max_allowed_crashes: u32) -> Self {
        Self::starting_at(limits, max_allowed_crashes, storage::now())
    }

    #[must_use]
    pub fn starting_at(
        limits: SessionLimits,
        max_allowed_crashes: u32,
        start_time: NaiveDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            total_interactions: BTreeMap::new(),
            successful_interactions: BTreeMap::new(),
            total_followed: BTreeMap::new(),
            total_scraped: BTreeMap::new(),
            total_likes: 0,
            total_watched: 0,
            total_comments: 0,
            total_pm: 0,
            total_unfollowed: 0,
            total_crashes: 0,
            max_allowed_crashes,
            limits,
            start_time,
            finish_time: None,
            profile: None,
            profile_end: None,
            jobs: Vec::new(),
            stop_reason: None,
        }
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Count one unit of job work against `target`.
    ///
    /// Every visit from a growth job counts toward `total_interactions`,
    /// even when nothing was done; a pure unfollow only moves the unfollow
    /// counter.
    pub fn record_interaction(&mut self, target: &str, update: &InteractionUpdate) {
        if !is_unfollow_only(update) {
            bump(&mut self.total_interactions, target);
        }
        if update.is_successful() {
            bump(&mut self.successful_interactions, target);
        }

        self.total_likes = self.total_likes.saturating_add(update.liked);
        self.total_watched = self.total_watched.saturating_add(update.watched);
        self.total_comments = self.total_comments.saturating_add(update.commented);
        if update.pm_sent {
            self.total_pm = self.total_pm.saturating_add(1);
        }
        if update.followed {
            bump(&mut self.total_followed, target);
        }
        if update.unfollowed {
            self.total_unfollowed = self.total_unfollowed.saturating_add(1);
        }
        if update.scraped {
            bump(&mut self.total_scraped, target);
        }
    }

    /// Count one crash. Returns the new total.
    pub fn add_crash(&mut self) -> u32 {
        self.total_crashes = self.total_crashes.saturating_add(1);
        self.total_crashes
    }

    pub fn finish(&mut self) {
        self.finish_at(storage::now());
    }

    pub fn finish_at(&mut self, when: NaiveDateTime) {
        if self.finish_time.is_none() {
            self.finish_time = Some(when);
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finish_time.is_some()
    }

    /// Wall-clock duration, if finished.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finish_time.map(|end| end - self.start_time)
    }

    // ------------------------------------------------------------------------
    // Limit checks
    // ------------------------------------------------------------------------

    /// Current count for a category.
    #[must_use]
    pub fn count(&self, limit: Limit) -> u32 {
        match limit {
            Limit::Likes => self.total_likes,
            Limit::Watches => self.total_watched,
            Limit::Comments => self.total_comments,
            Limit::Follows => self.total_followed.values().sum(),
            Limit::Unfollows => self.total_unfollowed,
            Limit::Pm => self.total_pm,
            Limit::Success => self.successful_interactions.values().sum(),
            Limit::Total => self.total_interactions.values().sum(),
            Limit::Scraped => self.total_scraped.values().sum(),
            Limit::Crashes => self.total_crashes,
            Limit::All => 0,
        }
    }

    /// Whether the category's maximum has been reached.
    ///
    /// The crash ceiling is the number of tolerated crashes, so it is
    /// reached once `total_crashes` exceeds it. `Limit::All` is true when
    /// any category in [`SessionState::check_all`] is reached.
    #[must_use]
    pub fn check_limit(&self, limit: Limit) -> bool {
        match limit {
            Limit::Crashes => self.total_crashes > self.max_allowed_crashes,
            Limit::All => self.check_all().any(),
            other => is_reached(self.count(other), self.limits.get(other)),
        }
    }

    /// Check every category at once.
    #[must_use]
    pub fn check_all(&self) -> LimitCheck {
        LimitCheck {
            active_reached: Limit::ACTIVE.iter().any(|l| self.check_limit(*l)),
            unfollow_reached: self.check_limit(Limit::Unfollows),
            hard_stop_reached: Limit::HARD_STOP.iter().any(|l| self.check_limit(*l)),
        }
    }

    /// One-line "count/limit" summary for logs.
    #[must_use]
    pub fn limit_summary(&self) -> String {
        const SHOWN: [Limit; 9] = [
            Limit::Likes,
            Limit::Follows,
            Limit::Unfollows,
            Limit::Watches,
            Limit::Comments,
            Limit::Pm,
            Limit::Success,
            Limit::Total,
            Limit::Scraped,
        ];
        let mut parts: Vec<String> = SHOWN
            .iter()
            .map(|l| match self.limits.get(*l) {
                Some(max) => format!("{} {}/{}", l, self.count(*l), max),
                None => format!("{} {}", l, self.count(*l)),
            })
            .collect();
        parts.push(format!(
            "crashes {}/{}",
            self.total_crashes, self.max_allowed_crashes
        ));
        parts.join(", ")
    }
}

fn is_unfollow_only(update: &InteractionUpdate) -> bool {
    update.unfollowed
        && !update.followed
        && update.liked == 0
        && update.watched == 0
        && update.commented == 0
        && !update.scraped
        && !update.pm_sent
        && !update.welcomed
}

fn bump(counts: &mut BTreeMap<String, u32>, target: &str) {
    let count = counts.entry(target.to_string()).or_insert(0);
    *count = count.saturating_add(1);
}
