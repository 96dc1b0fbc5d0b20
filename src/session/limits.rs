//! Per-session limit categories.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Named limit categories a session can be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Limit {
    Likes,
    Watches,
    Comments,
    Follows,
    Unfollows,
    Pm,
    /// Successful interactions across all targets
    Success,
    /// All interactions across all targets
    Total,
    Scraped,
    Crashes,
    /// Every category at once
    All,
}

impl Limit {
    /// Categories that cap growth jobs.
    pub const ACTIVE: [Limit; 5] = [
        Limit::Likes,
        Limit::Follows,
        Limit::Watches,
        Limit::Comments,
        Limit::Pm,
    ];

    /// Categories that end the session outright.
    pub const HARD_STOP: [Limit; 3] = [Limit::Success, Limit::Total, Limit::Scraped];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Likes => "likes",
            Self::Watches => "watches",
            Self::Comments => "comments",
            Self::Follows => "follows",
            Self::Unfollows => "unfollows",
            Self::Pm => "pm",
            Self::Success => "success",
            Self::Total => "total",
            Self::Scraped => "scraped",
            Self::Crashes => "crashes",
            Self::All => "all",
        }
    }
}

impl std::fmt::Display for Limit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete limits chosen for one session. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLimits {
    #[serde(default)]
    pub likes: Option<u32>,
    #[serde(default)]
    pub watches: Option<u32>,
    #[serde(default)]
    pub comments: Option<u32>,
    #[serde(default)]
    pub follows: Option<u32>,
    #[serde(default)]
    pub unfollows: Option<u32>,
    #[serde(default)]
    pub pm: Option<u32>,
    #[serde(default)]
    pub success: Option<u32>,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub scraped: Option<u32>,
}

impl SessionLimits {
    /// No limits at all.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, limit: Limit, value: u32) -> Self {
        if let Some(slot) = self.slot_mut(limit) {
            *slot = Some(value);
        }
        self
    }

    /// The configured maximum for a countable category.
    #[must_use]
    pub fn get(&self, limit: Limit) -> Option<u32> {
        match limit {
            Limit::Likes => self.likes,
            Limit::Watches => self.watches,
            Limit::Comments => self.comments,
            Limit::Follows => self.follows,
            Limit::Unfollows => self.unfollows,
            Limit::Pm => self.pm,
            Limit::Success => self.success,
            Limit::Total => self.total,
            Limit::Scraped => self.scraped,
            Limit::Crashes | Limit::All => None,
        }
    }

    fn slot_mut(&mut self, limit: Limit) -> Option<&mut Option<u32>> {
        match limit {
            Limit::Likes => Some(&mut self.likes),
            Limit::Watches => Some(&mut self.watches),
            Limit::Comments => Some(&mut self.comments),
            Limit::Follows => Some(&mut self.follows),
            Limit::Unfollows => Some(&mut self.unfollows),
            Limit::Pm => Some(&mut self.pm),
            Limit::Success => Some(&mut self.success),
            Limit::Total => Some(&mut self.total),
            Limit::Scraped => Some(&mut self.scraped),
            Limit::Crashes | Limit::All => None,
        }
    }
}

/// Result of checking every category at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimitCheck {
    /// Some growth category (likes, follows, watches, comments, pm) is used up
    pub active_reached: bool,
    /// The unfollow limit is used up
    pub unfollow_reached: bool,
    /// Success, total or scraped is used up; the session must end
    pub hard_stop_reached: bool,
}

impl LimitCheck {
    #[must_use]
    pub fn any(&self) -> bool {
        self.active_reached || self.unfollow_reached || self.hard_stop_reached
    }
}

/// `count` has reached `limit`; an absent limit is never reached.
#[must_use]
pub fn is_reached(count: u32, limit: Option<u32>) -> bool {
    limit.is_some_and(|max| count >= max)
}
