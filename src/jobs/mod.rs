//! Jobs: the units of work a session runs in order.
//!
//! The core does not know what a job does. It only knows that a job runs
//! against a [`JobContext`], asks before each action whether a limit still
//! allows it and reports what it did.
//!
//! # Architecture
//!
//! ```text
//! JobRegistry (config order, optionally shuffled per session)
//!   └── Arc<dyn Job>
//!         └── run(&mut JobContext)
//!               ├── checkpoint()   honors Ctrl-C between units of work
//!               ├── can_act(limit) check-then-act against SessionState
//!               └── record(update) InteractionStore + SessionState counters
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use cadence::jobs::{Job, JobContext, JobKind};
//!
//! struct LikeFeed;
//!
//! #[async_trait]
//! impl Job for LikeFeed {
//!     fn name(&self) -> &str { "like-feed" }
//!     fn kind(&self) -> JobKind { JobKind::Active }
//!
//!     async fn run(&self, ctx: &mut JobContext<'_>) -> DeviceResult<()> {
//!         while ctx.can_act(Limit::Likes) {
//!             ctx.checkpoint()?;
//!             ctx.record(InteractionUpdate::new("bob").with_likes(1))?;
//!         }
//!         Ok(())
//!     }
//! }
//! ```

pub mod command;
pub mod registry;

pub use command::CommandJob;
pub use registry::JobRegistry;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::account::Account;
use crate::config::CampaignConfig;
use crate::device::{Device, DeviceError, DeviceResult};
use crate::session::{Interrupts, Limit, SessionState};
use crate::storage::{self, FollowingStatus, InteractionStore, InteractionUpdate, ProfileSnapshot, SkipUpdate};

/// Which limits gate a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Growth work (likes, follows, watches, comments, messages)
    #[default]
    Active,
    /// Removes follows; only the unfollow limit applies
    Unfollow,
}

impl JobKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Unfollow => "unfollow",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a candidate user should be worked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    Eligible,
    /// On the whitelist or blacklist
    Listed,
    /// Interacted too recently
    TooRecent,
    /// Skipped by the filter and not due for a recheck
    AlreadyFiltered,
    /// Unfollow candidate the operator does not follow
    NotFollowing,
}

impl Eligibility {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eligible => "eligible",
            Self::Listed => "listed",
            Self::TooRecent => "too_recent",
            Self::AlreadyFiltered => "already_filtered",
            Self::NotFollowing => "not_following",
        }
    }
}

impl fmt::Display for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of session work.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> JobKind;

    /// Source label for per-target counters. Defaults to the job name.
    fn target(&self) -> &str {
        self.name()
    }

    /// Run until the job is exhausted or a limit blocks further work.
    ///
    /// Errors carry their failure class; the supervisor decides whether the
    /// job is re-run.
    async fn run(&self, ctx: &mut JobContext<'_>) -> DeviceResult<()>;
}

/// Everything a running job may read or change.
pub struct JobContext<'a> {
    pub device: &'a dyn Device,
    pub config: &'a CampaignConfig,
    pub account: &'a Account,
    pub store: &'a mut InteractionStore,
    pub session: &'a mut SessionState,
    /// Finished sessions, oldest first
    pub history: &'a [SessionState],
    pub interrupts: &'a Interrupts,
    job_name: String,
    target: String,
}

impl<'a> JobContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &'a dyn Device,
        config: &'a CampaignConfig,
        account: &'a Account,
        store: &'a mut InteractionStore,
        session: &'a mut SessionState,
        history: &'a [SessionState],
        interrupts: &'a Interrupts,
    ) -> Self {
        Self {
            device,
            config,
            account,
            store,
            session,
            history,
            interrupts,
            job_name: String::new(),
            target: String::new(),
        }
    }

    /// Point the context at the job about to run.
    pub fn enter(&mut self, job: &dyn Job) {
        self.job_name = job.name().to_string();
        self.target = job.target().to_string();
    }

    #[must_use]
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Return [`DeviceError::Interrupted`] if Ctrl-C arrived since the last
    /// acknowledged interrupt.
    pub fn checkpoint(&self) -> DeviceResult<()> {
        if self.interrupts.is_requested() {
            debug!(job = %self.job_name, "Interrupt observed at checkpoint");
            return Err(DeviceError::Interrupted);
        }
        Ok(())
    }

    /// Whether one more action of `limit`'s category is allowed.
    ///
    /// A reached hard-stop limit blocks everything.
    #[must_use]
    pub fn can_act(&self, limit: Limit) -> bool {
        !self.session.check_limit(limit) && !self.session.check_all().hard_stop_reached
    }

    /// Whether the job as a whole may keep working.
    #[must_use]
    pub fn can_continue(&self, kind: JobKind) -> bool {
        let check = self.session.check_all();
        if check.hard_stop_reached {
            return false;
        }
        match kind {
            JobKind::Active => !check.active_reached,
            JobKind::Unfollow => !check.unfollow_reached,
        }
    }

    /// Whether `username` may be interacted with again.
    ///
    /// Whitelisted and blacklisted users are never eligible for growth work.
    #[must_use]
    pub fn can_reinteract(&self, username: &str) -> bool {
        if self.store.in_blacklist(username) || self.store.in_whitelist(username) {
            return false;
        }
        storage::can_reinteract(
            self.store.last_interaction(username),
            self.config.interaction.reinteract_after_hours,
        )
    }

    /// Whether `username` may be unfollowed. Whitelisted users never are.
    #[must_use]
    pub fn can_unfollow(&self, username: &str) -> bool {
        if self.store.in_whitelist(username) {
            return false;
        }
        storage::can_unfollow(
            self.store.last_interaction(username),
            self.config.interaction.unfollow_after_days,
        )
    }

    /// Whether the profile of `username` is due for another filter pass.
    ///
    /// The last evaluation is the later of the filter time and the last
    /// check recorded with an interaction.
    #[must_use]
    pub fn can_recheck(&self, username: &str) -> bool {
        let last = self
            .store
            .last_filtered(username)
            .max(self.store.was_checked(username));
        storage::can_recheck(last, self.config.interaction.recheck_after_hours)
    }

    /// Decide whether a job of `kind` should work on `username`.
    #[must_use]
    pub fn eligibility(&self, kind: JobKind, username: &str) -> Eligibility {
        match kind {
            JobKind::Active => {
                if self.store.in_blacklist(username) || self.store.in_whitelist(username) {
                    Eligibility::Listed
                } else if self.store.last_interaction(username).is_some()
                    && !self.can_reinteract(username)
                {
                    Eligibility::TooRecent
                } else if self
                    .store
                    .filter_record(username)
                    .is_some_and(|f| f.skip_reason.is_some())
                    && !self.can_recheck(username)
                {
                    Eligibility::AlreadyFiltered
                } else {
                    Eligibility::Eligible
                }
            }
            JobKind::Unfollow => {
                if self.store.in_whitelist(username) {
                    Eligibility::Listed
                } else if !matches!(
                    self.store.get_following_status(username),
                    FollowingStatus::Followed | FollowingStatus::Requested
                ) {
                    Eligibility::NotFollowing
                } else if !self.can_unfollow(username) {
                    Eligibility::TooRecent
                } else {
                    Eligibility::Eligible
                }
            }
        }
    }

    /// Store the filter verdict for a profile the job evaluated.
    ///
    /// # Errors
    ///
    /// A store write failure is returned as a fatal [`DeviceError::Other`].
    pub fn record_filter(
        &mut self,
        username: &str,
        snapshot: ProfileSnapshot,
        skip: SkipUpdate,
    ) -> DeviceResult<()> {
        self.store.record_filter(username, snapshot, skip).map_err(|e| {
            warn!("Failed to persist filter result for {}: {}", username, e);
            DeviceError::other(format!("store write failed: {e}"))
        })
    }

    /// Record one unit of work in the store and the session counters.
    ///
    /// Provenance (session, job, target) is filled in when the update does
    /// not carry it. Returns whether the store was changed.
    ///
    /// # Errors
    ///
    /// A store write failure is returned as a fatal [`DeviceError::Other`].
    pub fn record(&mut self, mut update: InteractionUpdate) -> DeviceResult<bool> {
        if update.session_id.is_none() {
            update.session_id = Some(self.session.id.to_string());
        }
        if update.job_name.is_none() {
            update.job_name = Some(self.job_name.clone());
        }
        if update.target.is_none() {
            update.target = Some(self.target.clone());
        }

        let written = self.store.record_interaction(&update).map_err(|e| {
            warn!("Failed to persist interaction with {}: {}", update.username, e);
            DeviceError::other(format!("store write failed: {e}"))
        })?;
        let target = self.target.clone();
        self.session.record_interaction(&target, &update);
        Ok(written)
    }
}
