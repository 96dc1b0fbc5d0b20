//! Durable per-account interaction store.
//!
//! The store remembers every user the operator has interacted with
//! (`interacted_users.json`) and every profile a job evaluated
//! (`history_filters_users.json`). Jobs consult it to avoid repeating work
//! and to decide when a user becomes eligible again.
//!
//! Both maps are rewritten in full through [`AtomicFile`] after every
//! mutation, so a crash at any point leaves either the previous or the new
//! version on disk.
//!
//! # Example
//!
//! ```rust,ignore
//! use cadence::storage::{InteractionStore, InteractionUpdate};
//!
//! let mut store = InteractionStore::load(&account)?;
//! store.record_interaction(
//!     &InteractionUpdate::new("bob")
//!         .with_likes(2)
//!         .with_job("blogger-followers", "somebody")
//!         .with_session(session_id),
//! )?;
//! assert_eq!(store.get_following_status("bob"), FollowingStatus::None);
//! ```

pub mod atomic;
pub mod lists;
pub mod records;

use std::collections::{BTreeMap, HashSet};

use chrono::{Duration, Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::account::Account;
use crate::error::Result;

pub use atomic::{AtomicFile, StagedWrite};
pub use records::{
    FilterRecord, FollowButtonText, FollowingStatus, InteractionRecord, ProfileSnapshot,
    SkipReason, SkipUpdate, TIMESTAMP_FORMAT,
};

/// Current local wall-clock time, the clock every store timestamp uses.
///
/// Truncated to microseconds, the precision of the on-disk format.
#[must_use]
pub fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(6)
}

// ============================================================================
// Interaction update
// ============================================================================

/// One interaction to merge into the store.
///
/// Also the JSON shape external job commands print for each unit of work,
/// so every field has a serde default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionUpdate {
    pub username: String,
    #[serde(default)]
    pub liked: u32,
    #[serde(default)]
    pub watched: u32,
    #[serde(default)]
    pub commented: u32,
    #[serde(default)]
    pub followed: bool,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub unfollowed: bool,
    #[serde(default)]
    pub scraped: bool,
    #[serde(default)]
    pub pm_sent: bool,
    #[serde(default)]
    pub welcomed: bool,
    #[serde(default = "default_true")]
    pub exists: bool,
    /// Stamp `last_check` with the write time.
    #[serde(default)]
    pub checked: bool,
    /// When false only provenance, `exists` and `welcomed` are written.
    #[serde(default = "default_true")]
    pub update_status: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
}

fn default_true() -> bool {
    true
}

impl InteractionUpdate {
    /// Creates an update for `username` that changes nothing yet.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            liked: 0,
            watched: 0,
            commented: 0,
            followed: false,
            is_private: false,
            unfollowed: false,
            scraped: false,
            pm_sent: false,
            welcomed: false,
            exists: true,
            checked: false,
            update_status: true,
            session_id: None,
            job_name: None,
            target: None,
        }
    }

    #[must_use]
    pub fn with_likes(mut self, count: u32) -> Self {
        self.liked = count;
        self
    }

    #[must_use]
    pub fn with_watches(mut self, count: u32) -> Self {
        self.watched = count;
        self
    }

    #[must_use]
    pub fn with_comments(mut self, count: u32) -> Self {
        self.commented = count;
        self
    }

    /// Mark a follow. Private accounts resolve to a pending request.
    #[must_use]
    pub fn with_follow(mut self, is_private: bool) -> Self {
        self.followed = true;
        self.is_private = is_private;
        self
    }

    #[must_use]
    pub fn with_unfollow(mut self) -> Self {
        self.unfollowed = true;
        self
    }

    #[must_use]
    pub fn with_scrape(mut self) -> Self {
        self.scraped = true;
        self
    }

    #[must_use]
    pub fn with_pm(mut self) -> Self {
        self.pm_sent = true;
        self
    }

    #[must_use]
    pub fn with_welcome(mut self) -> Self {
        self.welcomed = true;
        self
    }

    #[must_use]
    pub fn with_check(mut self) -> Self {
        self.checked = true;
        self
    }

    #[must_use]
    pub fn with_job(mut self, job_name: impl Into<String>, target: impl Into<String>) -> Self {
        self.job_name = Some(job_name.into());
        self.target = Some(target.into());
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// The user no longer exists on the target.
    #[must_use]
    pub fn not_existing(mut self) -> Self {
        self.exists = false;
        self
    }

    /// Only refresh provenance; leave counts, flags and status alone.
    #[must_use]
    pub fn without_status_update(mut self) -> Self {
        self.update_status = false;
        self
    }

    /// True if no interaction flag or count is set.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.liked == 0
            && self.watched == 0
            && self.commented == 0
            && !self.followed
            && !self.unfollowed
            && !self.scraped
            && !self.pm_sent
            && !self.welcomed
    }

    /// True if the update counts as a successful interaction for the session.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.liked > 0
            || self.watched > 0
            || self.commented > 0
            || self.followed
            || self.pm_sent
    }
}

// ============================================================================
// Eligibility
// ============================================================================

fn hours(value: f64) -> Duration {
    Duration::milliseconds((value * 3_600_000.0) as i64)
}

fn elapsed_at_least(last: Option<NaiveDateTime>, threshold: Duration, now: NaiveDateTime) -> bool {
    match last {
        None => true,
        Some(_) if threshold <= Duration::zero() => true,
        Some(ts) => now - ts >= threshold,
    }
}

/// Whether a user last interacted at `last` may be interacted again.
///
/// `None` hours means never; zero hours means always.
#[must_use]
pub fn can_reinteract(last: Option<NaiveDateTime>, after_hours: Option<f64>) -> bool {
    can_reinteract_at(last, after_hours, now())
}

#[must_use]
pub fn can_reinteract_at(
    last: Option<NaiveDateTime>,
    after_hours: Option<f64>,
    now: NaiveDateTime,
) -> bool {
    after_hours.is_some_and(|h| elapsed_at_least(last, hours(h), now))
}

/// Whether a followed user may be unfollowed `after_days` after the last interaction.
#[must_use]
pub fn can_unfollow(last: Option<NaiveDateTime>, after_days: Option<f64>) -> bool {
    can_unfollow_at(last, after_days, now())
}

#[must_use]
pub fn can_unfollow_at(
    last: Option<NaiveDateTime>,
    after_days: Option<f64>,
    now: NaiveDateTime,
) -> bool {
    after_days.is_some_and(|d| elapsed_at_least(last, hours(d * 24.0), now))
}

/// Whether a profile evaluated at `last_filtered` may be evaluated again.
#[must_use]
pub fn can_recheck(last_filtered: Option<NaiveDateTime>, after_hours: Option<f64>) -> bool {
    can_recheck_at(last_filtered, after_hours, now())
}

#[must_use]
pub fn can_recheck_at(
    last_filtered: Option<NaiveDateTime>,
    after_hours: Option<f64>,
    now: NaiveDateTime,
) -> bool {
    after_hours.is_some_and(|h| elapsed_at_least(last_filtered, hours(h), now))
}

// ============================================================================
// Store
// ============================================================================

/// Outcome of [`InteractionStore::clean`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub kept: usize,
    pub dropped: usize,
    /// Dropped records that had no filter history at all
    pub not_in_history: usize,
    /// Records without interaction kept because the filter accepted them
    pub probably_interacted: usize,
}

/// Record counts by following status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub welcomed: usize,
    pub last_day: usize,
    pub filtered: usize,
    pub skipped: usize,
}

/// Durable interaction and filter history for one account.
#[derive(Debug)]
pub struct InteractionStore {
    interacted: BTreeMap<String, InteractionRecord>,
    filters: BTreeMap<String, FilterRecord>,
    whitelist: HashSet<String>,
    blacklist: HashSet<String>,
    interacted_file: AtomicFile,
    filters_file: AtomicFile,
}

impl InteractionStore {
    /// Load the store for `account` and clean it.
    ///
    /// Absent files are empty maps. A file that does not parse aborts the
    /// load with [`crate::CadenceError::StoreCorrupted`].
    pub fn load(account: &Account) -> Result<Self> {
        let interacted_file = AtomicFile::new(account.interacted_users_path());
        let filters_file = AtomicFile::new(account.history_filters_path());

        let interacted = interacted_file.read_json()?.unwrap_or_default();
        let filters = filters_file.read_json()?.unwrap_or_default();
        let whitelist = lists::load_username_list(&account.whitelist_path())?;
        let blacklist = lists::load_username_list(&account.blacklist_path())?;

        let mut store = Self {
            interacted,
            filters,
            whitelist,
            blacklist,
            interacted_file,
            filters_file,
        };
        store.clean();

        debug!(
            account = account.username(),
            "Loaded {} interacted users, {} filtered profiles",
            store.interacted.len(),
            store.filters.len()
        );
        Ok(store)
    }

    /// Reconcile records that carry no interaction against the filter history.
    ///
    /// A record with no interaction is dropped unless the filter history has
    /// an entry for that user with a null skip reason. In that case the
    /// filter accepted the user, so an interaction was probably cut short by
    /// a crash and the record is kept as evidence. Cleaning only changes the
    /// in-memory map; the next mutation persists it.
    pub fn clean(&mut self) -> CleanReport {
        let before = self.interacted.len();
        let filters = &self.filters;
        let mut report = CleanReport::default();

        self.interacted.retain(|user, record| {
            if record.has_interaction() {
                report.kept += 1;
                return true;
            }
            match filters.get(user) {
                None => {
                    report.not_in_history += 1;
                    report.dropped += 1;
                    false
                }
                Some(filter) if filter.skip_reason.is_none() => {
                    debug!("{} was probably interacted", user);
                    report.probably_interacted += 1;
                    report.kept += 1;
                    true
                }
                Some(filter) => {
                    debug!(
                        "{} dropped, skipped because {}",
                        user,
                        filter
                            .skip_reason
                            .as_ref()
                            .map_or("unknown", SkipReason::as_str)
                    );
                    report.dropped += 1;
                    false
                }
            }
        });

        if report.dropped > 0 {
            info!(
                "Interaction data cleaned {} -> {} ({} were also not in history)",
                before,
                self.interacted.len(),
                report.not_in_history
            );
        }
        if report.probably_interacted > 0 {
            info!(
                "{} users were probably interacted (a previous run may have crashed)",
                report.probably_interacted
            );
        }
        report
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Merge an interaction into the store and persist it.
    ///
    /// Returns `Ok(false)` without touching anything when the update carries
    /// no interaction.
    pub fn record_interaction(&mut self, update: &InteractionUpdate) -> Result<bool> {
        self.record_interaction_at(update, now())
    }

    pub fn record_interaction_at(
        &mut self,
        update: &InteractionUpdate,
        now: NaiveDateTime,
    ) -> Result<bool> {
        if update.is_noop() {
            debug!("No interaction for {}, store untouched", update.username);
            return Ok(false);
        }

        let record = self
            .interacted
            .entry(update.username.clone())
            .or_default();

        record.exists = update.exists;
        if update.welcomed {
            record.welcomed = true;
        }
        record.last_interaction = Some(now);
        record.session_id.clone_from(&update.session_id);
        if record.job_name.as_deref().map_or(true, str::is_empty) {
            record.job_name.clone_from(&update.job_name);
        }
        if record.target.as_deref().map_or(true, str::is_empty) {
            record.target.clone_from(&update.target);
        }
        if update.checked {
            record.last_check = Some(now);
        }

        if update.update_status {
            record.following_status = FollowingStatus::from_flags(
                update.followed,
                update.unfollowed,
                update.scraped,
                update.is_private,
            );

            record.liked = record.liked.saturating_add(update.liked);
            record.watched = record.watched.saturating_add(update.watched);
            record.commented = record.commented.saturating_add(update.commented);

            // Flags describe the latest interaction, not the whole history.
            record.followed = update.followed;
            record.unfollowed = update.unfollowed;
            record.scraped = update.scraped;
            record.pm_sent = update.pm_sent;
        }

        debug!("{} added to interacted users", update.username);
        self.interacted_file.write_json(&self.interacted)?;
        Ok(true)
    }

    /// Store a profile snapshot taken while filtering `username`.
    pub fn record_filter(
        &mut self,
        username: &str,
        snapshot: ProfileSnapshot,
        skip: SkipUpdate,
    ) -> Result<()> {
        self.record_filter_at(username, snapshot, skip, now())
    }

    pub fn record_filter_at(
        &mut self,
        username: &str,
        mut snapshot: ProfileSnapshot,
        skip: SkipUpdate,
        now: NaiveDateTime,
    ) -> Result<()> {
        if snapshot.is_restricted {
            snapshot.follow_button_text = None;
        }

        let skip_reason = match skip {
            SkipUpdate::Clear => None,
            SkipUpdate::Set(reason) => Some(reason),
            SkipUpdate::Preserve => self
                .filters
                .get(username)
                .and_then(|previous| previous.skip_reason.clone()),
        };

        self.filters.insert(
            username.to_string(),
            FilterRecord {
                profile: snapshot,
                skip_reason,
                checked_at: Some(now),
            },
        );
        self.filters_file.write_json(&self.filters)
    }

    /// Remove `usernames` from the interaction map. Returns how many existed.
    pub fn forget<S: AsRef<str>>(&mut self, usernames: &[S]) -> Result<usize> {
        let removed = usernames
            .iter()
            .filter(|u| self.interacted.remove(u.as_ref()).is_some())
            .count();
        if removed > 0 {
            self.interacted_file.write_json(&self.interacted)?;
            info!("Removed {} users from interaction history", removed);
        } else {
            warn!("None of the {} given users were in the store", usernames.len());
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn record(&self, username: &str) -> Option<&InteractionRecord> {
        self.interacted.get(username)
    }

    #[must_use]
    pub fn filter_record(&self, username: &str) -> Option<&FilterRecord> {
        self.filters.get(username)
    }

    /// Relationship with `username`; `NotInList` when there is no record.
    #[must_use]
    pub fn get_following_status(&self, username: &str) -> FollowingStatus {
        match self.interacted.get(username) {
            None => FollowingStatus::NotInList,
            // Data written before statuses were stored only has the flag.
            Some(record) if record.following_status == FollowingStatus::None && record.followed => {
                FollowingStatus::Followed
            }
            Some(record) => record.following_status,
        }
    }

    #[must_use]
    pub fn was_welcomed(&self, username: &str) -> bool {
        self.interacted.get(username).is_some_and(|r| r.welcomed)
    }

    /// When `username` was last checked, if ever.
    #[must_use]
    pub fn was_checked(&self, username: &str) -> Option<NaiveDateTime> {
        self.interacted.get(username).and_then(|r| r.last_check)
    }

    #[must_use]
    pub fn last_interaction(&self, username: &str) -> Option<NaiveDateTime> {
        self.interacted.get(username).and_then(|r| r.last_interaction)
    }

    #[must_use]
    pub fn last_filtered(&self, username: &str) -> Option<NaiveDateTime> {
        self.filters.get(username).and_then(|r| r.checked_at)
    }

    /// Last filter time and last interaction time for `username`.
    #[must_use]
    pub fn interacted(&self, username: &str) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
        (self.last_filtered(username), self.last_interaction(username))
    }

    #[must_use]
    pub fn in_whitelist(&self, username: &str) -> bool {
        self.whitelist.contains(username)
    }

    #[must_use]
    pub fn in_blacklist(&self, username: &str) -> bool {
        self.blacklist.contains(username)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.interacted.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interacted.is_empty()
    }

    /// Users interacted within `window` before `now`.
    #[must_use]
    pub fn interactions_since(&self, window: Duration, now: NaiveDateTime) -> usize {
        self.interacted
            .values()
            .filter_map(|r| r.last_interaction)
            .filter(|ts| now - *ts <= window)
            .count()
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            total: self.interacted.len(),
            filtered: self.filters.len(),
            skipped: self
                .filters
                .values()
                .filter(|f| f.skip_reason.is_some())
                .count(),
            last_day: self.interactions_since(Duration::days(1), now()),
            ..StoreStats::default()
        };
        for username in self.interacted.keys() {
            let status = self.get_following_status(username);
            *stats.by_status.entry(status.to_string()).or_insert(0) += 1;
        }
        stats.welcomed = self.interacted.values().filter(|r| r.welcomed).count();
        stats
    }
}
