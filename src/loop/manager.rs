//! Session loop: the top-level control loop of a campaign run.
//!
//! # Architecture
//!
//! The `SessionLoop` runs sessions back to back until the schedule is
//! exhausted or something stops it:
//!
//! ```text
//! ┌──────────────────────────── one session ────────────────────────────┐
//! │ draw time_delta ─> working-hours gate ─> pre hook ─> SessionState    │
//! │   ─> wake device ─> open app (retry) ─> read own profile            │
//! │   ─> for each job: hours? hard stop? kind skip? navigate, supervise │
//! │   ─> finish ─> reconcile profile ─> append history                  │
//! │   ─> close app ─> screen off ─> post hook                           │
//! └─────────────────────────────────────────────────────────────────────┘
//!        │
//!        v
//! repeat gate: report, sleep repeat (extended to next window) or stop
//! ```
//!
//! Every session that got as far as creating its `SessionState` is
//! appended to `sessions.json`, including sessions that end with a stop
//! reason or a fatal error.
//!
//! # Example
//!
//! ```rust,ignore
//! use cadence::r#loop::SessionLoop;
//!
//! let mut session_loop = SessionLoop::new(config, account, device, jobs, interrupts, resume)?;
//! let outcome = session_loop.run().await?;
//! if let RunOutcome::Stopped(reason) = outcome {
//!     eprintln!("stopped: {reason}");
//! }
//! let status = outcome.exit_code();
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime};
use rand::thread_rng;
use tracing::{debug, error, info, warn, Instrument};

use super::retry::FailureClass;
use super::schedule::{format_wait, repeat_wait_at, wait_with_spinner};
use crate::account::Account;
use crate::config::CampaignConfig;
use crate::device::{Device, ProfileCounts};
use crate::error::{CadenceError, Result};
use crate::hooks::{self, HookPhase};
use crate::jobs::{JobContext, JobKind, JobRegistry};
use crate::logging;
use crate::report::AggregateStats;
use crate::session::{
    inside_working_hours_at, Interrupts, ResumePrompt, SessionHistory, SessionState, SleepOutcome, WindowStatus,
};
use crate::storage::InteractionStore;
use crate::supervisor::{write_crash_report, JobVerdict, StopReason, Supervisor};

/// Source of the time of day working hours are checked against.
pub type Clock = Arc<dyn Fn() -> NaiveTime + Send + Sync>;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every scheduled session ran
    Completed,
    Stopped(StopReason),
}

impl RunOutcome {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::Stopped(reason) => reason.exit_code(),
        }
    }
}

/// How a single session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Finished,
    Stop(StopReason),
}

/// Runs sessions for one account.
pub struct SessionLoop {
    config: CampaignConfig,
    account: Account,
    device: Arc<dyn Device>,
    jobs: JobRegistry,
    store: InteractionStore,
    history: SessionHistory,
    interrupts: Interrupts,
    supervisor: Supervisor,
    clock: Clock,
    /// Sessions run by this process
    completed: Vec<SessionState>,
}

impl SessionLoop {
    /// Load the account's store and history and prepare to run.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CadenceError::StoreCorrupted`] when a store file
    /// cannot be parsed.
    pub fn new(
        config: CampaignConfig,
        account: Account,
        device: Arc<dyn Device>,
        jobs: JobRegistry,
        interrupts: Interrupts,
        resume: Arc<dyn ResumePrompt>,
    ) -> Result<Self> {
        account.ensure_dir()?;
        let store = InteractionStore::load(&account)?;
        let history = SessionHistory::load(&account)?;

        Ok(Self {
            config,
            account,
            device,
            jobs,
            store,
            history,
            interrupts,
            supervisor: Supervisor::new(resume),
            clock: Arc::new(|| Local::now().time()),
            completed: Vec::new(),
        })
    }

    /// Replace the supervisor, e.g. to change the app-open retry policy.
    #[must_use]
    pub fn with_supervisor(mut self, supervisor: Supervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    /// Replace the local clock used for working hours.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn store(&self) -> &InteractionStore {
        &self.store
    }

    #[must_use]
    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    /// Sessions run by this loop so far.
    #[must_use]
    pub fn sessions(&self) -> &[SessionState] {
        &self.completed
    }

    /// Run sessions until the schedule is exhausted or a stop occurs.
    ///
    /// # Errors
    ///
    /// Returns the fatal error of a job after the session that hit it has
    /// been persisted.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let span = logging::account_span(&self.account);
        self.run_sessions().instrument(span).await
    }

    async fn run_sessions(&mut self) -> Result<RunOutcome> {
        info!(
            "Starting campaign with {} jobs, session budget {}",
            self.jobs.len(),
            self.config
                .session_budget()
                .map_or_else(|| "unlimited".to_string(), |n| n.to_string())
        );
        let mut sessions_done: u32 = 0;
        let mut time_delta = self.config.draw_time_delta(&mut thread_rng());

        loop {
            let end = self.run_session(time_delta).await;
            let end = match end {
                Ok(end) => end,
                Err(e) => {
                    self.print_report("this run");
                    return Err(e);
                }
            };
            sessions_done += 1;

            if let SessionEnd::Stop(reason) = end {
                warn!("Run stopped: {}", reason);
                self.print_report("this run");
                return Ok(RunOutcome::Stopped(reason));
            }

            let repeat = if self.config.can_repeat(sessions_done) {
                self.config.draw_repeat(&mut thread_rng())
            } else {
                None
            };
            let Some(repeat) = repeat else {
                info!("All {} sessions done", sessions_done);
                self.print_report("this run");
                return Ok(RunOutcome::Completed);
            };

            self.print_report("so far");
            let (next_delta, wait) = self.schedule_next(repeat);
            time_delta = next_delta;
            info!("Next session in {}", format_wait(wait));
            if wait_with_spinner(&self.interrupts, wait, "Next session").await == SleepOutcome::Interrupted {
                self.interrupts.acknowledge();
                self.print_report("this run");
                return Ok(RunOutcome::Stopped(StopReason::Interrupted));
            }
        }
    }

    /// Draw the next session's jitter and the wait before it starts.
    ///
    /// The wait is measured against the new jitter, since that is the one
    /// the next session's working-hours gate will use.
    fn schedule_next(&self, repeat: Duration) -> (chrono::Duration, Duration) {
        let time_delta = self.config.draw_time_delta(&mut thread_rng());
        let wait = repeat_wait_at(&self.config.working_hours, (self.clock)(), time_delta, repeat);
        (time_delta, wait)
    }

    fn working_hours(&self, time_delta: chrono::Duration) -> WindowStatus {
        inside_working_hours_at(&self.config.working_hours, (self.clock)(), time_delta)
    }

    fn print_report(&self, title: &str) {
        AggregateStats::from_sessions(&self.completed).print(title);
    }

    /// One session. The session is persisted on every path once created.
    async fn run_session(&mut self, time_delta: chrono::Duration) -> Result<SessionEnd> {
        let status = self.working_hours(time_delta);
        if !status.is_inside() {
            let wait = Duration::from_secs(status.wait_seconds());
            info!("Outside working hours, next window in {}", format_wait(wait));
            if wait_with_spinner(&self.interrupts, wait, "Waiting for working hours").await
                == SleepOutcome::Interrupted
            {
                self.interrupts.acknowledge();
                return Ok(SessionEnd::Stop(StopReason::Interrupted));
            }
        }

        hooks::run_optional(
            HookPhase::PreSession,
            self.config.pre_script.as_deref(),
            &self.account,
            None,
        )
        .await;

        let limits = self.config.limits.draw(&mut thread_rng());
        let mut session = SessionState::new(limits, self.config.max_crashes);
        info!(session = %session.id, "Session started: {}", session.limit_summary());

        let result = self.drive_session(&mut session, time_delta).await;
        match &result {
            Ok(SessionEnd::Stop(reason)) => session.stop_reason = Some(reason.to_string()),
            Err(e) => session.stop_reason = Some(e.to_string()),
            Ok(SessionEnd::Finished) => {}
        }

        let session_id = session.id;
        let saved = self.save_session(session);
        self.put_device_to_rest().await;
        hooks::run_optional(
            HookPhase::PostSession,
            self.config.post_script.as_deref(),
            &self.account,
            Some(session_id),
        )
        .await;

        match (result, saved) {
            (Err(e), saved) => {
                if let Err(save_error) = saved {
                    error!("Could not save the session: {}", save_error);
                }
                Err(e)
            }
            (Ok(_), Err(save_error)) => Err(save_error),
            (Ok(end), Ok(())) => Ok(end),
        }
    }

    async fn drive_session(&mut self, session: &mut SessionState, time_delta: chrono::Duration) -> Result<SessionEnd> {
        if let Some(reason) = self.wake_device().await {
            return Ok(SessionEnd::Stop(reason));
        }

        match self
            .supervisor
            .open_app(self.device.as_ref(), self.config.open_attempts)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                error!("The app could not be opened");
                return Ok(SessionEnd::Stop(StopReason::AppUnavailable));
            }
            Err(e) => {
                error!("Opening the app failed: {}", e);
                write_crash_report(
                    self.device.as_ref(),
                    &self.account,
                    session,
                    None,
                    &e.to_string(),
                    FailureClass::Fatal,
                )
                .await;
                return Err(CadenceError::device("open-app", e));
            }
        }

        match self.read_profile().await {
            Some(counts) => session.profile = Some(counts),
            None => {
                write_crash_report(
                    self.device.as_ref(),
                    &self.account,
                    session,
                    None,
                    "operator profile could not be read",
                    FailureClass::Fatal,
                )
                .await;
                return Ok(SessionEnd::Stop(StopReason::ProfileUnreadable));
            }
        }

        let jobs = if self.config.shuffle_jobs {
            self.jobs.shuffled(&mut thread_rng())
        } else {
            self.jobs.ordered()
        };
        debug!(
            "Job order: {}",
            jobs.iter().map(|j| j.name()).collect::<Vec<_>>().join(", ")
        );

        for (index, job) in jobs.iter().enumerate() {
            if !self.working_hours(time_delta).is_inside() {
                info!("Working hours ended, no more jobs this session");
                break;
            }

            let check = session.check_all();
            if check.hard_stop_reached {
                info!("Session limit reached: {}", session.limit_summary());
                break;
            }
            match job.kind() {
                JobKind::Unfollow if check.unfollow_reached => {
                    info!("Unfollow limit reached, skipping {}", job.name());
                    continue;
                }
                JobKind::Active if check.active_reached => {
                    let unfollow_left = jobs[index + 1..].iter().any(|j| j.kind() == JobKind::Unfollow);
                    if !unfollow_left {
                        info!("Active limits reached and no unfollow jobs left");
                        break;
                    }
                    info!("Active limits reached, skipping {}", job.name());
                    continue;
                }
                _ => {}
            }

            if let Err(e) = self.device.navigate_to_own_profile().await {
                warn!("Could not navigate to the profile before {}: {}", job.name(), e);
            }

            let mut ctx = JobContext::new(
                self.device.as_ref(),
                &self.config,
                &self.account,
                &mut self.store,
                session,
                self.history.sessions(),
                &self.interrupts,
            );
            match self.supervisor.run_job(job.as_ref(), &mut ctx).await? {
                JobVerdict::Completed => {}
                JobVerdict::Stop(reason) => return Ok(SessionEnd::Stop(reason)),
            }
        }

        session.finish();
        self.reconcile_profile(session).await;
        Ok(SessionEnd::Finished)
    }

    /// Turn the screen on and unlock. Returns a stop reason if the screen
    /// stays locked.
    async fn wake_device(&self) -> Option<StopReason> {
        match self.device.is_screen_on().await {
            Ok(true) => {}
            Ok(false) => {
                info!("Screen is off, turning it on");
                if let Err(e) = self.device.press_power().await {
                    warn!("Could not press power: {}", e);
                }
            }
            Err(e) => warn!("Could not read the screen state: {}", e),
        }

        match self.device.is_screen_locked().await {
            Ok(false) => return None,
            Ok(true) => {}
            Err(e) => {
                warn!("Could not read the lock state: {}", e);
                return None;
            }
        }

        info!("Unlocking the device");
        if let Err(e) = self.device.unlock().await {
            warn!("Unlock failed: {}", e);
        }
        match self.device.is_screen_locked().await {
            Ok(true) => {
                error!("The screen is still locked");
                Some(StopReason::ScreenLocked)
            }
            Ok(false) => None,
            Err(e) => {
                warn!("Could not read the lock state: {}", e);
                None
            }
        }
    }

    async fn read_profile(&self) -> Option<ProfileCounts> {
        if let Err(e) = self.device.navigate_to_own_profile().await {
            warn!("Could not navigate to the profile: {}", e);
        }
        let profile = match self.device.get_own_profile_counts().await {
            Ok(profile) => profile,
            Err(e) => {
                error!("Could not read the profile: {}", e);
                return None;
            }
        };
        let counts = profile.counts();
        match (&profile.username, counts) {
            (Some(username), Some(counts)) => {
                info!(
                    "Hello, @{}! You have {} followers and {} followings so far.",
                    username, counts.followers, counts.following
                );
                Some(counts)
            }
            _ => {
                error!("Profile is missing values: {:?}", profile);
                None
            }
        }
    }

    /// Re-read the profile at session end and log the change.
    async fn reconcile_profile(&self, session: &mut SessionState) {
        let counts = match self.device.get_own_profile_counts().await {
            Ok(profile) => profile.counts(),
            Err(e) => {
                warn!("Could not re-read the profile: {}", e);
                return;
            }
        };
        let Some(end) = counts else {
            warn!("Profile at session end is missing values");
            return;
        };
        if let Some(start) = session.profile {
            let (posts, followers, following) = start.drift(&end);
            info!(
                "Profile change this session: posts {:+}, followers {:+}, following {:+}",
                posts, followers, following
            );
        }
        session.profile_end = Some(end);
    }

    fn save_session(&mut self, session: SessionState) -> Result<()> {
        let mut session = session;
        session.finish();
        info!(
            session = %session.id,
            "Session ended: {}",
            session.limit_summary()
        );
        self.completed.push(session.clone());
        self.history.append(session)
    }

    async fn put_device_to_rest(&self) {
        if let Err(e) = self.device.close_app().await {
            warn!("Could not close the app: {}", e);
        }
        if self.config.screen_sleep {
            match self.device.is_screen_on().await {
                Ok(true) => {
                    debug!("Turning the screen off");
                    if let Err(e) = self.device.press_power().await {
                        warn!("Could not press power: {}", e);
                    }
                }
                Ok(false) => {}
                Err(e) => warn!("Could not read the screen state: {}", e),
            }
        }
    }
}

impl std::fmt::Debug for SessionLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLoop")
            .field("account", &self.account)
            .field("jobs", &self.jobs)
            .field("sessions", &self.completed.len())
            .finish_non_exhaustive()
    }
}
