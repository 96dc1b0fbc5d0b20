//! Job supervisor: turns job results into recovery decisions.
//!
//! Every job invocation is wrapped by [`Supervisor::run_job`], which maps
//! the job's result to a [`JobOutcome`] and acts on it:
//!
//! ```text
//! job.run() ──> JobOutcome
//!   Completed    ──> next job
//!   Paused       ──> prompt: RETURN resumes (navigate, re-run)
//!                            second Ctrl-C stops the session
//!   AppCrashed   ──> tally if count_app_crashes, restart, re-run
//!   Transient    ──> crash += 1 ─┬─ over ceiling ──> stop (CrashLimit)
//!                                └─ otherwise    ──> restart, re-run
//!   Fatal        ──> crash report, close app, return the error
//! ```
//!
//! The restart sequence closes the app, dismisses any crash dialog, waits a
//! random configured delay and reopens. Exhausting the reopen attempts stops
//! the run with [`StopReason::AppUnavailable`]; a reopen failure that is not
//! restartable is returned as an error.
//!
//! # Modules
//!
//! - [`diagnostics`] - Crash reports written to the account's `crashes/`

pub mod diagnostics;

pub use diagnostics::CrashReport;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::account::Account;
use crate::device::{Device, DeviceError, DeviceResult};
use crate::error::{CadenceError, Result};
use crate::jobs::{Job, JobContext};
use crate::r#loop::retry::{retry, FailureClass, RetryConfig};
use crate::session::{Limit, ResumePrompt, SessionState};

// ============================================================================
// Outcomes
// ============================================================================

/// Classified result of one job invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Paused,
    AppCrashed(DeviceError),
    Transient(DeviceError),
    Fatal(DeviceError),
}

impl From<DeviceResult<()>> for JobOutcome {
    fn from(result: DeviceResult<()>) -> Self {
        match result {
            Ok(()) => Self::Completed,
            Err(e) => match e.class() {
                FailureClass::Pause => Self::Paused,
                FailureClass::AppCrash => Self::AppCrashed(e),
                FailureClass::Transient => Self::Transient(e),
                FailureClass::Fatal => Self::Fatal(e),
            },
        }
    }
}

/// Why a run stopped before its schedule was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The operator pressed Ctrl-C twice or during a long wait
    Interrupted,
    /// More crashes than the session tolerates
    CrashLimit,
    /// The app could not be (re)opened
    AppUnavailable,
    /// The screen stayed locked after unlocking
    ScreenLocked,
    /// The operator profile could not be read
    ProfileUnreadable,
}

impl StopReason {
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Interrupted => "stopped by the operator",
            Self::CrashLimit => "crash limit reached",
            Self::AppUnavailable => "the app could not be opened",
            Self::ScreenLocked => "the screen could not be unlocked",
            Self::ProfileUnreadable => "the operator profile could not be read",
        }
    }

    /// Process exit status for this stop.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted => 0,
            Self::AppUnavailable => 2,
            Self::CrashLimit => 3,
            Self::ScreenLocked => 8,
            Self::ProfileUnreadable => 9,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// What the session loop should do after a supervised job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobVerdict {
    Completed,
    Stop(StopReason),
}

enum PauseDecision {
    Resume,
    Stop,
}

// ============================================================================
// Supervisor
// ============================================================================

/// Wraps job invocations with the failure policy.
pub struct Supervisor {
    resume: Arc<dyn ResumePrompt>,
    open_retry: RetryConfig,
}

impl Supervisor {
    #[must_use]
    pub fn new(resume: Arc<dyn ResumePrompt>) -> Self {
        Self {
            resume,
            open_retry: RetryConfig::default(),
        }
    }

    /// Retry policy used whenever the app is opened.
    #[must_use]
    pub fn with_open_retry(mut self, config: RetryConfig) -> Self {
        self.open_retry = config;
        self
    }

    /// Open the app, retrying restartable failures.
    ///
    /// Returns `Ok(false)` when every attempt failed.
    ///
    /// # Errors
    ///
    /// A failure that is not restartable is returned without further
    /// attempts.
    pub async fn open_app(&self, device: &dyn Device, attempts: u32) -> DeviceResult<bool> {
        let config = self.open_retry.clone().with_max_attempts(attempts);
        let opened = retry(
            &config,
            |e: &DeviceError| e.class().is_restartable(),
            |attempt| {
                debug!("Opening app, attempt {}", attempt);
                device.open_app()
            },
        )
        .await?;
        Ok(opened.is_some())
    }

    /// Run `job` until it completes, the session must stop, or it fails
    /// fatally.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Device`] for a fatal job failure, after the
    /// crash report is written and the app is closed.
    pub async fn run_job(&self, job: &dyn Job, ctx: &mut JobContext<'_>) -> Result<JobVerdict> {
        ctx.enter(job);
        ctx.session.jobs.push(job.name().to_string());
        info!(job = %job.name(), kind = %job.kind(), "Starting job");

        loop {
            let outcome = JobOutcome::from(job.run(ctx).await);
            match outcome {
                JobOutcome::Completed => {
                    info!(job = %job.name(), "Job completed: {}", ctx.session.limit_summary());
                    return Ok(JobVerdict::Completed);
                }
                JobOutcome::Paused => match self.pause(ctx).await {
                    PauseDecision::Resume => {
                        info!("Resuming {}", job.name());
                        if let Err(e) = ctx.device.navigate_to_own_profile().await {
                            warn!("Could not return to the profile after pause: {}", e);
                        }
                    }
                    PauseDecision::Stop => {
                        warn!("Stop requested during pause");
                        return Ok(JobVerdict::Stop(StopReason::Interrupted));
                    }
                },
                JobOutcome::AppCrashed(e) => {
                    warn!(job = %job.name(), "App crashed: {}", e);
                    if ctx.config.count_app_crashes {
                        let crashes = ctx.session.add_crash();
                        debug!("App crash counted ({} total)", crashes);
                    }
                    if let Some(reason) = self.restart(ctx).await? {
                        return Ok(JobVerdict::Stop(reason));
                    }
                }
                JobOutcome::Transient(e) => {
                    let crashes = ctx.session.add_crash();
                    warn!(
                        job = %job.name(),
                        "Transient failure ({}/{} crashes tolerated): {}",
                        crashes,
                        ctx.session.max_allowed_crashes,
                        e
                    );
                    if ctx.session.check_limit(Limit::Crashes) {
                        error!("Crash limit reached, stopping the session");
                        return Ok(JobVerdict::Stop(StopReason::CrashLimit));
                    }
                    if let Some(reason) = self.restart(ctx).await? {
                        return Ok(JobVerdict::Stop(reason));
                    }
                }
                JobOutcome::Fatal(e) => {
                    error!(job = %job.name(), "Fatal failure: {}", e);
                    write_crash_report(
                        ctx.device,
                        ctx.account,
                        ctx.session,
                        Some(job.name()),
                        &e.to_string(),
                        FailureClass::Fatal,
                    )
                    .await;
                    if let Err(close) = ctx.device.close_app().await {
                        warn!("Could not close the app: {}", close);
                    }
                    return Err(CadenceError::device(job.name(), e));
                }
            }
        }
    }

    async fn pause(&self, ctx: &JobContext<'_>) -> PauseDecision {
        let seen = ctx.interrupts.count();
        ctx.interrupts.acknowledge();
        println!(
            "\n{} {}",
            "PAUSED".yellow().bold(),
            "Press RETURN to resume or Ctrl-C again to stop.".dimmed()
        );

        tokio::select! {
            () = self.resume.wait_for_resume() => PauseDecision::Resume,
            () = ctx.interrupts.wait_past(seen) => {
                ctx.interrupts.acknowledge();
                PauseDecision::Stop
            }
        }
    }

    /// Close, dismiss any crash dialog, wait, reopen, return to the profile.
    ///
    /// Returns the reason to stop when the app cannot be reopened, or the
    /// error when reopening fails in a way a retry cannot fix.
    async fn restart(&self, ctx: &JobContext<'_>) -> Result<Option<StopReason>> {
        info!("Restarting the app");
        if let Err(e) = ctx.device.close_app().await {
            warn!("Could not close the app: {}", e);
        }
        match ctx.device.dismiss_crash_dialog().await {
            Ok(true) => info!("Dismissed a crash dialog"),
            Ok(false) => {}
            Err(e) => warn!("Could not check for a crash dialog: {}", e),
        }

        let wait = ctx.config.draw_restart_wait(&mut rand::thread_rng());
        debug!("Waiting {}s before reopening", wait.as_secs());
        // An interrupt here is picked up by the job's next checkpoint
        ctx.interrupts.sleep(wait).await;

        match self.open_app(ctx.device, ctx.config.open_attempts).await {
            Ok(true) => {}
            Ok(false) => {
                error!("The app could not be reopened");
                return Ok(Some(StopReason::AppUnavailable));
            }
            Err(e) => {
                error!("Reopening the app failed: {}", e);
                write_crash_report(
                    ctx.device,
                    ctx.account,
                    ctx.session,
                    Some(ctx.job_name()),
                    &e.to_string(),
                    FailureClass::Fatal,
                )
                .await;
                return Err(CadenceError::device(ctx.job_name(), e));
            }
        }
        if let Err(e) = ctx.device.navigate_to_own_profile().await {
            warn!("Could not navigate to the profile after restart: {}", e);
        }
        Ok(None)
    }
}

/// Collect device state and save a crash report under the account's
/// `crashes/` directory. Returns the report path when it was written.
pub async fn write_crash_report(
    device: &dyn Device,
    account: &Account,
    session: &SessionState,
    job: Option<&str>,
    error: &str,
    class: FailureClass,
) -> Option<PathBuf> {
    let dir = account.crashes_dir();
    let mut report = CrashReport::new(account.username(), error, class)
        .with_session(session.id, session.limit_summary());
    if let Some(job) = job {
        report = report.with_job(job);
    }
    let report = report.collect(device, &dir).await;
    match report.save(&dir) {
        Ok(path) => {
            warn!("Crash report saved to {}", path.display());
            Some(path)
        }
        Err(e) => {
            error!("Could not save crash report: {}", e);
            None
        }
    }
}
