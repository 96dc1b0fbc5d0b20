//! Test doubles for the device and for jobs.
//!
//! Both are thread-safe and count their calls so tests can assert how the
//! session loop drove them.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::device::{Device, DeviceError, DeviceResult, OwnProfile};
use crate::jobs::{Job, JobContext, JobKind};
use crate::session::ResumePrompt;

fn pop_error(queue: &Mutex<VecDeque<DeviceError>>) -> Option<DeviceError> {
    queue.lock().ok().and_then(|mut q| q.pop_front())
}

// ============================================================================
// MockDevice
// ============================================================================

/// Scriptable in-memory [`Device`].
///
/// # Example
///
/// ```rust,ignore
/// let device = MockDevice::new()
///     .with_screen_off()
///     .with_open_failures(vec![DeviceError::timeout("launch")]);
///
/// assert_eq!(device.open_calls(), 0);
/// ```
#[derive(Debug)]
pub struct MockDevice {
    profile: Mutex<OwnProfile>,
    screen_on: AtomicBool,
    locked: AtomicBool,
    unlockable: bool,
    app_running: AtomicBool,
    crash_dialog: AtomicBool,
    open_failures: Mutex<VecDeque<DeviceError>>,
    navigate_failures: Mutex<VecDeque<DeviceError>>,
    profile_failures: Mutex<VecDeque<DeviceError>>,
    open_calls: AtomicU32,
    close_calls: AtomicU32,
    dismiss_calls: AtomicU32,
    navigate_calls: AtomicU32,
    power_calls: AtomicU32,
    unlock_calls: AtomicU32,
    profile_calls: AtomicU32,
    snapshot_calls: AtomicU32,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self {
            profile: Mutex::new(OwnProfile {
                username: Some("alice".to_string()),
                posts: Some(10),
                followers: Some(100),
                following: Some(50),
            }),
            screen_on: AtomicBool::new(true),
            locked: AtomicBool::new(false),
            unlockable: true,
            app_running: AtomicBool::new(false),
            crash_dialog: AtomicBool::new(false),
            open_failures: Mutex::new(VecDeque::new()),
            navigate_failures: Mutex::new(VecDeque::new()),
            profile_failures: Mutex::new(VecDeque::new()),
            open_calls: AtomicU32::new(0),
            close_calls: AtomicU32::new(0),
            dismiss_calls: AtomicU32::new(0),
            navigate_calls: AtomicU32::new(0),
            power_calls: AtomicU32::new(0),
            unlock_calls: AtomicU32::new(0),
            profile_calls: AtomicU32::new(0),
            snapshot_calls: AtomicU32::new(0),
        }
    }
}

impl MockDevice {
    /// Unlocked device with the screen on and a readable profile.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_profile(self, profile: OwnProfile) -> Self {
        if let Ok(mut p) = self.profile.lock() {
            *p = profile;
        }
        self
    }

    #[must_use]
    pub fn with_screen_off(self) -> Self {
        self.screen_on.store(false, Ordering::SeqCst);
        self
    }

    /// Start locked. `unlockable = false` simulates a passcode.
    #[must_use]
    pub fn with_locked_screen(mut self, unlockable: bool) -> Self {
        self.locked.store(true, Ordering::SeqCst);
        self.unlockable = unlockable;
        self
    }

    /// Show a crash dialog until it is dismissed.
    #[must_use]
    pub fn with_crash_dialog(self) -> Self {
        self.crash_dialog.store(true, Ordering::SeqCst);
        self
    }

    /// Fail the next `open_app` calls with these errors, in order.
    #[must_use]
    pub fn with_open_failures(self, errors: Vec<DeviceError>) -> Self {
        if let Ok(mut q) = self.open_failures.lock() {
            q.extend(errors);
        }
        self
    }

    #[must_use]
    pub fn with_navigate_failures(self, errors: Vec<DeviceError>) -> Self {
        if let Ok(mut q) = self.navigate_failures.lock() {
            q.extend(errors);
        }
        self
    }

    #[must_use]
    pub fn with_profile_failures(self, errors: Vec<DeviceError>) -> Self {
        if let Ok(mut q) = self.profile_failures.lock() {
            q.extend(errors);
        }
        self
    }

    /// Change the profile returned from now on.
    pub fn set_profile(&self, profile: OwnProfile) {
        if let Ok(mut p) = self.profile.lock() {
            *p = profile;
        }
    }

    #[must_use]
    pub fn open_calls(&self) -> u32 {
        self.open_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn dismiss_calls(&self) -> u32 {
        self.dismiss_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn navigate_calls(&self) -> u32 {
        self.navigate_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn power_calls(&self) -> u32 {
        self.power_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn unlock_calls(&self) -> u32 {
        self.unlock_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn profile_calls(&self) -> u32 {
        self.profile_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn snapshot_calls(&self) -> u32 {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_app_open(&self) -> bool {
        self.app_running.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn screen_is_on(&self) -> bool {
        self.screen_on.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Device for MockDevice {
    async fn is_app_running(&self) -> DeviceResult<bool> {
        Ok(self.app_running.load(Ordering::SeqCst))
    }

    async fn open_app(&self) -> DeviceResult<()> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = pop_error(&self.open_failures) {
            return Err(e);
        }
        self.app_running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close_app(&self) -> DeviceResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.app_running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn dismiss_crash_dialog(&self) -> DeviceResult<bool> {
        self.dismiss_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.crash_dialog.swap(false, Ordering::SeqCst))
    }

    async fn is_screen_on(&self) -> DeviceResult<bool> {
        Ok(self.screen_on.load(Ordering::SeqCst))
    }

    async fn press_power(&self) -> DeviceResult<()> {
        self.power_calls.fetch_add(1, Ordering::SeqCst);
        self.screen_on.fetch_xor(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_screen_locked(&self) -> DeviceResult<bool> {
        Ok(self.locked.load(Ordering::SeqCst))
    }

    async fn unlock(&self) -> DeviceResult<()> {
        self.unlock_calls.fetch_add(1, Ordering::SeqCst);
        if self.unlockable {
            self.locked.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn navigate_to_own_profile(&self) -> DeviceResult<()> {
        self.navigate_calls.fetch_add(1, Ordering::SeqCst);
        match pop_error(&self.navigate_failures) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn get_own_profile_counts(&self) -> DeviceResult<OwnProfile> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = pop_error(&self.profile_failures) {
            return Err(e);
        }
        self.profile
            .lock()
            .map(|p| p.clone())
            .map_err(|_| DeviceError::other("profile lock poisoned"))
    }

    async fn running_apps(&self) -> DeviceResult<Vec<String>> {
        Ok(if self.is_app_open() {
            vec!["com.instagram.android".to_string()]
        } else {
            Vec::new()
        })
    }

    async fn save_crash_snapshot(&self, _dir: &Path) -> DeviceResult<Option<PathBuf>> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

// ============================================================================
// ScriptedJob
// ============================================================================

type Script = Box<dyn for<'a, 'b> Fn(&'a mut JobContext<'b>, u32) -> DeviceResult<()> + Send + Sync>;

/// Closure-driven [`Job`].
///
/// Queued failures are returned by the first runs, one per run, before the
/// script is consulted. The script receives the 1-indexed run number.
///
/// # Example
///
/// ```rust,ignore
/// let job = ScriptedJob::new("likes", JobKind::Active, |ctx, _run| {
///     while ctx.can_act(Limit::Likes) {
///         ctx.record(InteractionUpdate::new("bob").with_likes(1))?;
///     }
///     Ok(())
/// })
/// .with_failures(vec![DeviceError::timeout("feed")]);
/// ```
pub struct ScriptedJob {
    name: String,
    kind: JobKind,
    target: Option<String>,
    failures: Mutex<VecDeque<DeviceError>>,
    script: Script,
    runs: AtomicU32,
}

impl ScriptedJob {
    pub fn new<F>(name: impl Into<String>, kind: JobKind, script: F) -> Self
    where
        F: for<'a, 'b> Fn(&'a mut JobContext<'b>, u32) -> DeviceResult<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind,
            target: None,
            failures: Mutex::new(VecDeque::new()),
            script: Box::new(script),
            runs: AtomicU32::new(0),
        }
    }

    /// Active job that does nothing and completes.
    #[must_use]
    pub fn completing(name: impl Into<String>) -> Self {
        Self::new(name, JobKind::Active, |_, _| Ok(()))
    }

    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    #[must_use]
    pub fn with_failures(self, errors: Vec<DeviceError>) -> Self {
        if let Ok(mut q) = self.failures.lock() {
            q.extend(errors);
        }
        self
    }

    /// Number of times `run` was entered.
    #[must_use]
    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ScriptedJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedJob")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("runs", &self.runs())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Job for ScriptedJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> JobKind {
        self.kind
    }

    fn target(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.name)
    }

    async fn run(&self, ctx: &mut JobContext<'_>) -> DeviceResult<()> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(e) = pop_error(&self.failures) {
            return Err(e);
        }
        (self.script)(ctx, run)
    }
}

// ============================================================================
// MockResume
// ============================================================================

/// [`ResumePrompt`] that either resumes at once or never does.
#[derive(Debug, Clone, Copy)]
pub struct MockResume {
    resume: bool,
}

impl MockResume {
    #[must_use]
    pub fn resuming() -> Self {
        Self { resume: true }
    }

    /// Never resumes; only a second interrupt ends the pause.
    #[must_use]
    pub fn never() -> Self {
        Self { resume: false }
    }
}

#[async_trait]
impl ResumePrompt for MockResume {
    async fn wait_for_resume(&self) {
        if !self.resume {
            std::future::pending::<()>().await;
        }
    }
}
