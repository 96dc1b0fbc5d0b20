//! Cadence - session orchestration for long-running device automation
//!
//! Runs repeated interaction campaigns against an app on an Android device
//! inside time-boxed sessions, respecting randomized limits, working hours
//! and a crash ceiling, while keeping a crash-safe history of every
//! interaction per account.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`account`] - Per-account directory layout and the process lock
//! - [`config`] - Campaign configuration loading and validation
//! - [`device`] - The `Device` capability and its adb implementation
//! - [`error`] - Custom error types and handling
//! - [`hooks`] - Pre- and post-session scripts
//! - [`jobs`] - The `Job` trait, command jobs and the job registry
//! - [`logging`] - Subscriber setup and per-run log files
//! - [`r#loop`] - The session loop, schedules and retry policy
//! - [`report`] - Aggregate reports over sessions
//! - [`session`] - Session state, limits, working hours and history
//! - [`storage`] - Interaction store and atomic JSON files
//! - [`supervisor`] - Failure handling around each job
//! - [`testing`] - Testing infrastructure (mocks, fixtures)
//!
//! # Example
//!
//! ```rust,ignore
//! use cadence::config::CampaignConfig;
//! use cadence::jobs::JobRegistry;
//! use cadence::r#loop::SessionLoop;
//!
//! let config = CampaignConfig::load("accounts/alice/config.toml")?;
//! let account = config.account("accounts");
//! let jobs = JobRegistry::from_config(&config)?;
//!
//! let mut session_loop = SessionLoop::new(config, account, device, jobs, interrupts, resume)?;
//! let outcome = session_loop.run().await?;
//! ```

pub mod account;
pub mod config;
pub mod device;
pub mod error;
pub mod hooks;
pub mod jobs;
pub mod logging;
pub mod r#loop;
pub mod report;
pub mod session;
pub mod storage;
pub mod supervisor;
pub mod testing;

// Re-export commonly used types
pub use error::{CadenceError, IntoCadenceError, Result};

pub use account::{Account, AccountLock};
pub use config::{CampaignConfig, ValidationReport};
pub use device::{Device, DeviceError, DeviceResult, OwnProfile};
pub use jobs::{Job, JobContext, JobKind, JobRegistry};
pub use r#loop::{RunOutcome, SessionLoop};
pub use report::AggregateStats;
pub use session::{Limit, SessionHistory, SessionState};
pub use storage::{InteractionStore, InteractionUpdate};
pub use supervisor::{StopReason, Supervisor};

// Re-export testing types for convenience
pub use testing::{MockDevice, MockResume, ScriptedJob};

// AccountFixture is only available in test builds
#[cfg(test)]
pub use testing::AccountFixture;
