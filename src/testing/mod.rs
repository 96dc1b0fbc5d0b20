//! Testing infrastructure for cadence.
//!
//! Test doubles for the external collaborators of the session loop, so the
//! orchestrator, supervisor and jobs can be exercised without a device.
//!
//! # Architecture
//!
//! - **Mocks**: [`MockDevice`] (scripted failures, call counters) and
//!   [`ScriptedJob`] (closure-driven job with queued failures)
//! - **Fixtures**: a temporary accounts root with one account (test-only)
//!
//! # Example
//!
//! ```rust,ignore
//! use cadence::testing::{MockDevice, ScriptedJob};
//!
//! let device = MockDevice::new().with_screen_off();
//! let job = ScriptedJob::completing("noop");
//! ```

#[cfg(test)]
pub mod fixtures;
pub mod mocks;

#[cfg(test)]
pub use fixtures::*;
pub use mocks::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, DeviceError};
    use crate::jobs::{Job, JobContext, JobKind};
    use crate::session::{Interrupts, SessionLimits, SessionState};

    #[tokio::test]
    async fn test_mock_device_defaults() {
        let device = MockDevice::new();
        assert!(device.is_screen_on().await.expect("screen"));
        assert!(!device.is_screen_locked().await.expect("lock"));
        assert!(!device.is_app_running().await.expect("running"));

        device.open_app().await.expect("open");
        assert!(device.is_app_running().await.expect("running"));
        assert_eq!(device.open_calls(), 1);

        let profile = device.get_own_profile_counts().await.expect("profile");
        assert!(profile.counts().is_some());
    }

    #[tokio::test]
    async fn test_mock_device_scripted_open_failures() {
        let device = MockDevice::new().with_open_failures(vec![
            DeviceError::timeout("launch"),
            DeviceError::app_crashed("gone"),
        ]);
        assert!(device.open_app().await.is_err());
        assert!(device.open_app().await.is_err());
        assert!(device.open_app().await.is_ok());
        assert_eq!(device.open_calls(), 3);
    }

    #[tokio::test]
    async fn test_mock_device_power_and_lock() {
        let device = MockDevice::new().with_screen_off().with_locked_screen(false);
        device.press_power().await.expect("power");
        assert!(device.screen_is_on());
        device.unlock().await.expect("unlock");
        assert!(device.is_screen_locked().await.expect("lock"));
        assert_eq!(device.unlock_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_device_crash_dialog_dismissed_once() {
        let device = MockDevice::new().with_crash_dialog();
        assert!(device.dismiss_crash_dialog().await.expect("dismiss"));
        assert!(!device.dismiss_crash_dialog().await.expect("dismiss"));
        assert_eq!(device.dismiss_calls(), 2);
    }

    #[tokio::test]
    async fn test_scripted_job_failures_then_script() {
        let fixture = AccountFixture::new("alice");
        let mut store = fixture.store();
        let mut session = SessionState::new(SessionLimits::unlimited(), 5);
        let device = MockDevice::new();
        let config = fixture.config();
        let account = fixture.account();
        let interrupts = Interrupts::new();

        let job = ScriptedJob::new("likes", JobKind::Active, |_, run| {
            assert_eq!(run, 2);
            Ok(())
        })
        .with_failures(vec![DeviceError::timeout("feed")]);

        let mut ctx = JobContext::new(&device, &config, &account, &mut store, &mut session, &[], &interrupts);
        ctx.enter(&job);
        assert!(job.run(&mut ctx).await.is_err());
        assert!(job.run(&mut ctx).await.is_ok());
        assert_eq!(job.runs(), 2);
        assert_eq!(job.target(), "likes");
    }
}
