//! Device capability consumed by the session loop.
//!
//! The UI-automation layer is an external collaborator: everything the
//! orchestrator needs from it is expressed by the [`Device`] trait. The
//! shipped [`AdbDevice`] drives app lifecycle and screen state over `adb`
//! and delegates screen reading to a configured driver command.
//!
//! Every device call returns a [`DeviceError`] whose variant carries the
//! failure classification used by the supervisor:
//!
//! ```text
//! DeviceError ──class()──> FailureClass ──> Supervisor decision
//!   Interrupted                Pause           prompt, resume or stop
//!   AppCrashed                 AppCrash        restart (tally if configured)
//!   Timeout / Malformed /      Transient       crash count, restart
//!   IndexOutOfRange / ...
//!   Command / Other            Fatal           crash report, abort
//! ```

pub mod adb;
pub mod process;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::r#loop::retry::FailureClass;

pub use adb::AdbDevice;

/// Result alias for device calls.
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Errors raised by the device or by a job talking to it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// User interrupt observed at a checkpoint
    #[error("Interrupted by user")]
    Interrupted,

    /// Target application process died or was closed
    #[error("Application crashed: {message}")]
    AppCrashed { message: String },

    /// Automation call timed out
    #[error("Timed out while {operation}")]
    Timeout { operation: String },

    /// Automation layer returned something unparseable
    #[error("Malformed automation response: {message}")]
    MalformedResponse { message: String },

    /// A UI list had fewer entries than expected
    #[error("Index out of range: {message}")]
    IndexOutOfRange { message: String },

    /// A UI element could not be found on screen
    #[error("UI object not found: {selector}")]
    UiObjectNotFound { selector: String },

    /// A lookup produced nothing where something was required
    #[error("Empty result: {message}")]
    EmptyResult { message: String },

    /// An external program could not be run
    #[error("Command '{program}' failed: {message}")]
    Command { program: String, message: String },

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl DeviceError {
    /// Create an app crash error
    pub fn app_crashed(message: impl Into<String>) -> Self {
        Self::AppCrashed {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a malformed response error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Create a command error
    pub fn command(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Create an unclassified error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Failure class used by the supervisor to pick a recovery path.
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Interrupted => FailureClass::Pause,
            Self::AppCrashed { .. } => FailureClass::AppCrash,
            Self::Timeout { .. }
            | Self::MalformedResponse { .. }
            | Self::IndexOutOfRange { .. }
            | Self::UiObjectNotFound { .. }
            | Self::EmptyResult { .. } => FailureClass::Transient,
            Self::Command { .. } | Self::Other(_) => FailureClass::Fatal,
        }
    }
}

/// Operator profile counters as read from the device.
///
/// Each field is optional because the screen may not render it; callers
/// treat any missing value as "profile unreadable".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnProfile {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub posts: Option<u64>,
    #[serde(default)]
    pub followers: Option<u64>,
    #[serde(default)]
    pub following: Option<u64>,
}

impl OwnProfile {
    /// Returns the counters when all three are present.
    #[must_use]
    pub fn counts(&self) -> Option<ProfileCounts> {
        Some(ProfileCounts {
            posts: self.posts?,
            followers: self.followers?,
            following: self.following?,
        })
    }
}

/// Snapshot of the operator's own counters stored with each session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileCounts {
    pub posts: u64,
    pub followers: u64,
    pub following: u64,
}

impl ProfileCounts {
    /// Signed change from `self` to `later`, as (posts, followers, following).
    #[must_use]
    pub fn drift(&self, later: &ProfileCounts) -> (i64, i64, i64) {
        (
            later.posts as i64 - self.posts as i64,
            later.followers as i64 - self.followers as i64,
            later.following as i64 - self.following as i64,
        )
    }
}

/// Narrow automation capability required by the session loop.
///
/// Implementations must be usable behind `Arc<dyn Device>`; the loop never
/// issues overlapping calls.
#[async_trait]
pub trait Device: Send + Sync {
    /// Whether the target application is in the foreground process list.
    async fn is_app_running(&self) -> DeviceResult<bool>;

    /// Launch the target application.
    async fn open_app(&self) -> DeviceResult<()>;

    /// Force-stop the target application.
    async fn close_app(&self) -> DeviceResult<()>;

    /// Dismiss an "app has stopped" dialog. Returns true if one was shown.
    async fn dismiss_crash_dialog(&self) -> DeviceResult<bool>;

    async fn is_screen_on(&self) -> DeviceResult<bool>;

    async fn press_power(&self) -> DeviceResult<()>;

    async fn is_screen_locked(&self) -> DeviceResult<bool>;

    async fn unlock(&self) -> DeviceResult<()>;

    /// Navigate to the operator's own profile, the anchor screen.
    async fn navigate_to_own_profile(&self) -> DeviceResult<()>;

    /// Read username and counters from the operator's profile screen.
    async fn get_own_profile_counts(&self) -> DeviceResult<OwnProfile>;

    /// Package names of running applications, for crash reports.
    async fn running_apps(&self) -> DeviceResult<Vec<String>>;

    /// Capture a screenshot into `dir`. Returns the written path, if any.
    async fn save_crash_snapshot(&self, dir: &Path) -> DeviceResult<Option<PathBuf>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_classes() {
        assert_eq!(DeviceError::Interrupted.class(), FailureClass::Pause);
        assert_eq!(DeviceError::app_crashed("gone").class(), FailureClass::AppCrash);
        assert_eq!(DeviceError::timeout("reading feed").class(), FailureClass::Transient);
        assert_eq!(DeviceError::malformed("xml").class(), FailureClass::Transient);
        assert_eq!(
            DeviceError::IndexOutOfRange {
                message: "row 7".into()
            }
            .class(),
            FailureClass::Transient
        );
        assert_eq!(
            DeviceError::UiObjectNotFound {
                selector: "follow_button".into()
            }
            .class(),
            FailureClass::Transient
        );
        assert_eq!(
            DeviceError::EmptyResult {
                message: "no posts".into()
            }
            .class(),
            FailureClass::Transient
        );
        assert_eq!(DeviceError::command("adb", "not found").class(), FailureClass::Fatal);
        assert_eq!(DeviceError::other("???").class(), FailureClass::Fatal);
    }

    #[test]
    fn test_own_profile_counts_requires_every_value() {
        let full = OwnProfile {
            username: Some("alice".into()),
            posts: Some(10),
            followers: Some(200),
            following: Some(150),
        };
        assert_eq!(
            full.counts(),
            Some(ProfileCounts {
                posts: 10,
                followers: 200,
                following: 150
            })
        );

        let partial = OwnProfile {
            followers: None,
            ..full
        };
        assert!(partial.counts().is_none());
    }

    #[test]
    fn test_profile_drift() {
        let start = ProfileCounts {
            posts: 10,
            followers: 200,
            following: 150,
        };
        let end = ProfileCounts {
            posts: 10,
            followers: 212,
            following: 141,
        };
        assert_eq!(start.drift(&end), (0, 12, -9));
    }
}
