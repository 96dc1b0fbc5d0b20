//! Custom error types for cadence.
//!
//! This module provides structured error types that enable better
//! error handling, reporting, and recovery throughout the application.
//! Device-level failures live in [`crate::device::DeviceError`] because
//! the failure policy classifies them separately.

use std::path::PathBuf;
use thiserror::Error;

use crate::device::DeviceError;

/// Main error type for cadence operations
#[derive(Error, Debug)]
pub enum CadenceError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Missing required file
    #[error("Missing required file: {path}")]
    MissingFile { path: PathBuf },

    // =========================================================================
    // Account State Errors
    // =========================================================================
    /// On-disk state could not be parsed
    #[error("Corrupted store file {path}: {message}")]
    StoreCorrupted { path: PathBuf, message: String },

    /// Another process owns this account
    #[error("Account '{account}' is locked by another process ({path})")]
    AccountLocked { account: String, path: PathBuf },

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// Crash ceiling exceeded
    #[error("Crash limit reached: {crashes} crashes (ceiling: {max})")]
    CrashLimit { crashes: u32, max: u32 },

    /// The target application could not be (re)opened
    #[error("Application unavailable: {message}")]
    AppUnavailable { message: String },

    /// Unrecoverable device failure surfaced by the supervisor
    #[error("Device failure during '{job}': {source}")]
    Device {
        job: String,
        #[source]
        source: DeviceError,
    },

    /// Job could not be constructed or registered
    #[error("Job '{job}' error: {message}")]
    Job { job: String, message: String },

    // =========================================================================
    // Hook Errors
    // =========================================================================
    /// Hook execution failed
    #[error("Hook '{name}' failed: {message}")]
    Hook { name: String, message: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML error wrapper
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CadenceError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a store corruption error
    pub fn store_corrupted(path: PathBuf, message: impl Into<String>) -> Self {
        Self::StoreCorrupted {
            path,
            message: message.into(),
        }
    }

    /// Create a device error attributed to a job
    pub fn device(job: impl Into<String>, source: DeviceError) -> Self {
        Self::Device {
            job: job.into(),
            source,
        }
    }

    /// Create a job error
    pub fn job(job: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Job {
            job: job.into(),
            message: message.into(),
        }
    }

    /// Create a hook error
    pub fn hook(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            name: name.into(),
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is recoverable within a session
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Hook { .. })
    }

    /// Check if this error must stop the process before any session starts
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::InvalidConfig { .. }
                | Self::MissingFile { .. }
                | Self::StoreCorrupted { .. }
                | Self::AccountLocked { .. }
        )
    }

    /// Check if this error is fatal (should abort the run)
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AppUnavailable { .. } => 2,
            Self::CrashLimit { .. } => 3,
            Self::StoreCorrupted { .. } => 4,
            Self::AccountLocked { .. } => 5,
            Self::MissingFile { .. } => 6,
            Self::Config { .. } | Self::InvalidConfig { .. } | Self::Toml(_) => 7,
            _ => 1,
        }
    }
}

/// Type alias for cadence results
pub type Result<T> = std::result::Result<T, CadenceError>;

/// Extension trait for converting foreign errors to CadenceError
pub trait IntoCadenceError<T> {
    fn into_cadence_config(self) -> Result<T>;
    fn into_cadence_hook(self, name: &str) -> Result<T>;
}

impl<T, E: Into<anyhow::Error>> IntoCadenceError<T> for std::result::Result<T, E> {
    fn into_cadence_config(self) -> Result<T> {
        self.map_err(|e| CadenceError::config(e.into().to_string()))
    }

    fn into_cadence_hook(self, name: &str) -> Result<T> {
        self.map_err(|e| CadenceError::hook(name, e.into().to_string()))
    }
}
