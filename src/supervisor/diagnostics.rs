//! Crash reports written when a job fails fatally or the profile cannot be
//! read.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::Device;
use crate::error::Result;
use crate::r#loop::retry::FailureClass;
use crate::storage::AtomicFile;

/// What was known about the device and session when something failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashReport {
    pub account: String,
    pub session_id: Option<Uuid>,
    pub job: Option<String>,
    pub error: String,
    pub class: FailureClass,
    pub limits: Option<String>,
    pub running_apps: Vec<String>,
    pub snapshot: Option<PathBuf>,
    pub generated_at: DateTime<Local>,
}

impl CrashReport {
    #[must_use]
    pub fn new(account: impl Into<String>, error: impl Into<String>, class: FailureClass) -> Self {
        Self {
            account: account.into(),
            session_id: None,
            job: None,
            error: error.into(),
            class,
            limits: None,
            running_apps: Vec::new(),
            snapshot: None,
            generated_at: Local::now(),
        }
    }

    #[must_use]
    pub fn with_session(mut self, id: Uuid, limits: String) -> Self {
        self.session_id = Some(id);
        self.limits = Some(limits);
        self
    }

    #[must_use]
    pub fn with_job(mut self, job: impl Into<String>) -> Self {
        self.job = Some(job.into());
        self
    }

    /// Ask the device for running apps and a screenshot.
    ///
    /// Device failures here are logged and otherwise ignored; the report is
    /// written either way.
    pub async fn collect(mut self, device: &dyn Device, dir: &Path) -> Self {
        match device.running_apps().await {
            Ok(apps) => self.running_apps = apps,
            Err(e) => tracing::warn!("Could not list running apps: {}", e),
        }
        match device.save_crash_snapshot(dir).await {
            Ok(path) => self.snapshot = path,
            Err(e) => tracing::warn!("Could not capture a crash snapshot: {}", e),
        }
        self
    }

    /// Save to `dir/crash-<timestamp>.json`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let filename = format!(
            "crash-{}.json",
            self.generated_at.format("%Y%m%d-%H%M%S%.3f")
        );
        let path = dir.join(filename);
        AtomicFile::new(&path).write_json(self)?;
        Ok(path)
    }
}
