//! [`Device`] implementation backed by the `adb` command line.
//!
//! App lifecycle, power and lock state go through `adb shell`. Screen
//! navigation and profile reading belong to the UI automation driver, so
//! they are delegated to the configured driver commands:
//!
//! ```text
//! AdbDevice
//!   ├── adb -s <id> shell pidof / monkey / am force-stop
//!   ├── adb -s <id> shell dumpsys power / window, input keyevent
//!   ├── adb -s <id> exec-out screencap -p        (crash snapshots)
//!   ├── device.navigate_command                  (anchor screen)
//!   └── device.profile_command → OwnProfile JSON on stdout
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use tracing::{debug, info, warn};

use super::process::{self, ProcessOutput};
use super::{Device, DeviceError, DeviceResult, OwnProfile};
use crate::config::DeviceConfig;
use crate::error::{CadenceError, Result};
use crate::r#loop::retry::FailureClassifier;

const KEYCODE_POWER: &str = "26";
const KEYCODE_MENU: &str = "82";
const KEYCODE_BACK: &str = "4";

/// Android device reached through `adb`.
pub struct AdbDevice {
    adb: PathBuf,
    serial: Option<String>,
    app_id: String,
    navigate_command: Vec<String>,
    profile_command: Vec<String>,
    timeout: Duration,
    classifier: FailureClassifier,
}

impl AdbDevice {
    /// Locate `adb` and build a device handle.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::InvalidConfig`] when the `adb` executable
    /// cannot be found.
    pub fn new(config: &DeviceConfig, app_id: impl Into<String>, serial: Option<String>) -> Result<Self> {
        let adb = which::which(&config.adb).map_err(|e| {
            CadenceError::invalid_config("device.adb", format!("'{}' not found: {}", config.adb, e))
        })?;
        debug!("Using adb at {}", adb.display());
        Ok(Self {
            adb,
            serial,
            app_id: app_id.into(),
            navigate_command: config.navigate_command.clone(),
            profile_command: config.profile_command.clone(),
            timeout: Duration::from_secs(config.command_timeout_secs),
            classifier: FailureClassifier::new(),
        })
    }

    fn adb_args<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut full = Vec::new();
        if let Some(serial) = &self.serial {
            full.push("-s".to_string());
            full.push(serial.clone());
        }
        full.extend(args.into_iter().map(str::to_string));
        full
    }

    async fn adb_raw(&self, args: &[&str]) -> DeviceResult<ProcessOutput> {
        let program = self.adb.to_string_lossy();
        process::run(&program, &self.adb_args(args.iter().copied()), self.timeout).await
    }

    /// Run `adb shell <args>` and return stdout, classifying failures.
    async fn shell(&self, args: &[&str]) -> DeviceResult<String> {
        let mut full = vec!["shell"];
        full.extend_from_slice(args);
        let output = self.adb_raw(&full).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(output.into_error("adb", &self.classifier))
        }
    }

    async fn keyevent(&self, code: &str) -> DeviceResult<()> {
        self.shell(&["input", "keyevent", code]).await.map(|_| ())
    }

    async fn run_driver(&self, command: &[String]) -> DeviceResult<String> {
        let (program, args) = process::split_command(command)?;
        let mut args = args.to_vec();
        if let Some(serial) = &self.serial {
            args.push("--device".to_string());
            args.push(serial.clone());
        }
        let output = process::run(program, &args, self.timeout).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(output.into_error(program, &self.classifier))
        }
    }
}

#[async_trait]
impl Device for AdbDevice {
    async fn is_app_running(&self) -> DeviceResult<bool> {
        // pidof exits 1 with no output when the process is absent
        let output = self.adb_raw(&["shell", "pidof", &self.app_id]).await?;
        Ok(output.success() && !output.stdout.trim().is_empty())
    }

    async fn open_app(&self) -> DeviceResult<()> {
        info!("Opening {}", self.app_id);
        let out = self
            .shell(&[
                "monkey",
                "-p",
                &self.app_id,
                "-c",
                "android.intent.category.LAUNCHER",
                "1",
            ])
            .await?;
        if out.contains("No activities found") {
            return Err(DeviceError::command(
                "adb",
                format!("{} is not installed", self.app_id),
            ));
        }
        Ok(())
    }

    async fn close_app(&self) -> DeviceResult<()> {
        info!("Closing {}", self.app_id);
        self.shell(&["am", "force-stop", &self.app_id]).await.map(|_| ())
    }

    async fn dismiss_crash_dialog(&self) -> DeviceResult<bool> {
        let windows = self.shell(&["dumpsys", "window", "windows"]).await?;
        if has_crash_dialog(&windows) {
            warn!("Dismissing crash dialog");
            self.keyevent(KEYCODE_BACK).await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn is_screen_on(&self) -> DeviceResult<bool> {
        let power = self.shell(&["dumpsys", "power"]).await?;
        Ok(screen_on_from_power(&power))
    }

    async fn press_power(&self) -> DeviceResult<()> {
        self.keyevent(KEYCODE_POWER).await
    }

    async fn is_screen_locked(&self) -> DeviceResult<bool> {
        let window = self.shell(&["dumpsys", "window"]).await?;
        Ok(locked_from_window(&window))
    }

    async fn unlock(&self) -> DeviceResult<()> {
        self.keyevent(KEYCODE_MENU).await?;
        self.shell(&["input", "swipe", "500", "1500", "500", "300"])
            .await
            .map(|_| ())
    }

    async fn navigate_to_own_profile(&self) -> DeviceResult<()> {
        if self.navigate_command.is_empty() {
            debug!("No navigate_command configured; assuming the profile is shown");
            return Ok(());
        }
        self.run_driver(&self.navigate_command).await.map(|_| ())
    }

    async fn get_own_profile_counts(&self) -> DeviceResult<OwnProfile> {
        let stdout = self.run_driver(&self.profile_command).await?;
        parse_profile(&stdout)
    }

    async fn running_apps(&self) -> DeviceResult<Vec<String>> {
        let ps = self.shell(&["ps", "-A", "-o", "NAME"]).await?;
        Ok(packages_from_ps(&ps))
    }

    async fn save_crash_snapshot(&self, dir: &Path) -> DeviceResult<Option<PathBuf>> {
        // screencap writes binary PNG data, so stdout is kept as raw bytes
        let capture = tokio::process::Command::new(&self.adb)
            .args(self.adb_args(["exec-out", "screencap", "-p"]))
            .kill_on_drop(true)
            .output();
        let output = match tokio::time::timeout(self.timeout, capture).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(DeviceError::command("adb", e.to_string())),
            Err(_) => return Err(DeviceError::timeout("screencap")),
        };
        if !output.status.success() || output.stdout.is_empty() {
            return Ok(None);
        }

        let path = dir.join(format!("screenshot-{}.png", Local::now().format("%Y%m%d-%H%M%S")));
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| DeviceError::other(e.to_string()))?;
        tokio::fs::write(&path, &output.stdout)
            .await
            .map_err(|e| DeviceError::other(e.to_string()))?;
        Ok(Some(path))
    }
}

// ============================================================================
// Output parsing
// ============================================================================

fn has_crash_dialog(windows: &str) -> bool {
    windows.lines().any(|line| {
        line.contains("mCurrentFocus")
            && (line.contains("Application Error") || line.contains("Application Not Responding"))
    })
}

fn screen_on_from_power(power: &str) -> bool {
    power.lines().map(str::trim).any(|line| {
        line == "mWakefulness=Awake" || line == "Display Power: state=ON" || line == "mScreenOn=true"
    })
}

fn locked_from_window(window: &str) -> bool {
    window.lines().map(str::trim).any(|line| {
        line.contains("mDreamingLockscreen=true")
            || line.contains("mShowingLockscreen=true")
            || line.contains("isStatusBarKeyguard=true")
    })
}

fn packages_from_ps(ps: &str) -> Vec<String> {
    ps.lines()
        .skip(1)
        .map(str::trim)
        .filter(|name| name.contains('.') && !name.starts_with('['))
        .map(str::to_string)
        .collect()
}

fn parse_profile(stdout: &str) -> DeviceResult<OwnProfile> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with('{'))
        .ok_or_else(|| DeviceError::EmptyResult {
            message: "profile command printed no JSON".to_string(),
        })?;
    serde_json::from_str(line).map_err(|e| DeviceError::malformed(format!("profile JSON: {e}")))
}
