//! Campaign configuration validation.
//!
//! Parsing already rejects unknown keys, unknown job kinds and malformed
//! windows or ranges. Validation covers what parses but cannot run well:
//! inverted ranges, duplicate job names, jobs without a command and
//! settings that are legal but probably a mistake.
//!
//! # Example
//!
//! ```rust,ignore
//! use cadence::config::CampaignConfig;
//!
//! let config = CampaignConfig::load("accounts/alice/config.toml")?;
//! let report = config.validate();
//!
//! if !report.is_valid() {
//!     for error in &report.errors {
//!         eprintln!("Error: {}", error);
//!     }
//!     return Ok(ExitCode::from(report.exit_code() as u8));
//! }
//! ```

use std::collections::HashSet;

use super::CampaignConfig;
use crate::jobs::JobKind;

/// Result of configuration validation.
///
/// Errors make the configuration unusable; warnings are reported but do not
/// block a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// An empty report, which is valid.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// 0 when valid, the configuration error status otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_valid() {
            0
        } else {
            7
        }
    }

    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_valid() {
            if self.warnings.is_empty() {
                "Configuration is valid.".to_string()
            } else {
                format!(
                    "Configuration is valid with {} warning(s).",
                    self.warnings.len()
                )
            }
        } else {
            format!(
                "Configuration is invalid with {} error(s).",
                self.errors.len()
            )
        }
    }

    /// Multi-line report listing every error and warning.
    #[must_use]
    pub fn verbose_report(&self) -> String {
        let mut lines = vec![
            "Configuration Validation Report".to_string(),
            "\u{2500}".repeat(50),
        ];

        if !self.errors.is_empty() {
            lines.push(String::new());
            lines.push(format!("Errors ({}):", self.errors.len()));
            for error in &self.errors {
                lines.push(format!("  \u{2717} {}", error));
            }
        }

        if !self.warnings.is_empty() {
            lines.push(String::new());
            lines.push(format!("Warnings ({}):", self.warnings.len()));
            for warning in &self.warnings {
                lines.push(format!("  \u{26a0} {}", warning));
            }
        }

        lines.push(String::new());
        lines.push(format!("Status: {}", self.summary()));
        lines.join("\n")
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

pub(super) fn validate(config: &CampaignConfig) -> ValidationReport {
    let mut report = ValidationReport::new();

    // Account identity
    let username = config.username.trim();
    if username.is_empty() {
        report.error("username must not be empty");
    } else if username.contains(['/', '\\']) || username.starts_with('.') {
        report.error(format!(
            "username '{}' cannot be used as a directory name",
            config.username
        ));
    }
    if config.app_id.trim().is_empty() {
        report.error("app_id must not be empty");
    }

    // Ranges
    let mut ranges = vec![("restart_wait".to_string(), config.restart_wait)];
    if let Some(r) = config.time_delta {
        ranges.push(("time_delta".to_string(), r));
    }
    if let Some(r) = config.repeat {
        ranges.push(("repeat".to_string(), r));
    }
    ranges.extend(
        config
            .limits
            .entries()
            .into_iter()
            .map(|(limit, r)| (format!("limits.{limit}"), r)),
    );
    for (field, range) in ranges {
        if range.is_inverted() {
            report.error(format!(
                "{field} range {}-{} has its bounds inverted",
                range.min(),
                range.max()
            ));
        }
    }

    // Session budget
    match config.total_sessions {
        Some(n) if n < -1 => report.error(format!(
            "total_sessions must be -1 (unlimited) or a positive count, got {n}"
        )),
        Some(0) => report.warn("total_sessions = 0 runs a single session"),
        Some(n) if n > 1 && config.repeat.is_none() => report.warn(format!(
            "total_sessions = {n} has no effect without repeat"
        )),
        _ => {}
    }

    // Working hours
    for window in &config.working_hours {
        if window.start() == window.end() {
            report.warn(format!(
                "working window {window} is a single instant; the loop will mostly wait"
            ));
        }
    }

    // Thresholds
    let thresholds = [
        ("interaction.reinteract_after_hours", config.interaction.reinteract_after_hours),
        ("interaction.unfollow_after_days", config.interaction.unfollow_after_days),
        ("interaction.recheck_after_hours", config.interaction.recheck_after_hours),
    ];
    for (field, value) in thresholds {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                report.error(format!("{field} must be a non-negative number, got {v}"));
            }
        }
    }

    // Crash handling
    if config.max_crashes == 0 {
        report.warn("max_crashes = 0 stops the session at the first transient error");
    }
    if config.open_attempts == 0 {
        report.error("open_attempts must be at least 1");
    }

    // Device
    if config.device.profile_command.is_empty() {
        report.error("device.profile_command is required to read the operator profile");
    }
    if config.device.command_timeout_secs == 0 {
        report.error("device.command_timeout_secs must be at least 1");
    }

    // Hooks
    for (field, script) in [
        ("pre_script", &config.pre_script),
        ("post_script", &config.post_script),
    ] {
        if let Some(path) = script {
            if !path.exists() {
                report.warn(format!("{field} {} does not exist", path.display()));
            }
        }
    }

    // Jobs
    if config.jobs.is_empty() {
        report.warn("no jobs configured; sessions will only wake the device and read the profile");
    }
    let mut seen = HashSet::new();
    for job in &config.jobs {
        if job.name.trim().is_empty() {
            report.error("job name must not be empty");
            continue;
        }
        if !seen.insert(job.name.as_str()) {
            report.error(format!("duplicate job name '{}'", job.name));
        }
        if job.command.is_empty() {
            report.error(format!("job '{}' has no command", job.name));
        }
    }
    let has_unfollow = config.jobs.iter().any(|j| j.kind == JobKind::Unfollow);
    if has_unfollow && config.interaction.unfollow_after_days.is_none() {
        report.warn(
            "unfollow jobs are configured but interaction.unfollow_after_days is not set; nobody will be eligible",
        );
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JobConfig, ValueRange};

    fn valid_config() -> CampaignConfig {
        let mut config = CampaignConfig::new("alice");
        config.device.profile_command = vec!["driver".to_string(), "profile".to_string()];
        config.jobs.push(JobConfig {
            name: "blogger-followers".to_string(),
            kind: JobKind::Active,
            target: Some("somebody".to_string()),
            command: vec!["driver".to_string()],
        });
        config
    }

    #[test]
    fn test_validation_report_new_is_valid() {
        let report = ValidationReport::new();
        assert!(report.is_valid());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.summary(), "Configuration is valid.");
    }

    #[test]
    fn test_validation_report_summary_invalid() {
        let mut report = ValidationReport::new();
        report.error("one");
        report.error("two");
        assert!(!report.is_valid());
        assert_eq!(report.exit_code(), 7);
        assert_eq!(report.summary(), "Configuration is invalid with 2 error(s).");
    }

    #[test]
    fn test_verbose_report_lists_everything() {
        let mut report = ValidationReport::new();
        report.error("Test error");
        report.warn("Test warning");
        let verbose = report.verbose_report();
        assert!(verbose.contains("Errors (1):"));
        assert!(verbose.contains("Test error"));
        assert!(verbose.contains("Warnings (1):"));
        assert!(verbose.contains("Status:"));
    }

    #[test]
    fn test_valid_config_passes() {
        let report = valid_config().validate();
        assert!(report.is_valid(), "{:?}", report.errors);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn test_inverted_range_is_error() {
        let mut config = valid_config();
        config.limits.likes = Some(ValueRange::new(150, 100));
        let report = config.validate();
        assert!(!report.is_valid());
        assert!(report.errors.iter().any(|e| e.contains("limits.likes")));
    }

    #[test]
    fn test_duplicate_job_names() {
        let mut config = valid_config();
        let job = config.jobs[0].clone();
        config.jobs.push(job);
        let report = config.validate();
        assert!(report.errors.iter().any(|e| e.contains("duplicate")));
    }

    #[test]
    fn test_job_without_command() {
        let mut config = valid_config();
        config.jobs[0].command.clear();
        let report = config.validate();
        assert!(report.errors.iter().any(|e| e.contains("no command")));
    }

    #[test]
    fn test_empty_jobs_and_zero_crashes_warn() {
        let mut config = valid_config();
        config.jobs.clear();
        config.max_crashes = 0;
        let report = config.validate();
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_bad_total_sessions() {
        let mut config = valid_config();
        config.total_sessions = Some(-5);
        assert!(!config.validate().is_valid());
    }

    #[test]
    fn test_missing_profile_command() {
        let mut config = valid_config();
        config.device.profile_command.clear();
        let report = config.validate();
        assert!(report.errors.iter().any(|e| e.contains("profile_command")));
    }

    #[test]
    fn test_unfollow_without_threshold_warns() {
        let mut config = valid_config();
        config.jobs[0].kind = JobKind::Unfollow;
        let report = config.validate();
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|w| w.contains("unfollow_after_days")));
    }
}
