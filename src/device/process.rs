//! External process execution shared by the adb device and command jobs.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use super::{DeviceError, DeviceResult};
use crate::r#loop::retry::FailureClassifier;

/// Captured result of one process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Turn a failed invocation into a classified [`DeviceError`].
    ///
    /// Stderr is classified first; when it is empty stdout is used, and a
    /// silent failure becomes a command error naming the exit status.
    pub fn into_error(self, program: &str, classifier: &FailureClassifier) -> DeviceError {
        let output = if self.stderr.trim().is_empty() {
            self.stdout.as_str()
        } else {
            self.stderr.as_str()
        };
        if output.trim().is_empty() {
            let status = self
                .status
                .map_or_else(|| "a signal".to_string(), |code| format!("status {code}"));
            return DeviceError::command(program, format!("exited with {status}"));
        }
        classifier.classify(output)
    }
}

/// Run `program args...` to completion, killing it after `timeout`.
///
/// # Errors
///
/// [`DeviceError::Timeout`] when the deadline passes and
/// [`DeviceError::Command`] when the process cannot be spawned. A non-zero
/// exit is not an error here; callers inspect [`ProcessOutput::success`].
pub async fn run(program: &str, args: &[String], timeout: Duration) -> DeviceResult<ProcessOutput> {
    run_with_env(program, args, &[], timeout).await
}

/// [`run`] with extra environment variables.
pub async fn run_with_env(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    timeout: Duration,
) -> DeviceResult<ProcessOutput> {
    debug!(program, ?args, "Spawning process");
    let child = Command::new(program)
        .args(args)
        .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DeviceError::command(program, e.to_string()))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(ProcessOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
        Ok(Err(e)) => Err(DeviceError::command(program, e.to_string())),
        Err(_) => Err(DeviceError::timeout(format!(
            "{program} did not finish within {}s",
            timeout.as_secs()
        ))),
    }
}

/// Split a configured command line into program and arguments.
pub fn split_command(command: &[String]) -> DeviceResult<(&str, &[String])> {
    command
        .split_first()
        .map(|(program, args)| (program.as_str(), args))
        .ok_or_else(|| DeviceError::other("empty command line"))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_run_captures_output() {
        let output = run("sh", &sh("echo out; echo err >&2"), Duration::from_secs(5))
            .await
            .expect("run");
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let err = run("sh", &sh("sleep 5"), Duration::from_millis(100))
            .await
            .expect_err("should time out");
        assert!(matches!(err, DeviceError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_command_error() {
        let err = run("/nonexistent/cadence-test-binary", &[], Duration::from_secs(1))
            .await
            .expect_err("should fail");
        assert!(matches!(err, DeviceError::Command { .. }));
    }

    #[tokio::test]
    async fn test_failed_output_is_classified() {
        let classifier = FailureClassifier::new();
        let output = run("sh", &sh("echo 'IndexError: list index out of range' >&2; exit 1"), Duration::from_secs(5))
            .await
            .expect("run");
        assert!(!output.success());
        assert!(matches!(
            output.into_error("sh", &classifier),
            DeviceError::IndexOutOfRange { .. }
        ));
    }

    #[tokio::test]
    async fn test_silent_failure_names_status() {
        let classifier = FailureClassifier::new();
        let output = run("sh", &sh("exit 3"), Duration::from_secs(5))
            .await
            .expect("run");
        match output.into_error("sh", &classifier) {
            DeviceError::Command { message, .. } => assert!(message.contains("status 3")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_with_env() {
        let envs = vec![("CADENCE_JOB".to_string(), "likes".to_string())];
        let output = run_with_env("sh", &sh("echo $CADENCE_JOB"), &envs, Duration::from_secs(5))
            .await
            .expect("run");
        assert_eq!(output.stdout.trim(), "likes");
    }

    #[test]
    fn test_split_command() {
        let cmd = vec!["python3".to_string(), "driver.py".to_string()];
        let (program, args) = split_command(&cmd).expect("split");
        assert_eq!(program, "python3");
        assert_eq!(args, &["driver.py".to_string()]);
        assert!(split_command(&[]).is_err());
    }
}
