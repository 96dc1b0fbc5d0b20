//! Pre- and post-session hook scripts.
//!
//! A hook is an executable run once before the device is woken and once
//! after the app is closed. It receives the account and session through
//! environment variables. A failing hook is logged and the session goes on.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::account::Account;
use crate::device::process;
use crate::error::{CadenceError, Result};

/// Longest a hook may run before it is killed.
pub const HOOK_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// When a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    PreSession,
    PostSession,
}

impl HookPhase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreSession => "pre-session",
            Self::PostSession => "post-session",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environment passed to a hook script.
fn hook_env(phase: HookPhase, account: &Account, session_id: Option<Uuid>) -> Vec<(String, String)> {
    let mut envs = vec![
        ("CADENCE_HOOK".to_string(), phase.to_string()),
        ("CADENCE_ACCOUNT".to_string(), account.username().to_string()),
        (
            "CADENCE_ACCOUNT_DIR".to_string(),
            account.dir().display().to_string(),
        ),
    ];
    if let Some(id) = session_id {
        envs.push(("CADENCE_SESSION_ID".to_string(), id.to_string()));
    }
    envs
}

/// Run `script` for `phase`.
///
/// # Errors
///
/// [`CadenceError::Hook`] when the script cannot be started, times out or
/// exits non-zero.
pub async fn run_hook(
    phase: HookPhase,
    script: &Path,
    account: &Account,
    session_id: Option<Uuid>,
    timeout: Duration,
) -> Result<()> {
    let program = script.display().to_string();
    info!("Running {} hook {}", phase, program);

    let envs = hook_env(phase, account, session_id);
    let output = process::run_with_env(&program, &[], &envs, timeout)
        .await
        .map_err(|e| CadenceError::hook(phase.as_str(), e.to_string()))?;

    for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
        debug!(hook = %phase, "{}", line);
    }

    if !output.success() {
        let detail = output.stderr.trim();
        let status = output
            .status
            .map_or_else(|| "a signal".to_string(), |code| format!("status {code}"));
        return Err(CadenceError::hook(
            phase.as_str(),
            if detail.is_empty() {
                format!("exited with {status}")
            } else {
                format!("exited with {status}: {detail}")
            },
        ));
    }
    Ok(())
}

/// Run the hook if one is configured, logging a failure instead of
/// returning it.
pub async fn run_optional(
    phase: HookPhase,
    script: Option<&Path>,
    account: &Account,
    session_id: Option<Uuid>,
) {
    let Some(script) = script else {
        return;
    };
    if let Err(e) = run_hook(phase, script, account, session_id, HOOK_TIMEOUT).await {
        warn!("{}", e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("chmod");
        path
    }

    #[tokio::test]
    async fn test_hook_receives_environment() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let account = Account::new(temp_dir.path(), "alice");
        let out = temp_dir.path().join("env.txt");
        let hook = script(
            temp_dir.path(),
            "pre.sh",
            &format!(
                "echo \"$CADENCE_HOOK $CADENCE_ACCOUNT $CADENCE_SESSION_ID\" > {}",
                out.display()
            ),
        );
        let id = Uuid::new_v4();

        run_hook(HookPhase::PreSession, &hook, &account, Some(id), HOOK_TIMEOUT)
            .await
            .expect("hook runs");
        let written = std::fs::read_to_string(out).expect("read env");
        assert_eq!(written.trim(), format!("pre-session alice {id}"));
    }

    #[tokio::test]
    async fn test_failing_hook_is_a_hook_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let account = Account::new(temp_dir.path(), "alice");
        let hook = script(temp_dir.path(), "post.sh", "echo broken >&2; exit 4");

        let err = run_hook(HookPhase::PostSession, &hook, &account, None, HOOK_TIMEOUT)
            .await
            .expect_err("non-zero exit");
        assert!(matches!(err, CadenceError::Hook { .. }));
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_missing_hook_is_logged_only() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let account = Account::new(temp_dir.path(), "alice");
        let missing = temp_dir.path().join("nope.sh");
        run_optional(HookPhase::PreSession, Some(missing.as_path()), &account, None).await;
        run_optional(HookPhase::PreSession, None, &account, None).await;
    }
}
