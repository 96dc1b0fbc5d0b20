//! Jobs backed by an external driver command.
//!
//! The command is invoked once per unit of work and prints one JSON object
//! on its last stdout line:
//!
//! - an interaction (`{"username": "bob", "liked": 2, "followed": true}`),
//!   which is recorded before the next invocation,
//! - a candidate (`{"candidate": "bob"}`), answered on the next invocation
//!   through `CADENCE_CANDIDATE` and `CADENCE_VERDICT`,
//! - a filter result (`{"filter": {"username": "bob", "profile": {..},
//!   "skip_reason": "PRIVATE_ACCOUNT"}}`); a null reason means the profile
//!   passed and an empty one keeps the stored reason,
//! - `{"done": false}` when there was nothing to do this round, or
//! - `{"done": true}`, which ends the job.
//!
//! The session context is passed in environment variables so the driver can
//! consult the account's store files:
//!
//! | Variable                         | Value                              |
//! |----------------------------------|------------------------------------|
//! | `CADENCE_ACCOUNT`                | operator username                  |
//! | `CADENCE_ACCOUNT_DIR`            | `accounts/<username>`              |
//! | `CADENCE_JOB`                    | job name                           |
//! | `CADENCE_TARGET`                 | job target                         |
//! | `CADENCE_SESSION_ID`             | current session UUID               |
//! | `CADENCE_DEVICE`                 | device serial, when configured     |
//! | `CADENCE_REINTERACT_AFTER_HOURS` | interaction threshold, when set    |
//! | `CADENCE_UNFOLLOW_AFTER_DAYS`    | unfollow threshold, when set       |
//! | `CADENCE_RECHECK_AFTER_HOURS`    | filter recheck threshold, when set |
//! | `CADENCE_CANDIDATE`              | last candidate reported            |
//! | `CADENCE_VERDICT`                | its [`Eligibility`]                |
//!
//! A non-zero exit is classified from stderr like any device error.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{Eligibility, Job, JobContext, JobKind};
use crate::config::JobConfig;
use crate::device::process;
use crate::device::{DeviceError, DeviceResult};
use crate::r#loop::retry::FailureClassifier;
use crate::storage::{InteractionUpdate, ProfileSnapshot, SkipUpdate};

/// Consecutive `{"done": false}` rounds after which the job ends.
pub const DEFAULT_IDLE_ROUNDS: u32 = 3;

/// Pause between idle rounds.
pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_secs(5);

/// One line of driver output.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Step {
    Done { done: bool },
    Candidate { candidate: String },
    Filter { filter: FilterStep },
    Interaction(InteractionUpdate),
}

#[derive(Debug, Deserialize)]
struct FilterStep {
    username: String,
    #[serde(default)]
    profile: ProfileSnapshot,
    #[serde(default)]
    skip_reason: Option<String>,
}

/// Job that delegates each unit of work to an external command.
pub struct CommandJob {
    name: String,
    kind: JobKind,
    target: String,
    command: Vec<String>,
    timeout: Duration,
    idle_rounds: u32,
    idle_wait: Duration,
    classifier: FailureClassifier,
}

impl CommandJob {
    #[must_use]
    pub fn new(config: &JobConfig, timeout: Duration) -> Self {
        Self {
            name: config.name.clone(),
            kind: config.kind,
            target: config.target_label().to_string(),
            command: config.command.clone(),
            timeout,
            idle_rounds: DEFAULT_IDLE_ROUNDS,
            idle_wait: DEFAULT_IDLE_WAIT,
            classifier: FailureClassifier::new(),
        }
    }

    /// End the job after `rounds` consecutive idle replies, waiting `wait`
    /// between them.
    #[must_use]
    pub fn with_idle(mut self, rounds: u32, wait: Duration) -> Self {
        self.idle_rounds = rounds.max(1);
        self.idle_wait = wait;
        self
    }

    fn env(&self, ctx: &JobContext<'_>, verdict: Option<&(String, Eligibility)>) -> Vec<(String, String)> {
        let mut env = vec![
            ("CADENCE_ACCOUNT".to_string(), ctx.account.username().to_string()),
            (
                "CADENCE_ACCOUNT_DIR".to_string(),
                ctx.account.dir().to_string_lossy().into_owned(),
            ),
            ("CADENCE_JOB".to_string(), self.name.clone()),
            ("CADENCE_TARGET".to_string(), self.target.clone()),
            ("CADENCE_SESSION_ID".to_string(), ctx.session.id.to_string()),
        ];
        if let Some(serial) = &ctx.config.device_id {
            env.push(("CADENCE_DEVICE".to_string(), serial.clone()));
        }

        let interaction = &ctx.config.interaction;
        let thresholds = [
            ("CADENCE_REINTERACT_AFTER_HOURS", interaction.reinteract_after_hours),
            ("CADENCE_UNFOLLOW_AFTER_DAYS", interaction.unfollow_after_days),
            ("CADENCE_RECHECK_AFTER_HOURS", interaction.recheck_after_hours),
        ];
        env.extend(
            thresholds
                .into_iter()
                .filter_map(|(key, value)| value.map(|v| (key.to_string(), v.to_string()))),
        );

        if let Some((candidate, eligibility)) = verdict {
            env.push(("CADENCE_CANDIDATE".to_string(), candidate.clone()));
            env.push(("CADENCE_VERDICT".to_string(), eligibility.to_string()));
        }
        env
    }

    async fn step(&self, ctx: &JobContext<'_>, verdict: Option<&(String, Eligibility)>) -> DeviceResult<Step> {
        let (program, args) = process::split_command(&self.command)?;
        let output =
            process::run_with_env(program, args, &self.env(ctx, verdict), self.timeout).await?;
        if !output.success() {
            return Err(output.into_error(program, &self.classifier));
        }
        parse_step(&output.stdout)
    }
}

fn parse_step(stdout: &str) -> DeviceResult<Step> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| DeviceError::EmptyResult {
            message: "job command printed nothing".to_string(),
        })?;
    serde_json::from_str(line)
        .map_err(|e| DeviceError::malformed(format!("job output '{line}': {e}")))
}

#[async_trait]
impl Job for CommandJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> JobKind {
        self.kind
    }

    fn target(&self) -> &str {
        &self.target
    }

    async fn run(&self, ctx: &mut JobContext<'_>) -> DeviceResult<()> {
        let mut units = 0u32;
        let mut idle = 0u32;
        let mut verdict: Option<(String, Eligibility)> = None;
        loop {
            ctx.checkpoint()?;
            if !ctx.can_continue(self.kind) {
                info!(job = %self.name, "Limit reached after {} units: {}", units, ctx.session.limit_summary());
                return Ok(());
            }

            let step = self.step(ctx, verdict.as_ref()).await?;
            verdict = None;
            match step {
                Step::Done { done: true } => {
                    info!(job = %self.name, "Finished after {} units", units);
                    return Ok(());
                }
                Step::Done { done: false } => {
                    idle += 1;
                    if idle >= self.idle_rounds {
                        info!(job = %self.name, "No work in {} rounds, finishing after {} units", idle, units);
                        return Ok(());
                    }
                    debug!(job = %self.name, "Driver reported no work this round");
                    // An interrupted wait is picked up by the next checkpoint.
                    ctx.interrupts.sleep(self.idle_wait).await;
                    continue;
                }
                Step::Candidate { candidate } => {
                    let eligibility = ctx.eligibility(self.kind, &candidate);
                    debug!(job = %self.name, user = %candidate, "Candidate is {}", eligibility);
                    verdict = Some((candidate, eligibility));
                }
                Step::Filter { filter } => {
                    debug!(job = %self.name, user = %filter.username, "Recording filter result");
                    let skip = SkipUpdate::from_reason(filter.skip_reason.as_deref());
                    ctx.record_filter(&filter.username, filter.profile, skip)?;
                }
                Step::Interaction(update) => {
                    debug!(job = %self.name, user = %update.username, "Recording unit of work");
                    ctx.record(update)?;
                    units += 1;
                }
            }
            idle = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_step_done() {
        assert!(matches!(
            parse_step("{\"done\": true}\n"),
            Ok(Step::Done { done: true })
        ));
    }

    #[test]
    fn test_parse_step_interaction_uses_last_line() {
        let out = "driver: scrolling\n{\"username\": \"bob\", \"liked\": 2}\n\n";
        match parse_step(out) {
            Ok(Step::Interaction(update)) => {
                assert_eq!(update.username, "bob");
                assert_eq!(update.liked, 2);
                assert!(update.update_status);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_step_candidate_and_filter() {
        assert!(matches!(
            parse_step("{\"candidate\": \"bob\"}"),
            Ok(Step::Candidate { candidate }) if candidate == "bob"
        ));
        let out = r#"{"filter": {"username": "carol", "profile": {"followers": 10, "is_private": true}, "skip_reason": "PRIVATE_ACCOUNT"}}"#;
        match parse_step(out) {
            Ok(Step::Filter { filter }) => {
                assert_eq!(filter.username, "carol");
                assert_eq!(filter.profile.followers, Some(10));
                assert_eq!(filter.skip_reason.as_deref(), Some("PRIVATE_ACCOUNT"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_step_errors_are_transient() {
        assert!(matches!(
            parse_step("   \n"),
            Err(DeviceError::EmptyResult { .. })
        ));
        assert!(matches!(
            parse_step("not json"),
            Err(DeviceError::MalformedResponse { .. })
        ));
    }

    #[cfg(unix)]
    mod process_tests {
        use super::super::*;
        use crate::session::{Interrupts, Limit, SessionLimits, SessionState};
        use crate::testing::{AccountFixture, MockDevice};

        fn job(script: &str) -> CommandJob {
            let config = JobConfig {
                name: "likes".to_string(),
                kind: JobKind::Active,
                target: Some("somebody".to_string()),
                command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            };
            CommandJob::new(&config, Duration::from_secs(5))
        }

        #[tokio::test]
        async fn test_command_job_stops_at_limit() {
            let fixture = AccountFixture::new("alice");
            let mut store = fixture.store();
            let mut session = SessionState::new(SessionLimits::unlimited().with(Limit::Likes, 3), 5);
            let device = MockDevice::new();
            let config = fixture.config();
            let account = fixture.account();
            let interrupts = Interrupts::new();

            let job = job(r#"echo "{\"username\": \"user$$\", \"liked\": 1}""#);
            let mut ctx = JobContext::new(&device, &config, &account, &mut store, &mut session, &[], &interrupts);
            ctx.enter(&job);
            job.run(&mut ctx).await.expect("run");

            assert_eq!(session.total_likes, 3);
            assert_eq!(store.len(), 3);
        }

        #[tokio::test]
        async fn test_command_job_done_and_env() {
            let fixture = AccountFixture::new("alice");
            let mut store = fixture.store();
            let mut session = SessionState::new(SessionLimits::unlimited(), 5);
            let device = MockDevice::new();
            let config = fixture.config();
            let account = fixture.account();
            let interrupts = Interrupts::new();

            // Interact once with a user named after the target, then finish
            let marker = fixture.dir().join("ran");
            let script = format!(
                r#"if [ -e {m} ]; then echo '{{"done": true}}'; else touch {m}; echo "{{\"username\": \"$CADENCE_TARGET\", \"followed\": true}}"; fi"#,
                m = marker.display()
            );
            let job = job(&script);
            let mut ctx = JobContext::new(&device, &config, &account, &mut store, &mut session, &[], &interrupts);
            ctx.enter(&job);
            job.run(&mut ctx).await.expect("run");

            assert!(store.record("somebody").is_some_and(|r| r.followed));
            assert_eq!(session.count(Limit::Follows), 1);
        }

        #[tokio::test]
        async fn test_idle_driver_ends_job() {
            let fixture = AccountFixture::new("alice");
            let mut store = fixture.store();
            let mut session = SessionState::new(SessionLimits::unlimited().with(Limit::Total, 3), 5);
            let device = MockDevice::new();
            let config = fixture.config();
            let account = fixture.account();
            let interrupts = Interrupts::new();

            let calls = fixture.dir().join("calls");
            let script = format!(r#"echo x >> {}; echo '{{"done": false}}'"#, calls.display());
            let job = job(&script).with_idle(3, Duration::from_millis(10));
            let mut ctx = JobContext::new(&device, &config, &account, &mut store, &mut session, &[], &interrupts);
            ctx.enter(&job);

            tokio::time::timeout(Duration::from_secs(10), job.run(&mut ctx))
                .await
                .expect("idle job must end")
                .expect("run");
            let invocations = std::fs::read_to_string(&calls).expect("calls").lines().count();
            assert_eq!(invocations, 3);
            assert!(store.is_empty());
        }

        #[tokio::test]
        async fn test_candidate_verdict_and_filter_reach_the_store() {
            let fixture = AccountFixture::new("alice").with_blacklist(&["spammer"]);
            let mut store = fixture.store();
            let mut session = SessionState::new(SessionLimits::unlimited(), 5);
            let device = MockDevice::new();
            let mut config = fixture.config();
            config.interaction.recheck_after_hours = Some(24.0);
            let account = fixture.account();
            let interrupts = Interrupts::new();

            // Ask about spammer, then stranger. Record the verdict for spammer
            // as a filter result and like stranger once it is eligible.
            let seen = fixture.dir().join("seen");
            let script = format!(
                r#"case "$CADENCE_CANDIDATE:$CADENCE_VERDICT" in
  spammer:listed) echo "$CADENCE_RECHECK_AFTER_HOURS" > {seen}; echo '{{"filter": {{"username": "spammer", "skip_reason": "blacklisted"}}}}' ;;
  stranger:eligible) echo '{{"username": "stranger", "liked": 1}}' ;;
  *) if [ -e {seen}.2 ]; then echo '{{"done": true}}'; elif [ -e {seen} ]; then touch {seen}.2; echo '{{"candidate": "stranger"}}'; else echo '{{"candidate": "spammer"}}'; fi ;;
esac"#,
                seen = fixture.dir().join("seen").display()
            );
            let job = job(&script);
            let mut ctx = JobContext::new(&device, &config, &account, &mut store, &mut session, &[], &interrupts);
            ctx.enter(&job);
            job.run(&mut ctx).await.expect("run");

            assert_eq!(std::fs::read_to_string(&seen).expect("seen").trim(), "24");
            let filter = store.filter_record("spammer").expect("filter stored");
            assert_eq!(filter.skip_reason.as_ref().map(|r| r.as_str()), Some("BLACKLISTED"));
            assert!(store.record("spammer").is_none());
            assert_eq!(store.record("stranger").map(|r| r.liked), Some(1));
            assert_eq!(session.total_likes, 1);
        }

        #[tokio::test]
        async fn test_command_job_failure_is_classified() {
            let fixture = AccountFixture::new("alice");
            let mut store = fixture.store();
            let mut session = SessionState::new(SessionLimits::unlimited(), 5);
            let device = MockDevice::new();
            let config = fixture.config();
            let account = fixture.account();
            let interrupts = Interrupts::new();

            let job = job("echo 'uiautomator2.UiObjectNotFoundError: like' >&2; exit 1");
            let mut ctx = JobContext::new(&device, &config, &account, &mut store, &mut session, &[], &interrupts);
            ctx.enter(&job);
            let err = job.run(&mut ctx).await.expect_err("should fail");
            assert!(matches!(err, DeviceError::UiObjectNotFound { .. }));
        }
    }
}
