//! End-to-end session loop scenarios against the mock device.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use cadence::config::{CampaignConfig, ValueRange};
use cadence::jobs::{JobKind, JobRegistry};
use cadence::r#loop::{RetryConfig, RunOutcome, SessionLoop};
use cadence::session::{Interrupts, Limit, ResumePrompt, SessionHistory};
use cadence::storage::InteractionStore;
use cadence::supervisor::Supervisor;
use cadence::{Account, DeviceError, InteractionUpdate, MockDevice, MockResume, ScriptedJob, StopReason};
use tempfile::TempDir;

fn config() -> CampaignConfig {
    let mut config = CampaignConfig::new("alice");
    config.restart_wait = ValueRange::fixed(0);
    config.device.profile_command = vec!["driver".to_string(), "profile".to_string()];
    config
}

fn build(account: &Account, config: CampaignConfig, device: Arc<MockDevice>, jobs: Vec<ScriptedJob>) -> SessionLoop {
    let registry = jobs
        .into_iter()
        .try_fold(JobRegistry::new(), |registry, job| registry.with_job(Arc::new(job)))
        .expect("register jobs");
    let resume: Arc<dyn ResumePrompt> = Arc::new(MockResume::resuming());
    SessionLoop::new(config, account.clone(), device, registry, Interrupts::new(), resume.clone())
        .expect("session loop")
        .with_supervisor(Supervisor::new(resume).with_open_retry(RetryConfig::default().with_base_delay_ms(0)))
}

#[tokio::test]
async fn test_total_limit_blocks_sixth_interaction() {
    let temp = TempDir::new().expect("temp dir");
    let account = Account::new(temp.path(), "alice");
    let mut config = config();
    config.limits.total = Some(ValueRange::fixed(5));

    let blocked = Arc::new(AtomicU32::new(0));
    let seen_blocked = blocked.clone();
    let job = ScriptedJob::new("blogger-followers", JobKind::Active, move |ctx, _| {
        for n in 0..10 {
            ctx.checkpoint()?;
            if !ctx.can_act(Limit::Total) {
                seen_blocked.fetch_add(1, Ordering::SeqCst);
                break;
            }
            ctx.record(InteractionUpdate::new(format!("user{n}")).with_likes(1))?;
        }
        Ok(())
    })
    .with_target("somebody");

    let device = Arc::new(MockDevice::new());
    let mut session_loop = build(&account, config, device, vec![job]);
    let outcome = session_loop.run().await.expect("run");
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(blocked.load(Ordering::SeqCst), 1);

    let store = InteractionStore::load(&account).expect("store");
    assert_eq!(store.len(), 5);
    assert!(store.record("user4").is_some());
    assert!(store.record("user5").is_none());

    let history = SessionHistory::load(&account).expect("history");
    let session = &history.sessions()[0];
    assert_eq!(session.count(Limit::Total), 5);
    assert_eq!(session.total_interactions.get("somebody"), Some(&5));
    let record = store.record("user0").expect("record");
    assert_eq!(record.session_id.as_deref(), Some(session.id.to_string().as_str()));
    assert_eq!(record.job_name.as_deref(), Some("blogger-followers"));
}

#[tokio::test]
async fn test_crash_ceiling_stops_run_with_history() {
    let temp = TempDir::new().expect("temp dir");
    let account = Account::new(temp.path(), "alice");
    let mut config = config();
    config.max_crashes = 3;
    config.repeat = Some(ValueRange::fixed(0));

    let job = ScriptedJob::completing("feed").with_failures(vec![
        DeviceError::timeout("feed"),
        DeviceError::timeout("feed"),
        DeviceError::timeout("feed"),
        DeviceError::timeout("feed"),
    ]);
    let device = Arc::new(MockDevice::new());
    let mut session_loop = build(&account, config, device.clone(), vec![job]);

    let outcome = session_loop.run().await.expect("run");
    assert_eq!(outcome, RunOutcome::Stopped(StopReason::CrashLimit));
    assert_eq!(outcome.exit_code(), 3);
    // one open at session start plus three restarts
    assert_eq!(device.open_calls(), 4);

    let history = SessionHistory::load(&account).expect("history");
    assert_eq!(history.len(), 1, "no second session after a crash stop");
    let session = &history.sessions()[0];
    assert_eq!(session.total_crashes, 4);
    assert!(session.is_finished());
    assert_eq!(session.stop_reason.as_deref(), Some("crash limit reached"));
}

#[tokio::test]
async fn test_history_accumulates_across_runs() {
    let temp = TempDir::new().expect("temp dir");
    let account = Account::new(temp.path(), "alice");

    for _ in 0..2 {
        let device = Arc::new(MockDevice::new());
        let mut session_loop = build(&account, config(), device, vec![ScriptedJob::completing("noop")]);
        session_loop.run().await.expect("run");
    }

    let history = SessionHistory::load(&account).expect("history");
    assert_eq!(history.len(), 2);
    assert!(history.sessions()[0].start_time <= history.sessions()[1].start_time);
}
