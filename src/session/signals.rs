//! Cooperative interrupt handling.
//!
//! Ctrl-C never cancels a device call. It bumps a counter that the session
//! loop observes at checkpoints:
//!
//! ```text
//! Ctrl-C ──► Interrupts (count += 1)
//!               │
//!               ├─► JobContext::checkpoint()  → DeviceError::Interrupted → pause prompt
//!               ├─► pause prompt              → second Ctrl-C = graceful stop
//!               └─► Interrupts::sleep()       → long waits end early
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use cadence::session::signals::{Interrupts, SleepOutcome};
//!
//! let interrupts = Interrupts::new();
//! interrupts.listen();
//!
//! if interrupts.sleep(Duration::from_secs(3600)).await == SleepOutcome::Interrupted {
//!     // shut down gracefully
//! }
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// How an interruptible sleep ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    Completed,
    Interrupted,
}

/// Shared interrupt counter.
///
/// Cloning is cheap and every clone observes the same counter.
#[derive(Debug, Clone)]
pub struct Interrupts {
    tx: Arc<watch::Sender<u32>>,
    acknowledged: Arc<AtomicU32>,
}

impl Default for Interrupts {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupts {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            tx: Arc::new(tx),
            acknowledged: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Spawn a task that counts Ctrl-C presses for the process lifetime.
    pub fn listen(&self) -> JoinHandle<()> {
        let interrupts = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                interrupts.trigger();
                info!("Interrupt received");
            }
        })
    }

    /// Record one interrupt.
    pub fn trigger(&self) {
        self.tx.send_modify(|count| *count += 1);
    }

    /// Total interrupts received.
    #[must_use]
    pub fn count(&self) -> u32 {
        *self.tx.borrow()
    }

    /// An interrupt arrived that nobody has acted on yet.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.count() > self.acknowledged.load(Ordering::SeqCst)
    }

    /// Mark every interrupt so far as handled.
    pub fn acknowledge(&self) {
        self.acknowledged.store(self.count(), Ordering::SeqCst);
    }

    /// Resolve on the next interrupt after this call.
    pub async fn wait(&self) {
        self.wait_past(self.count()).await;
    }

    /// Resolve once more than `seen` interrupts have been received.
    ///
    /// Taking the count before a prompt and waiting past it closes the gap
    /// between printing the prompt and subscribing.
    pub async fn wait_past(&self, seen: u32) {
        let mut rx = self.tx.subscribe();
        while *rx.borrow_and_update() <= seen {
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `duration` unless interrupted first.
    ///
    /// An interrupt that is already pending ends the sleep immediately.
    pub async fn sleep(&self, duration: Duration) -> SleepOutcome {
        if self.is_requested() {
            return SleepOutcome::Interrupted;
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => SleepOutcome::Completed,
            () = self.wait() => SleepOutcome::Interrupted,
        }
    }
}

/// Source of the operator's "resume" answer while paused.
#[async_trait]
pub trait ResumePrompt: Send + Sync {
    /// Resolve when the operator asks to resume.
    async fn wait_for_resume(&self);
}

/// Resume on RETURN from stdin. With stdin closed it never resumes, so
/// only a second interrupt ends the pause.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinResume;

#[async_trait]
impl ResumePrompt for StdinResume {
    async fn wait_for_resume(&self) {
        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        match reader.read_line(&mut line).await {
            Ok(n) if n > 0 => {}
            _ => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_and_acknowledge() {
        let interrupts = Interrupts::new();
        assert!(!interrupts.is_requested());

        interrupts.trigger();
        assert_eq!(interrupts.count(), 1);
        assert!(interrupts.is_requested());

        interrupts.acknowledge();
        assert!(!interrupts.is_requested());

        let clone = interrupts.clone();
        clone.trigger();
        assert!(interrupts.is_requested());
    }

    #[tokio::test]
    async fn test_sleep_completes() {
        let interrupts = Interrupts::new();
        let outcome = interrupts.sleep(Duration::from_millis(5)).await;
        assert_eq!(outcome, SleepOutcome::Completed);
    }

    #[tokio::test]
    async fn test_sleep_interrupted_by_trigger() {
        let interrupts = Interrupts::new();
        let trigger = interrupts.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });

        let outcome = interrupts.sleep(Duration::from_secs(30)).await;
        assert_eq!(outcome, SleepOutcome::Interrupted);
    }

    #[tokio::test]
    async fn test_wait_past_sees_earlier_interrupt() {
        let interrupts = Interrupts::new();
        let seen = interrupts.count();
        interrupts.trigger();
        tokio::time::timeout(Duration::from_secs(1), interrupts.wait_past(seen))
            .await
            .expect("should resolve immediately");
    }

    #[tokio::test]
    async fn test_sleep_returns_immediately_when_pending() {
        let interrupts = Interrupts::new();
        interrupts.trigger();
        let outcome = interrupts.sleep(Duration::from_secs(30)).await;
        assert_eq!(outcome, SleepOutcome::Interrupted);
    }
}
