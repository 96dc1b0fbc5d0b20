//! Failure classification and bounded retry.
//!
//! This module owns the vocabulary the supervisor uses to decide what to do
//! with a failed job, the regex classifier that turns driver output into
//! typed [`DeviceError`]s, and the generic [`retry`] helper used for
//! idempotent setup steps such as opening the application.
//!
//! # Architecture
//!
//! ```text
//! driver stderr ──FailureClassifier──> DeviceError ──class()──> FailureClass
//!                                                                   │
//!                                                                   ▼
//!                                                               Supervisor
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use cadence::r#loop::retry::{retry, RetryConfig};
//!
//! let opened = retry(&RetryConfig::default(), |e: &DeviceError| e.class().is_restartable(), |_| {
//!     device.open_app()
//! })
//! .await?;
//! if opened.is_none() {
//!     // every attempt failed; caller decides: persist and stop
//! }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::device::DeviceError;

// ============================================================================
// Backoff Constants and Calculation
// ============================================================================

/// Base backoff delay in milliseconds for retry attempts.
pub const RETRY_BACKOFF_BASE_MS: u64 = 2000;

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Multiplier for exponential backoff.
pub const BACKOFF_MULTIPLIER: u64 = 2;

/// Calculate exponential backoff delay for a given attempt number.
///
/// # Example
///
/// ```rust
/// use cadence::r#loop::retry::calculate_backoff;
/// use std::time::Duration;
///
/// assert_eq!(calculate_backoff(1), Duration::from_millis(2000));
/// assert_eq!(calculate_backoff(2), Duration::from_millis(4000));
/// assert_eq!(calculate_backoff(3), Duration::from_millis(8000));
/// ```
#[must_use]
pub fn calculate_backoff(attempt: u32) -> Duration {
    backoff_from(RETRY_BACKOFF_BASE_MS, attempt)
}

/// Exponential backoff starting at `base_ms`, capped at [`MAX_BACKOFF_MS`].
#[must_use]
pub fn backoff_from(base_ms: u64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let multiplier = BACKOFF_MULTIPLIER.saturating_pow(exponent);
    let delay = base_ms.saturating_mul(multiplier);
    Duration::from_millis(delay.min(MAX_BACKOFF_MS))
}

// ============================================================================
// Failure Classification
// ============================================================================

/// How the supervisor treats a failed job invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// User asked to pause; prompt before continuing
    Pause,
    /// Target application died; always eligible for restart
    AppCrash,
    /// Recoverable automation hiccup; counts toward the crash ceiling
    Transient,
    /// Unknown state; persist diagnostics and abort
    Fatal,
}

impl FailureClass {
    /// Get a human-readable description of this failure class.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Pause => "Paused by user",
            Self::AppCrash => "Application crash",
            Self::Transient => "Transient automation error",
            Self::Fatal => "Unclassified failure",
        }
    }

    /// Whether the restart sequence can recover from this class.
    #[must_use]
    pub fn is_restartable(&self) -> bool {
        matches!(self, Self::AppCrash | Self::Transient)
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Error shapes the classifier can recognize in driver output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorShape {
    AppCrashed,
    Timeout,
    Malformed,
    IndexOutOfRange,
    UiObjectNotFound,
    EmptyResult,
}

impl ErrorShape {
    fn into_error(self, line: String) -> DeviceError {
        match self {
            Self::AppCrashed => DeviceError::AppCrashed { message: line },
            Self::Timeout => DeviceError::Timeout { operation: line },
            Self::Malformed => DeviceError::MalformedResponse { message: line },
            Self::IndexOutOfRange => DeviceError::IndexOutOfRange { message: line },
            Self::UiObjectNotFound => DeviceError::UiObjectNotFound { selector: line },
            Self::EmptyResult => DeviceError::EmptyResult { message: line },
        }
    }
}

/// Classifies raw driver output (usually stderr) into a [`DeviceError`].
pub struct FailureClassifier {
    /// Compiled regex patterns for classification.
    patterns: Vec<(Regex, ErrorShape)>,
}

impl FailureClassifier {
    /// Create a new classifier with default patterns.
    #[must_use]
    pub fn new() -> Self {
        // More specific patterns must come BEFORE more general ones
        let patterns = vec![
            (r"(?i)app(lication)? (has )?crashed", ErrorShape::AppCrashed),
            (r"(?i)has stopped", ErrorShape::AppCrashed),
            (r"(?i)process .*(died|not running)", ErrorShape::AppCrashed),
            (r"(?i)ui ?object ?not ?found", ErrorShape::UiObjectNotFound),
            (r"(?i)no such (element|view)", ErrorShape::UiObjectNotFound),
            (r"(?i)index ?error", ErrorShape::IndexOutOfRange),
            (r"(?i)index out of (range|bounds)", ErrorShape::IndexOutOfRange),
            (r"(?i)json ?decode ?error", ErrorShape::Malformed),
            (r"(?i)malformed|invalid (json|xml)", ErrorShape::Malformed),
            (r"(?i)timed? ?out", ErrorShape::Timeout),
            (r"(?i)empty (result|list|response)", ErrorShape::EmptyResult),
        ];

        let compiled: Vec<_> = patterns
            .into_iter()
            .filter_map(|(pattern, shape)| Regex::new(pattern).ok().map(|re| (re, shape)))
            .collect();

        Self { patterns: compiled }
    }

    /// Classify an output string.
    ///
    /// The matching line becomes the error message; unmatched output is
    /// treated as [`DeviceError::Other`] with its first non-empty line.
    pub fn classify(&self, output: &str) -> DeviceError {
        for (regex, shape) in &self.patterns {
            if let Some(line) = output.lines().find(|line| regex.is_match(line)) {
                debug!("Classified driver output as {:?}", shape);
                return shape.into_error(line.trim().to_string());
            }
        }

        let first = output
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("Unknown error");
        DeviceError::other(first)
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Bounded Retry
// ============================================================================

/// Configuration for [`retry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// First backoff delay; doubles per attempt.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: RETRY_BACKOFF_BASE_MS,
        }
    }
}

impl RetryConfig {
    /// Set the number of attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Set the base backoff delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }
}

/// Re-invoke `op` until it succeeds, at most `config.max_attempts` times.
///
/// Only errors for which `is_retryable` returns true are retried. After the
/// last failed attempt this returns `Ok(None)` so the caller can choose the
/// next step. `op` receives the 1-indexed attempt number.
///
/// # Errors
///
/// The first non-retryable error is returned as is.
pub async fn retry<T, E, F, Fut, P>(
    config: &RetryConfig,
    is_retryable: P,
    mut op: F,
) -> std::result::Result<Option<T>, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let attempts = config.max_attempts.max(1);
    for attempt in 1..=attempts {
        match op(attempt).await {
            Ok(value) => return Ok(Some(value)),
            Err(e) if is_retryable(&e) => {
                warn!("Attempt {}/{} failed: {}", attempt, attempts, e);
                if attempt < attempts {
                    tokio::time::sleep(backoff_from(config.base_delay_ms, attempt)).await;
                }
            }
            Err(e) => {
                error!("Attempt {} failed with a non-retryable error: {}", attempt, e);
                return Err(e);
            }
        }
    }
    warn!("Giving up after {} attempts", attempts);
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_calculate_backoff_doubles_and_caps() {
        assert_eq!(calculate_backoff(1), Duration::from_millis(2000));
        assert_eq!(calculate_backoff(2), Duration::from_millis(4000));
        assert_eq!(calculate_backoff(10), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(backoff_from(0, 5), Duration::ZERO);
    }

    #[test]
    fn test_failure_class_restartable() {
        assert!(FailureClass::AppCrash.is_restartable());
        assert!(FailureClass::Transient.is_restartable());
        assert!(!FailureClass::Pause.is_restartable());
        assert!(!FailureClass::Fatal.is_restartable());
    }

    #[test]
    fn test_classifier_recognizes_crash() {
        let classifier = FailureClassifier::new();
        let err = classifier.classify("Traceback...\nAppHasCrashed: Instagram has stopped\n");
        assert!(matches!(err, DeviceError::AppCrashed { .. }));
    }

    #[test]
    fn test_classifier_recognizes_transient_shapes() {
        let classifier = FailureClassifier::new();
        assert!(matches!(
            classifier.classify("IndexError: list index out of range"),
            DeviceError::IndexOutOfRange { .. }
        ));
        assert!(matches!(
            classifier.classify("uiautomator2.UiObjectNotFoundError: follow"),
            DeviceError::UiObjectNotFound { .. }
        ));
        assert!(matches!(
            classifier.classify("json.decoder.JSONDecodeError: Expecting value"),
            DeviceError::MalformedResponse { .. }
        ));
        assert!(matches!(
            classifier.classify("requests.exceptions.ConnectTimeout: timed out"),
            DeviceError::Timeout { .. }
        ));
        assert!(matches!(
            classifier.classify("empty result from dump"),
            DeviceError::EmptyResult { .. }
        ));
    }

    #[test]
    fn test_classifier_unknown_is_fatal() {
        let classifier = FailureClassifier::new();
        let err = classifier.classify("\n  KeyError: 'username'\n");
        assert_eq!(err, DeviceError::other("KeyError: 'username'"));
        assert_eq!(err.class(), FailureClass::Fatal);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default().with_base_delay_ms(0);
        let result = retry(
            &config,
            |_: &DeviceError| true,
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(DeviceError::timeout("opening app"))
                    } else {
                        Ok(attempt)
                    }
                }
            },
        )
        .await;
        assert_eq!(result, Ok(Some(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_returns_none_after_exhaustion() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default()
            .with_max_attempts(3)
            .with_base_delay_ms(0);
        let result: Result<Option<()>, DeviceError> = retry(
            &config,
            |e: &DeviceError| e.class() == FailureClass::AppCrash,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DeviceError::app_crashed("died")) }
            },
        )
        .await;
        assert_eq!(result, Ok(None));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_returns_non_retryable_error() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default().with_base_delay_ms(0);
        let result: Result<Option<()>, DeviceError> = retry(
            &config,
            |e: &DeviceError| e.class() == FailureClass::AppCrash,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DeviceError::other("unknown")) }
            },
        )
        .await;
        assert_eq!(result, Err(DeviceError::other("unknown")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
