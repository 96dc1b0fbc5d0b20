//! Session loop module.
//!
//! - [`manager`] - The session loop that runs sessions and jobs
//! - [`schedule`] - Working-hours and repeat waits
//! - [`retry`] - Failure classification and bounded retry
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │ SessionLoop │────>│ Supervisor   │────>│ Job         │
//! │             │     │              │     │             │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!       │                    │                    │
//!       v                    v                    v
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │ schedule    │     │ retry /      │     │ Interaction │
//! │ (waits)     │     │ classifier   │     │ Store       │
//! └─────────────┘     └──────────────┘     └─────────────┘
//! ```

pub mod manager;
pub mod retry;
pub mod schedule;

pub use manager::{RunOutcome, SessionLoop};
pub use retry::{retry, FailureClass, FailureClassifier, RetryConfig};
