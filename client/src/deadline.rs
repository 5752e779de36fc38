//! Wall-clock deadline enforcement for arbitrary asynchronous operations.
//!
//! The guard races a timer against the operation with [`tokio::time::timeout`];
//! whichever settles first decides the outcome. Cancellation is cooperative:
//! when the timer wins, the losing future is dropped and any work it already
//! dispatched may continue headless. Callers must treat such work as
//! side-effect-only and never act on a late result.

use std::future::Future;
use std::sync::OnceLock;
use tether_types::{TIMEOUT_ENV_VAR, TimeoutPolicy};

/// Errors that can stand in for a missed deadline.
///
/// The guard is generic over its error type so it can bound any fallible
/// operation, not just HTTP calls.
pub trait DeadlineError {
    /// The error produced when the timer wins the race.
    fn deadline_exceeded(policy: TimeoutPolicy) -> Self;

    /// Whether this error already represents a timeout. Timeouts raised
    /// inside the operation itself are re-labeled through
    /// [`DeadlineError::deadline_exceeded`]; everything else passes through
    /// verbatim.
    fn is_timeout(&self) -> bool;
}

/// Process-wide default deadline policy.
///
/// Reads [`TIMEOUT_ENV_VAR`] once; unparseable or non-positive values fall
/// back to the 30s default. Later changes to the environment have no effect.
pub fn default_policy() -> TimeoutPolicy {
    static POLICY: OnceLock<TimeoutPolicy> = OnceLock::new();
    *POLICY.get_or_init(|| {
        std::env::var(TIMEOUT_ENV_VAR)
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .and_then(|millis| TimeoutPolicy::from_millis(millis).ok())
            .unwrap_or_default()
    })
}

/// Await `op`, bounding it to the policy's duration.
///
/// Returns the operation's own result when it settles first; returns
/// `E::deadline_exceeded(policy)` when the timer settles first. The guarded
/// future is dropped on expiry, so its result, if any, is discarded.
pub async fn run_with_deadline<T, E, F>(policy: TimeoutPolicy, op: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: DeadlineError,
{
    match tokio::time::timeout(policy.duration(), op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) if error.is_timeout() => Err(E::deadline_exceeded(policy)),
        Ok(Err(error)) => Err(error),
        Err(_elapsed) => Err(E::deadline_exceeded(policy)),
    }
}
