//! Core domain types for Tether.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

mod registry;
pub use registry::{EndpointError, EndpointRegistry, ServiceEndpoint};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Service Names
// ============================================================================

/// The unique key a backend service is registered under.
///
/// Names are trimmed, rejected when empty or containing whitespace, and
/// normalized to ASCII uppercase so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceName(String);

#[derive(Debug, Error)]
pub enum ServiceNameError {
    #[error("service name must not be empty")]
    Empty,
    #[error("service name must not contain whitespace (got {0:?})")]
    Whitespace(String),
}

impl ServiceName {
    pub fn new(value: impl Into<String>) -> Result<Self, ServiceNameError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ServiceNameError::Empty);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(ServiceNameError::Whitespace(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for ServiceName {
    type Error = ServiceNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ServiceName {
    type Error = ServiceNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServiceName> for String {
    fn from(value: ServiceName) -> Self {
        value.0
    }
}

impl AsRef<str> for ServiceName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// Policies
// ============================================================================

/// Default wall-clock budget for a guarded operation, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Environment variable overriding [`DEFAULT_TIMEOUT_MS`] process-wide.
/// The value is a positive integer of milliseconds, read once at startup.
pub const TIMEOUT_ENV_VAR: &str = "TETHER_REQUEST_TIMEOUT_MS";

/// Wall-clock budget for a single awaited operation.
///
/// Fixed at construction; there is no way to change the duration of a policy
/// already handed to a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    duration: Duration,
}

#[derive(Debug, Error)]
#[error("timeout duration must be a positive number of milliseconds")]
pub struct ZeroTimeoutError;

impl TimeoutPolicy {
    pub fn from_millis(millis: u64) -> Result<Self, ZeroTimeoutError> {
        if millis == 0 {
            return Err(ZeroTimeoutError);
        }
        Ok(Self {
            duration: Duration::from_millis(millis),
        })
    }

    #[must_use]
    pub const fn duration(self) -> Duration {
        self.duration
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

/// Bounded-attempt schedule for retryable failures.
///
/// The delay before attempt `k + 1` is `base_delay * k`, so a policy of
/// 3 attempts at 100ms waits 100ms then 200ms before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: NonZeroU32,
    base_delay: Duration,
}

#[derive(Debug, Error)]
pub enum RetryPolicyError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("base delay must be a positive number of milliseconds")]
    ZeroDelay,
}

impl RetryPolicy {
    /// Construct from already-validated parts.
    #[must_use]
    pub const fn new(max_attempts: NonZeroU32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Construct from raw configuration values.
    pub fn from_parts(max_attempts: u32, base_delay_ms: u64) -> Result<Self, RetryPolicyError> {
        let max_attempts = NonZeroU32::new(max_attempts).ok_or(RetryPolicyError::ZeroAttempts)?;
        if base_delay_ms == 0 {
            return Err(RetryPolicyError::ZeroDelay);
        }
        Ok(Self {
            max_attempts,
            base_delay: Duration::from_millis(base_delay_ms),
        })
    }

    #[must_use]
    pub const fn max_attempts(self) -> u32 {
        self.max_attempts.get()
    }

    #[must_use]
    pub const fn base_delay(self) -> Duration {
        self.base_delay
    }

    /// The non-blocking wait inserted after a failed attempt.
    ///
    /// `attempt` is 1-based; the delay grows linearly with it.
    #[must_use]
    pub fn delay_after(self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: NonZeroU32::new(3).expect("3 is non-zero"),
            base_delay: Duration::from_millis(250),
        }
    }
}

// ============================================================================
// Alert Priority
// ============================================================================

/// Alert severity on the 1 (informational) to 5 (critical) scale used by
/// notification sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct AlertPriority(u8);

#[derive(Debug, Error)]
#[error("alert priority must be between 1 and 5 (got {0})")]
pub struct AlertPriorityError(u8);

impl AlertPriority {
    pub const LOW: Self = Self(1);
    pub const HIGH: Self = Self(4);
    pub const CRITICAL: Self = Self(5);

    pub fn new(value: u8) -> Result<Self, AlertPriorityError> {
        if (1..=5).contains(&value) {
            Ok(Self(value))
        } else {
            Err(AlertPriorityError(value))
        }
    }

    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for AlertPriority {
    type Error = AlertPriorityError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AlertPriority> for u8 {
    fn from(value: AlertPriority) -> Self {
        value.0
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Ambient session credential attached to outbound requests as
/// `Authorization: Bearer <token>`.
///
/// Note: `Debug` is manually implemented to redact the token value, preventing
/// accidental credential disclosure in logs or error messages.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

#[derive(Debug, Error)]
#[error("bearer token must not be empty")]
pub struct EmptyTokenError;

impl BearerToken {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyTokenError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyTokenError)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BearerToken(<redacted>)")
    }
}
