//! Bounded retry with linear backoff.
//!
//! # Classification
//!
//! - 2xx → success, loop exits
//! - 5xx → retryable
//! - any other status (4xx, and 1xx/3xx since redirects are not followed) →
//!   terminal, returned immediately without retry
//! - transport failures (connection refused, reset, timeout) → retryable
//!
//! # Schedule
//!
//! The delay before attempt `k + 1` is `base_delay * k`: linear, no jitter.
//! The schedule is part of the observable contract, so a policy of 3 attempts
//! at 100ms spends exactly 100ms + 200ms waiting before it gives up.

use crate::error::AttemptFailure;
use reqwest::{RequestBuilder, Response, StatusCode};
use tether_types::RetryPolicy;

/// Outcome of an attempt loop.
///
/// This is a sum type that structurally distinguishes success from the two
/// terminal failure shapes, ensuring callers cannot accidentally treat an
/// error response as success.
#[derive(Debug)]
pub enum RetryOutcome {
    /// 2xx response.
    Success(Response),
    /// Non-retryable HTTP status, returned on the attempt that produced it.
    Terminal(Response),
    /// Retryable failures consumed the whole attempt budget. `last` is the
    /// failure recorded on the final attempt.
    Exhausted { attempts: u32, last: AttemptFailure },
}

impl RetryOutcome {
    /// Returns true if this is a successful response.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Whether a response status is eligible for another attempt.
#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
}

fn status_failure(status: StatusCode) -> AttemptFailure {
    AttemptFailure::Status {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or("unknown").to_string(),
    }
}

/// Send a request with bounded retries and linear backoff.
///
/// `build_request` is called once per attempt, so every attempt issues a
/// fresh request. Attempts are numbered from 1 and never exceed the policy's
/// budget; the backoff sleep is non-blocking.
pub async fn send_with_retry<F>(build_request: F, policy: RetryPolicy) -> RetryOutcome
where
    F: Fn() -> RequestBuilder,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1u32;

    loop {
        let failure = match build_request().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return RetryOutcome::Success(response);
                }
                if !is_retryable_status(status) {
                    return RetryOutcome::Terminal(response);
                }
                status_failure(status)
            }
            Err(error) => AttemptFailure::Transport(error),
        };

        if attempt >= max_attempts {
            return RetryOutcome::Exhausted {
                attempts: attempt,
                last: failure,
            };
        }

        let delay = policy.delay_after(attempt);
        tracing::debug!(
            failure = %failure,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Retrying after retryable failure"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::is_retryable_status;
    use reqwest::StatusCode;

    #[test]
    fn server_errors_are_retryable() {
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::GATEWAY_TIMEOUT));
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
    }

    #[test]
    fn redirects_are_not_retryable() {
        assert!(!is_retryable_status(StatusCode::MOVED_PERMANENTLY));
        assert!(!is_retryable_status(StatusCode::SEE_OTHER));
    }
}

#[cfg(test)]
mod integration_tests {
    use super::{RetryOutcome, send_with_retry};
    use crate::error::AttemptFailure;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, Instant};
    use tether_types::RetryPolicy;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Fast schedule so the suite stays quick.
    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::from_parts(max_attempts, 1).unwrap()
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/test", server.uri());

        let outcome = send_with_retry(|| client.get(&url), fast_policy(3)).await;

        match outcome {
            RetryOutcome::Success(response) => {
                assert_eq!(response.status(), StatusCode::OK);
                assert_eq!(response.text().await.unwrap(), "ok");
            }
            other => panic!("expected Success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retries_500_then_succeeds() {
        let server = MockServer::start().await;
        let attempt = AtomicU32::new(0);

        Mock::given(method("GET"))
            .and(path("/test"))
            .respond_with(move |_: &wiremock::Request| {
                let n = attempt.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    ResponseTemplate::new(500)
                } else {
                    ResponseTemplate::new(200).set_body_string("ok")
                }
            })
            .expect(2)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/test", server.uri());

        let outcome = send_with_retry(|| client.get(&url), fast_policy(3)).await;
        assert!(outcome.is_success(), "expected Success, got {outcome:?}");
    }

    #[tokio::test]
    async fn always_500_is_attempted_exactly_max_attempts_times() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/test"))
            .respond_with(ResponseTemplate::new(503))
            .expect(4)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/test", server.uri());

        let outcome = send_with_retry(|| client.get(&url), fast_policy(4)).await;

        match outcome {
            RetryOutcome::Exhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert!(matches!(last, AttemptFailure::Status { status: 503, .. }));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_error_is_terminal_on_first_attempt() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/test"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/test", server.uri());

        let outcome = send_with_retry(|| client.get(&url), fast_policy(3)).await;

        match outcome {
            RetryOutcome::Terminal(response) => {
                assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            }
            other => panic!("expected Terminal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connection_refused_is_retried_then_exhausted() {
        // Nothing listens here; every attempt fails at the transport layer.
        let url = "http://127.0.0.1:9/unreachable";
        let client = reqwest::Client::new();

        let outcome = send_with_retry(|| client.get(url), fast_policy(2)).await;

        match outcome {
            RetryOutcome::Exhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(last, AttemptFailure::Transport(_)));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn backoff_delays_grow_linearly() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/test"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/test", server.uri());
        let policy = RetryPolicy::from_parts(3, 50).unwrap();

        let started = Instant::now();
        let outcome = send_with_retry(|| client.get(&url), policy).await;
        let elapsed = started.elapsed();

        assert!(matches!(outcome, RetryOutcome::Exhausted { .. }));
        // 50ms after attempt 1, 100ms after attempt 2.
        assert!(
            elapsed >= Duration::from_millis(150),
            "expected >= 150ms of backoff, took {elapsed:?}"
        );
    }
}
