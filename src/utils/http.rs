// src/utils/http.rs

//! HTTP client utilities.
//!
//! [`RateLimitedClient`] wraps a `reqwest::Client` with a fixed timeout and
//! retries HTTP 429 responses with exponential backoff plus jitter. Every
//! other failure is returned to the caller on the first attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::error::{CallError, Result};
use crate::models::RetryConfig;
use crate::utils::clock::Sleeper;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(user_agent: &str, timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Upper bound on a single backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Backoff policy for throttled calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per logical call, including the first one
    pub max_attempts: u32,
    /// Delay before retry `n` is `backoff_base^n` seconds plus jitter
    pub backoff_base: f64,
    /// Add `uniform(0, 1)` seconds to every delay
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: f64) -> Self {
        Self {
            max_attempts,
            backoff_base,
            jitter: true,
        }
    }

    /// Policy that gives up on the first throttled response.
    pub fn no_retry() -> Self {
        Self::new(1, 2.0)
    }

    /// Delay to wait after the given zero-based failed attempt, capped at
    /// [`MAX_BACKOFF`].
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter {
            rand::rng().random::<f64>()
        } else {
            0.0
        };
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        Duration::try_from_secs_f64(self.backoff_base.powi(exponent) + jitter)
            .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, 2.0)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.backoff_base)
    }
}

/// Run `op` until it succeeds, fails with something other than
/// `RateLimited`, or the attempt budget is spent.
///
/// `op` receives the zero-based attempt number. The attempt counter lives in
/// this call only; nothing is shared between logical calls.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    endpoint: &str,
    mut op: F,
) -> std::result::Result<T, CallError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, CallError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match op(attempt).await {
            Err(CallError::RateLimited { .. }) if attempt + 1 < max_attempts => {
                let delay = policy.delay(attempt);
                log::warn!(
                    "Rate limited by {}. Retrying in {:.2}s (attempt {}/{})",
                    endpoint,
                    delay.as_secs_f64(),
                    attempt + 1,
                    max_attempts
                );
                sleeper.sleep(delay).await;
                attempt += 1;
            }
            Err(CallError::RateLimited { endpoint, .. }) => {
                return Err(CallError::RateLimited {
                    endpoint,
                    attempts: attempt + 1,
                });
            }
            other => return other,
        }
    }
}

/// Send a request and decode a JSON body, classifying every failure.
pub async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    endpoint: &str,
) -> std::result::Result<T, CallError> {
    let response = request
        .send()
        .await
        .map_err(|e| CallError::from_reqwest(endpoint, &e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        return Err(CallError::from_status(endpoint, status, body));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| CallError::from_reqwest(endpoint, &e))?;
    serde_json::from_slice(&bytes).map_err(|e| CallError::invalid_response(endpoint, e))
}

/// HTTP client with timeout and throttling-aware retry.
#[derive(Clone)]
pub struct RateLimitedClient {
    client: Client,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RateLimitedClient {
    pub fn new(client: Client, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            client,
            policy,
            sleeper,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Perform one logical call.
    ///
    /// `build` is invoked once per attempt because a sent `RequestBuilder`
    /// cannot be reused. `endpoint` is only used for logs and errors, so it
    /// must not contain credentials.
    pub async fn call<T, F>(&self, endpoint: &str, build: F) -> std::result::Result<T, CallError>
    where
        T: DeserializeOwned + Send,
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let client = &self.client;
        let build = &build;
        with_retry(&self.policy, self.sleeper.as_ref(), endpoint, move |_| {
            let request = build(client);
            async move { send_json(request, endpoint).await }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::VirtualClock;

    fn throttled() -> CallError {
        CallError::RateLimited {
            endpoint: "test".into(),
            attempts: 1,
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let clock = VirtualClock::new();
        let policy = RetryPolicy::default();
        let mut calls = 0u32;

        let result = with_retry(&policy, &clock, "test", |_| {
            calls += 1;
            let outcome = if calls <= 3 { Err(throttled()) } else { Ok(42) };
            async move { outcome }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls, 4);

        let sleeps = clock.sleeps();
        assert_eq!(sleeps.len(), 3);
        for (attempt, delay) in sleeps.iter().enumerate() {
            let floor = 2f64.powi(attempt as i32);
            let secs = delay.as_secs_f64();
            assert!(secs >= floor, "delay {secs} below {floor}");
            assert!(secs <= floor + 1.0, "delay {secs} above {}", floor + 1.0);
        }
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let clock = VirtualClock::new();
        let policy = RetryPolicy::new(5, 2.0);
        let mut calls = 0u32;

        let result: std::result::Result<(), _> = with_retry(&policy, &clock, "test", |_| {
            calls += 1;
            async { Err(throttled()) }
        })
        .await;

        assert_eq!(calls, 5);
        assert_eq!(clock.sleeps().len(), 4);
        assert!(matches!(
            result,
            Err(CallError::RateLimited { attempts: 5, .. })
        ));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let clock = VirtualClock::new();
        let policy = RetryPolicy::default();
        let mut calls = 0u32;

        let result: std::result::Result<(), _> = with_retry(&policy, &clock, "test", |_| {
            calls += 1;
            async {
                Err(CallError::ClientError {
                    endpoint: "test".into(),
                    status: 400,
                    body: "bad".into(),
                })
            }
        })
        .await;

        assert_eq!(calls, 1);
        assert!(clock.sleeps().is_empty());
        assert!(matches!(result, Err(CallError::ClientError { status: 400, .. })));
    }

    #[tokio::test]
    async fn test_network_error_is_not_retried() {
        let clock = VirtualClock::new();
        let mut calls = 0u32;

        let result: std::result::Result<(), _> =
            with_retry(&RetryPolicy::default(), &clock, "test", |_| {
                calls += 1;
                async {
                    Err(CallError::Timeout {
                        endpoint: "test".into(),
                    })
                }
            })
            .await;

        assert_eq!(calls, 1);
        assert!(result.unwrap_err().is_transient());
    }

    #[test]
    fn test_delay_without_jitter_is_exact() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_is_capped() {
        let huge = RetryPolicy::new(5, 1e7);
        assert_eq!(huge.delay(3), MAX_BACKOFF);

        let nan = RetryPolicy::new(5, f64::NAN);
        assert_eq!(nan.delay(1), MAX_BACKOFF);

        let infinite = RetryPolicy::new(5, f64::INFINITY);
        assert_eq!(infinite.delay(2), MAX_BACKOFF);

        assert!(RetryPolicy::default().delay(0) < Duration::from_secs(2));
    }

    #[test]
    fn test_no_retry_policy() {
        assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
    }
}
