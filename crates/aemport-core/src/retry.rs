//! Bounded exponential-backoff retry for collaborator calls.
//!
//! Classification of errors is a pure function ([`classify_error`]) kept
//! apart from the retry loop. Fatal errors return immediately without
//! spending retry budget.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collaborator::CollaboratorOutput;
use crate::domain::{CollaboratorError, PortError};
use crate::obs;

/// Whether a failed call is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Retryable,
    Fatal,
}

/// Message fragments that mark an otherwise unclassified error as permanent.
const FATAL_MARKERS: &[&str] = &[
    "invalid",
    "not found",
    "permission denied",
    "authentication",
    "authorization",
    "api key",
];

/// Classify a collaborator failure.
pub fn classify_error(err: &CollaboratorError) -> ErrorClass {
    match err {
        CollaboratorError::Connection(_)
        | CollaboratorError::Timeout(_)
        | CollaboratorError::RateLimited(_)
        | CollaboratorError::Unavailable(_)
        | CollaboratorError::MalformedResponse(_) => ErrorClass::Retryable,
        CollaboratorError::Unauthorized(_)
        | CollaboratorError::InvalidConfig(_)
        | CollaboratorError::MalformedInput(_) => ErrorClass::Fatal,
        CollaboratorError::Other(msg) => {
            let msg = msg.to_lowercase();
            if FATAL_MARKERS.iter().any(|marker| msg.contains(marker)) {
                ErrorClass::Fatal
            } else {
                ErrorClass::Retryable
            }
        }
    }
}

/// Backoff configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Add up to one second of uniform random delay per retry.
    pub jitter: bool,
}

impl RetryPolicy {
    /// 3 retries, 1s base, doubling, capped at 60s, jittered.
    pub const DEFAULT: Self = Self {
        max_retries: 3,
        base_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(60),
        multiplier: 2.0,
        jitter: true,
    };

    /// Single attempt, no retries.
    pub const NONE: Self = Self {
        max_retries: 0,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        multiplier: 1.0,
        jitter: false,
    };

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (0-indexed), without jitter.
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    fn sleep_for(&self, retry: u32) -> Duration {
        let delay = self.delay_for_attempt(retry);
        if !self.jitter {
            return delay;
        }
        let jittered = delay + Duration::from_secs_f64(rand::random::<f64>());
        jittered.min(self.max_delay.max(delay))
    }

    /// Problems with this policy, for configuration validation.
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            out.push(format!("retry multiplier must be >= 1.0, got {}", self.multiplier));
        }
        if self.max_delay < self.base_delay {
            out.push("retry max delay is below base delay".to_string());
        }
        out
    }

    /// Run `operation` until it succeeds, fails fatally, or the budget is spent.
    /// The closure receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, name: &str, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, CollaboratorError>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation(attempt).await {
                Ok(value) => return RetryOutcome::Success(value),
                Err(e) => {
                    if classify_error(&e) == ErrorClass::Fatal {
                        return RetryOutcome::Fatal(e);
                    }
                    if attempt >= max_attempts {
                        return RetryOutcome::Exhausted {
                            last_error: e,
                            attempts: attempt,
                        };
                    }
                    let delay = self.sleep_for(attempt - 1);
                    obs::emit_collaborator_retry(name, attempt, delay.as_millis() as u64, &e);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Like [`run`](Self::run) for calls that report through
    /// [`CollaboratorOutput`]. `Structured` and `Raw` are returned as-is;
    /// `Failed` is retried when retryable and returned once the budget is spent.
    pub async fn run_output<T, F, Fut>(&self, name: &str, mut operation: F) -> CollaboratorOutput<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = CollaboratorOutput<T>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation(attempt).await {
                CollaboratorOutput::Failed(e) => {
                    if classify_error(&e) == ErrorClass::Fatal || attempt >= max_attempts {
                        return CollaboratorOutput::Failed(e);
                    }
                    let delay = self.sleep_for(attempt - 1);
                    obs::emit_collaborator_retry(name, attempt, delay.as_millis() as u64, &e);
                    tokio::time::sleep(delay).await;
                }
                delivered => return delivered,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Result of a retried call.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Success(T),
    /// Retryable failures used up the budget.
    Exhausted {
        last_error: CollaboratorError,
        attempts: u32,
    },
    /// A non-retryable failure; returned on the attempt it occurred.
    Fatal(CollaboratorError),
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success(_))
    }

    pub fn into_result(self, operation: &str) -> crate::domain::Result<T> {
        match self {
            RetryOutcome::Success(v) => Ok(v),
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => Err(PortError::RetriesExhausted {
                operation: operation.to_string(),
                attempts,
                last_error,
            }),
            RetryOutcome::Fatal(e) => Err(PortError::Collaborator(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            classify_error(&CollaboratorError::Timeout("t".into())),
            ErrorClass::Retryable
        );
        assert_eq!(
            classify_error(&CollaboratorError::Unauthorized("u".into())),
            ErrorClass::Fatal
        );
        assert_eq!(
            classify_error(&CollaboratorError::Other("Invalid API key provided".into())),
            ErrorClass::Fatal
        );
        assert_eq!(
            classify_error(&CollaboratorError::Other("socket hang up".into())),
            ErrorClass::Retryable
        );
    }

    #[test]
    fn test_delays_grow_and_cap() {
        let p = RetryPolicy {
            max_delay: Duration::from_secs(5),
            ..policy(10)
        };
        assert_eq!(p.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(p.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(p.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(p.delay_for_attempt(3), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_within_cap() {
        let p = RetryPolicy {
            jitter: true,
            max_delay: Duration::from_secs(2),
            ..policy(3)
        };
        for retry in 0..5 {
            assert!(p.sleep_for(retry) <= Duration::from_secs(2));
        }
    }

    #[test]
    fn test_policy_problems() {
        let p = RetryPolicy {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(1),
            multiplier: 0.5,
            ..policy(1)
        };
        assert_eq!(p.problems().len(), 2);
        assert!(RetryPolicy::DEFAULT.problems().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();
        let outcome = policy(3)
            .run("analyze", |_| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(CollaboratorError::Connection("reset".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert!(matches!(outcome, RetryOutcome::Success(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_consumes_no_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let outcome: RetryOutcome<()> = policy(5)
            .run("generate", |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(CollaboratorError::InvalidConfig("no model".into()))
                }
            })
            .await;

        assert!(matches!(outcome, RetryOutcome::Fatal(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_attempts() {
        let outcome: RetryOutcome<()> = policy(2)
            .run("review", |_| async {
                Err(CollaboratorError::Unavailable("503".into()))
            })
            .await;

        match outcome {
            RetryOutcome::Exhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {other:?}"),
        }
        let err = policy(0)
            .run("review", |_| async { Err::<(), _>(CollaboratorError::Timeout("t".into())) })
            .await
            .into_result("review")
            .unwrap_err();
        assert!(matches!(err, PortError::RetriesExhausted { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_output_returns_raw_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let out: CollaboratorOutput<u8> = policy(3)
            .run_output("validate", |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    CollaboratorOutput::Raw("looks fine".to_string())
                }
            })
            .await;
        assert!(matches!(out, CollaboratorOutput::Raw(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
