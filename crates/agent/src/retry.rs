//! Retry policy around stream sessions.
//!
//! Every attempt runs a fresh [`StreamSession`]; its events go straight to
//! the caller, so text from an attempt that later fails stays visible.
//! Only the final outcome's terminal event is forwarded: a failure that
//! will be retried is logged, not emitted.

use std::sync::Arc;
use std::time::Duration;

use ancient_config::RetryConfig;
use ancient_core::error::ErrorKind;
use ancient_core::provider::{Provider, ProviderRequest};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::session::{SessionOutcome, StreamSession};
use crate::stream_event::StreamEvent;

/// Maximum retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Wait before the first rate-limit retry; doubles on each later one.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after waiting this long.
    Retry(Duration),
    /// Retryable, but the budget is spent.
    Exhausted,
    /// Not worth retrying.
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, Duration::from_millis(config.base_delay_ms))
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Wait before retrying after a failure of `kind` on `attempt` (0-based),
    /// or `None` when `kind` is never retried.
    ///
    /// Rate limits back off exponentially; connection and decode failures
    /// retry at once.
    pub fn delay_for(&self, kind: ErrorKind, attempt: u32) -> Option<Duration> {
        if !kind.is_retryable() {
            return None;
        }
        Some(match kind {
            ErrorKind::RateLimited => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt.min(30))),
            _ => Duration::ZERO,
        })
    }

    pub fn decide(&self, kind: ErrorKind, attempt: u32) -> RetryDecision {
        match self.delay_for(kind, attempt) {
            None => RetryDecision::Fatal,
            Some(_) if attempt >= self.max_retries => RetryDecision::Exhausted,
            Some(delay) => RetryDecision::Retry(delay),
        }
    }

    /// Run attempts until one completes, a failure is fatal, or the budget
    /// is spent. The terminal event of the returned outcome has already
    /// been sent to `sink` (except on cancellation, where nobody listens).
    pub async fn run(
        &self,
        provider: &Arc<dyn Provider>,
        request: &ProviderRequest,
        sink: &mpsc::Sender<StreamEvent>,
    ) -> SessionOutcome {
        let mut attempt = 0;
        loop {
            debug!(attempt, provider = %provider.name(), model = %request.model, "Starting attempt");
            let mut session = StreamSession::new(Arc::clone(provider), request.clone());
            let outcome = session.run(sink).await;

            let (kind, message) = match &outcome {
                SessionOutcome::Completed { .. } => {
                    let _ = sink.send(outcome.to_event()).await;
                    return outcome;
                }
                SessionOutcome::Failed { kind, .. } if *kind == ErrorKind::Cancelled => {
                    return outcome;
                }
                SessionOutcome::Failed { kind, message } => (*kind, message.clone()),
            };

            let final_outcome = match self.decide(kind, attempt) {
                RetryDecision::Retry(delay) => {
                    info!(
                        attempt,
                        kind = %kind,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Attempt failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = sink.closed() => return SessionOutcome::cancelled(),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    attempt += 1;
                    continue;
                }
                RetryDecision::Exhausted => {
                    warn!(attempts = attempt + 1, kind = %kind, error = %message, "Retries exhausted");
                    SessionOutcome::Failed {
                        kind,
                        message: format!(
                            "Request failed after {} attempts: {message}",
                            attempt + 1
                        ),
                    }
                }
                RetryDecision::Fatal => {
                    warn!(attempt, kind = %kind, error = %message, "Request failed");
                    outcome
                }
            };

            let _ = sink.send(final_outcome.to_event()).await;
            return final_outcome;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_backs_off_exponentially() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(ErrorKind::RateLimited, 0),
            RetryDecision::Retry(Duration::from_secs(1))
        );
        assert_eq!(
            policy.decide(ErrorKind::RateLimited, 1),
            RetryDecision::Retry(Duration::from_secs(2))
        );
        assert_eq!(
            policy.decide(ErrorKind::RateLimited, 2),
            RetryDecision::Retry(Duration::from_secs(4))
        );
        assert_eq!(
            policy.decide(ErrorKind::RateLimited, 3),
            RetryDecision::Exhausted
        );
    }

    #[test]
    fn connection_failures_retry_immediately() {
        let policy = RetryPolicy::default();
        for attempt in 0..3 {
            assert_eq!(
                policy.decide(ErrorKind::ConnectionFailure, attempt),
                RetryDecision::Retry(Duration::ZERO)
            );
        }
        assert_eq!(
            policy.decide(ErrorKind::ConnectionFailure, 3),
            RetryDecision::Exhausted
        );
    }

    #[test]
    fn decode_failures_share_the_budget() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(ErrorKind::DecodeFailure, 0),
            RetryDecision::Retry(Duration::ZERO)
        );
        assert_eq!(
            policy.decide(ErrorKind::DecodeFailure, 3),
            RetryDecision::Exhausted
        );
    }

    #[test]
    fn rejected_and_unexpected_are_fatal() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(ErrorKind::RequestRejected, 0),
            RetryDecision::Fatal
        );
        assert_eq!(policy.decide(ErrorKind::Unexpected, 0), RetryDecision::Fatal);
        assert_eq!(policy.decide(ErrorKind::Cancelled, 0), RetryDecision::Fatal);
    }

    #[test]
    fn zero_retries_never_retry() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(
            policy.decide(ErrorKind::RateLimited, 0),
            RetryDecision::Exhausted
        );
    }

    #[test]
    fn config_conversion() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_retries: 5,
            base_delay_ms: 250,
        });
        assert_eq!(policy.max_retries(), 5);
        assert_eq!(
            policy.delay_for(ErrorKind::RateLimited, 2),
            Some(Duration::from_millis(1000))
        );
    }

    #[test]
    fn huge_attempt_saturates() {
        let policy = RetryPolicy::new(100, Duration::from_secs(1));
        assert!(policy.delay_for(ErrorKind::RateLimited, 64).is_some());
    }
}
