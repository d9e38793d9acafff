//! Caller-level retry around a single partner transport call.
//!
//! A call is re-issued while the transport fails or the partner answers with a code
//! the adapter does not classify as terminal. Terminal codes (success, invalid
//! input, business-rule rejection) end the loop immediately.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use cardlink_core::Partner;

use crate::adapter::PartnerError;
use crate::transport::TransportError;

/// Retry configuration for partner transport calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerRetryPolicy {
    /// Total attempts, including the first one (minimum 1).
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubled after every further failure.
    pub base_delay: Duration,
    /// Delay cap.
    pub max_delay: Duration,
}

impl Default for PartnerRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl PartnerRetryPolicy {
    /// Single attempt, no retry.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed): base * 2^(attempt-1), capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Executes transport calls under a `PartnerRetryPolicy`.
#[derive(Debug, Clone)]
pub struct PartnerRetry {
    partner: Partner,
    policy: PartnerRetryPolicy,
}

impl PartnerRetry {
    pub fn new(partner: Partner, policy: PartnerRetryPolicy) -> Self {
        Self { partner, policy }
    }

    pub fn policy(&self) -> &PartnerRetryPolicy {
        &self.policy
    }

    /// Run `call` until it yields a response accepted by `is_terminal`, or attempts
    /// run out.
    ///
    /// When attempts run out, the last response is returned as-is (the adapter maps
    /// its non-terminal code), or the last transport failure: `PartnerError::Timeout`
    /// for a timeout, `PartnerError::Transport` otherwise.
    pub async fn call<Resp, F, Fut, T>(
        &self,
        operation: &'static str,
        mut call: F,
        is_terminal: T,
    ) -> Result<Resp, PartnerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Resp, TransportError>>,
        T: Fn(&Resp) -> bool,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = call().await;

            let retryable = match &outcome {
                Ok(resp) if is_terminal(resp) => false,
                Ok(_) => {
                    debug!(partner = %self.partner, operation, attempt, "non-terminal partner response");
                    true
                }
                Err(e) => {
                    warn!(partner = %self.partner, operation, attempt, error = %e, "partner transport failure");
                    true
                }
            };

            if !retryable || attempt >= max_attempts {
                return outcome.map_err(|source| match source {
                    TransportError::Timeout => PartnerError::Timeout {
                        partner: self.partner,
                        attempts: attempt,
                    },
                    source => PartnerError::Transport {
                        partner: self.partner,
                        source,
                    },
                });
            }

            tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_attempts: u32) -> PartnerRetry {
        PartnerRetry::new(
            Partner::Visa,
            PartnerRetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(40),
            },
        )
    }

    #[test]
    fn delay_doubles_and_caps() {
        let policy = PartnerRetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_response_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result = quick(5)
            .call(
                "add_card",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, TransportError>("INVALID_CARD") }
                },
                |code| *code == "INVALID_CARD",
            )
            .await;

        assert_eq!(result.unwrap(), "INVALID_CARD");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_terminal_response_is_returned_after_budget() {
        let calls = AtomicU32::new(0);
        let result = quick(3)
            .call(
                "add_card",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, TransportError>("SERVICE_UNAVAILABLE") }
                },
                |_| false,
            )
            .await;

        assert_eq!(result.unwrap(), "SERVICE_UNAVAILABLE");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_recovers_on_retry() {
        let calls = AtomicU32::new(0);
        let result = quick(3)
            .call(
                "remove_card",
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(TransportError::Timeout)
                        } else {
                            Ok("SUCCESS")
                        }
                    }
                },
                |code| *code == "SUCCESS",
            )
            .await;

        assert_eq!(result.unwrap(), "SUCCESS");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_transport_failure_surfaces_as_partner_error() {
        let result = quick(2)
            .call(
                "remove_card",
                || async { Err::<&str, _>(TransportError::Unavailable("503".into())) },
                |_| true,
            )
            .await;

        assert_eq!(
            result.unwrap_err(),
            PartnerError::Transport {
                partner: Partner::Visa,
                source: TransportError::Unavailable("503".into()),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_timeouts_surface_as_timeout() {
        let calls = AtomicU32::new(0);
        let result = quick(3)
            .call(
                "add_card",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<&str, _>(TransportError::Timeout) }
                },
                |_| true,
            )
            .await;

        assert_eq!(
            result.unwrap_err(),
            PartnerError::Timeout {
                partner: Partner::Visa,
                attempts: 3,
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
