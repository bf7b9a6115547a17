//! Retry policy with exponential backoff and jitter.

use std::time::Duration;

use rand::Rng;
use tether_domain::{ErrorCode, HandshakeExecutionResult, HttpMethod, RetryPolicyConfig};

/// Lower bound of the jitter factor, in thousandths.
const JITTER_MIN_PERMILLE: u64 = 500;
/// Upper bound (exclusive) of the jitter factor, in thousandths.
const JITTER_MAX_PERMILLE: u64 = 1000;

/// Decides whether and when a failed attempt is retried.
///
/// The delay before retry `n` (0-based) is
/// `base * 2^n * (0.5 + random[0, 0.5))`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    config: RetryPolicyConfig,
}

impl RetryPolicy {
    /// Wraps a policy configuration.
    #[must_use]
    pub const fn new(config: RetryPolicyConfig) -> Self {
        Self { config }
    }

    /// Maximum number of retries after the first attempt.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Returns true if `result` of retry number `attempt` (0 for the first
    /// attempt) should be retried.
    ///
    /// Network and DNS failures always qualify. Timeouts and 5xx responses
    /// qualify for idempotent methods, or for any method when
    /// `retry_non_idempotent` is set. 4xx responses never do.
    #[must_use]
    pub fn should_retry(
        &self,
        result: &HandshakeExecutionResult,
        method: HttpMethod,
        attempt: u32,
    ) -> bool {
        if result.success || attempt >= self.config.max_retries {
            return false;
        }
        match result.error_code() {
            Some(ErrorCode::NetworkError | ErrorCode::DnsError) => true,
            Some(ErrorCode::Timeout | ErrorCode::ServerError) => {
                method.is_idempotent() || self.config.retry_non_idempotent
            }
            _ => false,
        }
    }

    /// Undithered delay before retry `attempt`, capped at the maximum.
    #[must_use]
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let raw = self
            .config
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(raw.min(self.config.max_delay_ms))
    }

    /// Delay before retry `attempt` with a given jitter in thousandths.
    ///
    /// `permille` is clamped to `[500, 1000)`.
    #[must_use]
    pub fn delay_with_jitter(&self, attempt: u32, permille: u64) -> Duration {
        let permille = permille.clamp(JITTER_MIN_PERMILLE, JITTER_MAX_PERMILLE - 1);
        let raw = u128::from(
            self.config
                .base_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt)),
        );
        let jittered = raw * u128::from(permille) / 1000;
        let capped = jittered.min(u128::from(self.config.max_delay_ms));
        Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX))
    }

    /// Delay before retry `attempt` with random jitter.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let permille = rand::rng().random_range(JITTER_MIN_PERMILLE..JITTER_MAX_PERMILLE);
        self.delay_with_jitter(attempt, permille)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryPolicyConfig::default())
    }
}
