use std::time::Duration;

use hojokin_core::config::RetryConfig;

use crate::provider::ProviderError;

/// Longest wait a provider's `retry-after` can impose on one attempt.
pub const MAX_RETRY_AFTER_MS: u64 = 60_000;

/// Exponential backoff for LLM calls.
///
/// `attempt` is zero-based: the wait after the first failure is
/// `base_delay_ms`, then doubles up to `max_delay_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay_ms: cfg.base_delay_ms,
            max_delay_ms: cfg.max_delay_ms.max(cfg.base_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Wait before the next attempt given the error that ended this one.
    /// A rate limit waits at least as long as the provider asked for, up to
    /// `MAX_RETRY_AFTER_MS`.
    pub fn delay_for(&self, attempt: u32, err: &ProviderError) -> Duration {
        let backoff = self.backoff(attempt);
        match err {
            ProviderError::RateLimited { retry_after_ms } => {
                backoff.max(Duration::from_millis((*retry_after_ms).min(MAX_RETRY_AFTER_MS)))
            }
            _ => backoff,
        }
    }
}
