//! Exponential backoff with jitter, shared by every call site.
//!
//! [`retry_with_backoff`] is generic over the error type; the caller passes a
//! classifier that decides per error whether to retry, retry after a server
//! supplied delay, or give up.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use pricetrail_core::AppConfig;

/// Backoff multiplier between consecutive retries.
pub const BACKOFF_FACTOR: u32 = 2;
/// Jitter applied to product-query retries.
pub const QUERY_JITTER_RATIO: f64 = 0.35;
/// Jitter applied to SKU-detail retries.
pub const DETAIL_JITTER_RATIO: f64 = 0.30;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Retry after the computed backoff.
    Transient,
    /// Retry after exactly this delay.
    RetryAfter(Duration),
    /// Return the error immediately.
    Fatal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the first; total attempts is `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: u32,
    /// Delays are scaled by a uniform factor in `[1 - ratio, 1 + ratio]`.
    pub jitter_ratio: f64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Policy for product-query and product-detail calls.
    #[must_use]
    pub fn for_queries(config: &AppConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.retry_base_delay_ms,
            backoff_factor: BACKOFF_FACTOR,
            jitter_ratio: QUERY_JITTER_RATIO,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }

    /// Policy for per-product SKU-detail calls, which start from a larger base
    /// delay.
    #[must_use]
    pub fn for_details(config: &AppConfig) -> Self {
        Self {
            max_retries: config.detail_max_retries,
            base_delay_ms: config.detail_retry_base_delay_ms,
            backoff_factor: BACKOFF_FACTOR,
            jitter_ratio: DETAIL_JITTER_RATIO,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }

    /// A policy that never retries. Mostly useful in tests.
    #[must_use]
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
            backoff_factor: BACKOFF_FACTOR,
            jitter_ratio: 0.0,
            max_delay_ms: 0,
        }
    }

    /// Un-jittered delay before the retry that follows failed attempt
    /// `attempt` (0-based): `min(base * factor^attempt, max)`.
    #[must_use]
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let growth = u64::from(self.backoff_factor).saturating_pow(attempt);
        self.base_delay_ms
            .saturating_mul(growth)
            .min(self.max_delay_ms)
    }

    /// [`Self::backoff_ms`] with random jitter applied.
    #[must_use]
    pub fn jittered_ms(&self, attempt: u32) -> u64 {
        apply_jitter(
            self.backoff_ms(attempt),
            self.jitter_ratio,
            rand::random::<f64>(),
        )
    }
}

/// Scales `delay_ms` by `1 + (2 * unit - 1) * ratio`, where `unit` is a
/// uniform sample from `[0, 1)`.
#[must_use]
pub fn apply_jitter(delay_ms: u64, ratio: f64, unit: f64) -> u64 {
    let factor = 1.0 + (unit.clamp(0.0, 1.0) * 2.0 - 1.0) * ratio;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let jittered = (delay_ms as f64 * factor).round().max(0.0) as u64;
    jittered
}

/// Runs `operation`, retrying while `classify` reports the error as
/// retriable and attempts remain.
///
/// The error from the final attempt is returned as-is, so a transient
/// condition on the last allowed attempt surfaces to the caller.
pub async fn retry_with_backoff<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    classify: C,
    mut operation: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> Disposition,
{
    let mut attempt = 0u32;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let delay = match classify(&err) {
            Disposition::Fatal => return Err(err),
            _ if attempt >= policy.max_retries => return Err(err),
            Disposition::RetryAfter(delay) => delay,
            Disposition::Transient => Duration::from_millis(policy.jittered_ms(attempt)),
        };

        #[allow(clippy::cast_possible_truncation)]
        let delay_ms = delay.as_millis() as u64;
        tracing::warn!(
            attempt = attempt + 1,
            max_retries = policy.max_retries,
            delay_ms,
            error = %err,
            "transient failure, retrying after backoff"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
