use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use stow_ledger::{Clock, Request};
use stow_store::{StoreError, StoreResult};
use stow_types::TransferError;
use tracing::{debug, warn};

/// Largest jitter `delay_for` applies, keeping every delay positive.
const MAX_JITTER: f64 = 0.99;

/// Bounded exponential backoff for transient store failures.
///
/// Attempt `n` (1-based) that fails transiently is followed by a sleep of
/// `base_delay * multiplier^(n-1)`, capped at `max_delay`, then scaled by a
/// random factor in `[1 - jitter, 1 + jitter]`. No sleep follows the final
/// attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    #[serde(rename = "base_delay_ms", with = "millis")]
    pub base_delay: Duration,
    pub multiplier: f64,
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
    /// Fractional jitter, e.g. `0.2` for ±20%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(200),
            multiplier: 2.0,
            max_delay: Duration::from_secs(3),
            jitter: 0.2,
        }
    }
}

/// Invalid retry policy settings.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PolicyError {
    #[error("max_attempts must be at least 1")]
    NoAttempts,

    #[error("multiplier must be >= 1.0, got {0}")]
    Multiplier(f64),

    #[error("jitter must be within [0, 1), got {0}")]
    Jitter(f64),

    #[error("base delay {base:?} exceeds max delay {max:?}")]
    DelayOrder { base: Duration, max: Duration },
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Same policy with jitter disabled, for reproducible schedules.
    pub fn without_jitter(self) -> Self {
        Self { jitter: 0.0, ..self }
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_attempts == 0 {
            return Err(PolicyError::NoAttempts);
        }
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(PolicyError::Multiplier(self.multiplier));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(PolicyError::Jitter(self.jitter));
        }
        if self.base_delay > self.max_delay {
            return Err(PolicyError::DelayOrder {
                base: self.base_delay,
                max: self.max_delay,
            });
        }
        Ok(())
    }

    /// Backoff after failed attempt `attempt`, before jitter.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let nanos = self.base_delay.as_nanos() as f64 * self.multiplier.powi(exponent);
        let capped = nanos.min(self.max_delay.as_nanos() as f64);
        Duration::from_nanos(capped.round() as u64)
    }

    /// Backoff after failed attempt `attempt`, with jitter applied.
    ///
    /// Jitter outside `[0, 1)` is clamped into range; NaN counts as none.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        let jitter = if self.jitter.is_nan() {
            0.0
        } else {
            self.jitter.clamp(0.0, MAX_JITTER)
        };
        if jitter == 0.0 {
            return nominal;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
        Duration::from_nanos((nominal.as_nanos() as f64 * factor).round() as u64)
    }
}

/// Map a non-transient store failure onto the caller-facing taxonomy.
pub(crate) fn classify_permanent(err: StoreError) -> TransferError {
    match err {
        StoreError::NotFound(key) => TransferError::NotFound(key),
        other => TransferError::Denied(other.to_string()),
    }
}

/// Run `op` under `policy`, recording each attempt on `request`.
///
/// Transient failures are retried until the budget runs out, then wrapped in
/// [`TransferError::Exhausted`]. Permanent failures return immediately.
pub(crate) async fn with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    clock: &dyn Clock,
    request: &Request,
    mut op: F,
) -> Result<T, TransferError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        request.begin_attempt(attempt);
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_transient() {
            debug!(key = %request.key().short(), attempt, error = %err, "permanent store failure");
            return Err(classify_permanent(err));
        }

        if attempt >= max_attempts {
            warn!(
                direction = %request.direction(),
                key = %request.key().short(),
                attempts = attempt,
                error = %err,
                "retry budget exhausted"
            );
            return Err(TransferError::Exhausted {
                attempts: attempt,
                last: Box::new(TransferError::RemoteUnavailable(err.to_string())),
            });
        }

        let delay = policy.delay_for(attempt);
        debug!(
            direction = %request.direction(),
            key = %request.key().short(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient store failure, backing off"
        );
        clock.sleep(delay).await;
        attempt += 1;
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
