//! Exponential backoff for startup dependencies.
//!
//! The orchestrator cannot build its faction queues until the roster
//! service answers, and it has nothing better to do in the meantime, so it
//! keeps asking. [`Backoff`] decides how long to wait between attempts and
//! [`retry_forever`] is the loop that never gives up.
//!
//! ```ignore
//! let mut backoff = Backoff::new(BackoffConfig::default());
//! // Does not return until the roster answers with at least one faction.
//! let factions = retry_forever(&mut backoff, "roster factions", || roster.factions()).await;
//! ```
//!
//! Tests drive this with `#[tokio::test(start_paused = true)]`, so the
//! sleeps cost nothing.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Backoff policy parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    pub min: Duration,
    /// Upper bound on any single delay.
    pub max: Duration,
    /// Growth factor per attempt.
    pub factor: f64,
    /// Randomize each delay between `min` and the computed value.
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: false,
        }
    }
}

impl BackoffConfig {
    /// A policy with no growth and no jitter, for tests.
    pub fn constant(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
            factor: 1.0,
            jitter: false,
        }
    }

    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`Backoff::new`]. Rules:
    /// - `min` of zero becomes 1 ms so the loop cannot spin.
    /// - `max` is raised to at least `min`.
    /// - `factor` below 1.0 (or not finite) becomes 1.0.
    pub fn validated(mut self) -> Self {
        if self.min.is_zero() {
            warn!("backoff min is zero, using 1ms");
            self.min = Duration::from_millis(1);
        }
        if self.max < self.min {
            warn!(min = ?self.min, max = ?self.max, "backoff max below min, raising");
            self.max = self.min;
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            warn!(factor = self.factor, "backoff factor out of range, using 1.0");
            self.factor = 1.0;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Stateful backoff: each call to [`next_delay`](Self::next_delay) returns
/// a longer wait, up to the configured maximum.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config: config.validated(),
            attempt: 0,
        }
    }

    /// Delay to wait after the current failure. Advances the attempt count.
    ///
    /// Without jitter the sequence is `min, min*factor, min*factor^2, ...`
    /// capped at `max`.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = i32::try_from(self.attempt).unwrap_or(i32::MAX);
        let scaled = self.config.min.as_secs_f64() * self.config.factor.powi(exponent);
        let capped = if scaled.is_finite() && scaled < self.config.max.as_secs_f64() {
            Duration::from_secs_f64(scaled)
        } else {
            self.config.max
        };
        self.attempt = self.attempt.saturating_add(1);

        if self.config.jitter && capped > self.config.min {
            let lo = self.config.min.as_secs_f64();
            let hi = capped.as_secs_f64();
            Duration::from_secs_f64(rand::rng().random_range(lo..=hi))
        } else {
            capped
        }
    }

    /// Start over from `min`. Call after a success.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// How many delays have been handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}

// ---------------------------------------------------------------------------
// Retry loop
// ---------------------------------------------------------------------------

/// Runs `op` until it succeeds, sleeping per `backoff` between failures.
///
/// Never gives up and has no overall timeout. Every failure is logged at
/// warn with `what` and the upcoming delay. The backoff is reset on
/// success so it can be reused.
pub async fn retry_forever<T, E, F, Fut>(backoff: &mut Backoff, what: &str, mut op: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    loop {
        match op().await {
            Ok(value) => {
                if backoff.attempt() > 0 {
                    debug!(what, attempts = backoff.attempt() + 1, "succeeded after retries");
                }
                backoff.reset();
                return value;
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(
                    what,
                    attempt = backoff.attempt(),
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
