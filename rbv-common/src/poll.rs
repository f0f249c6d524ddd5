//! Bounded waiting: attempt-budgeted health polling and deadline polling.
//!
//! Timing lives here; what to print on each attempt is injected through a
//! progress callback.

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{BackoffMode, ServiceBudget};

/// Default jitter factor for exponential backoff.
pub const DEFAULT_JITTER: f64 = 0.1;

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay before every attempt.
    Fixed,
    /// Doubling delay, capped, with symmetric jitter (0.0-1.0).
    Exponential { max_delay: Duration, jitter: f64 },
}

/// Attempt budget for one wait.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum probes including the first (minimum 1).
    pub max_attempts: u32,
    /// Base delay between probes.
    pub delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Exponential {
                max_delay,
                jitter: DEFAULT_JITTER,
            },
        }
    }

    /// Policy for a configured service budget.
    pub fn from_budget(budget: &ServiceBudget, mode: BackoffMode, max_delay: Duration) -> Self {
        match mode {
            BackoffMode::Fixed => Self::fixed(budget.max_attempts, budget.delay),
            BackoffMode::Exponential => {
                Self::exponential(budget.max_attempts, budget.delay, max_delay)
            }
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after the given attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max_delay, jitter } => {
                let attempt = attempt.max(1);
                let multiplier = 2_u32.saturating_pow(attempt.saturating_sub(1)) as f64;
                let mut delay = (self.delay.as_secs_f64() * multiplier)
                    .min(max_delay.as_secs_f64().max(0.0));
                if jitter > 0.0 && delay > 0.0 {
                    let factor = (fastrand::f64() * 2.0 - 1.0) * jitter.min(1.0);
                    delay = (delay * (1.0 + factor)).max(0.0);
                }
                Duration::from_secs_f64(delay)
            }
        }
    }

    /// Upper bound on total sleeping for a fixed policy; nominal for exponential.
    pub fn budget(&self) -> Duration {
        let sleeps = self.max_attempts().saturating_sub(1);
        match self.backoff {
            Backoff::Fixed => self.delay.saturating_mul(sleeps),
            Backoff::Exponential { max_delay, .. } => (1..=sleeps)
                .map(|attempt| {
                    let multiplier = 2_u32.saturating_pow(attempt - 1);
                    self.delay.saturating_mul(multiplier).min(max_delay)
                })
                .sum(),
        }
    }
}

/// One attempt's progress, handed to observers.
#[derive(Debug, Clone)]
pub struct PollProgress<'a> {
    pub label: &'a str,
    pub attempt: u32,
    /// `None` for deadline-bounded polling.
    pub max_attempts: Option<u32>,
    pub elapsed: Duration,
    /// Sleep before the next attempt, `None` after the last one.
    pub next_delay: Option<Duration>,
}

/// Outcome of an attempt-budgeted health wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthWait {
    pub healthy: bool,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Probe until healthy or the attempt budget is spent.
///
/// Probe errors count as "not yet healthy". Never reports healthy without a
/// successful probe.
pub async fn await_healthy<F, Fut, E>(
    label: &str,
    policy: &RetryPolicy,
    probe: F,
    on_progress: impl FnMut(&PollProgress<'_>),
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: Display,
{
    wait_until_healthy(label, policy, probe, on_progress)
        .await
        .healthy
}

/// [`await_healthy`] with attempt count and elapsed time.
pub async fn wait_until_healthy<F, Fut, E>(
    label: &str,
    policy: &RetryPolicy,
    mut probe: F,
    mut on_progress: impl FnMut(&PollProgress<'_>),
) -> HealthWait
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: Display,
{
    let start = Instant::now();
    let max_attempts = policy.max_attempts();

    for attempt in 1..=max_attempts {
        match probe().await {
            Ok(true) => {
                info!(service = label, attempt, max_attempts, "Healthy");
                return HealthWait {
                    healthy: true,
                    attempts: attempt,
                    elapsed: start.elapsed(),
                };
            }
            Ok(false) => debug!(service = label, attempt, "Not healthy yet"),
            Err(e) => debug!(service = label, attempt, error = %e, "Probe error, treating as not ready"),
        }

        let next_delay = (attempt < max_attempts).then(|| policy.delay_for(attempt));
        on_progress(&PollProgress {
            label,
            attempt,
            max_attempts: Some(max_attempts),
            elapsed: start.elapsed(),
            next_delay,
        });
        if let Some(delay) = next_delay {
            sleep(delay).await;
        }
    }

    warn!(service = label, max_attempts, "Health budget exhausted");
    HealthWait {
        healthy: false,
        attempts: max_attempts,
        elapsed: start.elapsed(),
    }
}

/// Interval and deadline for polling a derived read path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlinePolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl DeadlinePolicy {
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }
}

/// What one poll observed. Both variants carry the observation.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<T> {
    Matched(T),
    Pending(T),
}

/// Final result of [`poll_until`].
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome<T> {
    pub matched: bool,
    /// Observation from the final poll.
    pub last: Option<T>,
    pub polls: u32,
    pub elapsed: Duration,
}

/// Poll until an observation matches or the deadline passes.
///
/// The first poll happens immediately and a last poll happens at the deadline,
/// so a match that lands just before the deadline is still seen.
pub async fn poll_until<T, F, Fut>(
    label: &str,
    policy: &DeadlinePolicy,
    mut attempt: F,
    mut on_progress: impl FnMut(&PollProgress<'_>),
) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Observation<T>>,
{
    let start = Instant::now();
    let mut polls = 0;

    loop {
        polls += 1;
        let last = match attempt().await {
            Observation::Matched(value) => {
                debug!(target_check = label, polls, "Observation matched");
                return PollOutcome {
                    matched: true,
                    last: Some(value),
                    polls,
                    elapsed: start.elapsed(),
                };
            }
            Observation::Pending(value) => value,
        };

        let elapsed = start.elapsed();
        let remaining = policy.deadline.saturating_sub(elapsed);
        let next_delay = (!remaining.is_zero()).then(|| policy.interval.min(remaining));
        on_progress(&PollProgress {
            label,
            attempt: polls,
            max_attempts: None,
            elapsed,
            next_delay,
        });

        match next_delay {
            Some(delay) => sleep(delay).await,
            None => {
                return PollOutcome {
                    matched: false,
                    last: Some(last),
                    polls,
                    elapsed,
                };
            }
        }
    }
}
