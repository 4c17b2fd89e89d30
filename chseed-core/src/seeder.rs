//! Retry loop around the schema runner.
//!
//! Only the seeding step is retried. Connection setup and TTL conversion
//! happen before this and fail the run immediately.

use crate::error::SeedError;
use crate::runner::SchemaRunner;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Delay before the second attempt.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total runner invocations, including the first one. Must be at least 1.
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further failure.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Default delays with the given attempt budget.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }
}

/// Record of one failed runner invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedAttempt {
    /// 1-based attempt number
    pub attempt: u32,
    /// Rendered error of this attempt
    pub error: String,
    /// Sleep scheduled after this attempt; `None` for the final one
    pub next_delay: Option<Duration>,
}

/// Applies `dir` through `runner`, retrying failures with backoff.
///
/// Returns the number of attempts used on success.
///
/// # Errors
/// - [`SeedError::Cancelled`] as soon as `cancel` fires, whether the runner
///   or a backoff sleep was in progress
/// - [`SeedError::Seed`] once `policy.max_attempts` invocations have failed,
///   carrying every attempt and the last error
/// - [`SeedError::Configuration`] for a zero attempt budget
pub async fn seed<R>(
    runner: &R,
    dir: &Path,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> crate::Result<u32>
where
    R: SchemaRunner + ?Sized,
{
    if policy.max_attempts == 0 {
        return Err(SeedError::configuration("max attempts must be at least 1"));
    }

    let mut delay = policy.initial_delay;
    let mut history = Vec::new();

    for attempt in 1..=policy.max_attempts {
        debug!("Seed attempt {}/{}", attempt, policy.max_attempts);

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SeedError::Cancelled),
            outcome = runner.apply(dir) => outcome,
        };

        let err = match outcome {
            Ok(()) => return Ok(attempt),
            Err(err) => err,
        };

        if attempt == policy.max_attempts {
            history.push(SeedAttempt {
                attempt,
                error: err.to_string(),
                next_delay: None,
            });
            return Err(SeedError::Seed {
                attempts: attempt,
                history,
                last: Box::new(err),
            });
        }

        warn!(
            "RETRY: Seed failed, retrying in {:?}... (attempt {}/{}): {}",
            delay, attempt, policy.max_attempts, err
        );
        history.push(SeedAttempt {
            attempt,
            error: err.to_string(),
            next_delay: Some(delay),
        });

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SeedError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
        delay = delay.saturating_mul(2);
    }

    // max_attempts >= 1, so the loop always returns
    Err(SeedError::configuration("max attempts must be at least 1"))
}
