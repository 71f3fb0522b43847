//! Retry logic with exponential backoff and server-supplied wait hints
//!
//! An operation is attempted up to `max_retries + 1` times. Between attempts
//! the wait is `base_delay * 2^attempt` plus uniform jitter of up to
//! `jitter_ratio` of that backoff. When the failed attempt carried a
//! `Retry-After` hint, the hint is a floor on the wait.
//!
//! # Example
//!
//! ```no_run
//! use gridcrawl::retry::{IsRetryable, with_backoff};
//! use gridcrawl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Busy,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "busy")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         true
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let value = with_backoff(&config, || async { Ok::<_, MyError>(7) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;

    /// Minimum wait the server asked for before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Timeouts, connection failures and any other transport problem
            Error::Network(_) => true,
            // Every non-success status, not only 429/5xx
            Error::HttpStatus { .. } => true,
            // Malformed bodies take the same backoff path
            Error::Parse(_) => true,
            Error::RetriesExhausted { .. } => false,
            Error::Config { .. } => false,
            Error::Database(_) => false,
            Error::Io(_) => false,
            Error::Serialization(_) => false,
            Error::Other(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        Error::retry_after(self)
    }
}

/// Execute an async operation, retrying transient failures with backoff
///
/// Returns the first success, the first non-retryable error, or the error from
/// the final attempt once `max_retries` retries have been used.
pub async fn with_backoff<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let wait = retry_wait(config, attempt, e.retry_after());

                tracing::warn!(
                    error = %e,
                    retry = attempt + 1,
                    max_retries = config.max_retries,
                    wait_ms = wait.as_millis(),
                    "Attempt failed, retrying"
                );

                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Exponential backoff for the given zero-based attempt, without jitter
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    config
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt))
}

/// Wait before the next attempt: jittered backoff, floored by the server hint
pub fn retry_wait(config: &RetryConfig, attempt: u32, retry_after: Option<Duration>) -> Duration {
    let jittered = add_jitter(backoff_delay(config, attempt), config.jitter_ratio);
    match retry_after {
        Some(floor) => jittered.max(floor),
        None => jittered,
    }
}

/// Add uniform jitter in `[0, ratio * delay]`
fn add_jitter(delay: Duration, ratio: f64) -> Duration {
    if ratio <= 0.0 || delay.is_zero() {
        return delay;
    }
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=ratio);
    let jitter = Duration::try_from_secs_f64(delay.as_secs_f64() * jitter_factor)
        .unwrap_or(Duration::MAX);
    delay.saturating_add(jitter)
}

/// Obsolete HTTP-date layouts still accepted from servers: RFC 850 and asctime
const OBSOLETE_HTTP_DATE_FORMATS: &[&str] = &[
    "%A, %d-%b-%y %H:%M:%S GMT",
    "%a %b %e %H:%M:%S %Y",
];

/// Parse a `Retry-After` header value
///
/// Accepts a delay in seconds (a fractional part is truncated) or an HTTP
/// date in IMF-fixdate, RFC 850 or asctime layout. Dates in the past yield a
/// zero wait. Anything else yields `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    parse_retry_after_at(value, Utc::now())
}

fn parse_retry_after_at(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Some(secs) = parse_delay_seconds(value) {
        return Some(Duration::from_secs(secs));
    }

    let when = match DateTime::parse_from_rfc2822(value) {
        Ok(when) => when.with_timezone(&Utc),
        Err(_) => OBSOLETE_HTTP_DATE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())?
            .and_utc(),
    };
    let delta = when - now;
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// Whole seconds from `"2"` or `"2.5"`
fn parse_delay_seconds(value: &str) -> Option<u64> {
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    if whole.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    whole.parse().ok()
}
