//! Upload verification retry
//!
//! An upload whose stored ETag disagrees with the local checksum, or that
//! hit a transient transport failure, is sent again in full. Attempts are
//! spaced by an exponentially growing, jittered delay and capped at
//! [`UPLOAD_VERIFY_ATTEMPTS`] by default.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Number of upload attempts before an integrity failure is terminal
pub const UPLOAD_VERIFY_ATTEMPTS: u32 = 4;

/// Transport messages that indicate the store may accept the same request later
const TRANSIENT_MARKERS: [&str; 8] = [
    "timeout",
    "timed out",
    "connection reset",
    "connection refused",
    "503",
    "service unavailable",
    "slow down",
    "429",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: UPLOAD_VERIFY_ATTEMPTS,
            initial_backoff_ms: 250,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryConfig {
    /// Delay before attempt `failed + 1`: the doubled base delay plus up to
    /// the same amount again in jitter
    pub fn backoff(&self, failed: u32) -> Duration {
        let exponent = failed.saturating_sub(1).min(16);
        let base = self
            .initial_backoff_ms
            .saturating_mul(1 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(base + jitter(base))
    }
}

fn jitter(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    u64::from(nanos) % max
}

/// Run `operation` until it succeeds, fails with an error `should_retry`
/// rejects, or `config.max_attempts` is reached.
///
/// The operation receives the 1-based attempt number. The last error is
/// returned unchanged.
pub async fn retry_with_backoff<T, F, Fut, R>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: R,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    R: Fn(&Error) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if attempt >= max_attempts || !should_retry(&error) {
            return Err(error);
        }

        let delay = config.backoff(attempt);
        tracing::debug!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Upload attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Whether uploading again could fix `error`
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Integrity { .. } => true,
        Error::Network(message) => {
            let message = message.to_lowercase();
            TRANSIENT_MARKERS.iter().any(|m| message.contains(m))
        }
        Error::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::Interrupted
        ),
        Error::Config(_)
        | Error::InvalidInput(_)
        | Error::Precondition(_)
        | Error::NotFound(_)
        | Error::Auth(_)
        | Error::Script(_)
        | Error::Json(_)
        | Error::General(_) => false,
    }
}
