//! Bounded retry for remote calls
//!
//! Transient network and cluster errors are common during long-running bulk
//! work; a small fixed attempt budget absorbs them without masking systemic
//! failures. Deliberately no backoff and no jitter: once the budget is spent
//! the last error propagates and the caller's durable cursor is the
//! resumption point.

use crate::error::Result;
use std::future::Future;
use tracing::warn;

/// Default attempt budget for every remote call.
pub const DEFAULT_MAX_RETRY: usize = 3;

/// Invoke `op` up to `max_attempts` times, returning the first success
///
/// Each failed attempt is logged at `warn` with the attempt number. When the
/// budget is exhausted the last error is returned. `max_attempts` of zero is
/// treated as one attempt. Not-found errors are structural, not transient:
/// they propagate immediately without consuming the budget.
pub async fn with_retry<T, F, Fut>(max_attempts: usize, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = max_attempts.max(1);
    let mut last_attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_not_found() => return Err(err),
            Err(err) if last_attempt < attempts => {
                warn!(attempt = last_attempt, max = attempts, error = %err, "remote call failed, retrying");
                last_attempt += 1;
            }
            Err(err) => {
                warn!(attempt = last_attempt, max = attempts, error = %err, "remote call failed, budget exhausted");
                return Err(err);
            }
        }
    }
}
