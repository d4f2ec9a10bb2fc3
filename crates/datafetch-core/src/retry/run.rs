//! Blocking retry loop for transport calls (runs on a blocking thread).

use std::time::Duration;

use super::classify::Classify;
use super::policy::{RetryDecision, RetryPolicy};
use crate::control::AbortToken;

/// Runs `f` until it succeeds, the policy says stop, or `abort` trips.
/// `f` receives the 1-based attempt number.
pub fn run_with_retry<T, E, F>(policy: &RetryPolicy, abort: &AbortToken, mut f: F) -> Result<T, E>
where
    E: Classify + std::fmt::Display,
    F: FnMut(u32) -> Result<T, E>,
{
    let mut attempt = 1u32;
    loop {
        let err = match f(attempt) {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        if abort.is_aborted() {
            return Err(err);
        }
        match policy.decide(attempt, err.kind()) {
            RetryDecision::NoRetry => return Err(err),
            RetryDecision::RetryAfter(d) => {
                tracing::warn!(attempt, delay_ms = d.as_millis() as u64, "transient failure, retrying: {}", err);
                if !sleep_unless_aborted(d, abort) {
                    return Err(err);
                }
                attempt += 1;
            }
        }
    }
}

/// Returns false if the token tripped during the sleep.
fn sleep_unless_aborted(total: Duration, abort: &AbortToken) -> bool {
    const SLICE: Duration = Duration::from_millis(50);
    let mut left = total;
    while !left.is_zero() {
        if abort.is_aborted() {
            return false;
        }
        let step = left.min(SLICE);
        std::thread::sleep(step);
        left = left.saturating_sub(step);
    }
    !abort.is_aborted()
}
