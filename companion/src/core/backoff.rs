//! Retry delay policy for transient fetch failures.

use std::time::Duration;

/// Total attempts (first try included) before a transient failure surfaces.
pub const MAX_FETCH_ATTEMPTS: u32 = 5;

const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(10);

/// Delay before retrying after the failed attempt `attempt` (0-indexed).
///
/// Doubles from one second and is capped at ten seconds.
pub fn backoff(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(16));
    BASE_DELAY.saturating_mul(factor).min(MAX_DELAY)
}
