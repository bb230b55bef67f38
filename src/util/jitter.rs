use std::time::Duration;

use tinyrand::{Rand, RandRange, Seeded, StdRand};
use tinyrand_std::ClockSeed;

use crate::constants::{BACKOFF_BASE, BACKOFF_CAP, BACKOFF_MAX_JITTER_MS};

/// Random jitter in `0..max_ms` milliseconds
pub fn next(max_ms: u64) -> Duration {
    if max_ms == 0 {
        return Duration::ZERO;
    }

    let seed = ClockSeed::default().next_u64();
    let mut rng = StdRand::seed(seed);

    Duration::from_millis(rng.next_range(0..max_ms))
}

/// Exponential delay before retry number `attempt` (1-based), capped, without jitter
pub fn backoff_base(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    BACKOFF_BASE.saturating_mul(factor).min(BACKOFF_CAP)
}

pub fn backoff(attempt: u32) -> Duration {
    backoff_base(attempt) + next(BACKOFF_MAX_JITTER_MS)
}
