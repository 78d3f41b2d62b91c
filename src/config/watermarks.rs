//! Memory watermark derivation.
//!
//! Watermarks not given explicitly are derived from `memory_limit`:
//! low = 80% and high = 95%, rounded down. Explicit values are taken
//! as they are, even when they contradict each other or the limit.

use serde::Serialize;

use crate::config::schema::MemoryConfig;

const LOW_WATERMARK_PERCENT: u64 = 80;
const HIGH_WATERMARK_PERCENT: u64 = 95;

/// Thresholds classifying memory pressure, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Watermarks {
    /// Throttle threshold.
    pub low: u64,
    /// Hard-reject threshold.
    pub high: u64,
}

impl Watermarks {
    /// True when `low <= high`. Explicit configuration may violate this.
    pub fn is_consistent(&self) -> bool {
        self.low <= self.high
    }
}

/// Compute the watermarks, filling the absent ones from `memory_limit`.
pub fn compute_watermarks(memory: &MemoryConfig) -> Watermarks {
    Watermarks {
        low: memory
            .low_watermark
            .unwrap_or_else(|| percent_of(memory.memory_limit, LOW_WATERMARK_PERCENT)),
        high: memory
            .high_watermark
            .unwrap_or_else(|| percent_of(memory.memory_limit, HIGH_WATERMARK_PERCENT)),
    }
}

// floor(limit * percent / 100) without going through floats.
fn percent_of(limit: u64, percent: u64) -> u64 {
    (limit as u128 * percent as u128 / 100) as u64
}
