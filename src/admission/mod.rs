//! Admission control subsystem.
//!
//! # Data Flow
//! ```text
//! probe.rs (memory reading)
//!     → watcher.rs (periodic sample, atomic publish)
//!     → classify() against the watermarks
//!         Normal   → dispatch
//!         Degraded → dispatch with degraded execution mode
//!         Reject   → 503, driver never invoked
//!     → limiter.rs (in-flight cap, 429 when exhausted)
//! ```
//!
//! # Bands
//! ```text
//! 0 ──── normal ──── low ──── degraded ──── high ──── reject ────▶
//! ```

pub mod limiter;
pub mod probe;
pub mod watcher;

use std::fmt;

use serde::Serialize;

use crate::config::Watermarks;

pub use limiter::{CommandPermit, ConcurrencyLimiter};
pub use probe::{ManualProbe, PressureProbe, ProcessMemoryProbe};
pub use watcher::{PressureSample, ResourceWatcher};

/// Outcome of comparing a pressure sample with the watermarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    Normal,
    Degraded,
    Reject,
}

impl Admission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Admission::Normal => "normal",
            Admission::Degraded => "degraded",
            Admission::Reject => "reject",
        }
    }
}

impl fmt::Display for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a sample. The high watermark is checked first, so an inverted
/// configuration (low > high) never admits what `high` rejects.
pub fn classify(sample: PressureSample, watermarks: &Watermarks) -> Admission {
    if sample.bytes >= watermarks.high {
        Admission::Reject
    } else if sample.bytes >= watermarks.low {
        Admission::Degraded
    } else {
        Admission::Normal
    }
}
