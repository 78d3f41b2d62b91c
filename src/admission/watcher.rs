//! Resource watcher.
//!
//! # Responsibilities
//! - Periodically sample the pressure probe
//! - Publish the latest sample for lock-free reads by every command
//! - Stop sampling on shutdown
//!
//! # Design Decisions
//! - Probe reads run on the blocking pool, never on request threads
//! - The sample is a single `AtomicU64`; readers never see a torn value
//! - One sample is taken synchronously at start

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::admission::probe::PressureProbe;
use crate::observability::metrics;

/// Latest pressure reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PressureSample {
    pub bytes: u64,
}

/// Process-wide pressure monitor.
pub struct ResourceWatcher {
    current: AtomicU64,
    probe: Arc<dyn PressureProbe>,
    interval: Duration,
    stop: CancellationToken,
}

impl ResourceWatcher {
    /// Take an initial sample and spawn the sampling loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(probe: Arc<dyn PressureProbe>, interval: Duration) -> Arc<Self> {
        let initial = probe.sample();
        let watcher = Arc::new(Self {
            current: AtomicU64::new(initial),
            probe,
            interval,
            stop: CancellationToken::new(),
        });
        metrics::record_pressure(initial);

        tracing::info!(
            probe = watcher.probe.name(),
            interval_ms = interval.as_millis() as u64,
            initial_bytes = initial,
            "Resource watcher starting"
        );

        let looping = watcher.clone();
        tokio::spawn(async move {
            looping.run().await;
        });

        watcher
    }

    async fn run(self: Arc<Self>) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the initial sample is already taken.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh().await;
                }
                _ = self.stop.cancelled() => {
                    tracing::info!("Resource watcher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Sample the probe now and publish the result.
    pub async fn refresh(&self) -> PressureSample {
        let probe = self.probe.clone();
        let started = Instant::now();

        let bytes = match tokio::task::spawn_blocking(move || probe.sample()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Pressure probe failed, keeping previous sample");
                return self.current_pressure();
            }
        };

        self.current.store(bytes, Ordering::Release);
        metrics::record_pressure(bytes);

        tracing::trace!(
            bytes,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Pressure sampled"
        );
        PressureSample { bytes }
    }

    /// Latest published sample. Never blocks.
    pub fn current_pressure(&self) -> PressureSample {
        PressureSample {
            bytes: self.current.load(Ordering::Acquire),
        }
    }

    /// Stop the sampling loop. The last sample stays readable.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::probe::ManualProbe;

    #[tokio::test]
    async fn initial_sample_is_available_immediately() {
        let probe = Arc::new(ManualProbe::new(123));
        let watcher = ResourceWatcher::start(probe, Duration::from_secs(60));
        assert_eq!(watcher.current_pressure().bytes, 123);
        watcher.stop();
    }

    #[tokio::test]
    async fn refresh_publishes_new_value() {
        let probe = Arc::new(ManualProbe::new(1));
        let watcher = ResourceWatcher::start(probe.clone(), Duration::from_secs(60));

        probe.set(900);
        assert_eq!(watcher.current_pressure().bytes, 1);
        assert_eq!(watcher.refresh().await.bytes, 900);
        assert_eq!(watcher.current_pressure().bytes, 900);
        watcher.stop();
    }

    #[tokio::test]
    async fn loop_picks_up_changes() {
        let probe = Arc::new(ManualProbe::new(0));
        let watcher = ResourceWatcher::start(probe.clone(), Duration::from_millis(10));

        probe.set(77);
        let deadline = Instant::now() + Duration::from_secs(2);
        while watcher.current_pressure().bytes != 77 {
            assert!(Instant::now() < deadline, "watcher never sampled the new value");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        watcher.stop();
        assert!(watcher.is_stopped());
    }
}
