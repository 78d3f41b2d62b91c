//! Pressure probes read by the resource watcher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use sysinfo::{Pid, System};

/// Source of raw pressure readings, in bytes.
///
/// `sample` may block briefly (e.g. reading `/proc`); the watcher calls it
/// off the request-handling threads.
pub trait PressureProbe: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn sample(&self) -> u64;
}

/// Resident memory of the current process.
pub struct ProcessMemoryProbe {
    system: Mutex<System>,
    pid: Pid,
}

impl ProcessMemoryProbe {
    pub fn new() -> Result<Self, String> {
        let pid = sysinfo::get_current_pid().map_err(|e| e.to_string())?;
        Ok(Self {
            system: Mutex::new(System::new()),
            pid,
        })
    }
}

impl PressureProbe for ProcessMemoryProbe {
    fn name(&self) -> &'static str {
        "process_memory"
    }

    fn sample(&self) -> u64 {
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        if !system.refresh_process(self.pid) {
            tracing::warn!(pid = %self.pid, "Process vanished from the process table");
            return 0;
        }
        system.process(self.pid).map(|p| p.memory()).unwrap_or(0)
    }
}

/// Probe whose reading is set from outside.
///
/// Useful when pressure is accounted by the embedding application, and in tests.
#[derive(Debug, Default)]
pub struct ManualProbe {
    value: AtomicU64,
}

impl ManualProbe {
    pub fn new(value: u64) -> Self {
        Self {
            value: AtomicU64::new(value),
        }
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }
}

impl PressureProbe for ManualProbe {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn sample(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}
