//! Host memory gate for local LLM inference.
//!
//! A locally hosted model competes with everything else on the box for RAM.
//! Before a batch is allowed to call it, free memory must be above a floor
//! and overall usage below a ceiling.

use std::time::Duration;

use sysinfo::System;
use tokio::time::Instant;
use tracing::{debug, info};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Default floor for free memory.
pub const DEFAULT_MIN_FREE_MEMORY_MB: u64 = 1024;

/// Default ceiling for memory usage.
pub const DEFAULT_MAX_MEMORY_USAGE_PERCENT: f64 = 85.0;

/// Upper bound on how long a scheduled batch waits for memory.
pub const MAX_RESOURCE_WAIT: Duration = Duration::from_secs(30 * 60);

/// Poll interval used while waiting for memory.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResourceThresholds {
    pub min_free_memory_mb: u64,
    pub max_memory_usage_percent: f64,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            min_free_memory_mb: DEFAULT_MIN_FREE_MEMORY_MB,
            max_memory_usage_percent: DEFAULT_MAX_MEMORY_USAGE_PERCENT,
        }
    }
}

/// Point-in-time memory counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemorySnapshot {
    pub total_mb: u64,
    pub free_mb: u64,
}

impl MemorySnapshot {
    pub fn used_percent(&self) -> f64 {
        if self.total_mb == 0 {
            return 100.0;
        }
        let used = self.total_mb.saturating_sub(self.free_mb);
        100.0 * used as f64 / self.total_mb as f64
    }
}

/// Source of memory counters.
pub trait MemoryProbe: Send {
    fn snapshot(&mut self) -> MemorySnapshot;
}

/// Reads the host's counters through `sysinfo`. Free memory is the
/// "available" figure (reclaimable cache counts as free).
pub struct SystemProbe {
    system: System,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemProbe {
    fn snapshot(&mut self) -> MemorySnapshot {
        self.system.refresh_memory();
        MemorySnapshot {
            total_mb: self.system.total_memory() / BYTES_PER_MB,
            free_mb: self.system.available_memory() / BYTES_PER_MB,
        }
    }
}

/// Result of a single resource check.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceStatus {
    pub can_run_llm: bool,
    pub free_memory_mb: u64,
    pub total_memory_mb: u64,
    pub used_percent: f64,
    /// Why the check failed; `None` when it passed.
    pub reason: Option<String>,
}

impl ResourceStatus {
    pub fn summary(&self) -> String {
        format!(
            "{} MB free of {} MB ({:.1}% used)",
            self.free_memory_mb, self.total_memory_mb, self.used_percent
        )
    }
}

/// Evaluate a snapshot against the thresholds. Pure.
pub fn evaluate(snapshot: MemorySnapshot, thresholds: &ResourceThresholds) -> ResourceStatus {
    let used_percent = snapshot.used_percent();
    let reason = if snapshot.free_mb < thresholds.min_free_memory_mb {
        Some(format!(
            "free memory {} MB below minimum {} MB",
            snapshot.free_mb, thresholds.min_free_memory_mb
        ))
    } else if used_percent > thresholds.max_memory_usage_percent {
        Some(format!(
            "memory usage {:.1}% above maximum {:.1}%",
            used_percent, thresholds.max_memory_usage_percent
        ))
    } else {
        None
    };

    ResourceStatus {
        can_run_llm: reason.is_none(),
        free_memory_mb: snapshot.free_mb,
        total_memory_mb: snapshot.total_mb,
        used_percent,
        reason,
    }
}

/// Take a snapshot and evaluate it.
pub fn check_resources(probe: &mut dyn MemoryProbe, thresholds: &ResourceThresholds) -> ResourceStatus {
    let status = evaluate(probe.snapshot(), thresholds);
    debug!(can_run = status.can_run_llm, "Resource check: {}", status.summary());
    status
}

/// Poll until the check passes or `timeout` elapses.
/// Returns whether resources became available.
pub async fn wait_for_resources(
    probe: &mut dyn MemoryProbe,
    thresholds: &ResourceThresholds,
    poll_interval: Duration,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        let status = check_resources(probe, thresholds);
        if status.can_run_llm {
            return true;
        }

        let now = Instant::now();
        if now >= deadline {
            return false;
        }

        info!(
            "Waiting for resources: {} ({})",
            status.reason.as_deref().unwrap_or("insufficient"),
            status.summary()
        );
        let remaining = deadline - now;
        tokio::time::sleep(poll_interval.min(remaining)).await;
    }
}
