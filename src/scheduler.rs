//! Periodic execution around the pipeline: one-shot (for cron) or daemon.
//!
//! Before every batch the resource gate is consulted when the LLM runs on
//! this host. A batch either runs in full (up to the per-run limit) or is
//! skipped; batches never overlap because the daemon loop awaits each one
//! before sleeping.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::pipeline::{BatchSummary, Pipeline};
use crate::progress::create_spinner;
use crate::resources::{check_resources, wait_for_resources, MemoryProbe, ResourceThresholds, MAX_RESOURCE_WAIT};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Once,
    Daemon { interval: Duration },
}

#[derive(Clone, Debug, PartialEq)]
pub enum BatchOutcome {
    Completed(BatchSummary),
    /// Resources stayed insufficient for the whole wait; nothing was processed.
    Skipped { reason: String },
}

/// Daemon period for a minute count; `None` for zero or a value whose
/// length in seconds does not fit.
pub fn daemon_interval(minutes: u64) -> Option<Duration> {
    if minutes == 0 {
        return None;
    }
    minutes.checked_mul(60).map(Duration::from_secs)
}

/// Memory check with a bounded wait.
pub struct ResourceGate {
    probe: Box<dyn MemoryProbe>,
    thresholds: ResourceThresholds,
    poll_interval: Duration,
    max_wait: Duration,
}

impl ResourceGate {
    pub fn new(probe: Box<dyn MemoryProbe>, thresholds: ResourceThresholds, poll_interval: Duration) -> Self {
        Self {
            probe,
            thresholds,
            poll_interval,
            max_wait: MAX_RESOURCE_WAIT,
        }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// `Ok(())` when a local model may run now, otherwise the last reason.
    pub async fn admit(&mut self) -> Result<(), String> {
        let status = check_resources(self.probe.as_mut(), &self.thresholds);
        if status.can_run_llm {
            return Ok(());
        }
        warn!(
            "Insufficient resources ({}), waiting up to {} minutes",
            status.summary(),
            self.max_wait.as_secs() / 60
        );

        let spinner = create_spinner("Waiting for free memory");
        let ready = wait_for_resources(self.probe.as_mut(), &self.thresholds, self.poll_interval, self.max_wait).await;
        spinner.finish_and_clear();
        if ready {
            info!("Resources available, continuing");
            Ok(())
        } else {
            let status = check_resources(self.probe.as_mut(), &self.thresholds);
            let summary = status.summary();
            Err(status.reason.unwrap_or(summary))
        }
    }
}

pub struct ScheduledRunner {
    pipeline: Pipeline,
    gate: ResourceGate,
    max_songs: Option<usize>,
}

impl ScheduledRunner {
    pub fn new(pipeline: Pipeline, gate: ResourceGate, max_songs: Option<usize>) -> Self {
        Self {
            pipeline,
            gate,
            max_songs,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Gate, then one batch of at most `max_songs` files.
    pub async fn run_once(&mut self) -> Result<BatchOutcome> {
        self.pipeline.invalidate_examples();

        if self.pipeline.llm().is_local() {
            if let Err(reason) = self.gate.admit().await {
                warn!("Skipping this batch: resources still insufficient ({})", reason);
                return Ok(BatchOutcome::Skipped { reason });
            }
        }

        let summary = self.pipeline.run_batch(self.max_songs).await?;
        Ok(BatchOutcome::Completed(summary))
    }

    /// Batches every `interval` until `shutdown` resolves. Returns the number
    /// of batches that ran to completion.
    pub async fn run_daemon<F>(&mut self, interval: Duration, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut completed = 0;
        info!("Daemon started, running every {} minutes", interval.as_secs() / 60);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                result = self.run_once() => match result {
                    Ok(BatchOutcome::Completed(_)) => completed += 1,
                    Ok(BatchOutcome::Skipped { .. }) => {}
                    Err(e) => error!("Batch failed: {:#}", e),
                },
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("Shutdown requested, daemon stopping after {} batches", completed);
        completed
    }

    /// `None` when interrupted in one-shot mode, and always in daemon mode.
    pub async fn run<F>(&mut self, mode: RunMode, shutdown: F) -> Result<Option<BatchOutcome>>
    where
        F: Future<Output = ()>,
    {
        match mode {
            RunMode::Once => {
                tokio::select! {
                    result = self.run_once() => result.map(Some),
                    _ = shutdown => {
                        info!("Interrupted, stopping");
                        Ok(None)
                    }
                }
            }
            RunMode::Daemon { interval } => {
                self.run_daemon(interval, shutdown).await;
                Ok(None)
            }
        }
    }
}
