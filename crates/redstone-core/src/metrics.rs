//! In-process counters for the simulation.
//!
//! Counters are plain relaxed atomics so that any thread holding the
//! [`Metrics`] can bump or read them. A [`MetricsSnapshot`] is a serializable
//! point-in-time copy that also folds in the router's delivery counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::router::RouterStatsSnapshot;
use crate::scheduler::TickReport;

#[derive(Debug, Default)]
pub struct Metrics {
    ticks: AtomicU64,
    events_processed: AtomicU64,
    outputs: AtomicU64,
    step_errors: AtomicU64,
    saturated_steps: AtomicU64,
    throttled_steps: AtomicU64,
    submitted: AtomicU64,
    chunks_loaded: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub events_processed: u64,
    pub outputs: u64,
    pub step_errors: u64,
    /// Chunk steps that used their whole budget.
    pub saturated_steps: u64,
    /// Chunk steps that ended with a nonzero watchdog penalty.
    pub throttled_steps: u64,
    pub submitted: u64,
    /// Currently loaded chunks (gauge).
    pub chunks_loaded: u64,
    pub router: RouterStatsSnapshot,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one tick's report into the counters.
    pub fn record_tick(&self, report: &TickReport) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.events_processed
            .fetch_add(report.ops() as u64, Ordering::Relaxed);
        self.outputs
            .fetch_add(report.outputs.len() as u64, Ordering::Relaxed);
        self.step_errors
            .fetch_add(report.failed.len() as u64, Ordering::Relaxed);
        let saturated = report.chunks.iter().filter(|c| c.saturated).count();
        let throttled = report.chunks.iter().filter(|c| c.penalty > 0).count();
        self.saturated_steps
            .fetch_add(saturated as u64, Ordering::Relaxed);
        self.throttled_steps
            .fetch_add(throttled as u64, Ordering::Relaxed);
    }

    pub fn record_submit(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_chunks_loaded(&self, n: usize) {
        self.chunks_loaded.store(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, router: RouterStatsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            outputs: self.outputs.load(Ordering::Relaxed),
            step_errors: self.step_errors.load(Ordering::Relaxed),
            saturated_steps: self.saturated_steps.load(Ordering::Relaxed),
            throttled_steps: self.throttled_steps.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            chunks_loaded: self.chunks_loaded.load(Ordering::Relaxed),
            router,
        }
    }
}
