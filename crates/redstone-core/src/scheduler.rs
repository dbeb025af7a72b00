//! Deterministic per-tick driver over all chunk workers.
//!
//! Workers are stepped sequentially in ascending [`ChunkId`] Morton order.
//! The order is rebuilt only when the worker set changes. Each chunk's budget
//! starts at the base budget, grows by half when the router flagged the chunk
//! hot since the previous tick, and is then shifted right by the chunk's
//! watchdog penalty.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::event::Event;
use crate::id::ChunkId;
use crate::router::Router;
use crate::sim::Tick;
use crate::worker::ChunkWorker;

/// Consecutive saturated ticks that raise the penalty by one.
pub const SATURATION_STREAK: u32 = 3;

/// Largest penalty exponent: the budget never shrinks below `base >> 3`.
pub const MAX_PENALTY: u32 = 3;

// ---------------------------------------------------------------------------
// Watchdog
// ---------------------------------------------------------------------------

/// Per-chunk adaptive throttle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watchdog {
    streak: u32,
    penalty: u32,
}

impl Watchdog {
    pub fn penalty(&self) -> u32 {
        self.penalty
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// Record one tick's outcome. Returns the new penalty.
    pub fn observe(&mut self, saturated: bool) -> u32 {
        if saturated {
            self.streak += 1;
            if self.streak >= SATURATION_STREAK {
                self.streak = 0;
                self.penalty = (self.penalty + 1).min(MAX_PENALTY);
            }
        } else {
            self.streak = 0;
            self.penalty = self.penalty.saturating_sub(1);
        }
        self.penalty
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What one chunk did during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkTickStats {
    pub chunk: ChunkId,
    pub budget: usize,
    pub ops: usize,
    pub queue_len: usize,
    pub hot: bool,
    pub saturated: bool,
    /// Penalty after this tick's observation.
    pub penalty: u32,
}

/// Result of [`Scheduler::tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: Tick,
    /// Per-chunk stats, in scheduling order. Chunks whose step failed are absent.
    pub chunks: Vec<ChunkTickStats>,
    /// Outputs from every chunk, in scheduling order.
    pub outputs: Vec<Event>,
    /// Chunks whose step returned an error.
    pub failed: Vec<ChunkId>,
}

impl TickReport {
    pub fn ops(&self) -> usize {
        self.chunks.iter().map(|c| c.ops).sum()
    }

    pub fn stats(&self, chunk: ChunkId) -> Option<&ChunkTickStats> {
        self.chunks.iter().find(|c| c.chunk == chunk)
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Slot {
    worker: ChunkWorker,
    watchdog: Watchdog,
}

/// Owns every chunk worker and steps them once per tick.
#[derive(Debug)]
pub struct Scheduler {
    router: Arc<Router>,
    base_budget: usize,
    slots: FxHashMap<ChunkId, Slot>,
    order: Vec<ChunkId>,
    order_dirty: bool,
}

impl Scheduler {
    pub fn new(router: Arc<Router>, base_budget: usize) -> Self {
        Self {
            router,
            base_budget,
            slots: FxHashMap::default(),
            order: Vec::new(),
            order_dirty: false,
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn base_budget(&self) -> usize {
        self.base_budget
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, chunk: ChunkId) -> bool {
        self.slots.contains_key(&chunk)
    }

    /// Add a worker, returning the one it replaces. The replaced worker's
    /// watchdog state is kept.
    pub fn insert(&mut self, worker: ChunkWorker) -> Option<ChunkWorker> {
        let chunk = worker.chunk();
        match self.slots.get_mut(&chunk) {
            Some(slot) => Some(std::mem::replace(&mut slot.worker, worker)),
            None => {
                self.slots.insert(
                    chunk,
                    Slot {
                        worker,
                        watchdog: Watchdog::default(),
                    },
                );
                self.order_dirty = true;
                None
            }
        }
    }

    pub fn remove(&mut self, chunk: ChunkId) -> Option<ChunkWorker> {
        let slot = self.slots.remove(&chunk)?;
        self.order_dirty = true;
        Some(slot.worker)
    }

    pub fn worker(&self, chunk: ChunkId) -> Option<&ChunkWorker> {
        self.slots.get(&chunk).map(|s| &s.worker)
    }

    /// Chunks in scheduling order.
    pub fn order(&mut self) -> &[ChunkId] {
        self.refresh_order();
        &self.order
    }

    fn refresh_order(&mut self) {
        if !self.order_dirty {
            return;
        }
        self.order = self.slots.keys().copied().collect();
        self.order.sort_unstable();
        self.order_dirty = false;
        debug!(chunks = self.order.len(), "rebuilt scheduling order");
    }

    pub fn penalty(&self, chunk: ChunkId) -> u32 {
        self.slots.get(&chunk).map_or(0, |s| s.watchdog.penalty())
    }

    /// Budget `chunk` would get this tick.
    pub fn budget_for(&self, chunk: ChunkId, hot: bool) -> usize {
        let mut budget = self.base_budget;
        if hot {
            budget += budget / 2;
        }
        (budget >> self.penalty(chunk)).max(1)
    }

    /// Step every worker once for `tick`.
    ///
    /// A failing worker is logged and skipped; the rest of the tick runs.
    pub fn tick(&mut self, cancel: &CancelToken, tick: Tick) -> TickReport {
        self.refresh_order();
        let hot = self.router.snapshot_hot();
        self.router.clear_hot();

        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };
        for &chunk in &self.order {
            let budget = self.budget_for(chunk, hot.contains(&chunk));
            let Some(slot) = self.slots.get_mut(&chunk) else {
                continue;
            };
            let step = match slot.worker.step(cancel, tick, budget) {
                Ok(step) => step,
                Err(err) => {
                    warn!(tick, %chunk, %err, "chunk step failed");
                    report.failed.push(chunk);
                    continue;
                }
            };

            let saturated = step.saturated();
            let before = slot.watchdog.penalty();
            let penalty = slot.watchdog.observe(saturated);
            if penalty != before {
                debug!(tick, %chunk, from = before, to = penalty, "watchdog penalty changed");
            }

            report.chunks.push(ChunkTickStats {
                chunk,
                budget,
                ops: step.ops,
                queue_len: step.queue_len,
                hot: step.hot,
                saturated,
                penalty,
            });
            report.outputs.extend(step.outputs);
        }
        report
    }

    /// Stop and drop every worker.
    pub fn shutdown(&mut self) {
        for (_, mut slot) in self.slots.drain() {
            slot.worker.stop();
        }
        self.order.clear();
        self.order_dirty = false;
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::processor::NoopProcessor;

    fn worker(router: &Arc<Router>, chunk: ChunkId) -> ChunkWorker {
        ChunkWorker::spawn(chunk, &Graph::new(), Box::new(NoopProcessor), router, 16).unwrap()
    }

    #[test]
    fn watchdog_raises_after_streak_and_decays() {
        let mut w = Watchdog::default();
        assert_eq!(w.observe(true), 0);
        assert_eq!(w.observe(true), 0);
        assert_eq!(w.observe(true), 1);
        assert_eq!(w.streak(), 0);
        assert_eq!(w.observe(false), 0);
        assert_eq!(w.observe(false), 0);
    }

    #[test]
    fn watchdog_penalty_is_capped() {
        let mut w = Watchdog::default();
        for _ in 0..30 {
            w.observe(true);
        }
        assert_eq!(w.penalty(), MAX_PENALTY);
    }

    #[test]
    fn interrupted_streak_starts_over() {
        let mut w = Watchdog::default();
        w.observe(true);
        w.observe(true);
        w.observe(false);
        w.observe(true);
        w.observe(true);
        assert_eq!(w.penalty(), 0);
    }

    #[test]
    fn budget_hot_bonus_and_floor() {
        let router = Router::new();
        let mut s = Scheduler::new(router, 8);
        let chunk = ChunkId::new(0, 0);
        assert_eq!(s.budget_for(chunk, false), 8);
        assert_eq!(s.budget_for(chunk, true), 12);

        s.base_budget = 0;
        assert_eq!(s.budget_for(chunk, false), 1);
    }

    #[test]
    fn order_is_morton_sorted_regardless_of_insertion() {
        let router = Router::new();
        let mut s = Scheduler::new(Arc::clone(&router), 8);
        let chunks = [
            ChunkId::new(3, -1),
            ChunkId::new(0, 0),
            ChunkId::new(-2, 5),
            ChunkId::new(1, 1),
        ];
        for c in chunks {
            s.insert(worker(&router, c));
        }
        let mut expected = chunks.to_vec();
        expected.sort_by_key(|c| c.morton());
        assert_eq!(s.order(), expected.as_slice());

        s.remove(ChunkId::new(0, 0));
        expected.retain(|c| *c != ChunkId::new(0, 0));
        assert_eq!(s.order(), expected.as_slice());
    }

    #[test]
    fn cancelled_tick_skips_every_chunk() {
        let router = Router::new();
        let mut s = Scheduler::new(Arc::clone(&router), 8);
        s.insert(worker(&router, ChunkId::new(0, 0)));
        s.insert(worker(&router, ChunkId::new(1, 0)));

        let cancel = CancelToken::new();
        cancel.cancel();
        let report = s.tick(&cancel, 0);
        assert!(report.chunks.is_empty());
        assert_eq!(report.failed.len(), 2);
    }

    #[test]
    fn replacing_a_worker_keeps_order_stable() {
        let router = Router::new();
        let mut s = Scheduler::new(Arc::clone(&router), 8);
        let chunk = ChunkId::new(2, 2);
        assert!(s.insert(worker(&router, chunk)).is_none());
        let old = s.insert(worker(&router, chunk));
        assert!(old.is_some());
        assert_eq!(s.len(), 1);
        drop(old);
        // The old worker's registration was superseded, so the new one stays routable.
        assert!(router.is_registered(chunk));
    }

    #[test]
    fn shutdown_unregisters_everything() {
        let router = Router::new();
        let mut s = Scheduler::new(Arc::clone(&router), 8);
        s.insert(worker(&router, ChunkId::new(0, 0)));
        s.insert(worker(&router, ChunkId::new(0, 1)));
        s.shutdown();
        assert!(s.is_empty());
        assert!(!router.is_registered(ChunkId::new(0, 0)));
        assert!(!router.is_registered(ChunkId::new(0, 1)));
    }
}
