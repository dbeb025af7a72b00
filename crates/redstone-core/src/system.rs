//! Host-facing facade composing the router, scheduler and metrics.
//!
//! A [`System`] built from a disabled config (or with [`System::disabled`])
//! holds nothing. Every method on it is a no-op, so a host can keep its calls
//! in place and switch the whole subsystem off by configuration.

use std::sync::Arc;

use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::config::{Config, ConfigError};
use crate::event::Event;
use crate::graph::{Graph, GraphError};
use crate::id::ChunkId;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::processor::{ProcessorFactory, default_factory};
use crate::router::{RouteError, Router, SendOutcome};
use crate::scheduler::{Scheduler, TickReport};
use crate::sim::{StateHash, Tick};
use crate::worker::{ChunkWorker, WorkerError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("chunk {0} is not loaded")]
    UnknownChunk(ChunkId),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

struct Inner {
    config: Config,
    router: Arc<Router>,
    scheduler: Scheduler,
    metrics: Metrics,
    factory: ProcessorFactory,
    tick: Tick,
}

/// The redstone subsystem as seen by the host's tick loop.
pub struct System {
    inner: Option<Inner>,
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            None => f.write_str("System(disabled)"),
            Some(inner) => f
                .debug_struct("System")
                .field("config", &inner.config)
                .field("tick", &inner.tick)
                .field("chunks", &inner.scheduler.len())
                .finish(),
        }
    }
}

impl Default for System {
    fn default() -> Self {
        Self::disabled()
    }
}

impl System {
    /// Build a system running the built-in state machine.
    pub fn new(config: Config) -> Result<Self, SystemError> {
        Self::with_processor_factory(config, default_factory())
    }

    /// Build a system whose chunk workers get processors from `factory`.
    pub fn with_processor_factory(config: Config, factory: ProcessorFactory) -> Result<Self, SystemError> {
        if !config.enabled {
            info!("redstone simulation disabled by config");
            return Ok(Self::disabled());
        }
        config.validate()?;
        let router = Router::new();
        let scheduler = Scheduler::new(Arc::clone(&router), config.budget_per_tick);
        info!(
            inbox_size = config.inbox_size,
            budget_per_tick = config.budget_per_tick,
            "redstone simulation started"
        );
        Ok(Self {
            inner: Some(Inner {
                config,
                router,
                scheduler,
                metrics: Metrics::new(),
                factory,
                tick: 0,
            }),
        })
    }

    /// An inert system.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn config(&self) -> Option<&Config> {
        self.inner.as_ref().map(|i| &i.config)
    }

    pub fn router(&self) -> Option<&Arc<Router>> {
        self.inner.as_ref().map(|i| &i.router)
    }

    /// Start a worker for `chunk` owning a copy of `graph`, or replace the
    /// graph if the chunk is already loaded.
    pub fn load_chunk(&mut self, chunk: ChunkId, graph: &Graph) -> Result<(), SystemError> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(());
        };
        graph.validate()?;
        if let Some(worker) = inner.scheduler.worker(chunk) {
            worker.update_graph(graph)?;
            return Ok(());
        }
        let processor = (inner.factory)(chunk);
        let worker = ChunkWorker::spawn(chunk, graph, processor, &inner.router, inner.config.inbox_size)?;
        inner.scheduler.insert(worker);
        inner.metrics.set_chunks_loaded(inner.scheduler.len());
        debug!(%chunk, nodes = graph.len(), "chunk loaded");
        Ok(())
    }

    /// Replace a loaded chunk's graph wholesale.
    pub fn update_graph(&mut self, chunk: ChunkId, graph: &Graph) -> Result<(), SystemError> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(());
        };
        graph.validate()?;
        let worker = inner
            .scheduler
            .worker(chunk)
            .ok_or(SystemError::UnknownChunk(chunk))?;
        worker.update_graph(graph)?;
        Ok(())
    }

    /// Stop the chunk's worker. Returns whether the chunk was loaded.
    pub fn unload_chunk(&mut self, chunk: ChunkId) -> bool {
        let Some(inner) = self.inner.as_mut() else {
            return false;
        };
        let Some(mut worker) = inner.scheduler.remove(chunk) else {
            return false;
        };
        worker.stop();
        inner.metrics.set_chunks_loaded(inner.scheduler.len());
        debug!(%chunk, "chunk unloaded");
        true
    }

    /// Queue an externally produced event on the chunk containing its position.
    pub fn submit(&self, event: Event) -> Result<(), SystemError> {
        let Some(inner) = self.inner.as_ref() else {
            return Ok(());
        };
        let chunk = event.pos.chunk();
        let worker = inner
            .scheduler
            .worker(chunk)
            .ok_or(SystemError::UnknownChunk(chunk))?;
        worker.enqueue_local(event)?;
        inner.metrics.record_submit();
        Ok(())
    }

    /// Route an event through the router, as a neighbouring chunk would.
    /// A disabled system has no mailboxes, so every chunk is unknown.
    pub fn send(&self, chunk: ChunkId, event: Event) -> Result<SendOutcome, RouteError> {
        match &self.inner {
            Some(inner) => inner.router.send(chunk, event),
            None => Err(RouteError::UnknownChunk(chunk)),
        }
    }

    /// Run the current tick and advance the tick counter.
    pub fn tick(&mut self) -> TickReport {
        self.tick_with_cancel(&CancelToken::new())
    }

    /// Run the current tick; chunks not yet stepped when `cancel` fires are
    /// skipped and reported as failed.
    pub fn tick_with_cancel(&mut self, cancel: &CancelToken) -> TickReport {
        let Some(inner) = self.inner.as_mut() else {
            return TickReport::default();
        };
        let tick = inner.tick;
        let report = inner.scheduler.tick(cancel, tick);
        inner.metrics.record_tick(&report);
        inner.tick += 1;
        debug!(
            tick,
            chunks = report.chunks.len(),
            ops = report.ops(),
            outputs = report.outputs.len(),
            "tick complete"
        );
        report
    }

    /// The tick the next call to [`System::tick`] will run.
    pub fn current_tick(&self) -> Tick {
        self.inner.as_ref().map_or(0, |i| i.tick)
    }

    pub fn chunks(&mut self) -> Vec<ChunkId> {
        self.inner
            .as_mut()
            .map(|i| i.scheduler.order().to_vec())
            .unwrap_or_default()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        match &self.inner {
            Some(inner) => inner.metrics.snapshot(inner.router.stats()),
            None => MetricsSnapshot::default(),
        }
    }

    /// A deep copy of a loaded chunk's graph.
    pub fn graph_snapshot(&self, chunk: ChunkId) -> Result<Option<Graph>, SystemError> {
        let Some(inner) = self.inner.as_ref() else {
            return Ok(None);
        };
        let worker = inner
            .scheduler
            .worker(chunk)
            .ok_or(SystemError::UnknownChunk(chunk))?;
        Ok(Some(worker.graph_snapshot()?))
    }

    /// Fingerprint of every loaded chunk's state, folded in scheduling order.
    pub fn state_hash(&mut self) -> Result<u64, SystemError> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(StateHash::new().finish());
        };
        let mut h = StateHash::new();
        h.write_u64(inner.tick);
        let order = inner.scheduler.order().to_vec();
        for chunk in order {
            let Some(worker) = inner.scheduler.worker(chunk) else {
                continue;
            };
            h.write_u64(chunk.morton());
            h.write_u64(worker.state_hash()?);
        }
        Ok(h.finish())
    }

    /// Stop every worker and disable the system.
    pub fn shutdown(&mut self) {
        let Some(mut inner) = self.inner.take() else {
            return;
        };
        let chunks = inner.scheduler.len();
        inner.scheduler.shutdown();
        info!(tick = inner.tick, chunks, "redstone simulation shut down");
    }
}

// ===========================================================================
// Tests
// ===========================================================================
