//! Single-owner actor driving one chunk's graph.
//!
//! A [`ChunkWorker`] owns a dedicated thread that holds the chunk's
//! [`Graph`], local event queue and [`Processor`]. Every operation is a
//! command sent over the worker's command channel; the caller blocks on a
//! reply channel until the worker thread has processed it. Nothing outside
//! the thread ever holds a reference into the graph, so the owned state needs
//! no locking.
//!
//! # Step
//!
//! [`ChunkWorker::step`] runs one tick for the chunk:
//!
//! 1. Take the router's coalesced backlog for this chunk.
//! 2. Drain the mailbox without blocking.
//! 3. Walk the local queue: events not yet due go to a *future* bucket, due
//!    events past the budget go to an *overflow* bucket, and events identical
//!    in `(pos, tick, power, kind)` to one already handled this step are dropped.
//! 4. Hand each remaining event to the processor. Local emissions join the
//!    queue (never earlier than the current tick), remote emissions go to the
//!    router no earlier than the next tick, and outputs are returned.
//! 5. Overflow then future becomes the new local queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, SendError, Sender};
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::event::{Event, EventKind};
use crate::graph::Graph;
use crate::id::{BlockPos, ChunkId};
use crate::processor::{Emission, Emitter, Processor};
use crate::router::{Registration, Router};
use crate::sim::Tick;

// ---------------------------------------------------------------------------
// Errors and reports
// ---------------------------------------------------------------------------

/// Errors surfaced by worker round-trips.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("operation cancelled")]
    Cancelled,
    #[error("worker for chunk {0} has stopped")]
    Stopped(ChunkId),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// What one [`ChunkWorker::step`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    pub chunk: ChunkId,
    pub tick: Tick,
    /// Budget the step ran with.
    pub budget: usize,
    /// Events handed to the processor.
    pub ops: usize,
    /// Local queue length after the step (overflow + future).
    pub queue_len: usize,
    /// Whether work remains queued.
    pub hot: bool,
    /// Externally visible effects, in emission order.
    pub outputs: Vec<Event>,
}

impl StepReport {
    /// The step used its whole budget.
    pub fn saturated(&self) -> bool {
        self.budget > 0 && self.ops >= self.budget
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

enum Command {
    EnqueueLocal {
        event: Event,
        reply: Sender<()>,
    },
    UpdateGraph {
        graph: Box<Graph>,
        reply: Sender<()>,
    },
    Step {
        tick: Tick,
        budget: usize,
        cancel: CancelToken,
        reply: Sender<Result<StepReport, WorkerError>>,
    },
    Snapshot {
        reply: Sender<Graph>,
    },
    QueueLen {
        reply: Sender<usize>,
    },
    Stop,
}

// ---------------------------------------------------------------------------
// ChunkWorker (handle)
// ---------------------------------------------------------------------------

/// Handle to a chunk's actor thread.
#[derive(Debug)]
pub struct ChunkWorker {
    chunk: ChunkId,
    commands: Sender<Command>,
    thread: Option<JoinHandle<()>>,
    registration: Option<Registration>,
}

impl ChunkWorker {
    /// Start a worker owning a deep copy of `graph`, with a mailbox of
    /// `inbox_size` events registered on `router`.
    pub fn spawn(
        chunk: ChunkId,
        graph: &Graph,
        processor: Box<dyn Processor>,
        router: &Arc<Router>,
        inbox_size: usize,
    ) -> Result<Self, WorkerError> {
        let (mailbox_tx, mailbox_rx) = channel::bounded(inbox_size);
        let (commands_tx, commands_rx) = channel::unbounded();

        debug!(%chunk, processor = processor.name(), inbox_size, "starting chunk worker");
        let state = WorkerState {
            chunk,
            graph: graph.clone(),
            queue: Vec::new(),
            processor,
            mailbox: mailbox_rx,
            router: Arc::clone(router),
            undelivered: Vec::new(),
        };
        let thread = std::thread::Builder::new()
            .name(format!("chunk-{}-{}", chunk.x, chunk.z))
            .spawn(move || state.run(commands_rx))?;
        let registration = router.register(chunk, mailbox_tx);

        Ok(Self {
            chunk,
            commands: commands_tx,
            thread: Some(thread),
            registration: Some(registration),
        })
    }

    pub fn chunk(&self) -> ChunkId {
        self.chunk
    }

    fn call<T>(&self, make: impl FnOnce(Sender<T>) -> Command) -> Result<T, WorkerError> {
        let (tx, rx) = channel::bounded(1);
        self.commands
            .send(make(tx))
            .map_err(|_| WorkerError::Stopped(self.chunk))?;
        rx.recv().map_err(|_| WorkerError::Stopped(self.chunk))
    }

    /// Queue an event for this chunk, replacing a pending event with the same
    /// `(pos, tick, kind)`.
    pub fn enqueue_local(&self, event: Event) -> Result<(), WorkerError> {
        self.call(|reply| Command::EnqueueLocal { event, reply })
    }

    /// Replace the owned graph wholesale with a deep copy of `graph`.
    pub fn update_graph(&self, graph: &Graph) -> Result<(), WorkerError> {
        let graph = Box::new(graph.clone());
        self.call(|reply| Command::UpdateGraph { graph, reply })
    }

    /// Run one tick with at most `budget` processed events.
    ///
    /// If `cancel` fires before the worker accepts the command, the worker
    /// returns [`WorkerError::Cancelled`] without touching its state. If it
    /// fires while the step is running, the caller stops waiting; outputs of
    /// that step are carried over into the next report.
    pub fn step(&self, cancel: &CancelToken, tick: Tick, budget: usize) -> Result<StepReport, WorkerError> {
        if cancel.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }
        let (tx, rx) = channel::bounded(1);
        self.commands
            .send(Command::Step {
                tick,
                budget,
                cancel: cancel.clone(),
                reply: tx,
            })
            .map_err(|_| WorkerError::Stopped(self.chunk))?;

        channel::select! {
            recv(rx) -> reply => reply.map_err(|_| WorkerError::Stopped(self.chunk))?,
            recv(cancel.done()) -> _ => rx.try_recv().unwrap_or(Err(WorkerError::Cancelled)),
        }
    }

    /// A deep copy of the owned graph, for inspection.
    pub fn graph_snapshot(&self) -> Result<Graph, WorkerError> {
        self.call(|reply| Command::Snapshot { reply })
    }

    /// Fingerprint of the owned graph's node states.
    pub fn state_hash(&self) -> Result<u64, WorkerError> {
        Ok(self.graph_snapshot()?.state_hash())
    }

    /// Length of the local queue.
    pub fn queue_len(&self) -> Result<usize, WorkerError> {
        self.call(|reply| Command::QueueLen { reply })
    }

    /// Unregister from the router and stop the worker thread. Idempotent.
    pub fn stop(&mut self) {
        if let Some(registration) = self.registration.take() {
            registration.unregister();
        }
        let Some(thread) = self.thread.take() else {
            return;
        };
        // A send error means the thread already exited.
        let _ = self.commands.send(Command::Stop);
        if thread.join().is_err() {
            warn!(chunk = %self.chunk, "chunk worker thread panicked");
        }
    }
}

impl Drop for ChunkWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// WorkerState (owned by the worker thread)
// ---------------------------------------------------------------------------

struct WorkerState {
    chunk: ChunkId,
    graph: Graph,
    queue: Vec<Event>,
    processor: Box<dyn Processor>,
    mailbox: Receiver<Event>,
    router: Arc<Router>,
    /// Outputs whose step reply was abandoned by a cancelled caller.
    undelivered: Vec<Event>,
}

/// Identity used to drop duplicate work within one step.
type StepKey = (BlockPos, Tick, u8, EventKind);

impl WorkerState {
    fn run(mut self, commands: Receiver<Command>) {
        while let Ok(command) = commands.recv() {
            match command {
                Command::EnqueueLocal { event, reply } => {
                    self.enqueue_local(event);
                    let _ = reply.send(());
                }
                Command::UpdateGraph { graph, reply } => {
                    self.graph = *graph;
                    debug!(chunk = %self.chunk, nodes = self.graph.len(), "graph replaced");
                    let _ = reply.send(());
                }
                Command::Step {
                    tick,
                    budget,
                    cancel,
                    reply,
                } => {
                    if cancel.is_cancelled() {
                        let _ = reply.send(Err(WorkerError::Cancelled));
                        continue;
                    }
                    let report = self.step(tick, budget);
                    if let Err(SendError(Ok(report))) = reply.send(Ok(report)) {
                        self.undelivered.extend(report.outputs);
                    }
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.graph.clone());
                }
                Command::QueueLen { reply } => {
                    let _ = reply.send(self.queue.len());
                }
                Command::Stop => break,
            }
        }
        debug!(chunk = %self.chunk, "chunk worker stopped");
    }

    fn enqueue_local(&mut self, event: Event) {
        let same = |e: &Event| e.pos == event.pos && e.tick == event.tick && e.kind == event.kind;
        match self.queue.iter_mut().find(|e| same(e)) {
            Some(slot) => *slot = event,
            None => self.queue.push(event),
        }
    }

    fn step(&mut self, tick: Tick, budget: usize) -> StepReport {
        let mut pending: VecDeque<Event> = self.router.drain_coalesced(self.chunk).into();
        pending.extend(self.mailbox.try_iter());
        // Previously queued work runs ahead of newly arrived events.
        for event in self.queue.drain(..).rev() {
            pending.push_front(event);
        }

        let mut future = Vec::new();
        let mut overflow = Vec::new();
        let mut seen: FxHashSet<StepKey> = FxHashSet::default();
        let mut outputs = std::mem::take(&mut self.undelivered);
        let mut ops = 0;
        let mut emitter = Emitter::new();

        while let Some(mut event) = pending.pop_front() {
            if event.tick > tick {
                future.push(event);
                continue;
            }
            if ops >= budget {
                overflow.push(event);
                continue;
            }
            if !seen.insert((event.pos, event.tick, event.power, event.kind)) {
                continue;
            }
            // Late events (overflow from earlier ticks) run as of now.
            event.tick = tick;
            ops += 1;

            self.processor
                .handle_event(self.chunk, &mut self.graph, &event, &mut emitter);
            for emission in emitter.drain() {
                match emission {
                    Emission::Local(mut local) => {
                        local.tick = local.tick.max(tick);
                        pending.push_back(local);
                    }
                    Emission::Remote(dest, mut remote) => {
                        remote.tick = remote.tick.max(tick + 1);
                        if let Err(err) = self.router.send(dest, remote) {
                            warn!(chunk = %self.chunk, %dest, %err, "dropped cross-chunk event");
                        }
                    }
                    Emission::Output(output) => outputs.push(output),
                }
            }
        }

        self.queue = overflow;
        self.queue.extend(future);

        StepReport {
            chunk: self.chunk,
            tick,
            budget,
            ops,
            queue_len: self.queue.len(),
            hot: !self.queue.is_empty(),
            outputs,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
