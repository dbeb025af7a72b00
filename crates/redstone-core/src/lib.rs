//! Redstone Core -- a chunk-partitioned logic-circuit simulation engine.
//!
//! Circuits (wires, power sources, repeaters, comparators, lamps, observers)
//! are split into 16x16 block chunks. Each chunk's graph is owned by a single
//! actor thread; signals crossing a chunk boundary travel as copied events
//! through a non-blocking router that coalesces under backpressure. A
//! scheduler steps every chunk once per tick in a deterministic global order.
//!
//! # Tick Pipeline
//!
//! Each call to [`system::System::tick`]:
//!
//! 1. **Hot poll** -- Read and reset the router's backpressure flags.
//! 2. **Order** -- Rebuild the Morton-sorted chunk order if the chunk set changed.
//! 3. **Step** -- For each chunk in order: compute its budget (base, +50% when
//!    hot, shifted right by the watchdog penalty) and step its worker. The
//!    worker drains coalesced and mailbox events, runs due events through its
//!    processor, forwards cross-chunk emissions no earlier than the next tick,
//!    and returns outputs.
//! 4. **Watchdog** -- Raise a chunk's penalty after three saturated ticks in a
//!    row; lower it on any unsaturated tick.
//! 5. **Bookkeeping** -- Record metrics and advance the tick counter.
//!
//! # Key Types
//!
//! - [`system::System`] -- Host facade; inert when disabled.
//! - [`graph::Graph`] -- Flat node palette with CSR adjacency and per-node state.
//! - [`processor::Processor`] -- Swappable signal logic; [`processor::GraphProcessor`]
//!   is the built-in per-kind state machine.
//! - [`router::Router`] -- Bounded mailboxes with last-write-wins coalescing.
//! - [`worker::ChunkWorker`] -- Single-owner actor for one chunk.
//! - [`scheduler::Scheduler`] -- Deterministic, watchdog-throttled tick driver.
//! - [`replay::ReplayLog`] -- Recorded inputs with per-tick hash checkpoints.

pub mod cancel;
pub mod config;
pub mod event;
pub mod graph;
pub mod id;
pub mod metrics;
pub mod processor;
pub mod replay;
pub mod router;
pub mod scheduler;
pub mod sim;
pub mod system;
pub mod worker;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
