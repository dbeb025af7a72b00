//! Cross-chunk event delivery with backpressure.
//!
//! Every chunk worker registers a bounded mailbox. [`Router::send`] never
//! blocks: when the destination mailbox is full the event is coalesced into
//! a per-destination map keyed by [`Event::key`] (last write wins), the
//! destination is flagged "hot", and the worker picks the backlog up at the
//! start of its next step via [`Router::drain_coalesced`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crossbeam::channel::{Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::event::{Event, EventKey, sort_events};
use crate::id::ChunkId;

// ---------------------------------------------------------------------------
// Outcomes and errors
// ---------------------------------------------------------------------------

/// How a successfully routed event was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Placed in the destination mailbox.
    Delivered,
    /// Mailbox full; merged into the destination's coalesced backlog.
    Coalesced,
}

/// Why an event was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("unknown chunk {0}")]
    UnknownChunk(ChunkId),
    #[error("mailbox for chunk {0} is disconnected")]
    Disconnected(ChunkId),
}

/// Lifetime routing counters.
#[derive(Debug, Default)]
pub struct RouterStats {
    delivered: AtomicU64,
    coalesced: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`RouterStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterStatsSnapshot {
    pub delivered: u64,
    /// Sends that hit a full mailbox (backpressure events).
    pub coalesced: u64,
    pub dropped: u64,
}

impl RouterStats {
    pub fn snapshot(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Endpoint {
    generation: u64,
    mailbox: Sender<Event>,
    coalesced: Mutex<BTreeMap<EventKey, Event>>,
    hot: AtomicBool,
}

/// Handle returned by [`Router::register`]. Unregistering only removes the
/// endpoint this handle installed, so a stale handle cannot evict a newer
/// registration for the same chunk.
#[derive(Debug)]
pub struct Registration {
    router: Weak<Router>,
    chunk: ChunkId,
    generation: u64,
}

impl Registration {
    pub fn chunk(&self) -> ChunkId {
        self.chunk
    }

    /// Remove the endpoint. Returns whether it was still installed.
    pub fn unregister(self) -> bool {
        let Some(router) = self.router.upgrade() else {
            return false;
        };
        let mut endpoints = router.endpoints.write();
        let installed = endpoints.get(&self.chunk).map(|ep| ep.generation);
        if installed != Some(self.generation) {
            return false;
        }
        endpoints.remove(&self.chunk);
        true
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Mailbox directory shared by all workers and the scheduler.
#[derive(Debug, Default)]
pub struct Router {
    endpoints: RwLock<FxHashMap<ChunkId, Arc<Endpoint>>>,
    next_generation: AtomicU64,
    stats: RouterStats,
}

impl Router {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Install (or replace) the mailbox for `chunk`. Latest registration wins.
    pub fn register(self: &Arc<Self>, chunk: ChunkId, mailbox: Sender<Event>) -> Registration {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let endpoint = Arc::new(Endpoint {
            generation,
            mailbox,
            coalesced: Mutex::new(BTreeMap::new()),
            hot: AtomicBool::new(false),
        });
        if self.endpoints.write().insert(chunk, endpoint).is_some() {
            tracing::debug!(%chunk, "replaced mailbox registration");
        }
        Registration {
            router: Arc::downgrade(self),
            chunk,
            generation,
        }
    }

    fn endpoint(&self, chunk: ChunkId) -> Option<Arc<Endpoint>> {
        self.endpoints.read().get(&chunk).cloned()
    }

    pub fn is_registered(&self, chunk: ChunkId) -> bool {
        self.endpoints.read().contains_key(&chunk)
    }

    /// Route `event` to `chunk` without blocking.
    pub fn send(&self, chunk: ChunkId, event: Event) -> Result<SendOutcome, RouteError> {
        let Some(endpoint) = self.endpoint(chunk) else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(RouteError::UnknownChunk(chunk));
        };
        match endpoint.mailbox.try_send(event) {
            Ok(()) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(SendOutcome::Delivered)
            }
            Err(TrySendError::Full(event)) => {
                endpoint.coalesced.lock().insert(event.key(), event);
                endpoint.hot.store(true, Ordering::Relaxed);
                self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                Ok(SendOutcome::Coalesced)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(RouteError::Disconnected(chunk))
            }
        }
    }

    /// Atomically take the coalesced backlog for `chunk`, in deterministic order.
    pub fn drain_coalesced(&self, chunk: ChunkId) -> Vec<Event> {
        let Some(endpoint) = self.endpoint(chunk) else {
            return Vec::new();
        };
        let backlog = std::mem::take(&mut *endpoint.coalesced.lock());
        let mut events: Vec<Event> = backlog.into_values().collect();
        sort_events(&mut events);
        events
    }

    /// Number of coalesced events waiting for `chunk`.
    pub fn pending_coalesced(&self, chunk: ChunkId) -> usize {
        self.endpoint(chunk)
            .map_or(0, |ep| ep.coalesced.lock().len())
    }

    /// Chunks that saw backpressure since the last [`Router::clear_hot`].
    pub fn snapshot_hot(&self) -> BTreeSet<ChunkId> {
        self.endpoints
            .read()
            .iter()
            .filter(|(_, ep)| ep.hot.load(Ordering::Relaxed))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn clear_hot(&self) {
        for ep in self.endpoints.read().values() {
            ep.hot.store(false, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> RouterStatsSnapshot {
        self.stats.snapshot()
    }
}
