//! Simulation events: the only data that moves between chunks.
//!
//! Events are small `Copy` values. They are produced by block-interaction
//! code outside this crate and by processor emissions, consumed within one
//! or more ticks, and never persisted.
//!
//! # Ordering
//!
//! Whenever a batch of events would otherwise be ordered by container
//! iteration (coalesced backlogs, traces, replay), [`sort_events`] puts it in
//! a deterministic order keyed by `(morton(pos), kind, node low byte)`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::id::{BlockPos, NodeId};
use crate::sim::Tick;

/// Maximum signal strength.
pub const MAX_POWER: u8 = 15;

/// Clamp an arbitrary power value into `0..=MAX_POWER`.
pub fn clamp_power(power: u8) -> u8 {
    power.min(MAX_POWER)
}

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// What happened. The discriminant order is part of the deterministic sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    #[default]
    Unknown = 0,
    SignalRise,
    SignalFall,
    /// A scheduled wake-up for a node (repeater delay, button release, observer pulse).
    Tick,
    Comparator,
    Observer,
    PowerChange,
    BlockUpdate,
    NeighbourChange,
    /// An externally visible effect returned to the host instead of being processed.
    Output,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A single simulation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Event {
    pub pos: BlockPos,
    pub kind: EventKind,
    /// Signal strength, 0..=15.
    pub power: u8,
    /// The tick at which this event becomes due.
    pub tick: Tick,
    /// The node this event targets. `None` means "whatever node is at `pos`".
    pub node: Option<NodeId>,
    /// Opaque payload whose meaning depends on `kind` and the target node.
    pub meta: u32,
}

/// Identity of an event for de-duplication and coalescing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    pub pos: BlockPos,
    pub kind: EventKind,
    pub node: Option<NodeId>,
}

impl Event {
    pub fn new(pos: BlockPos, kind: EventKind, power: u8, tick: Tick) -> Self {
        Self {
            pos,
            kind,
            power,
            tick,
            node: None,
            meta: 0,
        }
    }

    /// A `SignalRise` at full power, e.g. a lever being flipped on.
    pub fn rise(pos: BlockPos, tick: Tick) -> Self {
        Self::new(pos, EventKind::SignalRise, MAX_POWER, tick)
    }

    /// A `SignalFall`, e.g. a lever being flipped off.
    pub fn fall(pos: BlockPos, tick: Tick) -> Self {
        Self::new(pos, EventKind::SignalFall, 0, tick)
    }

    pub fn with_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    pub fn with_meta(mut self, meta: u32) -> Self {
        self.meta = meta;
        self
    }

    /// `(pos, kind, node)`: two events with the same key describe the same
    /// thing happening to the same target, so the later one supersedes.
    pub fn key(&self) -> EventKey {
        EventKey {
            pos: self.pos,
            kind: self.kind,
            node: self.node,
        }
    }

    fn node_low_byte(&self) -> u8 {
        self.node.map_or(0, NodeId::low_byte)
    }

    /// Deterministic total order. The leading components are
    /// `(morton(pos), kind, node low byte)`; the rest only break ties.
    pub fn deterministic_cmp(&self, other: &Self) -> Ordering {
        self.pos
            .morton()
            .cmp(&other.pos.morton())
            .then(self.kind.cmp(&other.kind))
            .then(self.node_low_byte().cmp(&other.node_low_byte()))
            .then(self.pos.y.cmp(&other.pos.y))
            .then(self.tick.cmp(&other.tick))
            .then(self.power.cmp(&other.power))
            .then(self.node.cmp(&other.node))
            .then(self.meta.cmp(&other.meta))
    }
}

/// Sort a batch of events into the deterministic order.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(Event::deterministic_cmp);
}
