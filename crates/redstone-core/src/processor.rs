//! Per-node-kind signal logic.
//!
//! A [`Processor`] receives one due event at a time together with mutable
//! access to the chunk's [`Graph`], updates node state, and records follow-up
//! events on an [`Emitter`]. It never touches another chunk directly: events
//! for neighbours leave through [`Emitter::remote`] and are routed by the
//! worker.
//!
//! [`GraphProcessor`] is the built-in state machine. [`TraceProcessor`] and
//! [`NoopProcessor`] are alternate engines that can be swapped in through a
//! [`ProcessorFactory`] without touching the scheduler or router.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::event::{Event, EventKind, MAX_POWER, clamp_power};
use crate::graph::{Graph, NodeKind, SourceKind};
use crate::id::{ChunkId, NodeId};
use crate::sim::Tick;

/// Release delay for buttons and pressure plates when the event carries no duration.
pub const DEFAULT_PRESS_TICKS: Tick = 10;

// ---------------------------------------------------------------------------
// Emissions
// ---------------------------------------------------------------------------

/// Where an emitted event goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    /// Re-enqueued in the emitting chunk.
    Local(Event),
    /// Forwarded to another chunk through the router.
    Remote(ChunkId, Event),
    /// Returned to the host as an externally visible effect.
    Output(Event),
}

/// Collects emissions produced while handling one event.
#[derive(Debug, Default)]
pub struct Emitter {
    emissions: Vec<Emission>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local(&mut self, event: Event) {
        self.emissions.push(Emission::Local(event));
    }

    pub fn remote(&mut self, chunk: ChunkId, event: Event) {
        self.emissions.push(Emission::Remote(chunk, event));
    }

    pub fn output(&mut self, event: Event) {
        self.emissions.push(Emission::Output(event));
    }

    pub fn is_empty(&self) -> bool {
        self.emissions.is_empty()
    }

    pub fn emissions(&self) -> &[Emission] {
        &self.emissions
    }

    /// Take everything emitted so far, in emission order.
    pub fn drain(&mut self) -> std::vec::Drain<'_, Emission> {
        self.emissions.drain(..)
    }
}

// ---------------------------------------------------------------------------
// Processor trait
// ---------------------------------------------------------------------------

/// Signal logic for one chunk. Each worker owns exactly one processor.
pub trait Processor: Send + std::fmt::Debug {
    /// Human-readable engine name, used in logs.
    fn name(&self) -> &str;

    /// Apply `event` to `graph`. Events naming nodes that no longer exist
    /// must be ignored: they are an expected race with graph rebuilds.
    fn handle_event(&mut self, chunk: ChunkId, graph: &mut Graph, event: &Event, emit: &mut Emitter);
}

/// Builds the processor for a newly created chunk worker.
pub type ProcessorFactory = Arc<dyn Fn(ChunkId) -> Box<dyn Processor> + Send + Sync>;

/// The factory used when none is configured: one [`GraphProcessor`] per chunk.
pub fn default_factory() -> ProcessorFactory {
    Arc::new(|_| Box::new(GraphProcessor::new()))
}

// ---------------------------------------------------------------------------
// GraphProcessor
// ---------------------------------------------------------------------------

/// The built-in state machine, dispatching on [`NodeKind`].
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphProcessor;

impl GraphProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Processor for GraphProcessor {
    fn name(&self) -> &str {
        "graph"
    }

    fn handle_event(&mut self, _chunk: ChunkId, graph: &mut Graph, event: &Event, emit: &mut Emitter) {
        if event.kind == EventKind::Output {
            return;
        }
        let Some(idx) = graph.locate(event.node, event.pos) else {
            return;
        };
        let Some(&node) = graph.node(idx) else {
            return;
        };
        let mut cx = NodeContext {
            graph,
            idx,
            event,
            emit,
        };
        match node.kind {
            NodeKind::PowerSource => cx.power_source(node.source_kind()),
            NodeKind::Wire => cx.wire(),
            NodeKind::Repeater => cx.repeater(node.repeater_delay()),
            NodeKind::Comparator => cx.comparator(),
            NodeKind::Lamp | NodeKind::Consumer => cx.lamp(),
            NodeKind::Observer => cx.observer(),
            NodeKind::Unknown => {}
        }
    }
}

/// Input power carried by an event: falls always mean 0.
fn input_power(event: &Event) -> u8 {
    match event.kind {
        EventKind::SignalFall => 0,
        _ => clamp_power(event.power),
    }
}

/// Per-event scratch state for the [`GraphProcessor`].
struct NodeContext<'a> {
    graph: &'a mut Graph,
    idx: usize,
    event: &'a Event,
    emit: &'a mut Emitter,
}

impl NodeContext<'_> {
    fn node_id(&self) -> Option<NodeId> {
        self.graph.node(self.idx).map(|n| n.id)
    }

    fn power(&self) -> u8 {
        self.graph.state(self.idx).map_or(0, |s| s.power)
    }

    /// Store a new power level; returns whether it changed.
    fn set_power(&mut self, power: u8) -> bool {
        let Some(state) = self.graph.state_mut(self.idx) else {
            return false;
        };
        if state.power == power {
            return false;
        }
        state.power = power;
        true
    }

    /// Schedule a `Tick` wake-up for this node `delay` ticks after the event.
    fn schedule(&mut self, delay: Tick, pending_power: u8) {
        let at = self.event.tick + delay;
        let Some(state) = self.graph.state_mut(self.idx) else {
            return;
        };
        state.pending_tick = Some(at);
        state.pending_power = pending_power;
        let Some(node) = self.graph.node(self.idx).copied() else {
            return;
        };
        self.emit
            .local(Event::new(node.pos, EventKind::Tick, pending_power, at).with_node(node.id));
    }

    /// Consume a pending wake-up if `event` is the one that was scheduled.
    /// Stale ticks (superseded by a later schedule) return `None`.
    fn take_pending(&mut self) -> Option<u8> {
        let state = self.graph.state_mut(self.idx)?;
        if state.pending_tick != Some(self.event.tick) {
            return None;
        }
        state.pending_tick = None;
        Some(state.pending_power)
    }

    /// Fan `power` out to every local neighbour and every port of this node.
    fn propagate(&mut self) {
        let power = self.power();
        let tick = self.event.tick;
        for &n in self.graph.neighbours(self.idx) {
            let Some(target) = self.graph.node(n as usize) else {
                continue;
            };
            let attenuated = match target.kind {
                NodeKind::Wire => power.saturating_sub(1),
                _ => power,
            };
            self.emit.local(
                Event::new(target.pos, EventKind::PowerChange, attenuated, tick).with_node(target.id),
            );
        }
        let Some(id) = self.node_id() else {
            return;
        };
        for port in self.graph.ports_of(id) {
            // Unattenuated at the boundary; the worker enforces the one-tick
            // minimum crossing delay.
            self.emit.remote(
                port.neighbour,
                Event::new(port.target, EventKind::PowerChange, power, tick + 1),
            );
        }
    }

    fn set_and_propagate(&mut self, power: u8) {
        if self.set_power(power) {
            self.propagate();
        }
    }

    // -----------------------------------------------------------------------
    // Kinds
    // -----------------------------------------------------------------------

    fn power_source(&mut self, source: SourceKind) {
        let ev = self.event;
        match source {
            SourceKind::Torch => match ev.kind {
                EventKind::PowerChange => {
                    let lit = if ev.power > 0 { 0 } else { MAX_POWER };
                    self.set_and_propagate(lit);
                }
                EventKind::SignalRise => self.set_and_propagate(MAX_POWER),
                EventKind::SignalFall => self.set_and_propagate(0),
                _ => {}
            },
            s if s.auto_releases() => match ev.kind {
                EventKind::SignalRise | EventKind::BlockUpdate => {
                    self.set_and_propagate(pressed_power(ev));
                    let duration = match ev.meta {
                        0 => DEFAULT_PRESS_TICKS,
                        d => d as Tick,
                    };
                    self.schedule(duration, 0);
                }
                EventKind::SignalFall => self.set_and_propagate(0),
                EventKind::Tick => {
                    if let Some(power) = self.take_pending() {
                        self.set_and_propagate(power);
                    }
                }
                _ => {}
            },
            _ => match ev.kind {
                EventKind::SignalRise | EventKind::BlockUpdate => {
                    self.set_and_propagate(pressed_power(ev));
                }
                EventKind::SignalFall => self.set_and_propagate(0),
                _ => {}
            },
        }
    }

    fn wire(&mut self) {
        match self.event.kind {
            EventKind::PowerChange
            | EventKind::SignalRise
            | EventKind::SignalFall
            | EventKind::BlockUpdate => {
                let power = input_power(self.event);
                if self.set_power(power) {
                    self.propagate();
                    if let Some(node) = self.graph.node(self.idx).copied() {
                        self.emit.output(
                            Event::new(node.pos, EventKind::Output, power, self.event.tick)
                                .with_node(node.id)
                                .with_meta(power as u32),
                        );
                    }
                }
            }
            _ => {}
        }
    }

    fn repeater(&mut self, delay: Tick) {
        match self.event.kind {
            EventKind::PowerChange | EventKind::SignalRise | EventKind::SignalFall => {
                let input = input_power(self.event);
                let out = if input > 0 { MAX_POWER } else { 0 };
                let Some(state) = self.graph.state_mut(self.idx) else {
                    return;
                };
                state.last_input = input as u32;
                let settled = match state.pending_tick {
                    Some(_) => state.pending_power == out,
                    None => state.power == out,
                };
                if !settled {
                    self.schedule(delay, out);
                }
            }
            EventKind::Tick => {
                if let Some(power) = self.take_pending() {
                    self.set_and_propagate(power);
                }
            }
            _ => {}
        }
    }

    fn comparator(&mut self) {
        match self.event.kind {
            EventKind::PowerChange
            | EventKind::SignalRise
            | EventKind::SignalFall
            | EventKind::Comparator => {
                let power = input_power(self.event);
                self.set_and_propagate(power);
            }
            _ => {}
        }
    }

    fn lamp(&mut self) {
        match self.event.kind {
            EventKind::PowerChange
            | EventKind::SignalRise
            | EventKind::SignalFall
            | EventKind::BlockUpdate => {
                let power = input_power(self.event);
                self.set_power(power);
                let Some(state) = self.graph.state_mut(self.idx) else {
                    return;
                };
                let active = power > 0;
                if state.active == active {
                    return;
                }
                state.active = active;
                if let Some(node) = self.graph.node(self.idx).copied() {
                    self.emit.output(
                        Event::new(node.pos, EventKind::Output, power, self.event.tick)
                            .with_node(node.id)
                            .with_meta(active as u32),
                    );
                }
            }
            _ => {}
        }
    }

    fn observer(&mut self) {
        match self.event.kind {
            EventKind::Tick => {
                if let Some(power) = self.take_pending() {
                    self.set_and_propagate(power);
                }
            }
            EventKind::Output => {}
            _ => {
                let input = self.event.meta;
                let Some(state) = self.graph.state_mut(self.idx) else {
                    return;
                };
                if state.last_input == input {
                    return;
                }
                state.last_input = input;
                self.set_and_propagate(MAX_POWER);
                self.schedule(1, 0);
            }
        }
    }
}

/// Power for a press/rise: the event's power, or full power when it carries none.
fn pressed_power(event: &Event) -> u8 {
    match clamp_power(event.power) {
        0 => MAX_POWER,
        p => p,
    }
}

// ---------------------------------------------------------------------------
// Alternate engines
// ---------------------------------------------------------------------------

/// Shared, append-only record of handled events.
pub type Trace = Arc<Mutex<Vec<(ChunkId, Event)>>>;

/// Wraps another processor and records every event it is handed.
#[derive(Debug)]
pub struct TraceProcessor {
    inner: Box<dyn Processor>,
    trace: Trace,
}

impl TraceProcessor {
    pub fn new(inner: Box<dyn Processor>, trace: Trace) -> Self {
        Self { inner, trace }
    }

    /// A factory wrapping the built-in state machine, recording into `trace`.
    pub fn factory(trace: Trace) -> ProcessorFactory {
        Arc::new(move |_| {
            Box::new(TraceProcessor::new(
                Box::new(GraphProcessor::new()),
                Arc::clone(&trace),
            ))
        })
    }
}

impl Processor for TraceProcessor {
    fn name(&self) -> &str {
        "trace"
    }

    fn handle_event(&mut self, chunk: ChunkId, graph: &mut Graph, event: &Event, emit: &mut Emitter) {
        self.trace.lock().push((chunk, *event));
        self.inner.handle_event(chunk, graph, event, emit);
    }
}

/// Ignores every event. Useful for measuring routing and scheduling overhead.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProcessor;

impl Processor for NoopProcessor {
    fn name(&self) -> &str {
        "noop"
    }

    fn handle_event(&mut self, _: ChunkId, _: &mut Graph, _: &Event, _: &mut Emitter) {}
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Direction, GraphBuilder};
    use crate::id::BlockPos;

    const CHUNK: ChunkId = ChunkId::new(0, 0);

    fn at(x: i32) -> BlockPos {
        BlockPos::new(x, 64, 0)
    }

    /// Run `event` and every local emission it causes (regardless of tick)
    /// until quiescent, returning outputs and remote emissions.
    fn settle(graph: &mut Graph, event: Event) -> (Vec<Event>, Vec<(ChunkId, Event)>) {
        let mut proc = GraphProcessor::new();
        let mut queue = std::collections::VecDeque::from([event]);
        let mut outputs = Vec::new();
        let mut remotes = Vec::new();
        let mut guard = 0;
        while let Some(ev) = queue.pop_front() {
            guard += 1;
            assert!(guard < 1000, "processor did not settle");
            let mut emit = Emitter::new();
            proc.handle_event(CHUNK, graph, &ev, &mut emit);
            for e in emit.drain() {
                match e {
                    Emission::Local(l) => queue.push_back(l),
                    Emission::Remote(c, r) => remotes.push((c, r)),
                    Emission::Output(o) => outputs.push(o),
                }
            }
        }
        (outputs, remotes)
    }

    fn power_at(graph: &mut Graph, pos: BlockPos) -> u8 {
        let idx = graph.index_of_pos(pos).unwrap();
        graph.state(idx).unwrap().power
    }

    #[test]
    fn wire_attenuates_per_hop() {
        let mut b = GraphBuilder::new(CHUNK);
        let src = b.add_source(SourceKind::Generic, at(0));
        let a = b.add_node(NodeKind::Wire, 0, at(1));
        let w = b.add_node(NodeKind::Wire, 0, at(2));
        b.connect(src, a).connect(a, w);
        let mut graph = b.build();

        settle(&mut graph, Event::rise(at(0), 0));

        assert_eq!(power_at(&mut graph, at(0)), 15);
        assert_eq!(power_at(&mut graph, at(1)), 14);
        assert_eq!(power_at(&mut graph, at(2)), 13);
    }

    #[test]
    fn attenuation_floors_at_zero() {
        let mut b = GraphBuilder::new(CHUNK);
        let src = b.add_source(SourceKind::Generic, at(0));
        let a = b.add_node(NodeKind::Wire, 0, at(1));
        b.connect(src, a);
        let mut graph = b.build();

        settle(&mut graph, Event::new(at(0), EventKind::SignalRise, 1, 0));
        assert_eq!(power_at(&mut graph, at(1)), 0);
    }

    #[test]
    fn lever_wire_lamp_emits_one_output_each_way() {
        let mut b = GraphBuilder::new(CHUNK);
        let lever = b.add_source(SourceKind::Lever, at(0));
        let wire = b.add_node(NodeKind::Wire, 0, at(1));
        let lamp = b.add_node(NodeKind::Lamp, 0, at(2));
        b.connect(lever, wire).connect(wire, lamp);
        let mut graph = b.build();

        let (outputs, _) = settle(&mut graph, Event::rise(at(0), 0));
        let lamp_out: Vec<_> = outputs.iter().filter(|e| e.pos == at(2)).collect();
        assert_eq!(lamp_out.len(), 1);
        assert_eq!(lamp_out[0].meta, 1);

        let (outputs, _) = settle(&mut graph, Event::fall(at(0), 1));
        let lamp_out: Vec<_> = outputs.iter().filter(|e| e.pos == at(2)).collect();
        assert_eq!(lamp_out.len(), 1);
        assert_eq!(lamp_out[0].meta, 0);
    }

    #[test]
    fn wire_output_carries_new_power() {
        let mut b = GraphBuilder::new(CHUNK);
        let src = b.add_source(SourceKind::Generic, at(0));
        let wire = b.add_node(NodeKind::Wire, 0, at(1));
        b.connect(src, wire);
        let mut graph = b.build();

        let (outputs, _) = settle(&mut graph, Event::rise(at(0), 0));
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].pos, at(1));
        assert_eq!(outputs[0].power, 14);
    }

    #[test]
    fn unchanged_power_does_not_propagate() {
        let mut b = GraphBuilder::new(CHUNK);
        let src = b.add_source(SourceKind::Generic, at(0));
        let wire = b.add_node(NodeKind::Wire, 0, at(1));
        b.connect(src, wire);
        let mut graph = b.build();

        settle(&mut graph, Event::rise(at(0), 0));
        let (outputs, _) = settle(&mut graph, Event::rise(at(0), 1));
        assert!(outputs.is_empty());
    }

    #[test]
    fn button_schedules_release() {
        let mut b = GraphBuilder::new(CHUNK);
        b.add_source(SourceKind::Button, at(0));
        let mut graph = b.build();

        let mut proc = GraphProcessor::new();
        let mut emit = Emitter::new();
        proc.handle_event(CHUNK, &mut graph, &Event::rise(at(0), 5).with_meta(2), &mut emit);

        assert_eq!(power_at(&mut graph, at(0)), 15);
        let ticks: Vec<_> = emit
            .emissions()
            .iter()
            .filter_map(|e| match e {
                Emission::Local(ev) if ev.kind == EventKind::Tick => Some(ev.tick),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![7]);

        let release = Event::new(at(0), EventKind::Tick, 0, 7).with_node(NodeId(1));
        proc.handle_event(CHUNK, &mut graph, &release, &mut Emitter::new());
        assert_eq!(power_at(&mut graph, at(0)), 0);
    }

    #[test]
    fn button_default_duration() {
        let mut b = GraphBuilder::new(CHUNK);
        b.add_source(SourceKind::PressurePlate, at(0));
        let mut graph = b.build();

        let mut emit = Emitter::new();
        GraphProcessor::new().handle_event(CHUNK, &mut graph, &Event::rise(at(0), 0), &mut emit);
        assert!(emit.emissions().iter().any(|e| matches!(
            e,
            Emission::Local(ev) if ev.kind == EventKind::Tick && ev.tick == DEFAULT_PRESS_TICKS
        )));
    }

    #[test]
    fn stale_tick_is_ignored() {
        let mut b = GraphBuilder::new(CHUNK);
        b.add_source(SourceKind::Button, at(0));
        let mut graph = b.build();
        let mut proc = GraphProcessor::new();

        proc.handle_event(CHUNK, &mut graph, &Event::rise(at(0), 0).with_meta(4), &mut Emitter::new());
        let stale = Event::new(at(0), EventKind::Tick, 0, 3).with_node(NodeId(1));
        proc.handle_event(CHUNK, &mut graph, &stale, &mut Emitter::new());
        assert_eq!(power_at(&mut graph, at(0)), 15);
    }

    #[test]
    fn torch_inverts_input() {
        let mut b = GraphBuilder::new(CHUNK);
        let torch = b.add_source(SourceKind::Torch, at(0));
        let wire = b.add_node(NodeKind::Wire, 0, at(1));
        b.connect(torch, wire);
        let mut graph = b.build();

        settle(&mut graph, Event::rise(at(0), 0));
        assert_eq!(power_at(&mut graph, at(0)), 15);
        assert_eq!(power_at(&mut graph, at(1)), 14);

        settle(&mut graph, Event::new(at(0), EventKind::PowerChange, 7, 1));
        assert_eq!(power_at(&mut graph, at(0)), 0);
        assert_eq!(power_at(&mut graph, at(1)), 0);

        settle(&mut graph, Event::new(at(0), EventKind::PowerChange, 0, 2));
        assert_eq!(power_at(&mut graph, at(0)), 15);
        assert_eq!(power_at(&mut graph, at(1)), 14);
    }

    #[test]
    fn repeater_delays_output() {
        let mut b = GraphBuilder::new(CHUNK);
        b.add_node(NodeKind::Repeater, 2, at(0));
        let mut graph = b.build();
        let mut proc = GraphProcessor::new();

        let mut emit = Emitter::new();
        let input = Event::new(at(0), EventKind::PowerChange, 9, 10);
        proc.handle_event(CHUNK, &mut graph, &input, &mut emit);

        // Output does not change until the scheduled tick fires.
        assert_eq!(power_at(&mut graph, at(0)), 0);
        let scheduled: Vec<_> = emit
            .drain()
            .filter_map(|e| match e {
                Emission::Local(ev) => Some(ev),
                _ => None,
            })
            .collect();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].kind, EventKind::Tick);
        assert_eq!(scheduled[0].tick, 13);

        proc.handle_event(CHUNK, &mut graph, &scheduled[0], &mut Emitter::new());
        assert_eq!(power_at(&mut graph, at(0)), 15);
    }

    #[test]
    fn repeater_ignores_repeated_input() {
        let mut b = GraphBuilder::new(CHUNK);
        b.add_node(NodeKind::Repeater, 0, at(0));
        let mut graph = b.build();
        let mut proc = GraphProcessor::new();

        let mut first = Emitter::new();
        proc.handle_event(CHUNK, &mut graph, &Event::new(at(0), EventKind::PowerChange, 5, 0), &mut first);
        let mut second = Emitter::new();
        proc.handle_event(CHUNK, &mut graph, &Event::new(at(0), EventKind::PowerChange, 12, 0), &mut second);

        assert_eq!(first.emissions().len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn comparator_passes_clamped_input() {
        let mut b = GraphBuilder::new(CHUNK);
        b.add_node(NodeKind::Comparator, 0, at(0));
        let mut graph = b.build();

        settle(&mut graph, Event::new(at(0), EventKind::PowerChange, 40, 0));
        assert_eq!(power_at(&mut graph, at(0)), 15);
        settle(&mut graph, Event::new(at(0), EventKind::PowerChange, 6, 1));
        assert_eq!(power_at(&mut graph, at(0)), 6);
    }

    #[test]
    fn observer_pulses_on_change() {
        let mut b = GraphBuilder::new(CHUNK);
        let obs = b.add_node(NodeKind::Observer, 0, at(0));
        let lamp = b.add_node(NodeKind::Lamp, 0, at(1));
        b.connect(obs, lamp);
        let mut graph = b.build();

        let (outputs, _) = settle(
            &mut graph,
            Event::new(at(0), EventKind::BlockUpdate, 0, 0).with_meta(3),
        );
        let metas: Vec<u32> = outputs.iter().map(|e| e.meta).collect();
        // On, then off once the scheduled pulse end fires.
        assert_eq!(metas, vec![1, 0]);
        assert_eq!(power_at(&mut graph, at(0)), 0);

        let (outputs, _) = settle(
            &mut graph,
            Event::new(at(0), EventKind::BlockUpdate, 0, 5).with_meta(3),
        );
        assert!(outputs.is_empty(), "unchanged input must not pulse");
    }

    #[test]
    fn ports_emit_unattenuated_remote_events() {
        let mut b = GraphBuilder::new(CHUNK);
        let src = b.add_source(SourceKind::Generic, at(15));
        b.add_port(src, Direction::East, at(16));
        let mut graph = b.build();

        let (_, remotes) = settle(&mut graph, Event::rise(at(15), 4));
        assert_eq!(remotes.len(), 1);
        let (chunk, ev) = remotes[0];
        assert_eq!(chunk, ChunkId::new(1, 0));
        assert_eq!(ev.pos, at(16));
        assert_eq!(ev.power, 15);
        assert!(ev.tick >= 5);
    }

    #[test]
    fn missing_nodes_are_ignored() {
        let mut graph = GraphBuilder::new(CHUNK).build();
        let mut emit = Emitter::new();
        GraphProcessor::new().handle_event(CHUNK, &mut graph, &Event::rise(at(3), 0), &mut emit);
        GraphProcessor::new().handle_event(
            CHUNK,
            &mut graph,
            &Event::rise(at(3), 0).with_node(NodeId(77)),
            &mut emit,
        );
        assert!(emit.is_empty());
    }

    #[test]
    fn trace_processor_records_and_delegates() {
        let mut b = GraphBuilder::new(CHUNK);
        b.add_source(SourceKind::Lever, at(0));
        let mut graph = b.build();
        let trace = Trace::default();
        let mut proc = TraceProcessor::new(Box::new(GraphProcessor::new()), Arc::clone(&trace));

        proc.handle_event(CHUNK, &mut graph, &Event::rise(at(0), 0), &mut Emitter::new());

        assert_eq!(trace.lock().len(), 1);
        assert_eq!(power_at(&mut graph, at(0)), 15);
    }

    #[test]
    fn noop_processor_changes_nothing() {
        let mut b = GraphBuilder::new(CHUNK);
        b.add_source(SourceKind::Lever, at(0));
        let mut graph = b.build();
        let before = graph.clone();
        let mut emit = Emitter::new();
        NoopProcessor.handle_event(CHUNK, &mut graph, &Event::rise(at(0), 0), &mut emit);
        assert_eq!(graph, before);
        assert!(emit.is_empty());
    }
}
