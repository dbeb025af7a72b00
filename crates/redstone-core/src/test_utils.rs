//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::config::Config;
use crate::graph::{Direction, Graph, GraphBuilder, NodeKind, SourceKind};
use crate::id::{BlockPos, ChunkId};

/// Y level every helper circuit is built on.
pub const Y: i32 = 64;

// ===========================================================================
// Positions and config
// ===========================================================================

/// Absolute block position at local column `(x, z)` of `chunk`.
pub fn pos_in(chunk: ChunkId, x: i32, z: i32) -> BlockPos {
    BlockPos::new(chunk.x * 16 + x, Y, chunk.z * 16 + z)
}

pub fn config(budget_per_tick: usize, inbox_size: usize) -> Config {
    Config {
        enabled: true,
        inbox_size,
        budget_per_tick,
    }
}

// ===========================================================================
// Circuits
// ===========================================================================

/// A built circuit plus the positions tests poke at.
#[derive(Debug, Clone)]
pub struct Circuit {
    pub graph: Graph,
    pub input: BlockPos,
    /// Wires in signal order.
    pub wires: Vec<BlockPos>,
    pub output: BlockPos,
}

/// Source → `wires` wires → lamp along +x.
pub fn source_line(chunk: ChunkId, source: SourceKind, wires: usize) -> Circuit {
    let mut b = GraphBuilder::new(chunk);
    let input = pos_in(chunk, 0, 0);
    let mut prev = b.add_source(source, input);
    let mut wire_pos = Vec::with_capacity(wires);
    for i in 0..wires {
        let pos = pos_in(chunk, 1 + i as i32, 0);
        let wire = b.add_node(NodeKind::Wire, 0, pos);
        b.connect(prev, wire);
        wire_pos.push(pos);
        prev = wire;
    }
    let output = pos_in(chunk, 1 + wires as i32, 0);
    let lamp = b.add_node(NodeKind::Lamp, 0, output);
    b.connect(prev, lamp);
    Circuit {
        graph: b.build(),
        input,
        wires: wire_pos,
        output,
    }
}

/// Lever → wire → lamp.
pub fn lever_wire_lamp(chunk: ChunkId) -> Circuit {
    source_line(chunk, SourceKind::Lever, 1)
}

/// Button → wire → lamp.
pub fn button_wire_lamp(chunk: ChunkId) -> Circuit {
    source_line(chunk, SourceKind::Button, 1)
}

/// Lever → repeater (`delay_bits` in its data) → lamp.
pub fn repeater_line(chunk: ChunkId, delay_bits: u32) -> Circuit {
    let mut b = GraphBuilder::new(chunk);
    let input = pos_in(chunk, 0, 0);
    let output = pos_in(chunk, 2, 0);
    let lever = b.add_source(SourceKind::Lever, input);
    let repeater = b.add_node(NodeKind::Repeater, delay_bits, pos_in(chunk, 1, 0));
    let lamp = b.add_node(NodeKind::Lamp, 0, output);
    b.connect(lever, repeater).connect(repeater, lamp);
    Circuit {
        graph: b.build(),
        input,
        wires: Vec::new(),
        output,
    }
}

/// Torch → lamp. The torch starts unlit; feed it a `PowerChange` to settle it.
pub fn torch_lamp(chunk: ChunkId) -> Circuit {
    let mut b = GraphBuilder::new(chunk);
    let input = pos_in(chunk, 0, 0);
    let output = pos_in(chunk, 1, 0);
    let torch = b.add_source(SourceKind::Torch, input);
    let lamp = b.add_node(NodeKind::Lamp, 0, output);
    b.connect(torch, lamp);
    Circuit {
        graph: b.build(),
        input,
        wires: Vec::new(),
        output,
    }
}

/// Lever driving `lamps` lamps directly: one rise produces `lamps + 1` events.
pub fn fan_out(chunk: ChunkId, lamps: usize) -> Circuit {
    let mut b = GraphBuilder::new(chunk);
    let input = pos_in(chunk, 0, 0);
    let lever = b.add_source(SourceKind::Lever, input);
    let mut last = input;
    for i in 0..lamps {
        let pos = pos_in(chunk, (i % 15) as i32 + 1, (i / 15) as i32 % 16);
        let pos = BlockPos::new(pos.x, Y + (i / 240) as i32, pos.z);
        let lamp = b.add_node(NodeKind::Lamp, 0, pos);
        b.connect(lever, lamp);
        last = pos;
    }
    Circuit {
        graph: b.build(),
        input,
        wires: Vec::new(),
        output: last,
    }
}

/// Two chunks joined by a port: lever → wire in `from`, crossing `direction`
/// into wire → lamp in the neighbouring chunk.
#[derive(Debug, Clone)]
pub struct Bridge {
    pub from: ChunkId,
    pub to: ChunkId,
    pub from_graph: Graph,
    pub to_graph: Graph,
    pub lever: BlockPos,
    /// First block on the far side of the boundary.
    pub entry: BlockPos,
    pub lamp: BlockPos,
}

/// Build a [`Bridge`] from `from` eastwards into `from + (1, 0)`.
pub fn east_bridge(from: ChunkId) -> Bridge {
    let to = Direction::East.offset(from);

    let mut a = GraphBuilder::new(from);
    let lever = pos_in(from, 14, 0);
    let edge = pos_in(from, 15, 0);
    let entry = pos_in(to, 0, 0);
    let lamp = pos_in(to, 1, 0);
    let l = a.add_source(SourceKind::Lever, lever);
    let w = a.add_node(NodeKind::Wire, 0, edge);
    a.connect(l, w).add_port(w, Direction::East, entry);

    let mut b = GraphBuilder::new(to);
    let w2 = b.add_node(NodeKind::Wire, 0, entry);
    let lp = b.add_node(NodeKind::Lamp, 0, lamp);
    b.connect(w2, lp);

    Bridge {
        from,
        to,
        from_graph: a.build(),
        to_graph: b.build(),
        lever,
        entry,
        lamp,
    }
}

/// A square of `side * side` chunks each holding a lever line, with every
/// chunk bridged east into its neighbour. Returns `(chunk, graph)` pairs in
/// row-major order.
pub fn chunk_grid(side: i32) -> Vec<(ChunkId, Graph)> {
    let mut out = Vec::new();
    for z in 0..side {
        for x in 0..side {
            let chunk = ChunkId::new(x, z);
            let mut b = GraphBuilder::new(chunk);
            let lever = b.add_source(SourceKind::Lever, pos_in(chunk, 0, 0));
            let mut prev = lever;
            for i in 1..15 {
                let w = b.add_node(NodeKind::Wire, 0, pos_in(chunk, i, 0));
                b.connect(prev, w);
                prev = w;
            }
            // Entry wire for the western neighbour's port.
            let entry = b.add_node(NodeKind::Wire, 0, pos_in(chunk, 0, 1));
            let lamp = b.add_node(NodeKind::Lamp, 0, pos_in(chunk, 1, 1));
            b.connect(entry, lamp);
            if x + 1 < side {
                let east = ChunkId::new(x + 1, z);
                b.add_port(prev, Direction::East, pos_in(east, 0, 1));
            }
            out.push((chunk, b.build()));
        }
    }
    out
}
