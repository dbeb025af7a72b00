//! Per-chunk circuit graph stored as flat arrays.
//!
//! Nodes live in a contiguous palette addressed by index. Adjacency is a
//! CSR table: the neighbours of `palette[i]` are
//! `adjacency[offsets[i]..offsets[i + 1]]`. Cycles in the circuit are just
//! index references, so a whole-graph deep copy is a handful of `Vec` clones.
//!
//! A graph is built by a collaborator outside the engine (see
//! [`GraphBuilder`]) and handed wholesale to the chunk worker that owns it.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::id::{BlockPos, ChunkId, NodeId};
use crate::sim::{StateHash, Tick};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Structural problems found by [`Graph::validate`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("offset table has {actual} entries, expected {expected}")]
    OffsetLength { expected: usize, actual: usize },
    #[error("offset table is not monotonic at index {0}")]
    OffsetOrder(usize),
    #[error("offset table ends at {end} but adjacency has {len} entries")]
    OffsetEnd { end: usize, len: usize },
    #[error("adjacency entry {entry} points at missing palette index {target}")]
    DanglingEdge { entry: usize, target: u32 },
    #[error("port references unknown node {0:?}")]
    UnknownPortNode(NodeId),
    #[error("duplicate node id {0:?}")]
    DuplicateNode(NodeId),
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// The closed set of circuit element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NodeKind {
    #[default]
    Unknown,
    PowerSource,
    Wire,
    Repeater,
    Comparator,
    Lamp,
    Observer,
    Consumer,
}

/// PowerSource subtype, stored in the low four bits of [`Node::data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Generic,
    Lever,
    Button,
    Torch,
    PressurePlate,
}

impl SourceKind {
    const MASK: u32 = 0xF;

    pub fn from_data(data: u32) -> Self {
        match data & Self::MASK {
            1 => SourceKind::Lever,
            2 => SourceKind::Button,
            3 => SourceKind::Torch,
            4 => SourceKind::PressurePlate,
            _ => SourceKind::Generic,
        }
    }

    pub fn to_data(self) -> u32 {
        match self {
            SourceKind::Generic => 0,
            SourceKind::Lever => 1,
            SourceKind::Button => 2,
            SourceKind::Torch => 3,
            SourceKind::PressurePlate => 4,
        }
    }

    /// Buttons and pressure plates release on their own after a delay.
    pub fn auto_releases(self) -> bool {
        matches!(self, SourceKind::Button | SourceKind::PressurePlate)
    }
}

/// One circuit element. Immutable once the graph is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Subtype and delay bits; meaning depends on `kind`.
    pub data: u32,
    pub pos: BlockPos,
}

impl Node {
    /// Repeater delay in ticks: `1 + (data & 0x3)`.
    pub fn repeater_delay(&self) -> Tick {
        1 + (self.data & 0x3) as Tick
    }

    pub fn source_kind(&self) -> SourceKind {
        SourceKind::from_data(self.data)
    }
}

/// Mutable simulation state for one node, index-aligned with the palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeState {
    pub power: u8,
    pub active: bool,
    /// Tick at which a scheduled transition fires, if one is pending.
    pub pending_tick: Option<Tick>,
    /// Power to apply when `pending_tick` fires.
    pub pending_power: u8,
    /// Last observed input (power for repeaters, meta for observers).
    pub last_input: u32,
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Horizontal direction of a chunk boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    /// The chunk across this boundary.
    pub fn offset(self, chunk: ChunkId) -> ChunkId {
        match self {
            Direction::North => ChunkId::new(chunk.x, chunk.z - 1),
            Direction::South => ChunkId::new(chunk.x, chunk.z + 1),
            Direction::East => ChunkId::new(chunk.x + 1, chunk.z),
            Direction::West => ChunkId::new(chunk.x - 1, chunk.z),
        }
    }
}

/// A declared edge continuing a local node's signal into a neighbouring chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub direction: Direction,
    pub neighbour: ChunkId,
    /// The local node whose output crosses the boundary.
    pub node: NodeId,
    /// The block in the neighbouring chunk the signal continues into.
    pub target: BlockPos,
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Node palette, CSR adjacency, ports and per-node state for one chunk.
///
/// Position and id lookup tables are not serialized and are rebuilt lazily
/// whenever they are stale relative to the palette length.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Graph {
    palette: Vec<Node>,
    offsets: Vec<u32>,
    adjacency: Vec<u32>,
    ports: Vec<Port>,
    states: Vec<NodeState>,

    #[serde(skip)]
    by_pos: FxHashMap<BlockPos, usize>,
    #[serde(skip)]
    by_id: FxHashMap<NodeId, usize>,
    /// Palette length the lookup tables were built for.
    #[serde(skip)]
    indexed_len: Option<usize>,
}

impl Clone for Graph {
    fn clone(&self) -> Self {
        Self {
            palette: self.palette.clone(),
            offsets: self.offsets.clone(),
            adjacency: self.adjacency.clone(),
            ports: self.ports.clone(),
            states: self.states.clone(),
            // Indices are rebuilt on first lookup.
            by_pos: FxHashMap::default(),
            by_id: FxHashMap::default(),
            indexed_len: None,
        }
    }
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.palette == other.palette
            && self.offsets == other.offsets
            && self.adjacency == other.adjacency
            && self.ports == other.ports
            && self.states == other.states
    }
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a graph from raw parts. Missing states are filled with
    /// defaults so that `states.len() >= palette.len()` always holds.
    pub fn from_parts(
        palette: Vec<Node>,
        offsets: Vec<u32>,
        adjacency: Vec<u32>,
        ports: Vec<Port>,
        states: Vec<NodeState>,
    ) -> Self {
        let mut graph = Self {
            palette,
            offsets,
            adjacency,
            ports,
            states,
            ..Self::default()
        };
        graph.ensure_states();
        graph
    }

    pub fn len(&self) -> usize {
        self.palette.len()
    }

    pub fn is_empty(&self) -> bool {
        self.palette.is_empty()
    }

    pub fn palette(&self) -> &[Node] {
        &self.palette
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn states(&self) -> &[NodeState] {
        &self.states
    }

    pub fn node(&self, idx: usize) -> Option<&Node> {
        self.palette.get(idx)
    }

    pub fn state(&self, idx: usize) -> Option<&NodeState> {
        self.states.get(idx)
    }

    pub fn state_mut(&mut self, idx: usize) -> Option<&mut NodeState> {
        self.states.get_mut(idx)
    }

    /// Palette indices driven by `palette[idx]`. O(1) via the offset table.
    pub fn neighbours(&self, idx: usize) -> &[u32] {
        let (Some(&start), Some(&end)) = (self.offsets.get(idx), self.offsets.get(idx + 1)) else {
            return &[];
        };
        self.adjacency
            .get(start as usize..end as usize)
            .unwrap_or(&[])
    }

    /// Ports whose local end is `node`.
    pub fn ports_of(&self, node: NodeId) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(move |p| p.node == node)
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    fn ensure_states(&mut self) {
        if self.states.len() < self.palette.len() {
            self.states.resize(self.palette.len(), NodeState::default());
        }
    }

    fn ensure_index(&mut self) {
        if self.indexed_len == Some(self.palette.len()) {
            return;
        }
        self.by_pos.clear();
        self.by_id.clear();
        for (idx, node) in self.palette.iter().enumerate() {
            // First node at a position wins the position slot; duplicates are
            // reachable by id.
            self.by_pos.entry(node.pos).or_insert(idx);
            self.by_id.entry(node.id).or_insert(idx);
        }
        self.indexed_len = Some(self.palette.len());
        self.ensure_states();
    }

    pub fn index_of_pos(&mut self, pos: BlockPos) -> Option<usize> {
        self.ensure_index();
        self.by_pos.get(&pos).copied()
    }

    pub fn index_of_id(&mut self, id: NodeId) -> Option<usize> {
        self.ensure_index();
        self.by_id.get(&id).copied()
    }

    /// Resolve an event target: by node id when given, else by position.
    pub fn locate(&mut self, node: Option<NodeId>, pos: BlockPos) -> Option<usize> {
        match node {
            Some(id) => self.index_of_id(id),
            None => self.index_of_pos(pos),
        }
    }

    // -----------------------------------------------------------------------
    // Integrity
    // -----------------------------------------------------------------------

    /// Check the CSR table and port references.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.palette.is_empty() && self.offsets.is_empty() {
            return if self.adjacency.is_empty() {
                self.validate_ports()
            } else {
                Err(GraphError::OffsetEnd {
                    end: 0,
                    len: self.adjacency.len(),
                })
            };
        }

        let expected = self.palette.len() + 1;
        if self.offsets.len() != expected {
            return Err(GraphError::OffsetLength {
                expected,
                actual: self.offsets.len(),
            });
        }
        if let Some(i) = self.offsets.windows(2).position(|w| w[0] > w[1]) {
            return Err(GraphError::OffsetOrder(i + 1));
        }
        let end = self.offsets[self.palette.len()] as usize;
        if end != self.adjacency.len() {
            return Err(GraphError::OffsetEnd {
                end,
                len: self.adjacency.len(),
            });
        }
        if let Some((entry, &target)) = self
            .adjacency
            .iter()
            .enumerate()
            .find(|(_, t)| **t as usize >= self.palette.len())
        {
            return Err(GraphError::DanglingEdge { entry, target });
        }

        let mut seen = rustc_hash::FxHashSet::default();
        for node in &self.palette {
            if !seen.insert(node.id) {
                return Err(GraphError::DuplicateNode(node.id));
            }
        }
        self.validate_ports()
    }

    fn validate_ports(&self) -> Result<(), GraphError> {
        for port in &self.ports {
            if !self.palette.iter().any(|n| n.id == port.node) {
                return Err(GraphError::UnknownPortNode(port.node));
            }
        }
        Ok(())
    }

    /// Fingerprint of node identities and states, in palette order.
    pub fn state_hash(&self) -> u64 {
        let mut h = StateHash::new();
        for (node, state) in self.palette.iter().zip(&self.states) {
            h.write_u32(node.id.0);
            h.write_u8(state.power);
            h.write_u8(state.active as u8);
            h.write_u64(state.pending_tick.unwrap_or(u64::MAX));
            h.write_u8(state.pending_power);
            h.write_u32(state.last_input);
        }
        h.finish()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`Graph`] from nodes and directed edges.
///
/// Node ids are assigned sequentially starting at 1. Edges are directed in
/// the signal-flow sense: `connect(a, b)` means `a` drives `b`.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    edges: Vec<(usize, usize)>,
    ports: Vec<Port>,
    chunk: ChunkId,
}

impl GraphBuilder {
    /// Start a graph for the given chunk. The chunk is used to resolve port
    /// directions into neighbour ids.
    pub fn new(chunk: ChunkId) -> Self {
        Self {
            chunk,
            ..Self::default()
        }
    }

    pub fn add_node(&mut self, kind: NodeKind, data: u32, pos: BlockPos) -> NodeId {
        let id = NodeId(self.nodes.len() as u32 + 1);
        self.nodes.push(Node { id, kind, data, pos });
        id
    }

    pub fn add_source(&mut self, source: SourceKind, pos: BlockPos) -> NodeId {
        self.add_node(NodeKind::PowerSource, source.to_data(), pos)
    }

    /// Add a directed edge. Unknown ids are ignored.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> &mut Self {
        if let (Some(a), Some(b)) = (self.index(from), self.index(to)) {
            self.edges.push((a, b));
        }
        self
    }

    /// Declare that `node`'s output continues into `target` across `direction`.
    pub fn add_port(&mut self, node: NodeId, direction: Direction, target: BlockPos) -> &mut Self {
        self.ports.push(Port {
            direction,
            neighbour: direction.offset(self.chunk),
            node,
            target,
        });
        self
    }

    fn index(&self, id: NodeId) -> Option<usize> {
        let idx = (id.0 as usize).checked_sub(1)?;
        (idx < self.nodes.len()).then_some(idx)
    }

    /// Compute the CSR table. Edge order per node is insertion order.
    pub fn build(&self) -> Graph {
        let mut counts = vec![0u32; self.nodes.len()];
        for &(from, _) in &self.edges {
            counts[from] += 1;
        }

        let mut offsets = Vec::with_capacity(self.nodes.len() + 1);
        let mut running = 0u32;
        offsets.push(0);
        for c in &counts {
            running += c;
            offsets.push(running);
        }

        let mut cursor: Vec<u32> = offsets[..self.nodes.len()].to_vec();
        let mut adjacency = vec![0u32; running as usize];
        for &(from, to) in &self.edges {
            adjacency[cursor[from] as usize] = to as u32;
            cursor[from] += 1;
        }

        Graph::from_parts(
            self.nodes.clone(),
            offsets,
            adjacency,
            self.ports.clone(),
            Vec::new(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> (Graph, [NodeId; 3]) {
        let mut b = GraphBuilder::new(ChunkId::new(0, 0));
        let lever = b.add_source(SourceKind::Lever, BlockPos::new(0, 64, 0));
        let wire = b.add_node(NodeKind::Wire, 0, BlockPos::new(1, 64, 0));
        let lamp = b.add_node(NodeKind::Lamp, 0, BlockPos::new(2, 64, 0));
        b.connect(lever, wire).connect(wire, lamp);
        (b.build(), [lever, wire, lamp])
    }

    #[test]
    fn builder_produces_csr_table() {
        let (graph, _) = chain();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.neighbours(0), &[1]);
        assert_eq!(graph.neighbours(1), &[2]);
        assert!(graph.neighbours(2).is_empty());
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn neighbours_out_of_range_is_empty() {
        let (graph, _) = chain();
        assert!(graph.neighbours(99).is_empty());
    }

    #[test]
    fn states_cover_palette() {
        let (graph, _) = chain();
        assert!(graph.states().len() >= graph.palette().len());
    }

    #[test]
    fn locate_prefers_node_id_over_position() {
        let mut b = GraphBuilder::new(ChunkId::new(0, 0));
        let pos = BlockPos::new(3, 64, 3);
        let first = b.add_node(NodeKind::Wire, 0, pos);
        let second = b.add_node(NodeKind::Lamp, 0, pos);
        let mut graph = b.build();

        assert_eq!(graph.locate(None, pos), Some(0));
        assert_eq!(graph.locate(Some(second), pos), Some(1));
        assert_eq!(graph.locate(Some(first), BlockPos::new(9, 9, 9)), Some(0));
        assert_eq!(graph.locate(Some(NodeId(42)), pos), None);
    }

    #[test]
    fn clone_is_deep() {
        let (mut graph, _) = chain();
        let copy = graph.clone();
        graph.state_mut(0).unwrap().power = 15;
        assert_eq!(copy.state(0).unwrap().power, 0);
        assert_ne!(graph, copy);
    }

    #[test]
    fn clone_rebuilds_indices() {
        let (mut graph, ids) = chain();
        assert_eq!(graph.index_of_id(ids[2]), Some(2));
        let mut copy = graph.clone();
        assert_eq!(copy.index_of_pos(BlockPos::new(2, 64, 0)), Some(2));
    }

    #[test]
    fn ports_resolve_neighbour_chunk() {
        let mut b = GraphBuilder::new(ChunkId::new(2, 5));
        let wire = b.add_node(NodeKind::Wire, 0, BlockPos::new(47, 64, 80));
        b.add_port(wire, Direction::East, BlockPos::new(48, 64, 80));
        let graph = b.build();

        let ports: Vec<_> = graph.ports_of(wire).collect();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].neighbour, ChunkId::new(3, 5));
    }

    #[test]
    fn validate_rejects_bad_offsets() {
        let node = Node {
            id: NodeId(1),
            kind: NodeKind::Wire,
            data: 0,
            pos: BlockPos::default(),
        };
        let graph = Graph::from_parts(vec![node], vec![0], vec![], vec![], vec![]);
        assert_eq!(
            graph.validate(),
            Err(GraphError::OffsetLength {
                expected: 2,
                actual: 1
            })
        );

        let graph = Graph::from_parts(vec![node], vec![0, 1], vec![7], vec![], vec![]);
        assert_eq!(
            graph.validate(),
            Err(GraphError::DanglingEdge {
                entry: 0,
                target: 7
            })
        );
    }

    #[test]
    fn validate_rejects_unknown_port_node() {
        let mut b = GraphBuilder::new(ChunkId::new(0, 0));
        b.add_node(NodeKind::Wire, 0, BlockPos::default());
        b.add_port(NodeId(9), Direction::North, BlockPos::new(0, 64, -1));
        assert_eq!(
            b.build().validate(),
            Err(GraphError::UnknownPortNode(NodeId(9)))
        );
    }

    #[test]
    fn source_kind_round_trips_through_data() {
        for kind in [
            SourceKind::Generic,
            SourceKind::Lever,
            SourceKind::Button,
            SourceKind::Torch,
            SourceKind::PressurePlate,
        ] {
            assert_eq!(SourceKind::from_data(kind.to_data()), kind);
        }
        // Upper bits are ignored.
        assert_eq!(SourceKind::from_data(0x30), SourceKind::Generic);
    }

    #[test]
    fn repeater_delay_uses_low_two_bits() {
        let mut node = Node {
            id: NodeId(1),
            kind: NodeKind::Repeater,
            data: 0,
            pos: BlockPos::default(),
        };
        assert_eq!(node.repeater_delay(), 1);
        node.data = 3;
        assert_eq!(node.repeater_delay(), 4);
        node.data = 0x7;
        assert_eq!(node.repeater_delay(), 4);
    }

    #[test]
    fn state_hash_tracks_state_changes() {
        let (mut graph, _) = chain();
        let before = graph.state_hash();
        graph.state_mut(1).unwrap().power = 14;
        assert_ne!(before, graph.state_hash());
    }
}
