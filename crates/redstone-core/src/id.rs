//! Identifier and coordinate types shared by every layer of the engine.
//!
//! [`ChunkId`] names a simulation partition and carries a Morton (Z-order)
//! key so that scheduling order never depends on container iteration order.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Width of a chunk in blocks along x and z.
pub const CHUNK_WIDTH_SHIFT: i32 = 4;

/// Identifies a node within the graph of a single chunk. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The lowest eight bits, used as the last component of the event sort key.
    pub fn low_byte(self) -> u8 {
        (self.0 & 0xff) as u8
    }
}

/// A block position in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The chunk column containing this block.
    pub fn chunk(self) -> ChunkId {
        ChunkId::new(self.x >> CHUNK_WIDTH_SHIFT, self.z >> CHUNK_WIDTH_SHIFT)
    }

    /// Z-order key over the horizontal coordinates.
    pub fn morton(self) -> u64 {
        morton2(self.x, self.z)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Identifies a chunk column: the unit of graph ownership and scheduling.
///
/// Ordering is by [`ChunkId::morton`], not by field order, so sorted
/// collections of chunks walk the Z-order curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ChunkId {
    pub x: i32,
    pub z: i32,
}

impl ChunkId {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Interleave the bits of both sign-shifted coordinates into one 64-bit
    /// key. `x` occupies the even bits and `z` the odd bits.
    pub fn morton(self) -> u64 {
        morton2(self.x, self.z)
    }
}

impl Ord for ChunkId {
    fn cmp(&self, other: &Self) -> Ordering {
        // Morton is a bijection over (x, z), so this is a total order.
        self.morton().cmp(&other.morton())
    }
}

impl PartialOrd for ChunkId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

/// Map a signed coordinate onto `u32` preserving order.
fn sign_shift(v: i32) -> u32 {
    (v as u32) ^ 0x8000_0000
}

/// Spread the 32 bits of `v` over the even bits of a `u64`.
fn spread(v: u32) -> u64 {
    let mut x = v as u64;
    x = (x | (x << 16)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    x = (x | (x << 1)) & 0x5555_5555_5555_5555;
    x
}

fn morton2(x: i32, z: i32) -> u64 {
    spread(sign_shift(x)) | (spread(sign_shift(z)) << 1)
}
