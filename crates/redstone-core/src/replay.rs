//! Replay recording and playback for debugging and determinism checks.
//!
//! A [`Recorder`] wraps a [`System`] and logs every host input (chunk loads,
//! submitted events, unloads, ticks). After each tick it stores a checkpoint
//! holding a hash of that tick's outputs and of the whole system state. The
//! resulting [`ReplayLog`] can be encoded with bitcode, shipped around, and
//! played back against a fresh system with [`replay_and_verify`].

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::event::Event;
use crate::graph::Graph;
use crate::id::ChunkId;
use crate::scheduler::TickReport;
use crate::sim::StateHash;
use crate::system::{System, SystemError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error(transparent)]
    System(#[from] SystemError),
}

// ---------------------------------------------------------------------------
// ReplayInput
// ---------------------------------------------------------------------------

/// One host action against the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplayInput {
    Load { chunk: ChunkId, graph: Graph },
    Unload { chunk: ChunkId },
    Submit { event: Event },
    Tick,
}

/// Hashes captured right after a recorded tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Index of the `Tick` input in [`ReplayLog::inputs`].
    pub input_index: usize,
    pub output_hash: u64,
    pub state_hash: u64,
}

/// Fingerprint of a tick's outputs, in order.
pub fn output_hash(outputs: &[Event]) -> u64 {
    let mut h = StateHash::new();
    for ev in outputs {
        h.write_i32(ev.pos.x);
        h.write_i32(ev.pos.y);
        h.write_i32(ev.pos.z);
        h.write_u8(ev.kind as u8);
        h.write_u8(ev.power);
        h.write_u64(ev.tick);
        h.write_u32(ev.node.map_or(0, |n| n.0));
        h.write_u32(ev.meta);
    }
    h.finish()
}

// ---------------------------------------------------------------------------
// ReplayLog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayLog {
    pub config: Config,
    pub inputs: Vec<ReplayInput>,
    pub checkpoints: Vec<Checkpoint>,
}

impl ReplayLog {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            inputs: Vec::new(),
            checkpoints: Vec::new(),
        }
    }

    pub fn tick_count(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, ReplayError> {
        bitcode::serialize(self).map_err(|e| ReplayError::Encode(e.to_string()))
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, ReplayError> {
        bitcode::deserialize(data).map_err(|e| ReplayError::Decode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// A [`System`] whose inputs are logged for later playback.
#[derive(Debug)]
pub struct Recorder {
    system: System,
    log: ReplayLog,
}

impl Recorder {
    pub fn new(config: Config) -> Result<Self, ReplayError> {
        let system = System::new(config.clone())?;
        Ok(Self {
            system,
            log: ReplayLog::new(config),
        })
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    pub fn load_chunk(&mut self, chunk: ChunkId, graph: &Graph) -> Result<(), ReplayError> {
        self.system.load_chunk(chunk, graph)?;
        self.log.inputs.push(ReplayInput::Load {
            chunk,
            graph: graph.clone(),
        });
        Ok(())
    }

    pub fn unload_chunk(&mut self, chunk: ChunkId) -> bool {
        self.log.inputs.push(ReplayInput::Unload { chunk });
        self.system.unload_chunk(chunk)
    }

    pub fn submit(&mut self, event: Event) -> Result<(), ReplayError> {
        self.system.submit(event)?;
        self.log.inputs.push(ReplayInput::Submit { event });
        Ok(())
    }

    pub fn tick(&mut self) -> Result<TickReport, ReplayError> {
        let report = self.system.tick();
        let input_index = self.log.inputs.len();
        self.log.inputs.push(ReplayInput::Tick);
        self.log.checkpoints.push(Checkpoint {
            input_index,
            output_hash: output_hash(&report.outputs),
            state_hash: self.system.state_hash()?,
        });
        Ok(report)
    }

    /// Stop the system and hand back the log.
    pub fn finish(mut self) -> ReplayLog {
        self.system.shutdown();
        self.log
    }
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

/// Where playback diverged from the recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayMismatch {
    pub input_index: usize,
    pub expected: Checkpoint,
    pub actual: Checkpoint,
}

#[derive(Debug)]
pub struct ReplayResult {
    pub ticks_executed: usize,
    pub is_verified: bool,
    pub first_mismatch: Option<ReplayMismatch>,
    /// Outputs of every replayed tick, in order.
    pub outputs: Vec<Vec<Event>>,
}

/// Play `log` against a fresh system and compare every checkpoint.
pub fn replay_and_verify(log: &ReplayLog) -> Result<ReplayResult, ReplayError> {
    let mut system = System::new(log.config.clone())?;
    let mut checkpoints = log.checkpoints.iter();
    let mut result = ReplayResult {
        ticks_executed: 0,
        is_verified: true,
        first_mismatch: None,
        outputs: Vec::new(),
    };

    for (i, input) in log.inputs.iter().enumerate() {
        match input {
            ReplayInput::Load { chunk, graph } => system.load_chunk(*chunk, graph)?,
            ReplayInput::Unload { chunk } => {
                system.unload_chunk(*chunk);
            }
            ReplayInput::Submit { event } => system.submit(*event)?,
            ReplayInput::Tick => {
                let report = system.tick();
                result.ticks_executed += 1;
                let actual = Checkpoint {
                    input_index: i,
                    output_hash: output_hash(&report.outputs),
                    state_hash: system.state_hash()?,
                };
                result.outputs.push(report.outputs);

                let Some(expected) = checkpoints.next() else {
                    continue;
                };
                if *expected != actual && result.first_mismatch.is_none() {
                    result.is_verified = false;
                    result.first_mismatch = Some(ReplayMismatch {
                        input_index: i,
                        expected: *expected,
                        actual,
                    });
                }
            }
        }
    }
    system.shutdown();
    Ok(result)
}

// ===========================================================================
// Tests
// ===========================================================================
