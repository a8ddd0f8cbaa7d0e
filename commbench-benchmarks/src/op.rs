//! Collective primitives that can be benchmarked.
use crate::{BenchError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of collective operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// Broadcast from rank 0.
    Broadcast,

    /// In-place sum all-reduce.
    AllReduce,

    /// All-gather into a buffer `world_size` times the input.
    AllGather,

    /// All-to-all with one shard per destination.
    AllToAll,

    /// Rank 0 sends to rank 1.
    Pt2pt,
}

impl OpKind {
    /// Operations run when none are selected, in execution order.
    pub const ALL: [OpKind; 5] = [
        OpKind::AllReduce,
        OpKind::AllGather,
        OpKind::AllToAll,
        OpKind::Broadcast,
        OpKind::Pt2pt,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OpKind::Broadcast => "broadcast",
            OpKind::AllReduce => "all_reduce",
            OpKind::AllGather => "all_gather",
            OpKind::AllToAll => "all_to_all",
            OpKind::Pt2pt => "pt2pt",
        }
    }

    /// Number of payload-sized buffers each process holds for this op.
    pub fn buffer_factor(self, world_size: usize) -> usize {
        match self {
            OpKind::Broadcast | OpKind::Pt2pt => 1,
            OpKind::AllReduce => 2,
            OpKind::AllGather => 1 + world_size,
            OpKind::AllToAll => 2 * world_size,
        }
    }

    /// Ranks taking part in the operation.
    pub fn participants(self, world_size: usize) -> usize {
        match self {
            OpKind::Pt2pt => 2,
            _ => world_size,
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OpKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<OpKind> {
        let compact: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect();
        match compact.as_str() {
            "broadcast" => Ok(OpKind::Broadcast),
            "allreduce" => Ok(OpKind::AllReduce),
            "allgather" => Ok(OpKind::AllGather),
            "alltoall" => Ok(OpKind::AllToAll),
            "pt2pt" => Ok(OpKind::Pt2pt),
            _ => Err(BenchError::Configuration(format!(
                "unsupported operation: {}",
                s
            ))),
        }
    }
}
