//! Bandwidth model: converts a measured duration into algorithmic throughput
//! and bus bandwidth.
//!
//! Bus bandwidth scales throughput by how many times the payload crosses the
//! slowest link under the optimal ring/tree algorithm for each primitive, so
//! the figure is comparable across process counts.
use crate::op::OpKind;
use crate::{BenchError, Result};

/// Throughput figures for one measurement, in bytes per second.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bandwidth {
    /// Bytes moved per second as observed by the caller.
    pub throughput: f64,

    /// Throughput corrected by the op's link utilization factor.
    pub bus_bandwidth: f64,
}

/// Link utilization factor `f(n)` for `op` on `world_size` ranks.
pub fn bus_factor(op: OpKind, world_size: usize) -> Result<f64> {
    if world_size < 2 {
        return Err(BenchError::Configuration(format!(
            "{} needs at least 2 processes, got {}",
            op, world_size
        )));
    }
    let n = world_size as f64;
    Ok(match op {
        OpKind::AllReduce => 2.0 * (n - 1.0) / n,
        OpKind::AllGather | OpKind::Broadcast | OpKind::AllToAll => (n - 1.0) / n,
        OpKind::Pt2pt => 1.0,
    })
}

/// Bytes one call of `op` moves, given the per-rank input buffer size.
///
/// All-gather is measured on the gathered output. Every other op's input
/// buffer already holds the full exchange.
pub fn traffic_bytes(op: OpKind, input_bytes: usize, world_size: usize) -> usize {
    match op {
        OpKind::AllGather => input_bytes * world_size,
        _ => input_bytes,
    }
}

/// Compute throughput and bus bandwidth for one measurement.
pub fn bandwidth(op: OpKind, bytes: usize, duration: f64, world_size: usize) -> Result<Bandwidth> {
    let factor = bus_factor(op, world_size)?;
    if !duration.is_finite() || duration <= 0.0 {
        return Err(BenchError::Measurement(format!(
            "duration must be positive, got {}",
            duration
        )));
    }
    let throughput = bytes as f64 / duration;
    Ok(Bandwidth {
        throughput,
        bus_bandwidth: throughput * factor,
    })
}
