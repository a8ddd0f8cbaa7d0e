//! Per-iteration timed all-gather, printed in the run log format.
use crate::{BenchError, Result};
use commbench::communicator::Communicator;
use commbench::timer::DeviceTimer;
use commbench::{Element, ExecMode};
use log::debug;
use std::fmt;
use std::time::Instant;

/// Result of one probe run, as seen by one rank.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeReport {
    pub world_size: usize,
    /// Bytes contributed by each rank.
    pub bytes: usize,
    /// Wall seconds, excluding the first iteration when there is more than one.
    pub total_duration: f64,
    /// Milliseconds per iteration.
    pub xfer_times: Vec<f64>,
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "world_size={} bytes={} total_duration={}",
            self.world_size, self.bytes, self.total_duration
        )?;
        for ms in &self.xfer_times {
            write!(f, "\nxfer time (ms): {}", ms)?;
        }
        Ok(())
    }
}

/// All-gather `total_bytes` split evenly across ranks, `iterations` times.
pub fn all_gather_probe<C: Communicator>(
    comm: &C,
    total_bytes: usize,
    iterations: usize,
) -> Result<ProbeReport> {
    if iterations == 0 {
        return Err(BenchError::Configuration("iterations must be positive".to_string()));
    }
    let world_size = comm.size();
    let bytes = total_bytes / world_size;
    if bytes == 0 {
        return Err(BenchError::Configuration(format!(
            "{} bytes can't be split across {} ranks",
            total_bytes, world_size
        )));
    }

    let input = vec![u8::from_index(comm.rank()); bytes];
    let mut output = vec![0u8; bytes * world_size];
    // The first iteration warms up the transport unless it is the only one.
    let timed_from = if iterations > 1 { 1 } else { 0 };

    comm.barrier()?;
    let mut xfer_times = Vec::with_capacity(iterations);
    let mut started = None;
    for i in 0..iterations {
        if i == timed_from {
            comm.barrier()?;
            started = Some(Instant::now());
        }
        let mut timer = comm.timer();
        timer.start();
        if let Some(req) = comm.all_gather(&input, &mut output, ExecMode::Blocking)? {
            comm.wait(vec![req])?;
        }
        timer.stop();
        xfer_times.push(timer.elapsed_ms());
    }
    comm.barrier()?;
    let total_duration = started.map_or(0.0, |t| t.elapsed().as_secs_f64());
    debug!(
        "(rank = {}) probe of {} iterations took {:.6} s",
        comm.rank(),
        iterations,
        total_duration
    );

    Ok(ProbeReport {
        world_size,
        bytes,
        total_duration,
        xfer_times,
    })
}
