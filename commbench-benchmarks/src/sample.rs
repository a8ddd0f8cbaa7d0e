//! Measurement results.
use crate::bw::{bandwidth, traffic_bytes};
use crate::op::OpKind;
use crate::Result;
use serde::Serialize;

/// Timing of the trial loop for one payload point.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrialResult {
    /// Seconds spent in all timed trials together.
    pub total_duration: f64,

    /// Number of timed trials.
    pub trials: usize,

    /// Elements in the input buffer.
    pub elements: usize,

    /// Bytes per element.
    pub element_size: usize,
}

impl TrialResult {
    /// Average seconds per call.
    pub fn average(&self) -> f64 {
        self.total_duration / self.trials as f64
    }

    /// Bytes in the input buffer.
    pub fn input_bytes(&self) -> usize {
        self.elements * self.element_size
    }
}

/// Derived bandwidth figures for one payload point.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricSample {
    pub op: OpKind,
    pub world_size: usize,
    pub elements: usize,
    pub element_size: usize,
    /// Bytes moved by one call.
    pub bytes: usize,
    /// Average seconds per call.
    pub duration: f64,
    /// Bytes per second.
    pub throughput: f64,
    /// Bytes per second, corrected for the op's link utilization.
    pub bus_bandwidth: f64,
}

impl MetricSample {
    pub fn from_trial(op: OpKind, trial: &TrialResult, world_size: usize) -> Result<MetricSample> {
        let world_size = op.participants(world_size);
        let bytes = traffic_bytes(op, trial.input_bytes(), world_size);
        let duration = trial.average();
        let bw = bandwidth(op, bytes, duration, world_size)?;
        Ok(MetricSample {
            op,
            world_size,
            elements: trial.elements,
            element_size: trial.element_size,
            bytes,
            duration,
            throughput: bw.throughput,
            bus_bandwidth: bw.bus_bandwidth,
        })
    }
}
