//! Binding of each collective primitive to payloads and the trial harness.
use crate::buffer::Payload;
use crate::bw::bus_factor;
use crate::config::{BenchmarkConfig, Dtype, PayloadMode};
use crate::harness::TrialHarness;
use crate::op::OpKind;
use crate::report::Reporter;
use crate::sample::{MetricSample, TrialResult};
use crate::sweep::{fixed_elements, sweep_sizes, SweepSpec};
use crate::{BenchError, Result};
use commbench::communicator::Communicator;
use commbench::{Element, ExecMode, ReduceOp};
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::Write;

/// Elements shown per rank in debug dumps.
const DEBUG_ELEMENTS: usize = 8;

/// Outcome of a sweep. Failed points are kept alongside the successful ones.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub samples: Vec<MetricSample>,
    pub failures: Vec<(usize, BenchError)>,
}

/// Issue one call of `op` on the payload.
fn invoke<C, T>(
    op: OpKind,
    comm: &C,
    payload: &mut Payload<T>,
    reduce_op: ReduceOp,
    mode: ExecMode,
) -> commbench::Result<Option<C::Request>>
where
    C: Communicator,
    T: Element,
{
    match op {
        OpKind::Broadcast => comm.broadcast(&mut payload.input, 0, mode),
        OpKind::AllReduce => comm.all_reduce(&mut payload.input, reduce_op, mode),
        OpKind::AllGather => comm.all_gather(&payload.input, &mut payload.output, mode),
        OpKind::AllToAll => comm.all_to_all(&payload.input, &mut payload.output, mode),
        OpKind::Pt2pt => pt2pt(comm, &mut payload.input, mode),
    }
}

/// Rank 0 sends to rank 1, every other rank sits the call out.
fn pt2pt<C, T>(comm: &C, buf: &mut [T], mode: ExecMode) -> commbench::Result<Option<C::Request>>
where
    C: Communicator,
    T: Element,
{
    match (comm.rank(), mode) {
        (0, ExecMode::Blocking) => comm.send(buf, 1).map(|_| None),
        (0, ExecMode::Async) => comm.isend(buf, 1).map(Some),
        (1, ExecMode::Blocking) => comm.recv(buf, 0).map(|_| None),
        (1, ExecMode::Async) => comm.irecv(buf, 0).map(Some),
        _ => Ok(None),
    }
}

/// Fail early if `op` has no defined behavior on `world_size` processes.
pub fn check_world_size(op: OpKind, world_size: usize) -> Result<()> {
    bus_factor(op, world_size.min(op.participants(world_size))).map(|_| ())
}

/// Runs one primitive, either at a single size or across a sweep.
pub struct OperationRunner<'a, C: Communicator, W: Write> {
    op: OpKind,
    comm: &'a C,
    config: &'a BenchmarkConfig,
    reporter: &'a mut Reporter<W>,
}

impl<'a, C: Communicator, W: Write> OperationRunner<'a, C, W> {
    pub fn new(
        op: OpKind,
        comm: &'a C,
        config: &'a BenchmarkConfig,
        reporter: &'a mut Reporter<W>,
    ) -> Result<OperationRunner<'a, C, W>> {
        check_world_size(op, comm.size())?;
        Ok(OperationRunner {
            op,
            comm,
            config,
            reporter,
        })
    }

    /// Print the header and run the configured payload selection.
    pub fn run<T: Element>(&mut self) -> Result<SweepReport> {
        self.reporter.header(self.op)?;
        match self.config.payload {
            PayloadMode::Scan(spec) => self.run_sweep::<T>(&spec),
            PayloadMode::Fixed { exponent } => {
                let elements = fixed_elements(exponent)?;
                let element_size = std::mem::size_of::<T>();
                if !self.config.budget.admits(self.op, elements, element_size, self.comm.size()) {
                    warn!(
                        "{} with {} elements exceeds the memory budget of {} bytes",
                        self.op,
                        elements,
                        self.config.budget.usable_bytes()
                    );
                }
                let mut report = SweepReport::default();
                match self.run_single::<T>(elements) {
                    Ok(sample) => report.samples.push(sample),
                    Err(err) => {
                        error!("(rank = {}) {} failed: {}", self.comm.rank(), self.op, err);
                        report.failures.push((elements, err));
                    }
                }
                Ok(report)
            }
        }
    }

    /// Measure a single payload of `elements` elements.
    pub fn run_single<T: Element>(&mut self, elements: usize) -> Result<MetricSample> {
        self.measure::<T>(elements, self.config.debug)
    }

    /// Measure every size of the sweep, continuing past failed points.
    pub fn run_sweep<T: Element>(&mut self, spec: &SweepSpec) -> Result<SweepReport> {
        let sizes = sweep_sizes(
            spec,
            &self.config.budget,
            self.op,
            std::mem::size_of::<T>(),
            self.comm.size(),
        )?;
        info!(
            "(rank = {}) sweeping {} over {} sizes ({} to {} {} elements)",
            self.comm.rank(),
            self.op,
            sizes.len(),
            sizes[0],
            sizes[sizes.len() - 1],
            T::NAME
        );

        let mut report = SweepReport::default();
        for elements in sizes {
            match self.measure::<T>(elements, false) {
                Ok(sample) => report.samples.push(sample),
                Err(err) => {
                    error!(
                        "(rank = {}) {} with {} elements failed: {}",
                        self.comm.rank(),
                        self.op,
                        elements,
                        err
                    );
                    report.failures.push((elements, err));
                }
            }
        }
        Ok(report)
    }

    /// Allocate, time, convert and report one payload point. The payload is
    /// dropped before returning.
    fn measure<T: Element>(&mut self, elements: usize, debug: bool) -> Result<MetricSample> {
        let (op, comm, config) = (self.op, self.comm, self.config);
        let mut payload = Payload::<T>::for_op(op, elements, comm.size(), comm.rank());
        debug!(
            "(rank = {}) {} payload: {} B in, {} B out",
            comm.rank(),
            op,
            payload.input_desc().bytes(),
            payload.output_desc().bytes()
        );
        if debug {
            self.dump("input", &payload.input)?;
        }

        let harness = TrialHarness::new(comm, config.warmups, config.trials, config.mode);
        let total_duration = harness.run_total(|comm, mode| {
            invoke(op, comm, &mut payload, config.reduce_op, mode)
        })?;

        if debug {
            let result = if payload.output.is_empty() {
                &payload.input
            } else {
                &payload.output
            };
            self.dump("result", result)?;
        }

        let input = payload.input_desc();
        let trial = TrialResult {
            total_duration,
            trials: config.trials,
            elements: input.elements,
            element_size: input.element_size,
        };
        let sample = MetricSample::from_trial(op, &trial, comm.size())?;
        self.reporter.record(&sample)?;
        Ok(sample)
    }

    /// Print the head of `data` from every rank, one rank at a time.
    fn dump<T: Element>(&mut self, label: &str, data: &[T]) -> Result<()> {
        for rank in 0..self.comm.size() {
            if rank == self.comm.rank() {
                let shown = &data[..data.len().min(DEBUG_ELEMENTS)];
                let more = if data.len() > shown.len() { " ..." } else { "" };
                self.reporter
                    .debug_line(&format!("{} {} at rank {}: {:?}{}", self.op, label, rank, shown, more))?;
            }
            self.comm.barrier()?;
        }
        Ok(())
    }
}

/// Run every configured operation. Configuration problems abort before any
/// measurement; failed points are logged and skipped.
pub fn run_benchmarks<C, W>(
    comm: &C,
    config: &BenchmarkConfig,
    reporter: &mut Reporter<W>,
) -> Result<Vec<MetricSample>>
where
    C: Communicator,
    W: Write,
{
    for &op in &config.ops {
        check_world_size(op, comm.size())?;
    }

    let mut samples = vec![];
    let mut failed = 0;
    for &op in &config.ops {
        let mut runner = OperationRunner::new(op, comm, config, reporter)?;
        let report = match config.dtype {
            Dtype::F32 => runner.run::<f32>(),
            Dtype::F64 => runner.run::<f64>(),
            Dtype::I32 => runner.run::<i32>(),
            Dtype::I64 => runner.run::<i64>(),
            Dtype::U8 => runner.run::<u8>(),
        }?;
        failed += report.failures.len();
        samples.extend(report.samples);
    }
    if failed > 0 {
        warn!("(rank = {}) {} measurement points failed", comm.rank(), failed);
    }

    if let Some(path) = &config.output_json {
        if reporter.is_reporting() {
            serde_json::to_writer_pretty(File::create(path)?, &samples)?;
            info!("wrote {} samples to {}", samples.len(), path.display());
        }
    }
    Ok(samples)
}
