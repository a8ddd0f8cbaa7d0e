//! Warmup and trial timing loop.
use crate::{BenchError, Result};
use commbench::communicator::Communicator;
use commbench::timer::DeviceTimer;
use commbench::ExecMode;
use log::debug;

/// Times a collective call in steady state.
///
/// Warmups and trials are fenced by barriers so no rank starts timing while
/// another is still setting up. Trials run back-to-back without
/// synchronization, which measures pipelined throughput rather than per-call
/// round-trip latency.
pub struct TrialHarness<'a, C: Communicator> {
    comm: &'a C,
    warmups: usize,
    trials: usize,
    mode: ExecMode,
}

impl<'a, C: Communicator> TrialHarness<'a, C> {
    pub fn new(comm: &'a C, warmups: usize, trials: usize, mode: ExecMode) -> TrialHarness<'a, C> {
        TrialHarness {
            comm,
            warmups,
            trials,
            mode,
        }
    }

    /// Run `op` through warmups and timed trials. Returns the total seconds
    /// spent in the timed trials.
    pub fn run_total<F>(&self, mut op: F) -> Result<f64>
    where
        F: FnMut(&C, ExecMode) -> commbench::Result<Option<C::Request>>,
    {
        if self.trials == 0 {
            return Err(BenchError::Configuration("trial count must be positive".to_string()));
        }

        self.comm.barrier()?;
        // Warmups, establish connections, etc.
        self.issue(&mut op, self.warmups)?;
        self.comm.barrier()?;

        let mut timer = self.comm.timer();
        timer.start();
        self.issue(&mut op, self.trials)?;
        timer.stop();
        self.comm.barrier()?;

        let total = timer.elapsed_ms() / 1.0e3;
        debug!(
            "(rank = {}) {} trials took {:.6} s",
            self.comm.rank(),
            self.trials,
            total
        );
        Ok(total)
    }

    /// Run `op` through warmups and timed trials. Returns the average
    /// seconds per call.
    pub fn run<F>(&self, op: F) -> Result<f64>
    where
        F: FnMut(&C, ExecMode) -> commbench::Result<Option<C::Request>>,
    {
        Ok(self.run_total(op)? / self.trials as f64)
    }

    /// Issue `count` calls, then wait for anything still outstanding.
    fn issue<F>(&self, op: &mut F, count: usize) -> Result<()>
    where
        F: FnMut(&C, ExecMode) -> commbench::Result<Option<C::Request>>,
    {
        let mut pending = vec![];
        for _ in 0..count {
            if let Some(req) = op(self.comm, self.mode)? {
                pending.push(req);
            }
        }
        if !pending.is_empty() {
            self.comm.wait(pending)?;
        }
        Ok(())
    }
}
