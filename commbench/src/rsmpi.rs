//! MPI transport backed by rsmpi.
use crate::{
    communicator::Communicator,
    datatype::{Element, ReduceOp},
    request::Request,
    timer::DeviceTimer,
    Error, ExecMode, Result,
};
use log::info;
use mpi::collective::SystemOperation;
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
// Our own `Communicator` shadows the glob, keep rsmpi's methods callable.
use mpi::traits::Communicator as _;

/// MPI_COMM_WORLD wrapped in the capability interface.
///
/// rsmpi ties immediate requests to a scope borrowing the buffer, so a
/// request can't outlive the call that created it. Every operation here runs
/// to completion before returning and async mode hands back completed
/// requests.
pub struct MpiContext {
    world: SimpleCommunicator,
    // Finalizes MPI on drop, must outlive `world`.
    _universe: Universe,
}

/// Initialize MPI and wrap the world communicator.
pub fn init_mpi() -> Result<MpiContext> {
    let universe = mpi::initialize().ok_or(Error::InitFailure)?;
    let world = universe.world();
    info!("(rank = {}) MPI initialized with {} ranks", world.rank(), world.size());
    Ok(MpiContext {
        world,
        _universe: universe,
    })
}

/// Timer based on MPI_Wtime.
#[derive(Debug, Default)]
pub struct WtimeTimer {
    start: Option<f64>,
    stop: Option<f64>,
}

impl DeviceTimer for WtimeTimer {
    fn start(&mut self) {
        self.start = Some(mpi::time());
        self.stop = None;
    }

    fn stop(&mut self) {
        self.stop = Some(mpi::time());
    }

    fn elapsed_ms(&self) -> f64 {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => (stop - start) * 1.0e3,
            _ => 0.0,
        }
    }
}

impl MpiContext {
    fn check_rank(&self, rank: usize) -> Result<i32> {
        let size = self.size();
        if rank >= size {
            Err(Error::InvalidRank { rank, size })
        } else {
            Ok(rank as i32)
        }
    }
}

fn finished(mode: ExecMode) -> Option<Request> {
    match mode {
        ExecMode::Blocking => None,
        ExecMode::Async => Some(Request::completed()),
    }
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        Err(Error::BufferMismatch { expected, actual })
    } else {
        Ok(())
    }
}

/// Compare the element count reported by MPI with the receive buffer.
fn check_received(expected: usize, count: mpi::Count) -> Result<()> {
    let actual = usize::try_from(count)
        .map_err(|_| Error::InternalError(format!("undefined receive count {}", count)))?;
    check_len(expected, actual)
}

impl Communicator for MpiContext {
    type Request = Request;
    type Timer = WtimeTimer;

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn barrier(&self) -> Result<()> {
        self.world.barrier();
        Ok(())
    }

    fn broadcast<T: Element>(&self, buf: &mut [T], root: usize, mode: ExecMode) -> Result<Option<Request>> {
        let root = self.check_rank(root)?;
        self.world.process_at_rank(root).broadcast_into(buf);
        Ok(finished(mode))
    }

    fn all_reduce<T: Element>(&self, buf: &mut [T], op: ReduceOp, mode: ExecMode) -> Result<Option<Request>> {
        let op = match op {
            ReduceOp::Sum => SystemOperation::sum(),
            ReduceOp::Max => SystemOperation::max(),
            ReduceOp::Min => SystemOperation::min(),
        };
        // rsmpi has no MPI_IN_PLACE variant; reduce into scratch and copy back.
        // The copy lands inside the timed region and adds one buffer pass per
        // call, so MPI all-reduce figures read slightly low for large payloads.
        let mut result = vec![T::default(); buf.len()];
        self.world.all_reduce_into(&buf[..], &mut result[..], op);
        buf.copy_from_slice(&result);
        Ok(finished(mode))
    }

    fn all_gather<T: Element>(&self, input: &[T], output: &mut [T], mode: ExecMode) -> Result<Option<Request>> {
        check_len(input.len() * self.size(), output.len())?;
        self.world.all_gather_into(input, output);
        Ok(finished(mode))
    }

    fn all_to_all<T: Element>(&self, input: &[T], output: &mut [T], mode: ExecMode) -> Result<Option<Request>> {
        check_len(input.len(), output.len())?;
        self.world.all_to_all_into(input, output);
        Ok(finished(mode))
    }

    fn send<T: Element>(&self, data: &[T], dest: usize) -> Result<()> {
        let dest = self.check_rank(dest)?;
        self.world.process_at_rank(dest).send(data);
        Ok(())
    }

    fn recv<T: Element>(&self, data: &mut [T], source: usize) -> Result<()> {
        let source = self.check_rank(source)?;
        let status = self.world.process_at_rank(source).receive_into(data);
        check_received(data.len(), status.count(T::equivalent_datatype()))
    }

    fn isend<T: Element>(&self, data: &[T], dest: usize) -> Result<Request> {
        self.send(data, dest)?;
        Ok(Request::completed())
    }

    fn irecv<T: Element>(&self, data: &mut [T], source: usize) -> Result<Request> {
        self.recv(data, source)?;
        Ok(Request::completed())
    }

    fn wait(&self, _requests: Vec<Request>) -> Result<()> {
        Ok(())
    }

    fn timer(&self) -> WtimeTimer {
        WtimeTimer::default()
    }
}
