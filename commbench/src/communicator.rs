//! Code abstracting out the collective transport.
use crate::datatype::{Element, ReduceOp};
use crate::timer::DeviceTimer;
use crate::{ExecMode, Result};

/// Trait implementing collective and p2p communication on top of some
/// lower-level library.
///
/// Calls taking an [`ExecMode`] return `Ok(None)` once they have completed,
/// or `Ok(Some(request))` when the work is still outstanding. Outstanding
/// requests must be handed to [`Communicator::wait`] before the buffers they
/// reference are reused.
pub trait Communicator {
    type Request;
    type Timer: DeviceTimer;

    /// Return the number of processes in this communicator.
    fn size(&self) -> usize;

    /// Return the current rank of the process.
    fn rank(&self) -> usize;

    /// Perform a barrier on the processes.
    fn barrier(&self) -> Result<()>;

    /// Broadcast `buf` from `root` into `buf` on every other rank.
    fn broadcast<T: Element>(
        &self,
        buf: &mut [T],
        root: usize,
        mode: ExecMode,
    ) -> Result<Option<Self::Request>>;

    /// Reduce `buf` across all ranks, leaving the result in `buf`.
    fn all_reduce<T: Element>(
        &self,
        buf: &mut [T],
        op: ReduceOp,
        mode: ExecMode,
    ) -> Result<Option<Self::Request>>;

    /// Gather every rank's `input` into `output` in rank order.
    fn all_gather<T: Element>(
        &self,
        input: &[T],
        output: &mut [T],
        mode: ExecMode,
    ) -> Result<Option<Self::Request>>;

    /// Send shard `i` of `input` to rank `i`; shard `j` of `output` holds the
    /// data sent by rank `j`.
    fn all_to_all<T: Element>(
        &self,
        input: &[T],
        output: &mut [T],
        mode: ExecMode,
    ) -> Result<Option<Self::Request>>;

    /// Blocking send of data to the destination.
    fn send<T: Element>(&self, data: &[T], dest: usize) -> Result<()>;

    /// Blocking receive of data from the source.
    fn recv<T: Element>(&self, data: &mut [T], source: usize) -> Result<()>;

    /// Do a non-blocking send of data to the destination.
    fn isend<T: Element>(&self, data: &[T], dest: usize) -> Result<Self::Request>;

    /// Do a non-blocking recv of data from the source.
    fn irecv<T: Element>(&self, data: &mut [T], source: usize) -> Result<Self::Request>;

    /// Wait for all requests in list to complete.
    fn wait(&self, requests: Vec<Self::Request>) -> Result<()>;

    /// Create a timer scoped to the communication device.
    fn timer(&self) -> Self::Timer;
}
