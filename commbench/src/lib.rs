//! commbench transport library.
//!
//! Defines the capability interface the benchmark engine measures against
//! ([`communicator::Communicator`]) along with the concrete transports that
//! implement it: an in-process group of threads ([`LocalContext`]) and, with
//! the `rsmpi` feature, an MPI world ([`MpiContext`]).
use thiserror::Error as ThisError;

pub mod communicator;
mod context;
pub use context::{local_group, LocalContext};
pub mod datatype;
pub use datatype::{Element, ReduceOp};
mod request;
pub use request::{Request, RequestStatus};
pub mod timer;
#[cfg(feature = "rsmpi")]
mod rsmpi;
#[cfg(feature = "rsmpi")]
pub use rsmpi::{init_mpi, MpiContext, WtimeTimer};

/// Whether a call should block or return a pending request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExecMode {
    /// The call returns once the operation has completed locally.
    Blocking,

    /// The call may return a request that must be passed to `wait`.
    Async,
}

impl ExecMode {
    pub fn from_async_flag(async_op: bool) -> ExecMode {
        if async_op {
            ExecMode::Async
        } else {
            ExecMode::Blocking
        }
    }
}

#[derive(Debug, ThisError)]
pub enum Error {
    /// Initialization failure.
    #[error("failed to initialize the transport")]
    InitFailure,

    /// A rank outside of the group was addressed.
    #[error("rank {rank} is out of range for a group of {size}")]
    InvalidRank { rank: usize, size: usize },

    /// Buffer lengths don't match the shape the operation requires.
    #[error("buffer size mismatch: expected {expected} elements, got {actual}")]
    BufferMismatch { expected: usize, actual: usize },

    /// A peer contributed a buffer of a different element type.
    #[error("element type mismatch with rank {0}")]
    TypeMismatch(usize),

    /// An async request finished with an error.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The channel to a peer was closed.
    #[error("rank {0} disconnected")]
    Disconnected(usize),

    /// Internal error occurred.
    #[error("internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
