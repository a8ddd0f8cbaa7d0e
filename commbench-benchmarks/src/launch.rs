//! Starting the ranks of a run on the selected transport.
use crate::{BenchError, Result, TransportKind};
use commbench::communicator::Communicator;
use log::{error, info};
use std::thread;

/// Work executed by every rank of a run.
pub trait RankTask: Sync {
    fn run<C: Communicator>(&self, comm: &C) -> Result<()>;
}

/// Run `task` on every rank of `transport`. For the local transport this
/// spawns `local_ranks` threads and returns the first rank's error, if any.
pub fn launch<T: RankTask>(transport: TransportKind, local_ranks: usize, task: &T) -> Result<()> {
    match transport {
        TransportKind::Local => launch_local(local_ranks, task),
        TransportKind::Mpi => launch_mpi(task),
    }
}

fn launch_local<T: RankTask>(ranks: usize, task: &T) -> Result<()> {
    let group = commbench::local_group(ranks)?;
    info!("starting {} local ranks", ranks);
    let results: Vec<Result<()>> = thread::scope(|s| {
        let handles: Vec<_> = group
            .into_iter()
            .map(|ctx| s.spawn(move || task.run(&ctx)))
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, h)| {
                h.join().unwrap_or_else(|_| {
                    Err(commbench::Error::InternalError(format!("rank {} panicked", rank)).into())
                })
            })
            .collect()
    });

    let mut first = None;
    for (rank, result) in results.into_iter().enumerate() {
        if let Err(err) = result {
            error!("(rank = {}) {}", rank, err);
            first.get_or_insert(err);
        }
    }
    first.map_or(Ok(()), Err)
}

#[cfg(feature = "rsmpi")]
fn launch_mpi<T: RankTask>(task: &T) -> Result<()> {
    let ctx = commbench::init_mpi()?;
    task.run(&ctx)
}

#[cfg(not(feature = "rsmpi"))]
fn launch_mpi<T: RankTask>(_task: &T) -> Result<()> {
    Err(BenchError::Configuration(
        "the mpi transport requires building with the rsmpi feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountRanks(AtomicUsize);

    impl RankTask for CountRanks {
        fn run<C: Communicator>(&self, comm: &C) -> Result<()> {
            comm.barrier()?;
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailOnRankOne;

    impl RankTask for FailOnRankOne {
        fn run<C: Communicator>(&self, comm: &C) -> Result<()> {
            if comm.rank() == 1 {
                return Err(BenchError::Measurement("rank one".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn every_local_rank_runs() {
        let task = CountRanks(AtomicUsize::new(0));
        launch(TransportKind::Local, 3, &task).unwrap();
        assert_eq!(task.0.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn rank_error_is_returned() {
        assert!(matches!(
            launch(TransportKind::Local, 2, &FailOnRankOne),
            Err(BenchError::Measurement(_))
        ));
    }

    #[test]
    fn zero_local_ranks_is_a_transport_error() {
        assert!(matches!(
            launch(TransportKind::Local, 0, &FailOnRankOne),
            Err(BenchError::Transport(_))
        ));
    }
}
