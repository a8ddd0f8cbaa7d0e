//! Context handle for an in-process group of ranks.
//!
//! Every rank lives on its own thread and owns one [`LocalContext`]. Ranks
//! rendezvous on a shared barrier and exchange contributions through a slot
//! table; point-to-point messages travel over per-rank channels.
use crate::{
    communicator::Communicator,
    datatype::{reduce_into, Element, ReduceOp},
    request::{Completion, Request, RequestStatus},
    timer::HostTimer,
    Error, ExecMode, Result,
};
use log::debug;
use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Barrier, Mutex, MutexGuard};

type Contribution = Arc<dyn Any + Send + Sync>;

/// State shared by every rank of the group.
struct Shared {
    size: usize,
    barrier: Barrier,
    slots: Mutex<Vec<Option<Contribution>>>,
}

/// Point-to-point message in flight.
struct Envelope {
    source: usize,
    data: Box<dyn Any + Send>,
    completion: Option<Arc<Completion>>,
}

impl Drop for Envelope {
    fn drop(&mut self) {
        // No-op if the receiver already completed it.
        if let Some(completion) = self.completion.take() {
            completion.finish(RequestStatus::Error(format!(
                "message from rank {} was never received",
                self.source
            )));
        }
    }
}

/// Create a group of `size` ranks. Each context should be moved onto its own
/// thread.
pub fn local_group(size: usize) -> Result<Vec<LocalContext>> {
    if size == 0 {
        return Err(Error::InitFailure);
    }
    let shared = Arc::new(Shared {
        size,
        barrier: Barrier::new(size),
        slots: Mutex::new(vec![None; size]),
    });
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| mpsc::channel()).unzip();
    debug!("created local group of {} ranks", size);
    Ok(receivers
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| LocalContext {
            rank,
            shared: Arc::clone(&shared),
            peers: senders.clone(),
            inbox,
            unexpected: RefCell::new(VecDeque::new()),
        })
        .collect())
}

/// One rank of an in-process group.
///
/// Collectives complete before returning. `send` blocks and `isend`
/// completes once the receiver has consumed the message; `irecv` completes
/// on issue.
pub struct LocalContext {
    rank: usize,
    shared: Arc<Shared>,
    peers: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    /// Messages that arrived from a source nobody asked for yet.
    unexpected: RefCell<VecDeque<Envelope>>,
}

impl LocalContext {
    fn slots(&self) -> Result<MutexGuard<'_, Vec<Option<Contribution>>>> {
        self.shared
            .slots
            .lock()
            .map_err(|_| Error::InternalError("rendezvous table poisoned".to_string()))
    }

    fn check_rank(&self, rank: usize) -> Result<()> {
        if rank >= self.shared.size {
            Err(Error::InvalidRank {
                rank,
                size: self.shared.size,
            })
        } else {
            Ok(())
        }
    }

    /// Publish `data` and return every rank's contribution in rank order.
    fn exchange<T: Element>(&self, data: Vec<T>) -> Result<Vec<Contribution>> {
        self.slots()?[self.rank] = Some(Arc::new(data));
        self.shared.barrier.wait();
        let contributions = self.slots().and_then(|slots| {
            slots
                .iter()
                .enumerate()
                .map(|(i, slot)| {
                    slot.clone().ok_or_else(|| {
                        Error::InternalError(format!("rank {} did not contribute", i))
                    })
                })
                .collect::<Result<Vec<_>>>()
        });
        // Everyone must be done reading before anyone publishes again.
        self.shared.barrier.wait();
        self.slots()?[self.rank] = None;
        contributions
    }

    fn take_from(&self, source: usize) -> Result<Envelope> {
        let mut unexpected = self.unexpected.borrow_mut();
        if let Some(pos) = unexpected.iter().position(|env| env.source == source) {
            if let Some(env) = unexpected.remove(pos) {
                return Ok(env);
            }
        }
        loop {
            let env = self.inbox.recv().map_err(|_| Error::Disconnected(source))?;
            if env.source == source {
                return Ok(env);
            }
            unexpected.push_back(env);
        }
    }

    fn post<T: Element>(&self, data: &[T], dest: usize, completion: Arc<Completion>) -> Result<()> {
        self.check_rank(dest)?;
        let env = Envelope {
            source: self.rank,
            data: Box::new(data.to_vec()),
            completion: Some(completion),
        };
        self.peers[dest]
            .send(env)
            .map_err(|_| Error::Disconnected(dest))
    }
}

fn view<T: Element>(contribution: &Contribution, rank: usize) -> Result<&[T]> {
    contribution
        .downcast_ref::<Vec<T>>()
        .map(|v| &v[..])
        .ok_or(Error::TypeMismatch(rank))
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        Err(Error::BufferMismatch { expected, actual })
    } else {
        Ok(())
    }
}

fn finished(mode: ExecMode) -> Option<Request> {
    match mode {
        ExecMode::Blocking => None,
        ExecMode::Async => Some(Request::completed()),
    }
}

impl Communicator for LocalContext {
    type Request = Request;
    type Timer = HostTimer;

    fn size(&self) -> usize {
        self.shared.size
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn barrier(&self) -> Result<()> {
        self.shared.barrier.wait();
        Ok(())
    }

    fn broadcast<T: Element>(&self, buf: &mut [T], root: usize, mode: ExecMode) -> Result<Option<Request>> {
        self.check_rank(root)?;
        let data = if self.rank == root { buf.to_vec() } else { vec![] };
        let contributions = self.exchange(data)?;
        if self.rank != root {
            let src = view::<T>(&contributions[root], root)?;
            check_len(buf.len(), src.len())?;
            buf.copy_from_slice(src);
        }
        Ok(finished(mode))
    }

    fn all_reduce<T: Element>(&self, buf: &mut [T], op: ReduceOp, mode: ExecMode) -> Result<Option<Request>> {
        let contributions = self.exchange(buf.to_vec())?;
        for (i, contribution) in contributions.iter().enumerate() {
            let src = view::<T>(contribution, i)?;
            check_len(buf.len(), src.len())?;
            if i == 0 {
                buf.copy_from_slice(src);
            } else {
                reduce_into(buf, src, op);
            }
        }
        Ok(finished(mode))
    }

    fn all_gather<T: Element>(&self, input: &[T], output: &mut [T], mode: ExecMode) -> Result<Option<Request>> {
        check_len(input.len() * self.shared.size, output.len())?;
        let contributions = self.exchange(input.to_vec())?;
        let shard = input.len();
        for (i, contribution) in contributions.iter().enumerate() {
            let src = view::<T>(contribution, i)?;
            check_len(shard, src.len())?;
            output[i * shard..(i + 1) * shard].copy_from_slice(src);
        }
        Ok(finished(mode))
    }

    fn all_to_all<T: Element>(&self, input: &[T], output: &mut [T], mode: ExecMode) -> Result<Option<Request>> {
        let size = self.shared.size;
        check_len(input.len(), output.len())?;
        if input.len() % size != 0 {
            return Err(Error::BufferMismatch {
                expected: input.len() - input.len() % size,
                actual: input.len(),
            });
        }
        let shard = input.len() / size;
        let contributions = self.exchange(input.to_vec())?;
        for (i, contribution) in contributions.iter().enumerate() {
            let src = view::<T>(contribution, i)?;
            check_len(input.len(), src.len())?;
            output[i * shard..(i + 1) * shard]
                .copy_from_slice(&src[self.rank * shard..(self.rank + 1) * shard]);
        }
        Ok(finished(mode))
    }

    fn send<T: Element>(&self, data: &[T], dest: usize) -> Result<()> {
        // Returns once the receiver has copied the message out, so at most
        // one payload per sender is ever in flight.
        let req = self.isend(data, dest)?;
        self.wait(vec![req])
    }

    fn recv<T: Element>(&self, data: &mut [T], source: usize) -> Result<()> {
        self.check_rank(source)?;
        let mut env = self.take_from(source)?;
        let src = env
            .data
            .downcast_ref::<Vec<T>>()
            .ok_or(Error::TypeMismatch(source))?;
        check_len(data.len(), src.len())?;
        data.copy_from_slice(src);
        if let Some(completion) = env.completion.take() {
            completion.finish(RequestStatus::Complete);
        }
        Ok(())
    }

    fn isend<T: Element>(&self, data: &[T], dest: usize) -> Result<Request> {
        let (req, completion) = Request::pending();
        self.post(data, dest, completion)?;
        Ok(req)
    }

    fn irecv<T: Element>(&self, data: &mut [T], source: usize) -> Result<Request> {
        self.recv(data, source)?;
        Ok(Request::completed())
    }

    fn wait(&self, requests: Vec<Request>) -> Result<()> {
        for req in requests {
            if let RequestStatus::Error(msg) = req.wait() {
                return Err(Error::RequestFailed(msg));
            }
        }
        Ok(())
    }

    fn timer(&self) -> HostTimer {
        HostTimer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Run `f` on every rank of a fresh group and collect the results in
    /// rank order.
    fn run_group<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(LocalContext) -> R + Sync,
    {
        let group = local_group(size).unwrap();
        thread::scope(|s| {
            let handles: Vec<_> = group
                .into_iter()
                .map(|ctx| {
                    let f = &f;
                    s.spawn(move || f(ctx))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn empty_group_is_rejected() {
        assert!(matches!(local_group(0), Err(Error::InitFailure)));
    }

    #[test]
    fn all_reduce_sums_every_rank() {
        let results = run_group(4, |ctx| {
            let mut buf = vec![ctx.rank() as f32 + 1.0; 3];
            ctx.all_reduce(&mut buf, ReduceOp::Sum, ExecMode::Blocking).unwrap();
            buf
        });
        for buf in results {
            assert_eq!(buf, vec![10.0; 3]);
        }
    }

    #[test]
    fn all_gather_concatenates_in_rank_order() {
        let results = run_group(3, |ctx| {
            let input = vec![ctx.rank() as i32; 2];
            let mut output = vec![0i32; 6];
            ctx.all_gather(&input, &mut output, ExecMode::Blocking).unwrap();
            output
        });
        for output in results {
            assert_eq!(output, vec![0, 0, 1, 1, 2, 2]);
        }
    }

    #[test]
    fn all_to_all_orders_shards_by_source() {
        let results = run_group(3, |ctx| {
            // Shard j carries 10 * rank + j.
            let input: Vec<i64> = (0..3).map(|j| 10 * ctx.rank() as i64 + j).collect();
            let mut output = vec![0i64; 3];
            ctx.all_to_all(&input, &mut output, ExecMode::Blocking).unwrap();
            (ctx.rank() as i64, output)
        });
        for (rank, output) in results {
            assert_eq!(output, vec![rank, 10 + rank, 20 + rank]);
        }
    }

    #[test]
    fn broadcast_copies_root_buffer() {
        let results = run_group(4, |ctx| {
            let mut buf = if ctx.rank() == 2 { vec![7u8, 8, 9] } else { vec![0u8; 3] };
            let req = ctx.broadcast(&mut buf, 2, ExecMode::Async).unwrap();
            ctx.wait(req.into_iter().collect()).unwrap();
            buf
        });
        for buf in results {
            assert_eq!(buf, vec![7, 8, 9]);
        }
    }

    #[test]
    fn isend_completes_after_receive() {
        let results = run_group(2, |ctx| {
            let mut buf = vec![0.0f64; 4];
            if ctx.rank() == 0 {
                let reqs = (0..3)
                    .map(|i| ctx.isend(&[i as f64; 4], 1).unwrap())
                    .collect();
                ctx.wait(reqs).unwrap();
            } else {
                for _ in 0..3 {
                    let req = ctx.irecv(&mut buf, 0).unwrap();
                    ctx.wait(vec![req]).unwrap();
                }
            }
            buf
        });
        assert_eq!(results[1], vec![2.0; 4]);
    }

    #[test]
    fn blocking_send_waits_for_receiver() {
        let results = run_group(2, |ctx| {
            if ctx.rank() == 0 {
                let start = Instant::now();
                for _ in 0..3 {
                    ctx.send(&[1u8; 1 << 20], 1).unwrap();
                }
                start.elapsed()
            } else {
                thread::sleep(Duration::from_millis(100));
                let mut buf = vec![0u8; 1 << 20];
                for _ in 0..3 {
                    ctx.recv(&mut buf, 0).unwrap();
                }
                Duration::ZERO
            }
        });
        assert!(results[0] >= Duration::from_millis(100));
    }

    #[test]
    fn recv_matches_source_out_of_order() {
        let results = run_group(3, |ctx| {
            let mut buf = [0i32; 1];
            match ctx.rank() {
                0 => {
                    ctx.recv(&mut buf, 2).unwrap();
                    let first = buf[0];
                    ctx.recv(&mut buf, 1).unwrap();
                    vec![first, buf[0]]
                }
                r => {
                    ctx.send(&[r as i32 * 100], 0).unwrap();
                    vec![]
                }
            }
        });
        assert_eq!(results[0], vec![200, 100]);
    }

    #[test]
    fn mismatched_shapes_are_reported() {
        let results = run_group(2, |ctx| {
            let input = [1u8; 2];
            let mut output = [0u8; 3];
            ctx.all_gather(&input, &mut output, ExecMode::Blocking)
        });
        for result in results {
            assert!(matches!(result, Err(Error::BufferMismatch { expected: 4, actual: 3 })));
        }
    }

    #[test]
    fn invalid_destination_is_rejected() {
        let ctx = local_group(1).unwrap().pop().unwrap();
        assert!(matches!(
            ctx.send(&[1u8], 3),
            Err(Error::InvalidRank { rank: 3, size: 1 })
        ));
    }
}
