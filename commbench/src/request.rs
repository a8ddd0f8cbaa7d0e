//! Request object.
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Request status value.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestStatus {
    /// Request is in progress.
    InProgress,

    /// Request has completed.
    Complete,

    /// Error occurred.
    Error(String),
}

/// Completion state shared between the issuing rank and the rank that
/// finishes the operation.
#[derive(Debug)]
pub(crate) struct Completion {
    status: Mutex<RequestStatus>,
    cond: Condvar,
}

impl Completion {
    fn new(status: RequestStatus) -> Completion {
        Completion {
            status: Mutex::new(status),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RequestStatus> {
        // The status is a plain value, a panic elsewhere can't leave it torn.
        self.status.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Set the final status. Only the first transition out of `InProgress`
    /// sticks.
    pub(crate) fn finish(&self, status: RequestStatus) {
        let mut current = self.lock();
        if *current == RequestStatus::InProgress {
            *current = status;
            self.cond.notify_all();
        }
    }
}

/// Handle to an operation issued in async mode.
#[derive(Clone, Debug)]
pub struct Request {
    completion: Arc<Completion>,
}

impl Request {
    /// Request for work that finished before the call returned.
    pub fn completed() -> Request {
        Request {
            completion: Arc::new(Completion::new(RequestStatus::Complete)),
        }
    }

    /// Create a request along with the handle used to complete it.
    pub(crate) fn pending() -> (Request, Arc<Completion>) {
        let completion = Arc::new(Completion::new(RequestStatus::InProgress));
        (
            Request {
                completion: Arc::clone(&completion),
            },
            completion,
        )
    }

    /// Get the status of this request without blocking.
    pub fn status(&self) -> RequestStatus {
        self.completion.lock().clone()
    }

    /// Block until the request leaves the in-progress state.
    pub fn wait(&self) -> RequestStatus {
        let mut status = self.completion.lock();
        while *status == RequestStatus::InProgress {
            status = self
                .completion
                .cond
                .wait(status)
                .unwrap_or_else(|err| err.into_inner());
        }
        status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_request_completes_from_other_thread() {
        let (req, completion) = Request::pending();
        assert_eq!(req.status(), RequestStatus::InProgress);
        let handle = std::thread::spawn(move || completion.finish(RequestStatus::Complete));
        assert_eq!(req.wait(), RequestStatus::Complete);
        handle.join().unwrap();
    }

    #[test]
    fn first_final_status_wins() {
        let (req, completion) = Request::pending();
        completion.finish(RequestStatus::Complete);
        completion.finish(RequestStatus::Error("late".to_string()));
        assert_eq!(req.wait(), RequestStatus::Complete);
        assert_eq!(Request::completed().status(), RequestStatus::Complete);
    }
}
