//! Worker threads that run session handlers.

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use mio::{Token, Waker};
use tracing::{debug, error, warn};

use summit_protocol::{Reply, RequestBody, SessionHash};

use crate::session::SharedSession;

use super::DISPATCH_TARGET;

/// One request bound to the session that must serve it.
#[derive(Debug)]
pub(crate) struct Job {
    token: Token,
    hash: SessionHash,
    session: SharedSession,
    body: RequestBody,
}

/// Reply produced for the connection identified by `token`.
#[derive(Debug)]
pub(crate) struct Completion {
    pub(crate) token: Token,
    pub(crate) reply: Reply,
}

impl Job {
    pub(crate) fn new(
        token: Token,
        hash: SessionHash,
        session: SharedSession,
        body: RequestBody,
    ) -> Self {
        Self {
            token,
            hash,
            session,
            body,
        }
    }

    /// Locks the session and serves the request.
    ///
    /// A panicking handler is reported to the client as an error reply; the
    /// session stays usable.
    pub(crate) fn run(self) -> Completion {
        let Self {
            token,
            hash,
            session,
            body,
        } = self;
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut handler = session.lock().unwrap_or_else(PoisonError::into_inner);
            handler.respond(body)
        }));
        let reply = outcome.unwrap_or_else(|_| {
            error!(
                target: DISPATCH_TARGET,
                %hash,
                "session handler panicked"
            );
            Reply::error(format!("internal error while serving session {hash}"))
        });
        Completion { token, reply }
    }
}

/// Fixed set of threads that run [`Job`]s.
///
/// With zero workers, jobs run on the submitting thread.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    jobs: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn new(
        size: usize,
        completions: &Sender<Completion>,
        waker: &Arc<Waker>,
    ) -> io::Result<Self> {
        if size == 0 {
            return Ok(Self {
                jobs: None,
                workers: Vec::new(),
            });
        }
        let (jobs, queue) = mpsc::channel::<Job>();
        let queue = Arc::new(Mutex::new(queue));
        let workers = (0..size)
            .map(|index| {
                let queue = Arc::clone(&queue);
                let completions = completions.clone();
                let waker = Arc::clone(waker);
                thread::Builder::new()
                    .name(format!("summitd-worker-{index}"))
                    .spawn(move || work(&queue, &completions, &waker))
            })
            .collect::<io::Result<Vec<_>>>()?;
        debug!(
            target: DISPATCH_TARGET,
            workers = size,
            "worker pool started"
        );
        Ok(Self {
            jobs: Some(jobs),
            workers,
        })
    }

    /// Queues a job, or runs it immediately when the pool has no workers.
    ///
    /// Returns the completion when the job ran inline.
    pub(crate) fn submit(&self, job: Job) -> Option<Completion> {
        let Some(jobs) = &self.jobs else {
            return Some(job.run());
        };
        match jobs.send(job) {
            Ok(()) => None,
            Err(mpsc::SendError(job)) => {
                warn!(
                    target: DISPATCH_TARGET,
                    "worker pool unavailable; serving request inline"
                );
                Some(job.run())
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.jobs.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!(target: DISPATCH_TARGET, "worker thread panicked");
            }
        }
    }
}

fn work(queue: &Mutex<Receiver<Job>>, completions: &Sender<Completion>, waker: &Waker) {
    loop {
        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv();
        let Ok(job) = next else {
            return;
        };
        if completions.send(job.run()).is_err() {
            return;
        }
        if let Err(error) = waker.wake() {
            warn!(
                target: DISPATCH_TARGET,
                error = %error,
                "failed to wake event loop"
            );
        }
    }
}
