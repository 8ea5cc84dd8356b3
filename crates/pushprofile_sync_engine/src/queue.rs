//! Priority-ordered, single-worker operation queue.
//!
//! One dedicated thread runs every job to completion, network round trip
//! included, before it picks the next one. Among queued jobs the highest
//! priority runs first and equal priorities run in submission order. A
//! running job is never interrupted.
//!
//! Each submission gets a [`Completion`] that resolves exactly once: with
//! the job's result, or with [`SyncError::Cancelled`] if the job is dropped
//! unrun (queue shut down) or panics.

use crate::error::{SyncError, SyncResult};
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, info_span};

/// Scheduling priority of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum OperationPriority {
    /// Background sync and reads.
    #[default]
    Normal,
    /// Personalize and depersonalize.
    VeryHigh,
}

/// Counters describing queue activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Jobs accepted by the queue.
    pub submitted: u64,
    /// Jobs that returned `Ok`.
    pub completed: u64,
    /// Jobs that returned an error or panicked.
    pub failed: u64,
    /// Jobs dropped unrun at shutdown.
    pub cancelled: u64,
}

/// The eventual result of a submitted operation.
///
/// Await it from async code or call [`Completion::wait`] from a plain thread.
pub struct Completion<T> {
    state: CompletionState<T>,
}

enum CompletionState<T> {
    Pending(oneshot::Receiver<SyncResult<T>>),
    Ready(Option<SyncResult<T>>),
}

impl<T> Completion<T> {
    /// A completion that is already resolved.
    pub fn ready(result: SyncResult<T>) -> Self {
        Self {
            state: CompletionState::Ready(Some(result)),
        }
    }

    fn pending(receiver: oneshot::Receiver<SyncResult<T>>) -> Self {
        Self {
            state: CompletionState::Pending(receiver),
        }
    }

    /// Blocks the current thread until the result is available.
    ///
    /// Must not be called from inside an async runtime; await instead.
    pub fn wait(self) -> SyncResult<T> {
        match self.state {
            CompletionState::Pending(receiver) => receiver
                .blocking_recv()
                .unwrap_or_else(|_| Err(SyncError::Cancelled)),
            CompletionState::Ready(result) => result.unwrap_or(Err(SyncError::Cancelled)),
        }
    }
}

impl<T> Unpin for Completion<T> {}

impl<T> Future for Completion<T> {
    type Output = SyncResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            CompletionState::Pending(receiver) => Pin::new(receiver)
                .poll(cx)
                .map(|received| received.unwrap_or_else(|_| Err(SyncError::Cancelled))),
            CompletionState::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(SyncError::Cancelled)))
            }
        }
    }
}

type Task<C> = Box<dyn FnOnce(&C) -> bool + Send>;

struct Job<C> {
    priority: OperationPriority,
    seq: u64,
    name: &'static str,
    task: Task<C>,
}

impl<C> PartialEq for Job<C> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<C> Eq for Job<C> {}

impl<C> PartialOrd for Job<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C> Ord for Job<C> {
    // Max-heap: higher priority first, then lower sequence number first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct State<C> {
    pending: BinaryHeap<Job<C>>,
    running: Option<&'static str>,
    next_seq: u64,
    closed: bool,
    stats: QueueStats,
}

struct Shared<C> {
    state: Mutex<State<C>>,
    available: Condvar,
    idle: Condvar,
}

/// A serialized execution context over a shared `C`.
pub struct OperationQueue<C: Send + Sync + 'static> {
    shared: Arc<Shared<C>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Send + Sync + 'static> OperationQueue<C> {
    /// Starts the worker thread.
    pub fn start(context: Arc<C>, thread_name: &str) -> SyncResult<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                pending: BinaryHeap::new(),
                running: None,
                next_seq: 0,
                closed: false,
                stats: QueueStats::default(),
            }),
            available: Condvar::new(),
            idle: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || run_worker(&*worker_shared, &*context))
            .map_err(|e| SyncError::UnknownError(format!("failed to start queue thread: {e}")))?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Queues `job` and returns its completion.
    pub fn submit<T, F>(&self, name: &'static str, priority: OperationPriority, job: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(&C) -> SyncResult<T> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let task: Task<C> = Box::new(move |context| {
            let result = job(context);
            let ok = result.is_ok();
            // The caller may have dropped its completion.
            let _ = sender.send(result);
            ok
        });

        let mut state = self.shared.state.lock();
        if state.closed {
            return Completion::ready(Err(SyncError::Cancelled));
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.stats.submitted += 1;
        state.pending.push(Job {
            priority,
            seq,
            name,
            task,
        });
        debug!(operation = name, seq, ?priority, "operation queued");
        drop(state);

        self.shared.available.notify_one();
        Completion::pending(receiver)
    }

    /// Number of queued jobs that have not started.
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Name of the running job, if any.
    pub fn running(&self) -> Option<&'static str> {
        self.shared.state.lock().running
    }

    /// A snapshot of the counters.
    pub fn stats(&self) -> QueueStats {
        self.shared.state.lock().stats.clone()
    }

    /// Waits until nothing is queued or running.
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.pending.is_empty() || state.running.is_some() {
            if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.pending.is_empty() && state.running.is_none();
            }
        }
        true
    }

    /// Stops accepting jobs and cancels every queued one.
    ///
    /// A running job finishes normally. Does not wait for the worker.
    pub fn close(&self) {
        let dropped = {
            let mut state = self.shared.state.lock();
            state.closed = true;
            let dropped: Vec<Job<C>> = state.pending.drain().collect();
            state.stats.cancelled += dropped.len() as u64;
            dropped
        };
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "cancelled queued operations");
        }
        // Dropping the tasks drops their senders.
        drop(dropped);
        self.shared.available.notify_all();
        self.shared.idle.notify_all();
    }

    /// Closes the queue and joins the worker thread.
    pub fn shutdown(&self) {
        self.close();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                error!("queue worker terminated abnormally");
            }
        }
    }
}

impl<C: Send + Sync + 'static> Drop for OperationQueue<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker<C>(shared: &Shared<C>, context: &C) {
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if let Some(job) = state.pending.pop() {
                    state.running = Some(job.name);
                    break job;
                }
                if state.closed {
                    return;
                }
                shared.available.wait(&mut state);
            }
        };

        let Job {
            name, seq, task, ..
        } = job;
        let ok = {
            let span = info_span!("operation", operation = name, seq);
            let _entered = span.enter();
            debug!("operation started");
            match catch_unwind(AssertUnwindSafe(|| task(context))) {
                Ok(ok) => {
                    debug!(ok, "operation finished");
                    ok
                }
                Err(_) => {
                    error!("operation panicked");
                    false
                }
            }
        };

        let mut state = shared.state.lock();
        state.running = None;
        if ok {
            state.stats.completed += 1;
        } else {
            state.stats.failed += 1;
        }
        if state.pending.is_empty() {
            shared.idle.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn queue() -> OperationQueue<()> {
        OperationQueue::start(Arc::new(()), "test-queue").unwrap()
    }

    /// Occupies the worker until the returned sender fires.
    fn block(queue: &OperationQueue<()>) -> (mpsc::Sender<()>, Completion<()>) {
        let (release, gate) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let completion = queue.submit("blocker", OperationPriority::Normal, move |_| {
            let _ = started_tx.send(());
            let _ = gate.recv();
            Ok(())
        });
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        (release, completion)
    }

    fn record(queue: &OperationQueue<()>, log: &Log, name: &'static str, priority: OperationPriority) -> Completion<()> {
        let log = Arc::clone(log);
        queue.submit(name, priority, move |_| {
            log.lock().push(name);
            Ok(())
        })
    }

    #[test]
    fn returns_job_result() {
        let queue = queue();
        let completion = queue.submit("answer", OperationPriority::Normal, |_| Ok(42));
        assert_eq!(completion.wait().unwrap(), 42);
    }

    #[test]
    fn equal_priority_runs_in_submission_order() {
        let queue = queue();
        let log: Log = Arc::default();
        let (release, blocker) = block(&queue);

        let done: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|name| record(&queue, &log, name, OperationPriority::Normal))
            .collect();
        release.send(()).unwrap();

        blocker.wait().unwrap();
        for completion in done {
            completion.wait().unwrap();
        }
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn very_high_overtakes_queued_normal() {
        let queue = queue();
        let log: Log = Arc::default();
        let (release, _blocker) = block(&queue);

        let a = record(&queue, &log, "update", OperationPriority::Normal);
        let b = record(&queue, &log, "fetch", OperationPriority::Normal);
        let c = record(&queue, &log, "personalize", OperationPriority::VeryHigh);
        assert_eq!(queue.pending_len(), 3);
        assert_eq!(queue.running(), Some("blocker"));
        release.send(()).unwrap();

        a.wait().unwrap();
        b.wait().unwrap();
        c.wait().unwrap();
        assert_eq!(*log.lock(), vec!["personalize", "update", "fetch"]);
    }

    #[test]
    fn close_cancels_queued_jobs() {
        let queue = queue();
        let (release, blocker) = block(&queue);
        let queued = queue.submit("queued", OperationPriority::Normal, |_| Ok(()));

        queue.close();
        release.send(()).unwrap();

        assert!(blocker.wait().is_ok());
        assert!(matches!(queued.wait(), Err(SyncError::Cancelled)));
        assert!(matches!(
            queue.submit("late", OperationPriority::Normal, |_| Ok(())).wait(),
            Err(SyncError::Cancelled)
        ));
        assert_eq!(queue.stats().cancelled, 1);
    }

    #[test]
    fn panicking_job_resolves_cancelled_and_queue_survives() {
        let queue = queue();
        let boom = queue.submit("boom", OperationPriority::Normal, |_| -> SyncResult<()> {
            panic!("boom")
        });
        assert!(matches!(boom.wait(), Err(SyncError::Cancelled)));

        let after = queue.submit("after", OperationPriority::Normal, |_| Ok("still running"));
        assert_eq!(after.wait().unwrap(), "still running");

        assert!(queue.wait_idle(Duration::from_secs(5)));
        let stats = queue.stats();
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn failed_jobs_are_counted() {
        let queue = queue();
        let failed = queue.submit("fails", OperationPriority::Normal, |_| -> SyncResult<()> {
            Err(SyncError::NoRegistration)
        });
        assert!(matches!(failed.wait(), Err(SyncError::NoRegistration)));
        assert!(queue.wait_idle(Duration::from_secs(5)));
        assert_eq!(queue.stats().failed, 1);
    }

    #[test]
    fn jobs_see_the_shared_context() {
        let queue = OperationQueue::start(Arc::new(Mutex::new(0u32)), "ctx-queue").unwrap();
        for _ in 0..10 {
            let _ = queue.submit("inc", OperationPriority::Normal, |counter: &Mutex<u32>| {
                *counter.lock() += 1;
                Ok(())
            });
        }
        let total = queue.submit("read", OperationPriority::Normal, |counter: &Mutex<u32>| Ok(*counter.lock()));
        assert_eq!(total.wait().unwrap(), 10);
    }

    #[test]
    fn caller_and_worker_share_one_context() {
        let counter = Arc::new(Mutex::new(0u32));
        let queue = OperationQueue::start(Arc::clone(&counter), "shared-ctx").unwrap();
        queue
            .submit("set", OperationPriority::Normal, |counter: &Mutex<u32>| {
                *counter.lock() = 7;
                Ok(())
            })
            .wait()
            .unwrap();
        assert_eq!(*counter.lock(), 7);
    }

    #[test]
    fn ready_completion() {
        let completion: Completion<u8> = Completion::ready(Err(SyncError::NoRegistration));
        assert!(matches!(completion.wait(), Err(SyncError::NoRegistration)));
    }

    #[tokio::test]
    async fn completion_is_awaitable() {
        let queue = queue();
        let value = queue.submit("async", OperationPriority::Normal, |_| Ok("done")).await;
        assert_eq!(value.unwrap(), "done");
        assert_eq!(Completion::ready(Ok(7)).await.unwrap(), 7);
    }
}
