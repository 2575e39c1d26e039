//! The stream variable: a bounded buffer plus worker scheduler binding
//! concurrent producers to a single consumer.
//!
//! Producers are [`KStream`] continuations. Dispatching one spawns a task
//! that steps the stream and feeds the output queue; when the queue is full
//! the task parks the remaining tail in the work queue and exits, so
//! backpressure never holds an OS thread hostage. The consumer drains the
//! queue, re-dispatches parked continuations when it runs dry, and detects
//! termination once nothing is buffered, running, or parked.
//!
//! All shared state lives behind one mutex per variable. The doorbell of
//! the single consumer is a stored [`Waker`]: an occupied slot means the
//! consumer asked to be signalled, and posting any event wakes and clears
//! it. The consumer never sleeps while holding the lock.

mod drain;
mod worker;

pub use drain::DrainSVar;

use crate::error::{Result, StreamError};
use crate::kstream::KStream;
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::Waker;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Concurrency of producers: `Serial` runs at most one worker at a time
/// (the consumer still runs concurrently with it), `Parallel` runs as many
/// as the dispatch policy and worker limit allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Serial,
    Parallel,
}

/// Work-queue discipline. `Lifo` resumes the most recently parked
/// continuation first (demand-driven, left-biased); `Fifo` rotates through
/// parked continuations round-robin (fair).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sched {
    Lifo,
    Fifo,
}

/// A merge discipline: the two orthogonal axes combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    pub tag: Tag,
    pub sched: Sched,
}

impl Style {
    pub const SERIAL_LIFO: Style = Style {
        tag: Tag::Serial,
        sched: Sched::Lifo,
    };
    pub const SERIAL_FIFO: Style = Style {
        tag: Tag::Serial,
        sched: Sched::Fifo,
    };
    pub const PARALLEL_LIFO: Style = Style {
        tag: Tag::Parallel,
        sched: Sched::Lifo,
    };
    pub const PARALLEL_FIFO: Style = Style {
        tag: Tag::Parallel,
        sched: Sched::Fifo,
    };
}

/// Consumer-observable lifecycle of a stream variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SVarState {
    /// Branches may still be added or dispatched.
    Open,
    /// All branches are dispatched and no work is parked; live workers may
    /// still be producing.
    Draining,
    /// Fully shut down; workers are cancelled and the buffer is gone.
    Closed,
}

pub(crate) enum Event<T> {
    Value(T),
    Error(StreamError),
    ChildStop(u64),
}

/// Default producer-side buffer bound used by the merge operators.
pub const DEFAULT_OUTPUT_BOUND: usize = 1024;

static NEXT_ACCOUNT: AtomicU64 = AtomicU64::new(0);

/// A handle to a stream variable. Handles are cheap to clone and all refer
/// to the same engine; workers, merge nodes and the consumer each carry
/// their own.
pub struct SVar<T: Send + 'static> {
    style: Style,
    output_bound: usize,
    worker_limit: Option<usize>,
    // identifies this SVar in traces, nothing else
    account: u64,
    inner: Arc<Mutex<SVarInner<T>>>,
}

impl<T: Send + 'static> Clone for SVar<T> {
    fn clone(&self) -> Self {
        Self {
            style: self.style,
            output_bound: self.output_bound,
            worker_limit: self.worker_limit,
            account: self.account,
            inner: self.inner.clone(),
        }
    }
}

struct SVarInner<T: Send + 'static> {
    output: VecDeque<Event<T>>,
    /// `Value` events currently queued; only these count against the bound.
    buffered: usize,
    /// High-watermark of `buffered`, for observability.
    max_buffered: usize,
    work: VecDeque<KStream<T>>,
    active_workers: usize,
    doorbell: Option<Waker>,
    sealed: bool,
    closed: bool,
    workers: FnvHashMap<u64, JoinHandle<()>>,
    next_worker: u64,
    consumer_attached: bool,
}

impl<T: Send + 'static> SVar<T> {
    /// Create a stream variable. `output_bound` is clamped to at least one;
    /// `worker_limit` caps concurrent workers regardless of style.
    ///
    /// Workers are spawned on the ambient tokio runtime, so the variable
    /// must be used from within one.
    pub fn new(style: Style, output_bound: usize, worker_limit: Option<usize>) -> Self {
        let account = NEXT_ACCOUNT.fetch_add(1, Ordering::Relaxed);
        debug!(svar = account, ?style, output_bound, "created stream variable");
        Self {
            style,
            output_bound: output_bound.max(1),
            worker_limit,
            account,
            inner: Arc::new(Mutex::new(SVarInner {
                output: VecDeque::new(),
                buffered: 0,
                max_buffered: 0,
                work: VecDeque::new(),
                active_workers: 0,
                doorbell: None,
                sealed: false,
                closed: false,
                workers: FnvHashMap::default(),
                next_worker: 0,
                consumer_attached: false,
            })),
        }
    }

    pub fn style(&self) -> Style {
        self.style
    }

    pub fn output_bound(&self) -> usize {
        self.output_bound
    }

    pub fn account(&self) -> u64 {
        self.account
    }

    /// Add a producer branch.
    ///
    /// Under a `Fifo` (fair) discipline every branch is dispatched eagerly;
    /// under `Lifo` (demand-driven) only a single seed worker is started
    /// and the rest wait for the consumer to ask. Fails once the variable
    /// is closed.
    pub fn push(&self, stream: KStream<T>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(StreamError::Abandoned);
        }
        // fresh branches join in arrival order under either discipline;
        // only parked continuations re-enter the queue Lifo-style
        inner.work.push_back(stream);
        trace!(svar = self.account, parked = inner.work.len(), "queued branch");
        match self.style.sched {
            Sched::Fifo => while self.dispatch_one(&mut inner) {},
            Sched::Lifo => {
                if inner.active_workers == 0 {
                    self.dispatch_one(&mut inner);
                }
            }
        }
        Ok(())
    }

    /// Declare that no further top-level branches will be pushed, arming
    /// termination detection. Branches contributed by already-running
    /// workers (nested merge nodes flattening into this variable) are still
    /// accepted.
    pub fn seal(&self) {
        let mut inner = self.inner.lock();
        if !inner.sealed {
            inner.sealed = true;
            debug!(svar = self.account, "sealed");
            Self::ring(&mut inner);
        }
    }

    /// Attach the single consumer.
    pub fn drain(&self) -> DrainSVar<T> {
        let mut inner = self.inner.lock();
        if inner.consumer_attached {
            warn!(svar = self.account, "second consumer attached to a stream variable");
        }
        inner.consumer_attached = true;
        drain::DrainSVar::new(self.clone())
    }

    pub fn state(&self) -> SVarState {
        let inner = self.inner.lock();
        if inner.closed {
            SVarState::Closed
        } else if inner.sealed && inner.work.is_empty() {
            SVarState::Draining
        } else {
            SVarState::Open
        }
    }

    /// `Value` events currently buffered.
    pub fn buffered(&self) -> usize {
        self.inner.lock().buffered
    }

    /// Highest number of values ever buffered at once.
    pub fn max_buffered(&self) -> usize {
        self.inner.lock().max_buffered
    }

    pub fn active_workers(&self) -> usize {
        self.inner.lock().active_workers
    }

    pub fn queued_work(&self) -> usize {
        self.inner.lock().work.len()
    }

    /// Abort everything: cancel live workers, drop parked continuations and
    /// buffered events. Idempotent.
    pub fn close(&self) {
        self.close_locked(&mut self.inner.lock());
    }

    fn close_locked(&self, inner: &mut SVarInner<T>) {
        if inner.closed {
            return;
        }
        inner.closed = true;
        let live = inner.workers.len();
        for (_, handle) in inner.workers.drain() {
            handle.abort();
        }
        inner.active_workers = 0;
        inner.work.clear();
        inner.output.clear();
        inner.buffered = 0;
        debug!(svar = self.account, cancelled = live, "closed stream variable");
        Self::ring(inner);
    }

    /// Spawn a worker for one parked continuation, if policy permits.
    /// Returns whether a worker was started.
    fn dispatch_one(&self, inner: &mut SVarInner<T>) -> bool {
        if inner.closed || inner.work.is_empty() || inner.buffered >= self.output_bound {
            return false;
        }
        let mut cap = self.worker_limit.unwrap_or(usize::MAX);
        if self.style.tag == Tag::Serial {
            cap = cap.min(1);
        }
        if inner.active_workers >= cap {
            return false;
        }
        let stream = match inner.work.pop_front() {
            Some(s) => s,
            None => return false,
        };
        let id = inner.next_worker;
        inner.next_worker += 1;
        inner.active_workers += 1;
        let handle = worker::spawn(self.clone(), id, stream);
        inner.workers.insert(id, handle);
        trace!(
            svar = self.account,
            worker = id,
            active = inner.active_workers,
            "dispatched worker"
        );
        true
    }

    /// Producer side of the backpressure protocol. Accepts the value and
    /// returns the tail to continue with, or parks the continuation
    /// (element included) and returns `None`, in which case the calling
    /// task must exit without further accounting.
    fn offer(&self, worker: u64, value: T, tail: KStream<T>) -> Option<KStream<T>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        if inner.buffered < self.output_bound {
            inner.buffered += 1;
            inner.max_buffered = inner.max_buffered.max(inner.buffered);
            inner.output.push_back(Event::Value(value));
            Self::ring(&mut inner);
            Some(tail)
        } else {
            // full buffer: the continuation keeps the element so nothing is
            // lost when a later dispatch resumes it
            let parked = KStream::cons(value, tail);
            match self.style.sched {
                Sched::Lifo => inner.work.push_front(parked),
                Sched::Fifo => inner.work.push_back(parked),
            }
            inner.active_workers = inner.active_workers.saturating_sub(1);
            inner.workers.remove(&worker);
            trace!(svar = self.account, worker, "worker parked on full buffer");
            None
        }
    }

    /// A worker finished its branch.
    fn child_stop(&self, worker: u64) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.output.push_back(Event::ChildStop(worker));
        inner.active_workers = inner.active_workers.saturating_sub(1);
        inner.workers.remove(&worker);
        trace!(
            svar = self.account,
            worker,
            active = inner.active_workers,
            "worker stopped"
        );
        Self::ring(&mut inner);
    }

    /// A worker failed; the error is fatal for this variable's output.
    fn post_error(&self, worker: u64, err: StreamError) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.output.push_back(Event::Error(err));
        inner.active_workers = inner.active_workers.saturating_sub(1);
        inner.workers.remove(&worker);
        debug!(svar = self.account, worker, "worker failed");
        Self::ring(&mut inner);
    }

    fn ring(inner: &mut SVarInner<T>) {
        if let Some(waker) = inner.doorbell.take() {
            waker.wake();
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for SVar<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SVar")
            .field("account", &self.account)
            .field("style", &self.style)
            .field("output_bound", &self.output_bound)
            .field("buffered", &inner.buffered)
            .field("active_workers", &inner.active_workers)
            .field("queued_work", &inner.work.len())
            .field("sealed", &inner.sealed)
            .field("closed", &inner.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn counted(range: std::ops::Range<u32>) -> KStream<u32> {
        KStream::from_iter(range)
    }

    #[tokio::test]
    async fn push_drain_roundtrip() {
        let sv = SVar::new(Style::PARALLEL_LIFO, 16, None);
        sv.push(counted(0..5)).unwrap();
        sv.seal();
        let mut out = Vec::new();
        let mut drain = sv.drain();
        while let Some(x) = drain.next().await {
            out.push(x.unwrap());
        }
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
        assert_eq!(sv.state(), SVarState::Closed);
        assert_eq!(sv.active_workers(), 0);
        assert_eq!(sv.queued_work(), 0);
    }

    #[tokio::test]
    async fn buffer_never_exceeds_bound() {
        let sv = SVar::new(Style::PARALLEL_FIFO, 2, None);
        for _ in 0..3 {
            sv.push(counted(0..3)).unwrap();
        }
        sv.seal();
        let mut drain = sv.drain();
        let mut n = 0;
        while let Some(x) = drain.next().await {
            x.unwrap();
            assert!(sv.buffered() <= 2);
            n += 1;
        }
        assert_eq!(n, 9);
        assert!(sv.max_buffered() <= 2);
    }

    #[tokio::test]
    async fn empty_branches_account_correctly() {
        let sv: SVar<u32> = SVar::new(Style::PARALLEL_FIFO, 4, None);
        for _ in 0..4 {
            sv.push(KStream::nil()).unwrap();
        }
        sv.seal();
        let out: Vec<_> = sv.drain().collect().await;
        assert!(out.is_empty());
        assert_eq!(sv.active_workers(), 0);
    }

    #[tokio::test]
    async fn push_after_close_is_refused() {
        let sv = SVar::new(Style::PARALLEL_LIFO, 4, None);
        sv.close();
        let err = sv.push(counted(0..1)).unwrap_err();
        assert!(matches!(err, StreamError::Abandoned));
    }

    #[tokio::test]
    async fn worker_limit_is_respected() {
        let sv = SVar::new(Style::PARALLEL_FIFO, 64, Some(2));
        for _ in 0..6 {
            sv.push(counted(0..4)).unwrap();
        }
        assert!(sv.active_workers() <= 2);
        sv.seal();
        let out: Vec<_> = sv.drain().map(|x| x.unwrap()).collect().await;
        assert_eq!(out.len(), 24);
    }

    #[tokio::test]
    async fn serial_style_runs_one_worker_at_a_time() {
        let sv = SVar::new(Style::SERIAL_FIFO, 64, None);
        for _ in 0..5 {
            sv.push(counted(0..4)).unwrap();
        }
        assert!(sv.active_workers() <= 1);
        sv.seal();
        let out: Vec<_> = sv.drain().map(|x| x.unwrap()).collect().await;
        assert_eq!(out.len(), 20);
    }

    #[tokio::test]
    async fn worker_error_is_fatal_and_final() {
        let sv = SVar::new(Style::PARALLEL_LIFO, 8, None);
        let failing = counted(0..3).append(KStream::raise(StreamError::user(anyhow::anyhow!(
            "producer exploded"
        ))));
        sv.push(failing).unwrap();
        sv.seal();
        let mut drain = sv.drain();
        let mut values = Vec::new();
        let mut saw_error = false;
        while let Some(item) = drain.next().await {
            match item {
                Ok(x) => values.push(x),
                Err(e) => {
                    assert!(matches!(e, StreamError::User(_)));
                    saw_error = true;
                }
            }
        }
        assert!(saw_error);
        assert_eq!(values, vec![0, 1, 2]);
        assert_eq!(sv.state(), SVarState::Closed);
    }

    #[tokio::test]
    async fn dropping_the_consumer_aborts_workers() {
        let sv = SVar::new(Style::PARALLEL_FIFO, 1, None);
        // unbounded producer, so it can only end by cancellation
        sv.push(KStream::from_iter(0u64..)).unwrap();
        sv.seal();
        let mut drain = sv.drain();
        let first = drain.next().await.unwrap().unwrap();
        assert_eq!(first, 0);
        drop(drain);
        assert_eq!(sv.state(), SVarState::Closed);
        assert_eq!(sv.active_workers(), 0);
        assert_eq!(sv.queued_work(), 0);
    }
}
