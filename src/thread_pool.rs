use std::{
    sync::atomic::{AtomicUsize, Ordering},
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::{
    error::{Error, Result, TaskResult},
    job::Job,
    promise::Promise,
    queue::BlockingQueue,
    util::{catch_panic, CallOnDrop},
};

// -----------------------------------------------------------------------------
// Configuration

/// The prefix given to worker thread names when none is configured.
pub const DEFAULT_THREAD_NAME: &str = "spool-worker";

/// Returns the number of hardware threads available to this process, or one
/// if that cannot be determined. This is what [`Config::default`] uses.
pub fn available_workers() -> usize {
    thread::available_parallelism()
        .map(|num_threads| num_threads.get())
        .unwrap_or(1)
}

/// Settings used to build a [`ThreadPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The fixed number of worker threads. Must be positive.
    pub num_workers: usize,
    /// Worker threads are named `"{thread_name}-{index}"`.
    pub thread_name: String,
}

impl Config {
    /// A configuration with the given number of workers and default names.
    pub fn new(num_workers: usize) -> Config {
        Config {
            num_workers,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
        }
    }

    /// Replaces the worker thread name prefix.
    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Config {
        self.thread_name = thread_name.into();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new(available_workers())
    }
}

// -----------------------------------------------------------------------------
// Thread pool types

/// The lifecycle of a pool. A pool is running as soon as it is constructed;
/// there is no unstarted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Accepting work.
    Running,
    /// `shutdown` has pushed the stop signals and is waiting for workers.
    ShuttingDown,
    /// Every worker has been joined.
    Stopped,
}

/// Counters describing what happened to the tasks a pool accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Tasks that ran to completion.
    pub completed: usize,
    /// Submitted tasks that were never run because every handle to their
    /// result had been dropped.
    pub skipped: usize,
    /// Tasks that panicked.
    pub panicked: usize,
}

/// A fixed-size pool of worker threads fed from one shared FIFO queue.
///
/// # Submitting work
///
/// [`ThreadPool::submit`] queues a closure and returns a [`Promise`] for its
/// result. [`ThreadPool::execute`] queues a closure whose result nobody is
/// interested in. Both return immediately. Arguments are passed by capturing
/// them in a `move` closure.
///
/// ```
/// use spool::prelude::*;
///
/// let pool = ThreadPool::new(4)?;
/// let x = 3;
/// let answer = pool.submit(move || x + 1)?;
/// assert_eq!(answer.get(), Ok(4));
/// pool.shutdown()?;
/// # Ok::<(), spool::error::Error>(())
/// ```
///
/// # Skipping abandoned work
///
/// The job queued by `submit` only holds a weak reference to the promise. If
/// every clone of the returned promise is dropped before a worker picks the
/// job up, the closure is never called. This is the only form of
/// cancellation: once a closure starts running it runs to completion.
///
/// # Shutting down
///
/// [`ThreadPool::shutdown`] pushes one stop signal per worker behind all the
/// work already queued, then joins every worker. Everything accepted before
/// the call is therefore run (or skipped) before it returns. After shutdown
/// has begun `submit` and `execute` fail with [`Error::Stopped`]. Dropping a
/// running pool shuts it down.
///
/// When `shutdown` is called from one of the pool's own tasks it joins every
/// other worker; the calling worker exits once that task returns.
pub struct ThreadPool {
    /// State shared with the worker threads.
    shared: Arc<Shared>,
    /// The lifecycle state. Submissions hold the read lock while they push,
    /// and shutdown holds the write lock while it pushes the stop signals, so
    /// no job can land behind the stop signals.
    state: RwLock<PoolState>,
    /// Handles for every worker, taken when the pool is shut down.
    handles: Mutex<Vec<JoinHandle<()>>>,
    /// The number of workers this pool was built with.
    num_workers: usize,
}

/// The part of the pool that worker threads hold on to.
struct Shared {
    /// Jobs waiting for a worker.
    queue: CachePadded<BlockingQueue<Job>>,
    /// Workers that have been started and have not yet left their main loop.
    live_workers: CachePadded<AtomicUsize>,
    /// Jobs that have been queued but have not finished running. Used to
    /// implement `wait_until_idle`.
    active_tally: CachePadded<AtomicUsize>,
    /// Set while `active_tally > 0`.
    is_active: Mutex<bool>,
    /// Notified when `is_active` changes.
    activity_changed: Condvar,
    completed: AtomicUsize,
    skipped: AtomicUsize,
    panicked: AtomicUsize,
}

// -----------------------------------------------------------------------------
// Thread pool creation

impl ThreadPool {
    /// Creates a pool with `num_workers` threads, all of which start waiting
    /// for work immediately.
    ///
    /// Returns [`Error::InvalidWorkerCount`] when `num_workers` is zero.
    pub fn new(num_workers: usize) -> Result<ThreadPool> {
        Self::with_config(Config::new(num_workers))
    }

    /// Creates a pool from a full configuration.
    pub fn with_config(config: Config) -> Result<ThreadPool> {
        if config.num_workers == 0 {
            return Err(Error::InvalidWorkerCount);
        }

        let shared = Arc::new(Shared::new());
        let mut handles = Vec::with_capacity(config.num_workers);

        for index in 0..config.num_workers {
            // Counted before the spawn so that `live_workers` is exact as soon
            // as the constructor returns.
            shared.live_workers.fetch_add(1, Ordering::AcqRel);

            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, index))
                .spawn(move || main_loop(&worker_shared, index));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    shared.live_workers.fetch_sub(1, Ordering::AcqRel);
                    warn!(index, error = %err, "failed to spawn worker, stopping the rest");
                    stop_started_workers(&shared, handles);
                    return Err(Error::Spawn(err));
                }
            }
        }

        debug!(num_workers = config.num_workers, "thread pool started");

        Ok(ThreadPool {
            shared,
            state: RwLock::new(PoolState::Running),
            handles: Mutex::new(handles),
            num_workers: config.num_workers,
        })
    }
}

/// Stops the workers of a pool whose construction failed part way. Each
/// started worker gets one stop signal and is joined.
fn stop_started_workers(shared: &Shared, handles: Vec<JoinHandle<()>>) {
    for _ in 0..handles.len() {
        shared.queue.push(Job::Stop);
    }
    for handle in handles {
        let _ = handle.join();
    }
}

// -----------------------------------------------------------------------------
// Core API

impl ThreadPool {
    /// Queues `f` to run on a worker and returns a promise for its result.
    ///
    /// The promise resolves to `Ok(value)` when `f` returns and to
    /// `Err(TaskError::Panicked(_))` when it panics. If every clone of the
    /// promise is dropped before a worker reaches this job, `f` is not run and
    /// the promise is never resolved.
    ///
    /// Every reader of the promise gets its own copy of the result, hence the
    /// `Clone` bound. Wrap a result that cannot be cloned in an `Arc`.
    pub fn submit<F, R>(&self, f: F) -> Result<Promise<TaskResult<R>>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Clone + Send + 'static,
    {
        let promise = Promise::new();
        let weak = promise.downgrade();

        self.inject(move |shared| {
            // Holding the upgraded handle keeps the cell alive until the
            // result is stored, even if the caller drops theirs meanwhile.
            let Some(promise) = weak.upgrade() else {
                shared.skipped.fetch_add(1, Ordering::Relaxed);
                trace!("result handle dropped, skipping task");
                return;
            };

            let result = catch_panic(f);
            shared.record(&result);
            if promise.put(result).is_err() {
                warn!("task result discarded, its promise was already resolved");
            }
        })?;

        Ok(promise)
    }

    /// Queues `f` to run on a worker without any way to observe its result.
    /// A panic inside `f` is logged and counted, and the worker carries on.
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inject(move |shared| {
            let result = catch_panic(f);
            shared.record(&result);
        })
    }

    /// Pushes a job onto the queue unless the pool has begun shutting down.
    /// The job is counted as activity until it returns.
    fn inject<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Shared) + Send + 'static,
    {
        let state = self.state.read();
        if *state != PoolState::Running {
            return Err(Error::Stopped);
        }

        // Marks some pool activity. This is decremented when the job exits.
        self.shared.mark_active();
        let shared = Arc::clone(&self.shared);
        self.shared.queue.push(Job::work(move || {
            let _guard = CallOnDrop(|| shared.mark_inactive());
            f(&*shared);
        }));
        Ok(())
    }

    /// Stops the pool: queues one stop signal per worker, then blocks until
    /// every worker thread has exited. Jobs queued before the call still run.
    ///
    /// Returns [`Error::Stopped`] if the pool was already shut down.
    pub fn shutdown(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            if *state != PoolState::Running {
                return Err(Error::Stopped);
            }
            *state = PoolState::ShuttingDown;
            for _ in 0..self.num_workers {
                self.shared.queue.push(Job::Stop);
            }
        }
        debug!(num_workers = self.num_workers, "thread pool shutting down");

        let handles = std::mem::take(&mut *self.handles.lock());
        let current = thread::current().id();
        for handle in handles {
            // A worker cannot join itself. It takes the last stop signal once
            // the task it is running returns.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("worker thread exited by panicking");
            }
        }

        *self.state.write() = PoolState::Stopped;
        debug!("thread pool stopped");
        Ok(())
    }

    /// Blocks until every job accepted so far has been run or skipped. Unlike
    /// `shutdown`, the pool keeps running afterwards.
    ///
    /// Must not be called from one of the pool's own tasks: the calling task
    /// counts as active until it returns, so the wait never ends.
    pub fn wait_until_idle(&self) {
        let mut is_active = self.shared.is_active.lock();
        while *is_active {
            self.shared.activity_changed.wait(&mut is_active);
        }
    }
}

// -----------------------------------------------------------------------------
// Introspection

impl ThreadPool {
    /// The number of workers the pool was built with.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// The number of workers that have not yet left their main loop.
    pub fn live_workers(&self) -> usize {
        self.shared.live_workers.load(Ordering::Acquire)
    }

    /// The number of jobs (including stop signals) waiting for a worker.
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// The current lifecycle state.
    pub fn state(&self) -> PoolState {
        *self.state.read()
    }

    /// A snapshot of the task counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            completed: self.shared.completed.load(Ordering::Relaxed),
            skipped: self.shared.skipped.load(Ordering::Relaxed),
            panicked: self.shared.panicked.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        let running = *self.state.read() == PoolState::Running;
        if running {
            let _ = self.shutdown();
        }
    }
}

// -----------------------------------------------------------------------------
// Shared state

impl Shared {
    fn new() -> Shared {
        Shared {
            queue: CachePadded::new(BlockingQueue::new()),
            live_workers: CachePadded::new(AtomicUsize::new(0)),
            active_tally: CachePadded::new(AtomicUsize::new(0)),
            is_active: Mutex::new(false),
            activity_changed: Condvar::new(),
            completed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            panicked: AtomicUsize::new(0),
        }
    }

    /// Counts the outcome of a task that was run.
    fn record<R>(&self, result: &TaskResult<R>) {
        match result {
            Ok(_) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.panicked.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "task failed");
            }
        }
    }

    /// Marks new activity on the pool. Always paired with a later call to
    /// `mark_inactive`.
    fn mark_active(&self) {
        if self.active_tally.fetch_add(1, Ordering::AcqRel) == 0 {
            self.sync_activity();
        }
    }

    /// Marks the end of some activity. See `mark_active`.
    fn mark_inactive(&self) {
        if self.active_tally.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.sync_activity();
        }
    }

    /// Publishes the current tally to `is_active`. The tally is re-read under
    /// the lock, so concurrent transitions through zero settle on the value
    /// of the last one.
    fn sync_activity(&self) {
        let mut is_active = self.is_active.lock();
        *is_active = self.active_tally.load(Ordering::Acquire) > 0;
        self.activity_changed.notify_all();
    }
}

// -----------------------------------------------------------------------------
// Main worker loop

/// This is the main loop for a worker thread. It takes jobs off the queue in
/// order and runs them, until it takes a stop signal.
fn main_loop(shared: &Shared, index: usize) {
    let _exit = CallOnDrop(|| {
        shared.live_workers.fetch_sub(1, Ordering::AcqRel);
    });
    debug!(worker = index, "worker started");

    loop {
        match shared.queue.pop() {
            Job::Work(job) => job.execute(),
            Job::Stop => break,
        }
    }

    debug!(worker = index, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    // The operating system cannot be made to refuse a thread spawn portably,
    // so the cleanup that runs on `Error::Spawn` is exercised directly.
    #[test]
    fn failed_startup_stops_the_workers_already_running() {
        let shared = Arc::new(Shared::new());
        let handles: Vec<_> = (0..3)
            .map(|index| {
                shared.live_workers.fetch_add(1, Ordering::AcqRel);
                let worker_shared = Arc::clone(&shared);
                thread::spawn(move || main_loop(&worker_shared, index))
            })
            .collect();

        stop_started_workers(&shared, handles);

        assert_eq!(shared.live_workers.load(Ordering::Acquire), 0);
        assert!(shared.queue.is_empty());
    }
}
