//! This module defines the unit of work that travels through the pool's queue.
//!
//! A [`Job`] is either real work, boxed on the heap so that closures of any
//! type can share one queue, or the [`Job::Stop`] poison pill which tells the
//! worker that receives it to leave its main loop. Keeping the pill as its own
//! variant means a worker can never mistake it for an empty closure.

// -----------------------------------------------------------------------------
// Heap allocated job

/// A closure stored on the heap, ready to be run by whichever worker dequeues
/// it. Arguments are bound by capturing them in the closure.
pub struct HeapJob {
    job: Box<dyn FnOnce() + Send + 'static>,
}

impl HeapJob {
    /// Allocates a new `HeapJob` on the heap.
    pub fn new<F>(job: F) -> HeapJob
    where
        F: FnOnce() + Send + 'static,
    {
        HeapJob { job: Box::new(job) }
    }

    /// Runs the job on the current thread, consuming it.
    pub fn execute(self) {
        (self.job)()
    }
}

// -----------------------------------------------------------------------------
// Job

/// An item in the pool's queue.
pub enum Job {
    /// Work to run on a worker thread.
    Work(HeapJob),
    /// Terminates the worker that dequeues it. Exactly one is pushed per
    /// worker at shutdown.
    Stop,
}

impl Job {
    /// Wraps a closure into a `Job::Work`.
    pub fn work<F>(f: F) -> Job
    where
        F: FnOnce() + Send + 'static,
    {
        Job::Work(HeapJob::new(f))
    }

    /// Returns `true` for the poison pill.
    pub fn is_stop(&self) -> bool {
        matches!(self, Job::Stop)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[test]
    fn work_runs_its_closure_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let job = {
            let counter = Arc::clone(&counter);
            Job::work(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        };
        assert!(!job.is_stop());

        match job {
            Job::Work(work) => work.execute(),
            Job::Stop => unreachable!(),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_carries_no_work() {
        assert!(Job::Stop.is_stop());
    }
}
