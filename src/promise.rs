//! Single-assignment result cells used to carry a task's output from the
//! worker that ran it back to whoever is waiting for it.
//!
//! A [`Promise`] is the strong, reference-counted handle. Cloning it is cheap
//! and every clone observes the same value. A [`WeakPromise`] points at the
//! same cell without keeping it alive; the thread pool gives one of these to
//! each submitted task, so that a task whose every strong handle has been
//! dropped can notice that nobody will ever read its output and skip the work
//! entirely.

use std::{
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

// -----------------------------------------------------------------------------
// Shared cell

/// The state shared between all handles to one promise: a mutex-guarded slot
/// and a condvar that is notified when the slot is filled.
struct Cell<R> {
    value: Mutex<Option<R>>,
    resolved: Condvar,
}

// -----------------------------------------------------------------------------
// Strong handle

/// A thread-safe, write-once value that any number of threads may wait on.
pub struct Promise<R> {
    cell: Arc<Cell<R>>,
}

impl<R> Promise<R> {
    /// Creates a new, unresolved promise.
    pub fn new() -> Promise<R> {
        Promise {
            cell: Arc::new(Cell {
                value: Mutex::new(None),
                resolved: Condvar::new(),
            }),
        }
    }

    /// Stores `value` and wakes every thread blocked in [`Promise::get`].
    ///
    /// A promise can only be resolved once. A second call leaves the first
    /// value in place and returns [`Error::AlreadySet`].
    pub fn put(&self, value: R) -> Result<()> {
        let mut slot = self.cell.value.lock();
        if slot.is_some() {
            return Err(Error::AlreadySet);
        }
        *slot = Some(value);
        self.cell.resolved.notify_all();
        Ok(())
    }

    /// Returns `true` once the promise has been resolved.
    pub fn is_set(&self) -> bool {
        self.cell.value.lock().is_some()
    }

    /// Creates a non-owning handle to this promise.
    pub fn downgrade(&self) -> WeakPromise<R> {
        WeakPromise {
            cell: Arc::downgrade(&self.cell),
        }
    }
}

impl<R: Clone> Promise<R> {
    /// Returns the stored value, blocking the thread until one is put if the
    /// promise is still unresolved. Resolved promises return immediately.
    pub fn get(&self) -> R {
        let mut slot = self.cell.value.lock();
        loop {
            if let Some(value) = slot.as_ref() {
                return value.clone();
            }
            self.cell.resolved.wait(&mut slot);
        }
    }

    /// Returns the stored value if there is one, without blocking.
    pub fn try_get(&self) -> Option<R> {
        self.cell.value.lock().clone()
    }

    /// Like [`Promise::get`], but gives up and returns `None` if the promise
    /// is still unresolved after `timeout`. A timeout too large to be
    /// represented as a deadline waits without limit.
    pub fn get_timeout(&self, timeout: Duration) -> Option<R> {
        let mut slot = self.cell.value.lock();
        if slot.is_some() {
            return slot.clone();
        }
        match Instant::now().checked_add(timeout) {
            Some(deadline) => {
                while slot.is_none() {
                    if self.cell.resolved.wait_until(&mut slot, deadline).timed_out() {
                        break;
                    }
                }
            }
            None => {
                while slot.is_none() {
                    self.cell.resolved.wait(&mut slot);
                }
            }
        }
        slot.clone()
    }
}

impl<R> Clone for Promise<R> {
    fn clone(&self) -> Self {
        Promise {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<R> Default for Promise<R> {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// Weak handle

/// A handle to a promise that does not keep it alive.
pub struct WeakPromise<R> {
    cell: Weak<Cell<R>>,
}

impl<R> WeakPromise<R> {
    /// Returns a strong handle if at least one [`Promise`] for this cell is
    /// still alive, and `None` once they have all been dropped.
    pub fn upgrade(&self) -> Option<Promise<R>> {
        self.cell.upgrade().map(|cell| Promise { cell })
    }
}

impl<R> Clone for WeakPromise<R> {
    fn clone(&self) -> Self {
        WeakPromise {
            cell: Weak::clone(&self.cell),
        }
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use std::{sync::Barrier, thread};

    use super::*;

    #[test]
    fn get_after_put_returns_immediately() {
        let promise = Promise::new();
        promise.put(5).unwrap();
        assert!(promise.is_set());
        assert_eq!(promise.get(), 5);
        assert_eq!(promise.get(), 5);
        assert_eq!(promise.try_get(), Some(5));
    }

    #[test]
    fn second_put_is_rejected_and_keeps_first_value() {
        let promise = Promise::new();
        promise.put("first").unwrap();
        assert!(matches!(promise.put("second"), Err(Error::AlreadySet)));
        assert_eq!(promise.get(), "first");
    }

    #[test]
    fn unresolved_promise_does_not_block_try_get() {
        let promise: Promise<u32> = Promise::default();
        assert!(!promise.is_set());
        assert_eq!(promise.try_get(), None);
        assert_eq!(promise.get_timeout(Duration::from_millis(20)), None);
    }

    #[test]
    fn waiting_readers_are_all_released_by_one_put() {
        const READERS: usize = 8;
        let promise: Promise<String> = Promise::new();
        let ready = Barrier::new(READERS + 1);

        let values = crossbeam_utils::thread::scope(|s| {
            let readers: Vec<_> = (0..READERS)
                .map(|_| {
                    let promise = promise.clone();
                    let ready = &ready;
                    s.spawn(move |_| {
                        ready.wait();
                        promise.get()
                    })
                })
                .collect();

            ready.wait();
            thread::sleep(Duration::from_millis(20));
            promise.put(String::from("done")).unwrap();

            readers
                .into_iter()
                .map(|r| r.join().unwrap())
                .collect::<Vec<_>>()
        })
        .unwrap();

        assert_eq!(values.len(), READERS);
        assert!(values.iter().all(|v| v == "done"));
    }

    #[test]
    fn get_timeout_sees_a_late_put() {
        let promise = Promise::new();
        let writer = {
            let promise = promise.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                promise.put(11).unwrap();
            })
        };
        assert_eq!(promise.get_timeout(Duration::from_secs(10)), Some(11));
        writer.join().unwrap();
    }

    #[test]
    fn get_timeout_accepts_an_unrepresentable_deadline() {
        let promise = Promise::new();
        promise.put(1).unwrap();
        assert_eq!(promise.get_timeout(Duration::MAX), Some(1));

        let late = Promise::new();
        let writer = {
            let late = late.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                late.put("late").unwrap();
            })
        };
        assert_eq!(late.get_timeout(Duration::MAX), Some("late"));
        writer.join().unwrap();
    }

    #[test]
    fn weak_handle_dies_with_the_last_strong_handle() {
        let promise: Promise<i32> = Promise::new();
        let weak = promise.downgrade();
        let other = promise.clone();

        drop(promise);
        let upgraded = weak.upgrade().expect("a clone is still alive");
        upgraded.put(1).unwrap();
        assert_eq!(other.get(), 1);

        drop(upgraded);
        drop(other);
        assert!(weak.upgrade().is_none());
    }
}
