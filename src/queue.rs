//! This module provides the hand-off point between the threads that submit
//! work and the worker threads that run it: an unbounded, blocking FIFO queue.
//!
//! The queue has no notion of being closed. Consumers that need to stop are
//! told so through the items themselves (see [`crate::job::Job::Stop`]), which
//! keeps this type a plain container with a wait/notify discipline on top.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

// -----------------------------------------------------------------------------
// Blocking queue

/// An unbounded multi-producer, multi-consumer FIFO queue.
///
/// [`BlockingQueue::push`] never blocks. [`BlockingQueue::pop`] blocks the
/// calling thread (sleeping on a condition variable, not spinning) until an
/// item is available. Items come out in the order they went in, across all
/// producers, and each item is handed to exactly one consumer.
pub struct BlockingQueue<T> {
    /// The queued items. Every push and pop happens under this lock.
    items: Mutex<VecDeque<T>>,
    /// Signalled once per pushed item.
    available: Condvar,
}

impl<T> BlockingQueue<T> {
    /// Creates a new, empty queue.
    pub fn new() -> BlockingQueue<T> {
        BlockingQueue {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// Appends an item to the tail of the queue and wakes one waiting
    /// consumer, if there is any.
    pub fn push(&self, item: T) {
        let mut items = self.items.lock();
        items.push_back(item);
        // One item satisfies at most one consumer.
        self.available.notify_one();
    }

    /// Removes and returns the item at the head of the queue, putting the
    /// thread to sleep until one is pushed if the queue is currently empty.
    pub fn pop(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            self.available.wait(&mut items);
        }
    }

    /// Removes the head item if there is one. Never blocks.
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Returns the number of queued items. This is only a snapshot; other
    /// threads may change it immediately afterwards.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns `true` if the queue was empty at the time of the call.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    use super::*;

    #[test]
    fn pops_in_push_order() {
        let queue = BlockingQueue::new();
        for i in 0..100 {
            queue.push(i);
        }
        assert_eq!(queue.len(), 100);
        for i in 0..100 {
            assert_eq!(queue.pop(), i);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn try_pop_does_not_block_on_empty() {
        let queue: BlockingQueue<u8> = BlockingQueue::default();
        assert_eq!(queue.try_pop(), None);
        queue.push(7);
        assert_eq!(queue.try_pop(), Some(7));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn pop_waits_for_a_push() {
        let queue = Arc::new(BlockingQueue::new());
        let popped = Arc::new(AtomicBool::new(false));

        let consumer = {
            let queue = Arc::clone(&queue);
            let popped = Arc::clone(&popped);
            thread::spawn(move || {
                let value = queue.pop();
                popped.store(true, Ordering::SeqCst);
                value
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!popped.load(Ordering::SeqCst));

        queue.push("hello");
        assert_eq!(consumer.join().unwrap(), "hello");
        assert!(popped.load(Ordering::SeqCst));
    }

    #[test]
    fn no_item_lost_across_many_producers_and_consumers() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: usize = 1_000;

        let queue = BlockingQueue::new();
        let mut seen = crossbeam_utils::thread::scope(|s| {
            for p in 0..PRODUCERS {
                let queue = &queue;
                s.spawn(move |_| {
                    for i in 0..PER_PRODUCER {
                        queue.push(p * PER_PRODUCER + i);
                    }
                });
            }

            let consumers: Vec<_> = (0..CONSUMERS)
                .map(|_| {
                    let queue = &queue;
                    s.spawn(move |_| {
                        (0..PRODUCERS * PER_PRODUCER / CONSUMERS)
                            .map(|_| queue.pop())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            consumers
                .into_iter()
                .flat_map(|c| c.join().unwrap())
                .collect::<Vec<_>>()
        })
        .unwrap();

        seen.sort_unstable();
        let expected: Vec<_> = (0..PRODUCERS * PER_PRODUCER).collect();
        assert_eq!(seen, expected);
        assert!(queue.is_empty());
    }
}
