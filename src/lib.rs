//! A fixed-size worker pool built from two small blocking primitives.
//!
//! Spool runs closures on a set of long-lived OS threads. The threads all
//! consume from one unbounded FIFO [`queue::BlockingQueue`], so work is
//! picked up in exactly the order it was submitted (though with more than one
//! worker it may finish in a different order). Results come back through a
//! [`promise::Promise`], a write-once cell that any number of threads can
//! block on.
//!
//! The pool is deliberately plain: no work-stealing, no priorities, no
//! resizing and no backpressure. What it does guarantee is a clean shutdown.
//! One stop signal is queued per worker behind all pending work, and
//! [`thread_pool::ThreadPool::shutdown`] returns only once every worker has
//! drained its share and exited.
//!
//! Dropping every handle to a submitted task's promise before a worker gets
//! to it causes that task to be skipped, since nobody could observe what it
//! produced.

pub mod error;
pub mod job;
pub mod promise;
pub mod queue;
pub mod thread_pool;
pub mod timer;

mod util;

pub mod prelude {
    pub use crate::{
        error::{Error, TaskError, TaskResult},
        promise::Promise,
        thread_pool::{Config, ThreadPool},
    };
}
