use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
};

use crate::error::{TaskError, TaskResult};

// -----------------------------------------------------------------------------
// Call on drop guard

// A guard that calls the specified closure when it is dropped. This is used
// internally to run bookkeeping when a worker or a job exits, whichever way it
// exits.
pub struct CallOnDrop<F: FnMut()>(pub F);

impl<F: FnMut()> Drop for CallOnDrop<F> {
    fn drop(&mut self) {
        (self.0)();
    }
}

// -----------------------------------------------------------------------------
// Panic capture

/// Runs `f`, turning a panic into a [`TaskError::Panicked`].
pub fn catch_panic<F, R>(f: F) -> TaskResult<R>
where
    F: FnOnce() -> R,
{
    // The closure is consumed here and its captures are not observed again
    // after a panic, so unwind safety holds.
    panic::catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| TaskError::Panicked(panic_message(&*payload)))
}

/// Extracts the message from a panic payload. `panic!` produces either a
/// `&'static str` or a `String`; anything else gets a placeholder.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("<non-string panic payload>")
    }
}
