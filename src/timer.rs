//! A scoped wall-clock timer for quick measurements around pool operations.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use tracing::info;

/// Measures the time between its creation and its drop. On drop the elapsed
/// time is logged, and optionally written to a sink in microseconds.
///
/// ```
/// use spool::timer::ScopedTimer;
///
/// let _timer = ScopedTimer::new("sum");
/// let _total: u64 = (0..1_000u64).sum();
/// // "sum computed in N μsec" is logged here.
/// ```
pub struct ScopedTimer<'a> {
    label: String,
    start: Instant,
    sink: Option<&'a AtomicU64>,
}

impl ScopedTimer<'static> {
    /// Starts a timer that only logs.
    pub fn new(label: impl Into<String>) -> ScopedTimer<'static> {
        ScopedTimer {
            label: label.into(),
            start: Instant::now(),
            sink: None,
        }
    }
}

impl<'a> ScopedTimer<'a> {
    /// Starts a timer that also stores the elapsed microseconds in `sink`.
    pub fn with_sink(label: impl Into<String>, sink: &'a AtomicU64) -> ScopedTimer<'a> {
        ScopedTimer {
            label: label.into(),
            start: Instant::now(),
            sink: Some(sink),
        }
    }

    /// Microseconds elapsed so far.
    pub fn elapsed_micros(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        let micros = self.elapsed_micros();
        info!(label = %self.label, micros, "{} computed in {} μsec", self.label, micros);
        if let Some(sink) = self.sink {
            sink.store(micros, Ordering::Release);
        }
    }
}

/// Converts a microsecond count to seconds.
pub fn to_seconds(micros: u64) -> f64 {
    micros as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    #[test]
    fn sink_receives_elapsed_time_on_drop() {
        let sink = AtomicU64::new(0);
        {
            let _timer = ScopedTimer::with_sink("sleep", &sink);
            thread::sleep(Duration::from_millis(5));
        }
        assert!(sink.load(Ordering::Acquire) >= 5_000);
    }

    #[test]
    fn converts_micros_to_seconds() {
        assert_eq!(to_seconds(1_500_000), 1.5);
        assert_eq!(to_seconds(0), 0.0);
    }
}
