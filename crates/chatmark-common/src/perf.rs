//! Performance timing utilities for instrumentation.
//!
//! Uses `web_time::Instant`, which maps to `Performance.now()` on WASM
//! and to `std::time::Instant` on native builds.

use web_time::Instant;

/// Milliseconds elapsed since the first call in this process.
pub fn now() -> f64 {
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_secs_f64() * 1000.0
}

/// Measure the execution time of a closure and log it.
///
/// Returns the closure's result and logs the elapsed time via tracing.
pub fn measure<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = now();
    let result = f();
    let elapsed = now() - start;
    tracing::debug!(elapsed_ms = elapsed, "{}", label);
    result
}

/// A guard that logs elapsed time when dropped.
///
/// Useful for timing blocks of code without closures.
pub struct TimingGuard {
    label: &'static str,
    start: f64,
}

impl TimingGuard {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            start: now(),
        }
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let elapsed = now() - self.start;
        tracing::debug!(elapsed_ms = elapsed, "{}", self.label);
    }
}
