//! Logging infrastructure - structured tracing throughout the bridge
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Zero-cost when disabled
//! - Event names on every record so output can be filtered mechanically
//!
//! This crate only emits events; installing a subscriber is left to the
//! embedding application.

// Re-export tracing macros for use throughout the runtime
pub use tracing::{debug, error, info, trace, warn, Level};

/// Parse a level name, case-insensitively
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

// ============================================================================
// Bridge-specific logging functions
// ============================================================================

/// Log a runtime state being opened
pub fn log_state_open(id: u64, open_libs: bool) {
    debug!(
        event = "state_open",
        runtime = id,
        open_libs,
        "Runtime state opened"
    );
}

/// Log a runtime state being closed
pub fn log_state_close(id: u64, functions: usize) {
    debug!(
        event = "state_close",
        runtime = id,
        functions,
        "Runtime state closed"
    );
}

/// Log a host function being bound to a global name
pub fn log_function_registered(name: &str, arity: usize) {
    debug!(
        event = "function_registered",
        function = name,
        arity,
        "Host function registered"
    );
}

/// Log a script calling into a host function
#[inline]
pub fn log_dispatch(name: &str, supplied: i32) {
    trace!(
        event = "dispatch",
        function = name,
        args = supplied,
        "Host function called"
    );
}

/// Log a reference taking or dropping its registry anchor
#[inline]
pub fn log_reference(event: &'static str, key: usize) {
    trace!(event = event, key, "Reference anchor updated");
}

/// Log a runtime failure handed to the logging error handler
pub fn log_runtime_error(status: &str, message: &str) {
    error!(
        event = "runtime_error",
        status,
        error = message,
        "Runtime error occurred"
    );
}

/// Log an explicit collection cycle
pub fn log_gc_complete(duration_us: u64, before_bytes: usize, after_bytes: usize) {
    debug!(
        event = "gc_complete",
        duration_us,
        before_bytes,
        after_bytes,
        "Garbage collection cycle complete"
    );
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            let elapsed = self.start.elapsed();
            debug!(
                operation = self.operation,
                duration_us = elapsed.as_micros() as u64,
                "operation completed"
            );
        }
    }
}
