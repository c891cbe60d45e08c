//! Event sinks consumed by the solvers.
//!
//! Solvers report through a capability trait passed explicitly to each
//! long-running call; there is no process-global logger. Callbacks run on
//! solver worker threads and may be invoked concurrently, so sinks must be
//! `Sync` and should return quickly.

/// Severity of a log event.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Identifies which long-running phase a progress event belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProgressStep {
    /// Relaxation iterations.
    Relaxation,
    /// Vertical-edge sweep (`compute_overlaps_y`).
    OverlapsY,
    /// Horizontal-edge sweep (`compute_overlaps_x`).
    OverlapsX,
    /// Calibration measurements.
    Calibration,
    /// Canvas assembly.
    Composite,
}

/// Receives solver diagnostics and progress.
pub trait EventSink: Sync {
    /// Reports an unrecoverable condition inside a solve. The solve
    /// producing it returns a NaN score; the sweep carries on.
    fn fatal(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    fn log(&self, level: LogLevel, message: &str);

    /// Reports `n` of `n_max` units done for `step`.
    fn progress(&self, step: ProgressStep, n: usize, n_max: usize, message: &str);
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn log(&self, _level: LogLevel, _message: &str) {}
    fn progress(&self, _step: ProgressStep, _n: usize, _n_max: usize, _message: &str) {}
}

/// Forwards sink events to the `tracing` ecosystem.
#[cfg(feature = "tracing")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[cfg(feature = "tracing")]
impl EventSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!("{message}"),
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
    }

    fn progress(&self, step: ProgressStep, n: usize, n_max: usize, message: &str) {
        tracing::debug!(?step, n, n_max, "{message}");
    }
}
