//! Optional metrics instrumentation for Quire.
//!
//! When the `observe` feature is enabled, store and lock operations emit
//! counters and histograms via the [`metrics`] crate. A downstream
//! application must install a metrics recorder to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a committed append.
///
/// - `quire.append.total` – counter
/// - `quire.append.events_total` – counter of records written
/// - `quire.append.duration_seconds` – histogram
#[inline]
pub fn record_append(duration: std::time::Duration, events: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("quire.append.total").increment(1);
        metrics::counter!("quire.append.events_total").increment(events as u64);
        metrics::histogram!("quire.append.duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, events);
    }
}

/// Record an append rejected by the optimistic version check.
///
/// - `quire.append.conflicts_total` – counter
#[inline]
pub fn record_conflict() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("quire.append.conflicts_total").increment(1);
    }
}

/// Record an append whose expected version is past the stored version.
///
/// - `quire.append.version_ahead_total` – counter
#[inline]
pub fn record_version_ahead() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("quire.append.version_ahead_total").increment(1);
    }
}

/// Record a read stream being opened on an existing log.
///
/// - `quire.read.total` – counter
#[inline]
pub fn record_read() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("quire.read.total").increment(1);
    }
}

/// Record how long a lock acquisition waited.
///
/// - `quire.lock.wait_duration_seconds` – histogram with `mode` label (`read` / `write`)
#[inline]
pub fn record_lock_wait(duration: std::time::Duration, mode: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::histogram!("quire.lock.wait_duration_seconds", "mode" => mode)
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, mode);
    }
}
