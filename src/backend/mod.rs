// Metrics backend port
// Outbound interface to whatever stores and exports timer/counter values.
// The cache only ever talks to a backend through these traits
//
// Numan Thabit 2025 Nov

pub mod memory;
pub mod prom;

use crate::errors::MetricsError;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub use self::memory::InMemoryBackend;
pub use self::prom::PrometheusBackend;

/// Everything a backend needs to register a duration timer.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerSpec {
    pub name: String,
    pub description: String,
    pub tags: BTreeMap<String, String>,
    pub histogram: bool,
    pub percentiles: Vec<f64>,
}

/// Everything a backend needs to register an invocation counter.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterSpec {
    pub name: String,
    pub description: String,
    pub tags: BTreeMap<String, String>,
}

/// Backend-owned duration recorder.
pub trait TimerMetric: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
    fn record(&self, duration_nanos: u64) -> Result<(), MetricsError>;
    fn count(&self) -> u64;
    fn total_nanos(&self) -> u64;
    fn max_nanos(&self) -> u64;
}

/// Backend-owned call counter.
pub trait CounterMetric: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
    fn increment(&self) -> Result<(), MetricsError>;
    fn count(&self) -> u64;
}

pub type TimerHandle = Arc<dyn TimerMetric>;
pub type CounterHandle = Arc<dyn CounterMetric>;

pub trait MetricsBackend: Send + Sync {
    fn register_timer(&self, spec: &TimerSpec) -> Result<TimerHandle, MetricsError>;
    fn register_counter(&self, spec: &CounterSpec) -> Result<CounterHandle, MetricsError>;

    /// Drop a registration. Backends without removal support may keep the
    /// default no-op.
    fn deregister_timer(&self, _timer: &TimerHandle) -> Result<(), MetricsError> {
        Ok(())
    }

    fn deregister_counter(&self, _counter: &CounterHandle) -> Result<(), MetricsError> {
        Ok(())
    }
}

/// Run a call into backend code, turning a panic into [`MetricsError::Backend`].
///
/// Backends are user-implementable; nothing they do may unwind into the
/// instrumented call.
pub(crate) fn contain<T>(
    op: &str,
    f: impl FnOnce() -> Result<T, MetricsError>,
) -> Result<T, MetricsError> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Err(MetricsError::Backend(format!("{op} panicked: {message}")))
    })
}

/// Exact integer totals kept next to a backend timer for the query API.
#[derive(Debug, Default)]
pub(crate) struct DurationTotals {
    count: AtomicU64,
    total_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl DurationTotals {
    pub(crate) fn observe(&self, duration_nanos: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(duration_nanos, Ordering::Relaxed);
        self.max_nanos.fetch_max(duration_nanos, Ordering::Relaxed);
    }

    pub(crate) fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub(crate) fn total_nanos(&self) -> u64 {
        self.total_nanos.load(Ordering::Relaxed)
    }

    pub(crate) fn max_nanos(&self) -> u64 {
        self.max_nanos.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contained_panic_becomes_backend_error() {
        let result: Result<(), MetricsError> = contain("increment", || panic!("sink gone"));
        match result {
            Err(MetricsError::Backend(message)) => {
                assert_eq!(message, "increment panicked: sink gone")
            }
            other => panic!("unexpected {other:?}"),
        }

        let formatted: Result<(), MetricsError> =
            contain("record", || panic!("sink {} gone", 7));
        assert!(matches!(formatted, Err(MetricsError::Backend(m)) if m.ends_with("sink 7 gone")));

        assert_eq!(contain("record", || Ok(3)).unwrap(), 3);
    }
}
