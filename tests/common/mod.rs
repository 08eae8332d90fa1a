#![allow(dead_code)]

use method_metrics::backend::{
    CounterHandle, CounterMetric, CounterSpec, MetricsBackend, TimerHandle, TimerMetric, TimerSpec,
};
use method_metrics::{InMemoryBackend, MetricsError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// In-memory backend with switchable faults.
#[derive(Default)]
pub struct FaultyBackend {
    pub inner: InMemoryBackend,
    pub failing_registrations: AtomicUsize,
    pub broken_recording: Arc<AtomicBool>,
    pub panicking_registrations: AtomicBool,
    pub panicking_recording: Arc<AtomicBool>,
}

impl FaultyBackend {
    pub fn fail_next_registrations(&self, n: usize) {
        self.failing_registrations.store(n, Ordering::SeqCst);
    }

    pub fn break_recording(&self, broken: bool) {
        self.broken_recording.store(broken, Ordering::SeqCst);
    }

    /// Make registration panic instead of returning an error.
    pub fn panic_on_registration(&self, panicking: bool) {
        self.panicking_registrations.store(panicking, Ordering::SeqCst);
    }

    /// Make every timer and counter handed out so far panic when used.
    pub fn panic_on_recording(&self, panicking: bool) {
        self.panicking_recording.store(panicking, Ordering::SeqCst);
    }

    fn should_fail(&self) -> bool {
        self.failing_registrations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl MetricsBackend for FaultyBackend {
    fn register_timer(&self, spec: &TimerSpec) -> Result<TimerHandle, MetricsError> {
        if self.panicking_registrations.load(Ordering::SeqCst) {
            panic!("registry exploded registering {}", spec.name);
        }
        if self.should_fail() {
            return Err(MetricsError::Backend(format!("rejected {}", spec.name)));
        }
        let inner = self.inner.register_timer(spec)?;
        Ok(Arc::new(FaultyTimer {
            inner,
            broken: self.broken_recording.clone(),
            panicking: self.panicking_recording.clone(),
        }))
    }

    fn register_counter(&self, spec: &CounterSpec) -> Result<CounterHandle, MetricsError> {
        if self.panicking_registrations.load(Ordering::SeqCst) {
            panic!("registry exploded registering {}", spec.name);
        }
        if self.should_fail() {
            return Err(MetricsError::Backend(format!("rejected {}", spec.name)));
        }
        let inner = self.inner.register_counter(spec)?;
        Ok(Arc::new(FaultyCounter {
            inner,
            panicking: self.panicking_recording.clone(),
        }))
    }

    fn deregister_timer(&self, timer: &TimerHandle) -> Result<(), MetricsError> {
        self.inner.deregister_timer(timer)
    }

    fn deregister_counter(&self, counter: &CounterHandle) -> Result<(), MetricsError> {
        self.inner.deregister_counter(counter)
    }
}

#[derive(Debug)]
struct FaultyTimer {
    inner: TimerHandle,
    broken: Arc<AtomicBool>,
    panicking: Arc<AtomicBool>,
}

impl TimerMetric for FaultyTimer {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn record(&self, duration_nanos: u64) -> Result<(), MetricsError> {
        if self.panicking.load(Ordering::SeqCst) {
            panic!("timer sink exploded");
        }
        if self.broken.load(Ordering::SeqCst) {
            return Err(MetricsError::Recording {
                key: self.inner.name().to_string(),
                reason: "sink unavailable".to_string(),
            });
        }
        self.inner.record(duration_nanos)
    }

    fn count(&self) -> u64 {
        self.inner.count()
    }

    fn total_nanos(&self) -> u64 {
        self.inner.total_nanos()
    }

    fn max_nanos(&self) -> u64 {
        self.inner.max_nanos()
    }
}

#[derive(Debug)]
struct FaultyCounter {
    inner: CounterHandle,
    panicking: Arc<AtomicBool>,
}

impl CounterMetric for FaultyCounter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn increment(&self) -> Result<(), MetricsError> {
        if self.panicking.load(Ordering::SeqCst) {
            panic!("counter sink exploded");
        }
        self.inner.increment()
    }

    fn count(&self) -> u64 {
        self.inner.count()
    }
}
