// In-memory backend
// Keeps timers and counters in process memory with a log of every
// registration. Useful for embedding without an exporter and for tests
//
// Numan Thabit 2025 Nov

use super::{
    CounterHandle, CounterMetric, CounterSpec, DurationTotals, MetricsBackend, TimerHandle,
    TimerMetric, TimerSpec,
};
use crate::errors::MetricsError;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    Timer(TimerSpec),
    Counter(CounterSpec),
}

impl Registration {
    pub fn name(&self) -> &str {
        match self {
            Registration::Timer(spec) => &spec.name,
            Registration::Counter(spec) => &spec.name,
        }
    }
}

#[derive(Default)]
struct Inner {
    live: HashSet<String>,
    log: Vec<Registration>,
}

/// Backend that rejects duplicate live names, like a real registry would.
#[derive(Default)]
pub struct InMemoryBackend {
    inner: Mutex<Inner>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every successful registration, oldest first. Deregistration does not
    /// remove entries.
    pub fn registrations(&self) -> Vec<Registration> {
        self.inner.lock().log.clone()
    }

    pub fn registration_count(&self, name: &str) -> usize {
        self.inner
            .lock()
            .log
            .iter()
            .filter(|r| r.name() == name)
            .count()
    }

    pub fn is_live(&self, name: &str) -> bool {
        self.inner.lock().live.contains(name)
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().live.len()
    }

    fn claim(&self, name: &str, registration: Registration) -> Result<(), MetricsError> {
        if name.is_empty() {
            return Err(MetricsError::InvalidName(name.to_string()));
        }
        let mut inner = self.inner.lock();
        if !inner.live.insert(name.to_string()) {
            return Err(MetricsError::AlreadyRegistered(name.to_string()));
        }
        inner.log.push(registration);
        Ok(())
    }
}

impl MetricsBackend for InMemoryBackend {
    fn register_timer(&self, spec: &TimerSpec) -> Result<TimerHandle, MetricsError> {
        self.claim(&spec.name, Registration::Timer(spec.clone()))?;
        Ok(Arc::new(MemoryTimer {
            name: spec.name.clone(),
            totals: DurationTotals::default(),
        }))
    }

    fn register_counter(&self, spec: &CounterSpec) -> Result<CounterHandle, MetricsError> {
        self.claim(&spec.name, Registration::Counter(spec.clone()))?;
        Ok(Arc::new(MemoryCounter {
            name: spec.name.clone(),
            value: AtomicU64::new(0),
        }))
    }

    fn deregister_timer(&self, timer: &TimerHandle) -> Result<(), MetricsError> {
        self.inner.lock().live.remove(timer.name());
        Ok(())
    }

    fn deregister_counter(&self, counter: &CounterHandle) -> Result<(), MetricsError> {
        self.inner.lock().live.remove(counter.name());
        Ok(())
    }
}

#[derive(Debug)]
struct MemoryTimer {
    name: String,
    totals: DurationTotals,
}

impl TimerMetric for MemoryTimer {
    fn name(&self) -> &str {
        &self.name
    }

    fn record(&self, duration_nanos: u64) -> Result<(), MetricsError> {
        self.totals.observe(duration_nanos);
        Ok(())
    }

    fn count(&self) -> u64 {
        self.totals.count()
    }

    fn total_nanos(&self) -> u64 {
        self.totals.total_nanos()
    }

    fn max_nanos(&self) -> u64 {
        self.totals.max_nanos()
    }
}

#[derive(Debug)]
struct MemoryCounter {
    name: String,
    value: AtomicU64,
}

impl CounterMetric for MemoryCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn increment(&self) -> Result<(), MetricsError> {
        self.value.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn count(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}
