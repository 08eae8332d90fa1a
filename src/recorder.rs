// Execution recorder
// Resolves keys, makes sure a key's metrics exist and records every
// finished invocation. Also answers read-only queries over the recorded
// values. Nothing in here ever fails the instrumented call
//
// Numan Thabit 2025 Nov

use crate::backend::{contain, CounterHandle, MetricsBackend, TimerHandle};
use crate::cache::{MetricCache, MetricPair};
use crate::config::MetricsSettings;
use crate::descriptor::MetricDescriptor;
use crate::key::{KeyResolver, MetricKey};
use crate::metrics::{RECORDING_FAILURES, UNKNOWN_KEY_RECORDS};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Values derived from a key's timer and counter at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodSnapshot {
    pub key: MetricKey,
    pub calls: u64,
    pub total_time_nanos: u64,
    pub average_time_nanos: f64,
    pub max_time_nanos: u64,
}

impl MethodSnapshot {
    fn from_pair(key: MetricKey, pair: &MetricPair) -> Self {
        let calls = pair.counter.count();
        let total = pair.timer.total_nanos();
        Self {
            key,
            calls,
            total_time_nanos: total,
            average_time_nanos: average(total, calls),
            max_time_nanos: pair.timer.max_nanos(),
        }
    }
}

fn average(total_nanos: u64, calls: u64) -> f64 {
    if calls == 0 {
        0.0
    } else {
        total_nanos as f64 / calls as f64
    }
}

pub struct ExecutionRecorder {
    resolver: KeyResolver,
    cache: Arc<MetricCache>,
}

impl ExecutionRecorder {
    pub fn new(cache: Arc<MetricCache>) -> Self {
        Self {
            resolver: KeyResolver::new(),
            cache,
        }
    }

    pub fn with_backend(backend: Arc<dyn MetricsBackend>, settings: MetricsSettings) -> Self {
        Self::new(Arc::new(MetricCache::new(backend, settings)))
    }

    pub fn cache(&self) -> &Arc<MetricCache> {
        &self.cache
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.settings().enabled
    }

    pub fn resolve_key(
        &self,
        explicit_name: Option<&str>,
        owner_label: &str,
        operation_label: &str,
    ) -> MetricKey {
        self.resolver
            .resolve(explicit_name, owner_label, operation_label)
    }

    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    /// Get or create the pair for `key`. Backend failures are logged and
    /// swallowed; `None` means this invocation goes unrecorded.
    pub fn ensure_metrics(
        &self,
        key: &MetricKey,
        descriptor: &MetricDescriptor,
    ) -> Option<MetricPair> {
        if !self.is_enabled() {
            return None;
        }
        match self.cache.get_or_create(key, descriptor) {
            Ok(pair) => Some(pair),
            Err(err) => {
                warn!(key = %key, error = %err, "failed to create method metrics; will retry on next call");
                None
            }
        }
    }

    /// Count one call and record its duration. Unknown keys are ignored.
    pub fn record(&self, key: &str, duration_nanos: u64) {
        if !self.is_enabled() {
            return;
        }
        let Some(pair) = self.cache.get(key) else {
            UNKNOWN_KEY_RECORDS.inc();
            debug!(key = %key, "no metrics for key; record dropped");
            return;
        };

        if let Err(err) = contain("increment", || pair.counter.increment()) {
            RECORDING_FAILURES.with_label_values(&["counter"]).inc();
            warn!(key = %key, error = %err, "failed to increment call counter");
        }
        if let Err(err) = contain("record", || pair.timer.record(duration_nanos)) {
            RECORDING_FAILURES.with_label_values(&["timer"]).inc();
            warn!(key = %key, error = %err, "failed to record duration");
        }
        debug!(key = %key, duration_nanos = duration_nanos, "recorded execution");
    }

    pub fn get_timer(&self, key: &str) -> Option<TimerHandle> {
        self.cache.get(key).map(|pair| pair.timer)
    }

    pub fn get_counter(&self, key: &str) -> Option<CounterHandle> {
        self.cache.get(key).map(|pair| pair.counter)
    }

    pub fn all_timers(&self) -> HashMap<MetricKey, TimerHandle> {
        self.cache
            .snapshot_all()
            .into_iter()
            .map(|(key, pair)| (key, pair.timer))
            .collect()
    }

    pub fn all_counters(&self) -> HashMap<MetricKey, CounterHandle> {
        self.cache
            .snapshot_all()
            .into_iter()
            .map(|(key, pair)| (key, pair.counter))
            .collect()
    }

    pub fn call_count(&self, key: &str) -> u64 {
        self.cache.get(key).map_or(0, |pair| pair.counter.count())
    }

    pub fn total_time_nanos(&self, key: &str) -> u64 {
        self.cache.get(key).map_or(0, |pair| pair.timer.total_nanos())
    }

    /// Total time divided by call count; 0 when nothing was recorded.
    pub fn average_time_nanos(&self, key: &str) -> f64 {
        self.cache.get(key).map_or(0.0, |pair| {
            average(pair.timer.total_nanos(), pair.counter.count())
        })
    }

    pub fn max_time_nanos(&self, key: &str) -> u64 {
        self.cache.get(key).map_or(0, |pair| pair.timer.max_nanos())
    }

    pub fn snapshot(&self, key: &str) -> Option<MethodSnapshot> {
        let key = MetricKey::new(key)?;
        let pair = self.cache.get(key.as_str())?;
        Some(MethodSnapshot::from_pair(key, &pair))
    }

    /// Snapshots for every known key, sorted by key.
    pub fn snapshot_all(&self) -> Vec<MethodSnapshot> {
        let mut snapshots: Vec<MethodSnapshot> = self
            .cache
            .snapshot_all()
            .into_iter()
            .map(|(key, pair)| MethodSnapshot::from_pair(key, &pair))
            .collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        snapshots
    }

    /// Forget every key. A recording racing with this call may land in a
    /// discarded handle or trigger fresh creation.
    pub fn clear(&self) -> usize {
        self.cache.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;

    fn recorder() -> ExecutionRecorder {
        ExecutionRecorder::with_backend(Arc::new(InMemoryBackend::new()), MetricsSettings::default())
    }

    fn ensure(recorder: &ExecutionRecorder, raw: &str) -> MetricKey {
        let key = MetricKey::new(raw).unwrap();
        recorder.ensure_metrics(&key, &MetricDescriptor::new()).unwrap();
        key
    }

    #[test]
    fn recording_accumulates() {
        let recorder = recorder();
        ensure(&recorder, "K.op");
        recorder.record("K.op", 1000);
        recorder.record("K.op", 2000);
        recorder.record("K.op", 1500);

        assert_eq!(recorder.call_count("K.op"), 3);
        assert_eq!(recorder.total_time_nanos("K.op"), 4500);
        assert_eq!(recorder.average_time_nanos("K.op"), 1500.0);
        assert_eq!(recorder.max_time_nanos("K.op"), 2000);
    }

    #[test]
    fn unknown_key_is_a_no_op() {
        let recorder = recorder();
        recorder.record("no.such.key", 500);

        assert!(recorder.cache().is_empty());
        assert_eq!(recorder.call_count("no.such.key"), 0);
        assert_eq!(recorder.total_time_nanos("no.such.key"), 0);
        assert_eq!(recorder.average_time_nanos("no.such.key"), 0.0);
        assert!(recorder.snapshot("no.such.key").is_none());
        assert!(recorder.snapshot("").is_none());
        assert!(recorder.get_timer("no.such.key").is_none());
        assert!(recorder.get_counter("no.such.key").is_none());
    }

    #[test]
    fn average_is_zero_before_first_call() {
        let recorder = recorder();
        ensure(&recorder, "Idle.op");
        assert_eq!(recorder.average_time_nanos("Idle.op"), 0.0);
        let snapshot = recorder.snapshot("Idle.op").unwrap();
        assert_eq!(snapshot.calls, 0);
        assert_eq!(snapshot.average_time_nanos, 0.0);
    }

    #[test]
    fn clear_resets_state() {
        let recorder = recorder();
        let key = ensure(&recorder, "K.op");
        recorder.record("K.op", 700);
        assert_eq!(recorder.clear(), 1);

        assert!(recorder.snapshot("K.op").is_none());
        assert_eq!(recorder.call_count("K.op"), 0);

        recorder.record("K.op", 700);
        assert_eq!(recorder.call_count("K.op"), 0);

        recorder.ensure_metrics(&key, &MetricDescriptor::new()).unwrap();
        recorder.record("K.op", 300);
        let snapshot = recorder.snapshot("K.op").unwrap();
        assert_eq!(snapshot.calls, 1);
        assert_eq!(snapshot.total_time_nanos, 300);
    }

    #[test]
    fn snapshot_serializes_as_json() {
        let recorder = recorder();
        ensure(&recorder, "test.service.process");
        recorder.record("test.service.process", 10);
        recorder.record("test.service.process", 30);

        let json = serde_json::to_value(recorder.snapshot("test.service.process").unwrap()).unwrap();
        assert_eq!(json["key"], "test.service.process");
        assert_eq!(json["calls"], 2);
        assert_eq!(json["total_time_nanos"], 40);
        assert_eq!(json["average_time_nanos"], 20.0);
        assert_eq!(json["max_time_nanos"], 30);
    }

    #[test]
    fn lists_all_handles_and_sorted_snapshots() {
        let recorder = recorder();
        ensure(&recorder, "b.second");
        ensure(&recorder, "a.first");

        assert_eq!(recorder.all_timers().len(), 2);
        assert_eq!(recorder.all_counters().len(), 2);
        let keys: Vec<String> = recorder
            .snapshot_all()
            .into_iter()
            .map(|s| s.key.to_string())
            .collect();
        assert_eq!(keys, vec!["a.first", "b.second"]);
    }

    #[test]
    fn disabled_recorder_creates_nothing() {
        let settings = MetricsSettings {
            enabled: false,
            ..MetricsSettings::default()
        };
        let backend = Arc::new(InMemoryBackend::new());
        let recorder = ExecutionRecorder::with_backend(backend.clone(), settings);
        let key = recorder.resolve_key(None, "Svc", "run");

        assert!(recorder.ensure_metrics(&key, &MetricDescriptor::new()).is_none());
        recorder.record(key.as_str(), 10);
        assert!(backend.registrations().is_empty());
    }
}
