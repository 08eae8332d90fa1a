// Metric handle cache
// Owns the key -> (timer, counter) mapping. Lookups are concurrent reads;
// creation is serialized behind a single lock with a re-check so every key
// is registered with the backend at most once
//
// Numan Thabit 2025 Nov

use crate::backend::{
    contain, CounterHandle, CounterSpec, MetricsBackend, TimerHandle, TimerSpec,
};
use crate::config::MetricsSettings;
use crate::descriptor::MetricDescriptor;
use crate::errors::MetricsError;
use crate::key::MetricKey;
use crate::metrics::CREATION_FAILURES;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Timer and counter for one key. Always published together.
#[derive(Debug, Clone)]
pub struct MetricPair {
    pub timer: TimerHandle,
    pub counter: CounterHandle,
}

pub struct MetricCache {
    backend: Arc<dyn MetricsBackend>,
    settings: MetricsSettings,
    entries: DashMap<MetricKey, MetricPair>,
    // Held for creation and clear only; never while a DashMap ref is alive
    creation: Mutex<()>,
}

impl MetricCache {
    pub fn new(backend: Arc<dyn MetricsBackend>, settings: MetricsSettings) -> Self {
        Self {
            backend,
            settings,
            entries: DashMap::new(),
            creation: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &MetricsSettings {
        &self.settings
    }

    /// Return the pair for `key`, registering it with the backend on first use.
    ///
    /// `descriptor` is only consulted when the pair is created; later calls
    /// with a different descriptor get the existing pair unchanged. A failed
    /// registration leaves nothing behind, so the next call retries.
    pub fn get_or_create(
        &self,
        key: &MetricKey,
        descriptor: &MetricDescriptor,
    ) -> Result<MetricPair, MetricsError> {
        if let Some(pair) = self.get(key.as_str()) {
            return Ok(pair);
        }

        let _guard = self.creation.lock();
        if let Some(pair) = self.get(key.as_str()) {
            return Ok(pair);
        }

        let pair = self.create(key, descriptor)?;
        self.entries.insert(key.clone(), pair.clone());
        Ok(pair)
    }

    pub fn get(&self, key: &str) -> Option<MetricPair> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point-in-time copy of every cached pair.
    pub fn snapshot_all(&self) -> HashMap<MetricKey, MetricPair> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Drop every cached pair and deregister it from the backend.
    /// Returns the number of keys removed.
    pub fn clear(&self) -> usize {
        let _guard = self.creation.lock();
        // Inserts only happen under `creation`, so this key set is stable
        let keys: Vec<MetricKey> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut removed = 0;
        for key in keys {
            let Some((key, pair)) = self.entries.remove(&key) else {
                continue;
            };
            removed += 1;
            if let Err(err) =
                contain("deregister_timer", || self.backend.deregister_timer(&pair.timer))
            {
                warn!(key = %key, error = %err, "failed to deregister timer");
            }
            if let Err(err) =
                contain("deregister_counter", || self.backend.deregister_counter(&pair.counter))
            {
                warn!(key = %key, error = %err, "failed to deregister counter");
            }
        }
        info!(removed = removed, "metric cache cleared");
        removed
    }

    fn create(
        &self,
        key: &MetricKey,
        descriptor: &MetricDescriptor,
    ) -> Result<MetricPair, MetricsError> {
        let tags = descriptor.resolved_tags(key);
        let timer_spec = TimerSpec {
            name: self.metric_name(key, "duration"),
            description: descriptor.timer_description(key),
            tags: tags.clone(),
            histogram: self.settings.histogram,
            percentiles: self.settings.effective_percentiles().to_vec(),
        };
        let counter_spec = CounterSpec {
            name: self.metric_name(key, "calls"),
            description: descriptor.counter_description(key),
            tags,
        };

        let timer = contain("register_timer", || self.backend.register_timer(&timer_spec))
            .map_err(|err| {
                CREATION_FAILURES.with_label_values(&["timer"]).inc();
                err
            })?;
        let registered =
            contain("register_counter", || self.backend.register_counter(&counter_spec));
        let counter = match registered {
            Ok(counter) => counter,
            Err(err) => {
                CREATION_FAILURES.with_label_values(&["counter"]).inc();
                // Roll back so the retry does not trip over a half-registered pair
                if let Err(rollback) =
                    contain("deregister_timer", || self.backend.deregister_timer(&timer))
                {
                    warn!(key = %key, error = %rollback, "failed to roll back timer registration");
                }
                return Err(err);
            }
        };

        info!(
            key = %key,
            timer = %timer_spec.name,
            counter = %counter_spec.name,
            "created method metrics"
        );
        debug!(key = %key, tags = ?timer_spec.tags, percentiles = ?timer_spec.percentiles, "metric tags");
        Ok(MetricPair { timer, counter })
    }

    fn metric_name(&self, key: &MetricKey, suffix: &str) -> String {
        format!("{}.{}.{}", self.settings.prefix, key, suffix)
    }
}
