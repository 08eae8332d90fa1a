// Prometheus backend
// Registers timers as histograms and call counters as integer counters
// on a caller-owned prometheus registry
//
// Numan Thabit 2025 Nov

use super::{
    CounterHandle, CounterMetric, CounterSpec, DurationTotals, MetricsBackend, TimerHandle,
    TimerMetric, TimerSpec,
};
use crate::errors::MetricsError;
use parking_lot::Mutex;
use prometheus::core::Collector;
use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Seconds; 50us doubling up to ~26s.
const BUCKET_START_SECS: f64 = 0.000_05;
const BUCKET_FACTOR: f64 = 2.0;
const BUCKET_COUNT: usize = 20;

pub struct PrometheusBackend {
    registry: Registry,
    // exported name -> registered collector, for removal
    collectors: Mutex<HashMap<String, Box<dyn Collector>>>,
}

impl PrometheusBackend {
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            collectors: Mutex::new(HashMap::new()),
        }
    }

    /// Registry to hand to an exporter.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register under `name`, which must not be held by another collector of
    /// this backend. Different keys can sanitize to the same name; the
    /// registry alone would accept the second one when its labels differ.
    fn register_collector<C>(&self, name: &str, collector: &C) -> Result<(), MetricsError>
    where
        C: Collector + Clone + 'static,
    {
        let mut collectors = self.collectors.lock();
        if collectors.contains_key(name) {
            return Err(MetricsError::AlreadyRegistered(name.to_string()));
        }
        self.registry
            .register(Box::new(collector.clone()))
            .map_err(|err| match err {
                prometheus::Error::AlreadyReg => MetricsError::AlreadyRegistered(name.to_string()),
                other => MetricsError::from(other),
            })?;
        collectors.insert(name.to_string(), Box::new(collector.clone()));
        Ok(())
    }

    fn unregister(&self, name: &str) -> Result<(), MetricsError> {
        let collector = self.collectors.lock().remove(name);
        match collector {
            Some(collector) => {
                self.registry.unregister(collector)?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Default for PrometheusBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsBackend for PrometheusBackend {
    fn register_timer(&self, spec: &TimerSpec) -> Result<TimerHandle, MetricsError> {
        let name = sanitize_metric_name(&spec.name)?;
        let buckets = if spec.histogram {
            prometheus::exponential_buckets(BUCKET_START_SECS, BUCKET_FACTOR, BUCKET_COUNT)?
        } else {
            // +Inf only: sum and count, no distribution
            vec![f64::INFINITY]
        };
        // Quantiles come from histogram_quantile() over these buckets at query time
        debug!(name = %name, percentiles = ?spec.percentiles, "registering prometheus histogram");

        let opts = HistogramOpts::new(name.clone(), spec.description.clone())
            .const_labels(sanitize_labels(&spec.tags)?)
            .buckets(buckets);
        let histogram = Histogram::with_opts(opts)?;
        self.register_collector(&name, &histogram)?;

        Ok(Arc::new(PrometheusTimer {
            name,
            histogram,
            totals: DurationTotals::default(),
        }))
    }

    fn register_counter(&self, spec: &CounterSpec) -> Result<CounterHandle, MetricsError> {
        let name = sanitize_metric_name(&spec.name)?;
        let opts = Opts::new(name.clone(), spec.description.clone())
            .const_labels(sanitize_labels(&spec.tags)?);
        let counter = IntCounter::with_opts(opts)?;
        self.register_collector(&name, &counter)?;

        Ok(Arc::new(PrometheusCounter { name, counter }))
    }

    fn deregister_timer(&self, timer: &TimerHandle) -> Result<(), MetricsError> {
        self.unregister(timer.name())
    }

    fn deregister_counter(&self, counter: &CounterHandle) -> Result<(), MetricsError> {
        self.unregister(counter.name())
    }
}

struct PrometheusTimer {
    name: String,
    histogram: Histogram,
    totals: DurationTotals,
}

impl fmt::Debug for PrometheusTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusTimer")
            .field("name", &self.name)
            .field("totals", &self.totals)
            .finish()
    }
}

impl TimerMetric for PrometheusTimer {
    fn name(&self) -> &str {
        &self.name
    }

    fn record(&self, duration_nanos: u64) -> Result<(), MetricsError> {
        self.histogram.observe(duration_nanos as f64 / 1e9);
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

struct PrometheusCounter {
    name: String,
    counter: IntCounter,
}

impl fmt::Debug for PrometheusCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusCounter")
            .field("name", &self.name)
            .field("value", &self.counter.get())
            .finish()
    }
}

impl CounterMetric for PrometheusCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn increment(&self) -> Result<(), MetricsError> {
        self.counter.inc();
        Ok(())
    }

    fn count(&self) -> u64 {
        self.counter.get()
    }
}

/// Map a dotted metric name onto the prometheus charset `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn sanitize_metric_name(raw: &str) -> Result<String, MetricsError> {
    sanitize(raw, true).ok_or_else(|| MetricsError::InvalidName(raw.to_string()))
}

fn sanitize_labels(tags: &BTreeMap<String, String>) -> Result<HashMap<String, String>, MetricsError> {
    let mut labels = HashMap::with_capacity(tags.len());
    for (name, value) in tags {
        let label = sanitize(name, false)
            .filter(|l| !l.starts_with("__"))
            .ok_or_else(|| MetricsError::InvalidName(name.clone()))?;
        if labels.contains_key(&label) {
            return Err(MetricsError::InvalidName(format!(
                "{name} collides with another tag as label {label}"
            )));
        }
        labels.insert(label, value.clone());
    }
    Ok(labels)
}

fn sanitize(raw: &str, allow_colon: bool) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let mut out: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || (allow_colon && c == ':') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    Some(out)
}
