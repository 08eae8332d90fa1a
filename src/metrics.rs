// Self-diagnostics module
// Process-level counters describing the health of the instrumentation
// layer itself, registered on the prometheus default registry
//
// Numan Thabit 2025 Nov

use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

pub static CREATION_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "method_metrics_creation_failures_total",
        "timer/counter registrations rejected by the backend",
        &["kind"]
    )
    .unwrap()
});

pub static RECORDING_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "method_metrics_recording_failures_total",
        "duration samples or call increments the backend failed to store",
        &["kind"]
    )
    .unwrap()
});

pub static UNKNOWN_KEY_RECORDS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "method_metrics_unknown_key_records_total",
        "records dropped because no metrics exist for the key"
    )
    .unwrap()
});
