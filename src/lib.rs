// Library root module for method-metrics
// This file defines the public API and module structure: key resolution,
// the lazily populated metric cache, the execution recorder and the
// backends it records into
//
// Numan Thabit 2025 Nov

pub mod backend;
pub mod cache;
pub mod config;
pub mod descriptor;
pub mod errors;
pub mod intercept;
pub mod key;
pub mod metrics;
pub mod recorder;

pub use backend::{InMemoryBackend, MetricsBackend, PrometheusBackend};
pub use cache::{MetricCache, MetricPair};
pub use config::MetricsSettings;
pub use descriptor::MetricDescriptor;
pub use errors::MetricsError;
pub use intercept::{begin_timing, CallSite, StartMarker, TimingGuard};
pub use key::{KeyResolver, MetricKey};
pub use recorder::{ExecutionRecorder, MethodSnapshot};
