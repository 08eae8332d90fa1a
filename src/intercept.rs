// Interception helpers
// The glue a wrapper uses around an instrumented call: take a start
// marker, run the call, and record on every way out of it, including `?`
// returns, panics and dropped futures
//
// Numan Thabit 2025 Nov

use crate::descriptor::MetricDescriptor;
use crate::key::{owner_of, MetricKey};
use crate::recorder::ExecutionRecorder;
use std::future::Future;
use std::time::Instant;

/// Opaque start timestamp for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct StartMarker(Instant);

impl StartMarker {
    pub fn elapsed_nanos(&self) -> u64 {
        u64::try_from(self.0.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

pub fn begin_timing() -> StartMarker {
    StartMarker(Instant::now())
}

/// What the wrapper knows about the call being instrumented.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallSite<'a> {
    /// Caller-chosen key; shared by every site that uses it
    pub explicit_name: Option<&'a str>,
    /// Runtime type actually handling the call, when the wrapper can see it
    pub concrete_owner: Option<&'a str>,
    /// Statically declared owner (trait or interface name)
    pub declaring_owner: Option<&'a str>,
    pub operation: &'a str,
}

impl<'a> CallSite<'a> {
    pub fn new(operation: &'a str) -> Self {
        Self {
            operation,
            ..Self::default()
        }
    }

    pub fn named(mut self, name: &'a str) -> Self {
        self.explicit_name = Some(name);
        self
    }

    /// Attribute the call to the concrete type `T`.
    pub fn owned_by<T: ?Sized>(mut self) -> Self {
        self.concrete_owner = Some(owner_of::<T>());
        self
    }

    pub fn concrete(mut self, owner: &'a str) -> Self {
        self.concrete_owner = Some(owner);
        self
    }

    pub fn declared_in(mut self, owner: &'a str) -> Self {
        self.declaring_owner = Some(owner);
        self
    }
}

/// Records the guarded call when dropped.
#[must_use = "the call is timed until the guard is dropped"]
pub struct TimingGuard<'r> {
    recorder: &'r ExecutionRecorder,
    key: Option<MetricKey>,
    start: StartMarker,
}

impl TimingGuard<'_> {
    pub fn key(&self) -> Option<&MetricKey> {
        self.key.as_ref()
    }
}

impl Drop for TimingGuard<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.recorder.finish(&key, self.start);
        }
    }
}

impl ExecutionRecorder {
    pub fn resolve_call_site(&self, site: &CallSite<'_>) -> MetricKey {
        let owner = self
            .resolver()
            .owner_label(site.concrete_owner, site.declaring_owner);
        self.resolve_key(site.explicit_name, owner, site.operation)
    }

    /// Record the time elapsed since `start` against `key`.
    pub fn finish(&self, key: &MetricKey, start: StartMarker) {
        self.record(key.as_str(), start.elapsed_nanos());
    }

    /// Resolve the key, make sure its metrics exist and start the clock.
    ///
    /// If metrics could not be created the guard still times the call; the
    /// record is dropped as for any unknown key.
    pub fn enter(&self, site: &CallSite<'_>, descriptor: &MetricDescriptor) -> TimingGuard<'_> {
        let key = if self.is_enabled() {
            let key = self.resolve_call_site(site);
            self.ensure_metrics(&key, descriptor);
            Some(key)
        } else {
            None
        };
        TimingGuard {
            recorder: self,
            key,
            start: begin_timing(),
        }
    }

    /// Run `f` under a [`TimingGuard`]. The result, `Err` included, is
    /// returned untouched.
    pub fn time<T>(
        &self,
        site: &CallSite<'_>,
        descriptor: &MetricDescriptor,
        f: impl FnOnce() -> T,
    ) -> T {
        let _guard = self.enter(site, descriptor);
        f()
    }

    /// Async counterpart of [`ExecutionRecorder::time`]. Dropping the
    /// future before completion still records the elapsed time.
    pub async fn time_async<F: Future>(
        &self,
        site: &CallSite<'_>,
        descriptor: &MetricDescriptor,
        fut: F,
    ) -> F::Output {
        let _guard = self.enter(site, descriptor);
        fut.await
    }
}
