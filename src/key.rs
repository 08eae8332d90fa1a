// Metric key resolution
// Derives the aggregation identity for an instrumented call site from an
// optional explicit name, falling back to `<owner>.<operation>`
//
// Numan Thabit 2025 Nov

use serde::{Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Owner label used when neither a concrete nor a declaring type is known.
pub const UNKNOWN_OWNER: &str = "unknown";

/// Immutable, non-empty identifier under which a timer/counter pair is kept.
///
/// Cloning is cheap; the string is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey(Arc<str>);

impl MetricKey {
    /// Wrap a raw key. Returns `None` for an empty string.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let raw = raw.as_ref();
        if raw.is_empty() {
            None
        } else {
            Some(Self(Arc::from(raw)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Owner part of the key: everything before the last `.`.
    pub fn owner_label(&self) -> &str {
        match self.0.rfind('.') {
            Some(idx) => &self.0[..idx],
            None => UNKNOWN_OWNER,
        }
    }

    /// Operation part of the key: everything after the last `.`.
    pub fn operation_label(&self) -> &str {
        match self.0.rfind('.') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for MetricKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl Borrow<str> for MetricKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for MetricKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Resolves call sites to metric keys. Pure and total.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyResolver;

impl KeyResolver {
    pub fn new() -> Self {
        Self
    }

    /// A non-empty explicit name wins verbatim; otherwise `owner.operation`.
    pub fn resolve(
        &self,
        explicit_name: Option<&str>,
        owner_label: &str,
        operation_label: &str,
    ) -> MetricKey {
        if let Some(key) = explicit_name.and_then(|name| MetricKey::new(name)) {
            return key;
        }
        let owner = if owner_label.is_empty() {
            UNKNOWN_OWNER
        } else {
            owner_label
        };
        // Always contains '.', so never empty
        MetricKey(Arc::from(format!("{owner}.{operation_label}")))
    }

    /// Pick the label a call is attributed to: the concrete runtime type when
    /// the boundary knows it, else the declaring type, else [`UNKNOWN_OWNER`].
    pub fn owner_label<'a>(
        &self,
        concrete_owner: Option<&'a str>,
        declaring_owner: Option<&'a str>,
    ) -> &'a str {
        concrete_owner
            .filter(|s| !s.is_empty())
            .or(declaring_owner.filter(|s| !s.is_empty()))
            .unwrap_or(UNKNOWN_OWNER)
    }
}

/// Short type label for `T`: the outer module path is dropped, so
/// `billing::service::InvoiceService` becomes `InvoiceService`.
pub fn owner_of<T: ?Sized>() -> &'static str {
    short_type_name(std::any::type_name::<T>())
}

fn short_type_name(full: &'static str) -> &'static str {
    let head_end = full.find('<').unwrap_or(full.len());
    let start = full[..head_end].rfind("::").map(|i| i + 2).unwrap_or(0);
    &full[start..]
}
