// Configuration management module
// This file handles loading and parsing of the method metrics settings
// from environment variables and an optional settings file
//
// Numan Thabit 2025 Nov

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use tracing::warn;

pub const DEFAULT_PREFIX: &str = "method";
pub const DEFAULT_PERCENTILES: [f64; 3] = [0.5, 0.95, 0.99];

/// Environment variables are read as `METHOD_METRICS_<FIELD>`.
pub const ENV_PREFIX: &str = "METHOD_METRICS";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricsSettings {
    /// Master switch; when off, instrumented calls run without recording
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Prepended to every metric name: `<prefix>.<key>.duration`
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Publish latency distribution buckets for timers
    #[serde(default = "default_true")]
    pub histogram: bool,
    /// Percentiles handed to the backend, each in [0, 1]
    #[serde(default = "default_percentiles", deserialize_with = "deserialize_percentiles")]
    pub percentiles: Vec<f64>,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: default_prefix(),
            histogram: true,
            percentiles: default_percentiles(),
        }
    }
}

impl MetricsSettings {
    pub fn load() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(environment())
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Settings file (any format `config` understands) overlaid by the environment.
    pub fn load_with_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let cfg = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(environment())
            .build()
            .with_context(|| format!("read metrics settings from {}", path.display()))?;
        cfg.try_deserialize()
            .with_context(|| format!("parse metrics settings from {}", path.display()))
    }

    /// Replace the percentile list from a comma-separated string.
    /// Blank input leaves the current list untouched.
    pub fn set_percentiles_from_str(&mut self, raw: &str) {
        if !raw.trim().is_empty() {
            self.percentiles = parse_percentiles(raw);
        }
    }

    /// Percentiles actually sent to the backend; none when histograms are off.
    pub fn effective_percentiles(&self) -> &[f64] {
        if self.histogram {
            &self.percentiles
        } else {
            &[]
        }
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .try_parsing(true)
}

fn default_true() -> bool {
    true
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_percentiles() -> Vec<f64> {
    DEFAULT_PERCENTILES.to_vec()
}

/// Parse `"0.5,0.95,0.99"` into a percentile list.
///
/// All or nothing: a single bad token (non-numeric or outside [0, 1])
/// yields the full default list. Empty tokens are ignored; if nothing is
/// left the default is returned as well.
pub fn parse_percentiles(raw: &str) -> Vec<f64> {
    let tokens: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    validate_all(tokens.iter().map(|t| t.parse::<f64>().ok()))
}

fn validate_all(values: impl Iterator<Item = Option<f64>>) -> Vec<f64> {
    let parsed: Option<Vec<f64>> = values
        .map(|v| v.filter(|p| (0.0..=1.0).contains(p)))
        .collect();
    match parsed {
        Some(list) if !list.is_empty() => list,
        Some(_) => default_percentiles(),
        None => {
            warn!("invalid percentile list; falling back to defaults");
            default_percentiles()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPercentile {
    Number(f64),
    Text(String),
}

impl RawPercentile {
    fn value(&self) -> Option<f64> {
        match self {
            RawPercentile::Number(n) => Some(*n),
            RawPercentile::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPercentiles {
    List(Vec<RawPercentile>),
    One(RawPercentile),
}

fn deserialize_percentiles<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawPercentiles::deserialize(deserializer)?;
    Ok(match raw {
        RawPercentiles::List(items) => validate_all(items.iter().map(RawPercentile::value)),
        RawPercentiles::One(RawPercentile::Text(s)) => parse_percentiles(&s),
        RawPercentiles::One(single) => validate_all(std::iter::once(single.value())),
    })
}
