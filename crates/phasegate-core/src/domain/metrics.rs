//! Named gate metrics.
//!
//! Gates read metrics only through [`MetricMap::number`] and
//! [`MetricMap::flag`], which resolve absent names to `0.0` / `false`. A
//! missing metric is therefore evaluated as its zero value.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A metric value: numeric or boolean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Flag(bool),
    Number(f64),
}

impl MetricValue {
    /// Zero value of the same kind.
    pub fn zero_like(&self) -> Self {
        match self {
            Self::Flag(_) => Self::Flag(false),
            Self::Number(_) => Self::Number(0.0),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Flag(_) => "boolean",
            Self::Number(_) => "numeric",
        }
    }

    /// Numeric view; booleans map to 1.0 / 0.0.
    pub fn as_number(&self) -> f64 {
        match self {
            Self::Number(n) => *n,
            Self::Flag(true) => 1.0,
            Self::Flag(false) => 0.0,
        }
    }

    /// Boolean view; numbers are true when non-zero.
    pub fn as_flag(&self) -> bool {
        match self {
            Self::Flag(b) => *b,
            Self::Number(n) => *n != 0.0,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{b}"),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n:.2}"),
        }
    }
}

impl From<bool> for MetricValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u32> for MetricValue {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<usize> for MetricValue {
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

/// Ordered map of metric name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricMap(BTreeMap<String, MetricValue>);

impl MetricMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<MetricValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<MetricValue> {
        self.0.get(name).copied()
    }

    /// Numeric value of `name`, or `0.0` when absent.
    pub fn number(&self, name: &str) -> f64 {
        self.get(name).map(|v| v.as_number()).unwrap_or(0.0)
    }

    /// Boolean value of `name`, or `false` when absent.
    pub fn flag(&self, name: &str) -> bool {
        self.get(name).map(|v| v.as_flag()).unwrap_or(false)
    }

    /// Value of `name` resolved against the kind of `like`, defaulting to
    /// the zero value of that kind.
    pub fn resolve(&self, name: &str, like: &MetricValue) -> MetricValue {
        match like {
            MetricValue::Flag(_) => MetricValue::Flag(self.flag(name)),
            MetricValue::Number(_) => MetricValue::Number(self.number(name)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, MetricValue)> for MetricMap {
    fn from_iter<I: IntoIterator<Item = (String, MetricValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
