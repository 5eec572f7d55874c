//! Access to the host's configuration for engine tunables.
//!
//! The engine never owns its configuration file; the host supplies a [`ConfigSource`]
//! and handles reloading. Every tunable read through [`Config`] has a hardcoded
//! default, so a missing or invalid value is never fatal (it is logged and the
//! default is used).

use core::fmt;
use std::sync::Arc;

use hashbrown::HashMap;

/// Raw configuration lookups, implemented by the host.
///
/// Paths are dot-separated lowercase keys such as `"extension.max-cells"`.
/// A return value of [`None`] means the path is absent or its value could not be
/// interpreted as the requested type; [`Config`] turns both into the caller's default.
pub trait ConfigSource: fmt::Debug + Send + Sync {
    /// Look up an integer value.
    fn int(&self, path: &str) -> Option<i64>;
    /// Look up a floating-point value.
    fn float(&self, path: &str) -> Option<f64>;
    /// Look up a boolean value.
    fn bool(&self, path: &str) -> Option<bool>;
}

/// A [`ConfigSource`] together with the default-and-warn policy.
///
/// Cheap to clone; clones share the underlying source.
#[derive(Clone, Debug)]
pub struct Config {
    source: Arc<dyn ConfigSource>,
}

impl Config {
    /// Wraps the given source.
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self { source }
    }

    /// Configuration that answers every lookup with the hardcoded default.
    pub fn defaults() -> Self {
        Self::new(Arc::new(Defaults))
    }

    /// Reads an integer tunable, falling back to `default` with a logged warning if
    /// the value is absent or out of the requested range.
    pub fn int(&self, path: &str, default: i64) -> i64 {
        match self.source.int(path) {
            Some(value) => value,
            None => {
                log::warn!("config: {path} missing or invalid; using default {default}");
                default
            }
        }
    }

    /// Reads an integer tunable and converts it to `usize`, treating negative values
    /// as invalid.
    pub fn usize(&self, path: &str, default: usize) -> usize {
        match self.source.int(path).and_then(|v| usize::try_from(v).ok()) {
            Some(value) => value,
            None => {
                log::warn!("config: {path} missing or invalid; using default {default}");
                default
            }
        }
    }

    /// Reads a floating-point tunable, falling back to `default` with a logged
    /// warning. Non-finite values count as invalid.
    pub fn float(&self, path: &str, default: f64) -> f64 {
        match self.source.float(path).filter(|v| v.is_finite()) {
            Some(value) => value,
            None => {
                log::warn!("config: {path} missing or invalid; using default {default}");
                default
            }
        }
    }

    /// Reads a boolean tunable, falling back to `default` with a logged warning.
    pub fn bool(&self, path: &str, default: bool) -> bool {
        match self.source.bool(path) {
            Some(value) => value,
            None => {
                log::warn!("config: {path} missing or invalid; using default {default}");
                default
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

/// A [`ConfigSource`] with no values; every lookup falls back to its default.
#[derive(Clone, Copy, Debug, Default)]
#[allow(clippy::exhaustive_structs)]
pub struct Defaults;

impl ConfigSource for Defaults {
    fn int(&self, _path: &str) -> Option<i64> {
        None
    }
    fn float(&self, _path: &str) -> Option<f64> {
        None
    }
    fn bool(&self, _path: &str) -> Option<bool> {
        None
    }
}

/// A [`ConfigSource`] backed by an in-memory table; useful for tests and embedding.
#[derive(Clone, Debug, Default)]
pub struct TableConfig {
    values: HashMap<String, Value>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl TableConfig {
    /// Constructs an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an integer value, replacing any existing value at `path`.
    #[must_use]
    pub fn with_int(mut self, path: &str, value: i64) -> Self {
        self.values.insert(path.to_owned(), Value::Int(value));
        self
    }

    /// Sets a floating-point value, replacing any existing value at `path`.
    #[must_use]
    pub fn with_float(mut self, path: &str, value: f64) -> Self {
        self.values.insert(path.to_owned(), Value::Float(value));
        self
    }

    /// Sets a boolean value, replacing any existing value at `path`.
    #[must_use]
    pub fn with_bool(mut self, path: &str, value: bool) -> Self {
        self.values.insert(path.to_owned(), Value::Bool(value));
        self
    }

    /// Wraps this table in a [`Config`].
    pub fn build(self) -> Config {
        Config::new(Arc::new(self))
    }
}

impl ConfigSource for TableConfig {
    fn int(&self, path: &str) -> Option<i64> {
        match self.values.get(path) {
            Some(&Value::Int(v)) => Some(v),
            _ => None,
        }
    }
    fn float(&self, path: &str) -> Option<f64> {
        match self.values.get(path) {
            Some(&Value::Float(v)) => Some(v),
            // Integer values are acceptable where floats are expected.
            Some(&Value::Int(v)) => Some(v as f64),
            _ => None,
        }
    }
    fn bool(&self, path: &str) -> Option<bool> {
        match self.values.get(path) {
            Some(&Value::Bool(v)) => Some(v),
            _ => None,
        }
    }
}
