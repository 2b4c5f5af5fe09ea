//! Run configuration loaded from a YAML document
//!
//! A flat, ordered mapping of upper-case keys to scalar values, enriched on load
//! with the two values the training loop derives from the rollout sizes.
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::utils::{ConfigPrinter, LogPrinter};
use crate::{Result, ScheduleError};

/// Well-known configuration keys
pub mod keys {
    pub const TOTAL_TIMESTEPS: &str = "TOTAL_TIMESTEPS";
    pub const NUM_STEPS: &str = "NUM_STEPS";
    pub const NUM_ENVS: &str = "NUM_ENVS";
    pub const NUM_MINIBATCHES: &str = "NUM_MINIBATCHES";
    pub const UPDATE_EPOCHS: &str = "UPDATE_EPOCHS";
    pub const SCHEDULER: &str = "SCHEDULER";
    pub const LR: &str = "LR";
    pub const MIN_LR: &str = "MIN_LR";
    pub const T_MAX: &str = "T_MAX";

    /// Derived by [`Config::with_derived_fields`]
    pub const NUM_UPDATES: &str = "NUM_UPDATES";
    /// Derived by [`Config::with_derived_fields`]
    pub const MINIBATCH_SIZE: &str = "MINIBATCH_SIZE";
}

/// A scalar configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ConfigValue {
    fn from_yaml(key: &str, value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(Self::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Self::Int(i)),
                None => n.as_f64().map(Self::Float).ok_or_else(|| {
                    ScheduleError::ConfigParse(format!("{}: unrepresentable number {}", key, n))
                }),
            },
            Value::String(s) => Ok(Self::Str(s)),
            other => Err(ScheduleError::ConfigParse(format!(
                "{}: expected a scalar value, found {:?}",
                key, other
            ))),
        }
    }

    /// Integer view. Floats with no fractional part count as integers.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int(i) => Some(i),
            Self::Float(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                Some(f as i64)
            }
            _ => None,
        }
    }

    /// Numeric view, widening integers
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Int(i) => Some(i as f64),
            Self::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{:?}", x),
            Self::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

/// Training run configuration
///
/// Keys keep the order they had in the source document. Values are only
/// added by [`Config::insert`] and the derivation step; nothing is removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    entries: Vec<(String, ConfigValue)>,
}

impl Config {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration file, derive `NUM_UPDATES` and `MINIBATCH_SIZE`
    /// and log the result
    ///
    /// # Arguments
    /// * `path` - Path to the YAML document
    ///
    /// # Returns
    /// The enriched configuration
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_printer(path, &LogPrinter)
    }

    /// Same as [`Config::load`], rendering the result through `printer`
    pub fn load_with_printer<P: AsRef<Path>>(path: P, printer: &dyn ConfigPrinter) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading config from: {:?}", path);

        let config = {
            let file = File::open(path)?;
            Self::from_reader(BufReader::new(file))?
        };
        let config = config.with_derived_fields()?;

        printer.print(&config);
        Ok(config)
    }

    /// Parse a YAML document without deriving any fields
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mapping: Mapping = serde_yaml::from_str(yaml)?;
        Self::from_mapping(mapping)
    }

    /// Parse a YAML document from a reader without deriving any fields
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mapping: Mapping = serde_yaml::from_reader(reader)?;
        Self::from_mapping(mapping)
    }

    fn from_mapping(mapping: Mapping) -> Result<Self> {
        let mut config = Self::new();
        for (key, value) in mapping {
            let key = match key {
                Value::String(key) => key,
                other => {
                    return Err(ScheduleError::ConfigParse(format!(
                        "config keys must be strings, found {:?}",
                        other
                    )))
                }
            };
            let value = ConfigValue::from_yaml(&key, value)?;
            log::debug!("Parsed {} = {}", key, value);
            config.insert(key, value);
        }
        Ok(config)
    }

    /// Add `NUM_UPDATES` and `MINIBATCH_SIZE`
    ///
    /// `NUM_UPDATES = TOTAL_TIMESTEPS // NUM_STEPS // NUM_ENVS` and
    /// `MINIBATCH_SIZE = NUM_ENVS * NUM_STEPS // NUM_MINIBATCHES`, both with
    /// floor division.
    pub fn with_derived_fields(mut self) -> Result<Self> {
        let total_timesteps = self.get_i64(keys::TOTAL_TIMESTEPS)?;
        let num_steps = self.get_i64(keys::NUM_STEPS)?;
        let num_envs = self.get_i64(keys::NUM_ENVS)?;
        let num_minibatches = self.get_i64(keys::NUM_MINIBATCHES)?;

        let per_step = floor_div(total_timesteps, num_steps, keys::NUM_STEPS)?;
        let num_updates = floor_div(per_step, num_envs, keys::NUM_ENVS)?;

        let batch_size = num_envs.checked_mul(num_steps).ok_or_else(|| {
            ScheduleError::Config(format!(
                "{} * {} overflows ({} * {})",
                keys::NUM_ENVS,
                keys::NUM_STEPS,
                num_envs,
                num_steps
            ))
        })?;
        let minibatch_size = floor_div(batch_size, num_minibatches, keys::NUM_MINIBATCHES)?;

        log::info!(
            "Derived {}={}, {}={}",
            keys::NUM_UPDATES,
            num_updates,
            keys::MINIBATCH_SIZE,
            minibatch_size
        );

        self.insert(keys::NUM_UPDATES, ConfigValue::Int(num_updates));
        self.insert(keys::MINIBATCH_SIZE, ConfigValue::Int(minibatch_size));
        Ok(self)
    }

    /// Insert or replace a value. New keys go to the end.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Required integer value
    pub fn get_i64(&self, key: &str) -> Result<i64> {
        let value = self.require(key)?;
        value.as_i64().ok_or_else(|| invalid(key, "an integer"))
    }

    /// Required numeric value
    pub fn get_f64(&self, key: &str) -> Result<f64> {
        let value = self.require(key)?;
        value.as_f64().ok_or_else(|| invalid(key, "a number"))
    }

    /// Required string value
    pub fn get_str(&self, key: &str) -> Result<&str> {
        let value = self.require(key)?;
        value.as_str().ok_or_else(|| invalid(key, "a string"))
    }

    /// Integer value, or `default` when the key is absent
    pub fn get_i64_or(&self, key: &str, default: i64) -> Result<i64> {
        match self.get(key) {
            Some(value) => value.as_i64().ok_or_else(|| invalid(key, "an integer")),
            None => Ok(default),
        }
    }

    /// Numeric value, or `default` when the key is absent
    pub fn get_f64_or(&self, key: &str, default: f64) -> Result<f64> {
        match self.get(key) {
            Some(value) => value.as_f64().ok_or_else(|| invalid(key, "a number")),
            None => Ok(default),
        }
    }

    /// Entries in document order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize back to YAML, keeping key order
    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn require(&self, key: &str) -> Result<&ConfigValue> {
        self.get(key)
            .ok_or_else(|| ScheduleError::MissingKey(key.to_string()))
    }
}

fn invalid(key: &str, expected: &'static str) -> ScheduleError {
    ScheduleError::InvalidValue {
        key: key.to_string(),
        expected,
    }
}

/// Integer division rounding toward negative infinity
fn floor_div(lhs: i64, rhs: i64, divisor_key: &str) -> Result<i64> {
    if rhs == 0 {
        return Err(ScheduleError::Config(format!(
            "{} must be non-zero",
            divisor_key
        )));
    }
    let quotient = lhs.checked_div(rhs).ok_or_else(|| {
        ScheduleError::Config(format!("{} // {} overflows", lhs, rhs))
    })?;
    if lhs % rhs != 0 && ((lhs < 0) != (rhs < 0)) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

impl<K: Into<String>, V: Into<ConfigValue>> FromIterator<(K, V)> for Config {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut config = Self::new();
        for (key, value) in iter {
            config.insert(key, value);
        }
        config
    }
}

impl Serialize for Config {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(k, v)| (k, v)))
    }
}

/// One `KEY: value` line per entry, keys padded to the longest
impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.entries.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in &self.entries {
            writeln!(f, "{:<width$} : {}", key, value, width = width)?;
        }
        Ok(())
    }
}
