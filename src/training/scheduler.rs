//! Named learning rate schedules
//!
//! Two schedules are registered, selected by the `SCHEDULER` config key:
//! - `LinearLR`: linear decay from `LR` to zero over `NUM_UPDATES` updates
//! - `CosineAnnealingLR`: cosine annealing from `LR` to `MIN_LR`, restarting every `T_MAX` steps
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::keys;
use crate::{Config, Result, ScheduleError};

/// Learning rate as a function of the optimizer step count
pub type ScheduleFn = Box<dyn Fn(u64) -> f64 + Send + Sync>;

/// Registered scheduling strategies
///
/// The canonical name of each kind is its identifier, matched case-sensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulerKind {
    LinearLR,
    CosineAnnealingLR,
}

impl SchedulerKind {
    /// Every registered kind
    pub const ALL: [SchedulerKind; 2] = [SchedulerKind::LinearLR, SchedulerKind::CosineAnnealingLR];

    /// Canonical name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LinearLR => "LinearLR",
            Self::CosineAnnealingLR => "CosineAnnealingLR",
        }
    }

    /// Canonical names of every registered kind
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|kind| kind.as_str()).collect()
    }

    /// Evaluate this schedule at `count`
    pub fn schedule(self, count: u64, config: &Config) -> f64 {
        match self {
            Self::LinearLR => linear_schedule(count, config),
            Self::CosineAnnealingLR => cosine_annealing_schedule(count, config),
        }
    }

    /// Check that `config` gives this schedule finite numbers and non-zero divisors
    pub fn validate(self, config: &Config) -> Result<()> {
        match self {
            Self::LinearLR => LinearParams::from_config(config)?.validate(),
            Self::CosineAnnealingLR => CosineParams::from_config(config)?.validate(),
        }
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulerKind {
    type Err = ScheduleError;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| ScheduleError::unknown_scheduler(name))
    }
}

/// Resolve a scheduler name to its kind
///
/// # Arguments
/// * `name` - Exact, case-sensitive scheduler name, e.g. `"LinearLR"`
///
/// # Returns
/// The matching kind, or `UnknownScheduler` listing the valid names
pub fn resolve_name(name: &str) -> Result<SchedulerKind> {
    name.parse()
}

/// Build the learning rate function selected by `config["SCHEDULER"]`
///
/// The strategy's parameters are checked up front, so a zero `T_MAX`,
/// `NUM_MINIBATCHES` or `NUM_UPDATES` fails here instead of producing
/// non-finite rates during training. The returned closure owns a copy of
/// `config`.
pub fn build_handler(config: &Config) -> Result<ScheduleFn> {
    let kind = resolve_name(config.get_str(keys::SCHEDULER)?)?;
    kind.validate(config)?;

    log::info!("Using {} learning rate schedule", kind);

    let config = config.clone();
    Ok(Box::new(move |count| kind.schedule(count, &config)))
}

/// Linear decay parameters, read with defaults for missing keys
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearParams {
    pub num_minibatches: f64,
    pub update_epochs: f64,
    pub num_updates: f64,
    pub lr: f64,
}

impl LinearParams {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            num_minibatches: config.get_f64_or(keys::NUM_MINIBATCHES, 1.0)?,
            update_epochs: config.get_f64_or(keys::UPDATE_EPOCHS, 1.0)?,
            num_updates: config.get_f64_or(keys::NUM_UPDATES, 1.0)?,
            lr: config.get_f64_or(keys::LR, 1.0)?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        require_finite(keys::LR, self.lr)?;
        require_finite(keys::UPDATE_EPOCHS, self.update_epochs)?;
        require_nonzero(keys::NUM_MINIBATCHES, self.num_minibatches)?;
        require_nonzero(keys::NUM_UPDATES, self.num_updates)
    }

    /// `LR * (1 - floor(count / NUM_MINIBATCHES) * UPDATE_EPOCHS / NUM_UPDATES)`
    pub fn lr_at(&self, count: u64) -> f64 {
        let updates_done = (count as f64 / self.num_minibatches).floor();
        let fraction = 1.0 - (updates_done * self.update_epochs) / self.num_updates;
        self.lr * fraction
    }
}

/// Cosine annealing parameters, read with defaults for missing keys
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CosineParams {
    /// Peak learning rate (eta_max)
    pub lr: f64,
    /// Floor learning rate (eta_min)
    pub min_lr: f64,
    /// Steps per cosine cycle
    pub t_max: f64,
}

impl CosineParams {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            lr: config.get_f64_or(keys::LR, 1.0)?,
            min_lr: config.get_f64_or(keys::MIN_LR, 0.0)?,
            t_max: config.get_f64_or(keys::T_MAX, 100.0)?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        require_finite(keys::LR, self.lr)?;
        require_finite(keys::MIN_LR, self.min_lr)?;
        require_nonzero(keys::T_MAX, self.t_max)
    }

    /// `MIN_LR + 0.5 * (LR - MIN_LR) * (1 + cos(pi * (count mod T_MAX) / T_MAX))`
    pub fn lr_at(&self, count: u64) -> f64 {
        let phase = floor_mod(count as f64, self.t_max) / self.t_max;
        let cosine_factor = 0.5 * (1.0 + (phase * PI).cos());
        self.min_lr + (self.lr - self.min_lr) * cosine_factor
    }
}

/// Linear decay schedule
///
/// Missing keys fall back to `NUM_MINIBATCHES=1`, `UPDATE_EPOCHS=1`,
/// `NUM_UPDATES=1`, `LR=1.0`. The result is not clamped and goes negative
/// past the last update. Returns NaN when one of those keys is not numeric.
pub fn linear_schedule(count: u64, config: &Config) -> f64 {
    match LinearParams::from_config(config) {
        Ok(params) => params.lr_at(count),
        Err(_) => f64::NAN,
    }
}

/// Cosine annealing schedule with restarts every `T_MAX` steps
///
/// Missing keys fall back to `LR=1.0`, `MIN_LR=0.0`, `T_MAX=100`. Stays in
/// `[MIN_LR, LR]` when `MIN_LR <= LR`. Returns NaN when one of those keys is
/// not numeric.
pub fn cosine_annealing_schedule(count: u64, config: &Config) -> f64 {
    match CosineParams::from_config(config) {
        Ok(params) => params.lr_at(count),
        Err(_) => f64::NAN,
    }
}

/// Remainder taking the sign of the divisor
fn floor_mod(lhs: f64, rhs: f64) -> f64 {
    let rem = lhs % rhs;
    if rem != 0.0 && (rem < 0.0) != (rhs < 0.0) {
        rem + rhs
    } else {
        rem
    }
}

fn require_finite(key: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ScheduleError::Config(format!("{} must be finite, got {}", key, value)))
    }
}

fn require_nonzero(key: &str, value: f64) -> Result<()> {
    require_finite(key, value)?;
    if value == 0.0 {
        return Err(ScheduleError::Config(format!("{} must be non-zero", key)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigValue;

    fn cosine_config() -> Config {
        [
            (keys::LR, ConfigValue::Float(1.0)),
            (keys::MIN_LR, ConfigValue::Float(0.0)),
            (keys::T_MAX, ConfigValue::Int(100)),
        ]
        .into_iter()
        .collect()
    }

    fn linear_config() -> Config {
        [
            (keys::LR, ConfigValue::Float(1.0)),
            (keys::NUM_MINIBATCHES, ConfigValue::Int(1)),
            (keys::UPDATE_EPOCHS, ConfigValue::Int(1)),
            (keys::NUM_UPDATES, ConfigValue::Int(10)),
        ]
        .into_iter()
        .collect()
    }

    fn with_scheduler(mut config: Config, name: &str) -> Config {
        config.insert(keys::SCHEDULER, name);
        config
    }

    #[test]
    fn test_resolve_name() {
        assert_eq!(resolve_name("CosineAnnealingLR").unwrap(), SchedulerKind::CosineAnnealingLR);
        assert_eq!(resolve_name("LinearLR").unwrap(), SchedulerKind::LinearLR);
    }

    #[test]
    fn test_resolve_name_is_case_sensitive() {
        let err = resolve_name("cosineannealinglr").unwrap_err();

        assert!(matches!(err, ScheduleError::UnknownScheduler { .. }));
        let msg = err.to_string();
        assert!(msg.contains("Unknown scheduler name"), "{}", msg);
        assert!(msg.contains("cosineannealinglr"), "{}", msg);
    }

    #[test]
    fn test_resolve_name_unknown() {
        let err = resolve_name("InvalidScheduler").unwrap_err();

        assert_eq!(
            err.to_string(),
            "Unknown scheduler name: InvalidScheduler. Available options are: LinearLR, CosineAnnealingLR"
        );
    }

    #[test]
    fn test_kind_names_round_trip_through_display() {
        for kind in SchedulerKind::ALL {
            assert_eq!(kind.to_string().parse::<SchedulerKind>().unwrap(), kind);
        }
        assert_eq!(SchedulerKind::names(), vec!["LinearLR", "CosineAnnealingLR"]);
    }

    #[test]
    fn test_cosine_annealing() {
        let config = cosine_config();

        // Start of cycle: lr
        assert!((cosine_annealing_schedule(0, &config) - 1.0).abs() < 1e-6);

        // Halfway: cos(pi / 2) = 0, midpoint between min_lr and lr
        assert!((cosine_annealing_schedule(50, &config) - 0.5).abs() < 1e-6);

        // Just before restart: close to min_lr
        assert!(cosine_annealing_schedule(99, &config) < 1e-3);

        // Restart after t_max steps
        assert!((cosine_annealing_schedule(100, &config) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_is_periodic() {
        let config = cosine_config();

        for count in 0..100 {
            let first = cosine_annealing_schedule(count, &config);
            let later = cosine_annealing_schedule(count + 300, &config);
            assert!((first - later).abs() < 1e-12, "step {}: {} != {}", count, first, later);
        }
    }

    #[test]
    fn test_cosine_stays_in_range() {
        let config: Config = [
            (keys::LR, ConfigValue::Float(3e-4)),
            (keys::MIN_LR, ConfigValue::Float(1e-5)),
            (keys::T_MAX, ConfigValue::Int(37)),
        ]
        .into_iter()
        .collect();

        for count in 0..500 {
            let lr = cosine_annealing_schedule(count, &config);
            assert!(lr <= 3e-4 + 1e-12, "LR {} exceeds max at step {}", lr, count);
            assert!(lr >= 1e-5 - 1e-12, "LR {} below min at step {}", lr, count);
        }
    }

    #[test]
    fn test_cosine_defaults() {
        let config = Config::new();

        assert!((cosine_annealing_schedule(0, &config) - 1.0).abs() < 1e-6);
        // Default T_MAX = 100
        assert!((cosine_annealing_schedule(50, &config) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_negative_t_max_uses_divisor_sign() {
        let mut config = cosine_config();
        config.insert(keys::T_MAX, -100_i64);

        // 30 mod -100 = -70, phase 0.7
        let expected = 0.5 * (1.0 + (0.7 * PI).cos());
        assert!((cosine_annealing_schedule(30, &config) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_linear_schedule() {
        let config = linear_config();

        assert!((linear_schedule(0, &config) - 1.0).abs() < 1e-6);
        assert!((linear_schedule(5, &config) - 0.5).abs() < 1e-6);
        assert!(linear_schedule(10, &config).abs() < 1e-6);
    }

    #[test]
    fn test_linear_counts_whole_updates() {
        // Four minibatches and four epochs per update: 16 optimizer steps per update
        let config: Config = [
            (keys::LR, ConfigValue::Float(2.5e-4)),
            (keys::NUM_MINIBATCHES, ConfigValue::Int(4)),
            (keys::UPDATE_EPOCHS, ConfigValue::Int(4)),
            (keys::NUM_UPDATES, ConfigValue::Int(976)),
        ]
        .into_iter()
        .collect();

        // Steps within the same minibatch group share a rate
        assert_eq!(linear_schedule(1, &config), linear_schedule(3, &config));
        assert!(linear_schedule(4, &config) < linear_schedule(3, &config));

        let expected = 2.5e-4 * (1.0 - (2.0 * 4.0) / 976.0);
        assert!((linear_schedule(9, &config) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_linear_goes_negative_past_horizon() {
        let config = linear_config();

        assert!((linear_schedule(15, &config) + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_linear_defaults() {
        let config = Config::new();

        // All defaults: 1.0 * (1 - count)
        assert!((linear_schedule(0, &config) - 1.0).abs() < 1e-6);
        assert!(linear_schedule(1, &config).abs() < 1e-6);
    }

    #[test]
    fn test_non_numeric_value_yields_nan() {
        let mut config = linear_config();
        config.insert(keys::LR, "fast");

        assert!(linear_schedule(0, &config).is_nan());
        assert!(cosine_annealing_schedule(0, &config).is_nan());
    }

    #[test]
    fn test_handler_matches_cosine_schedule() {
        let config = with_scheduler(cosine_config(), "CosineAnnealingLR");
        let handler = build_handler(&config).unwrap();

        for count in 0..=250 {
            assert_eq!(handler(count), cosine_annealing_schedule(count, &config));
        }
    }

    #[test]
    fn test_handler_matches_linear_schedule() {
        let config = with_scheduler(linear_config(), "LinearLR");
        let handler = build_handler(&config).unwrap();

        for count in 0..=20 {
            assert_eq!(handler(count), linear_schedule(count, &config));
        }
    }

    #[test]
    fn test_handler_unknown_scheduler_lists_options() {
        let config = with_scheduler(cosine_config(), "StepLR");

        let err = build_handler(&config).err().unwrap();
        let msg = err.to_string();
        assert!(msg.contains("Unknown scheduler name: StepLR"), "{}", msg);
        assert!(msg.contains("LinearLR, CosineAnnealingLR"), "{}", msg);
    }

    #[test]
    fn test_handler_requires_scheduler_key() {
        let err = build_handler(&cosine_config()).err().unwrap();
        assert!(matches!(err, ScheduleError::MissingKey(ref key) if key == "SCHEDULER"));

        let mut config = cosine_config();
        config.insert(keys::SCHEDULER, 2_i64);
        let err = build_handler(&config).err().unwrap();
        assert!(matches!(err, ScheduleError::InvalidValue { .. }));
    }

    #[test]
    fn test_handler_rejects_zero_t_max() {
        let mut config = with_scheduler(cosine_config(), "CosineAnnealingLR");
        config.insert(keys::T_MAX, 0_i64);

        let err = build_handler(&config).err().unwrap();
        assert!(err.to_string().contains("T_MAX must be non-zero"));
    }

    #[test]
    fn test_handler_rejects_zero_linear_divisors() {
        let mut config = with_scheduler(linear_config(), "LinearLR");
        config.insert(keys::NUM_UPDATES, 0_i64);
        let err = build_handler(&config).err().unwrap();
        assert!(err.to_string().contains("NUM_UPDATES must be non-zero"));

        let mut config = with_scheduler(linear_config(), "LinearLR");
        config.insert(keys::NUM_MINIBATCHES, 0_i64);
        let err = build_handler(&config).err().unwrap();
        assert!(err.to_string().contains("NUM_MINIBATCHES must be non-zero"));
    }

    #[test]
    fn test_handler_owns_config() {
        let handler = {
            let config = with_scheduler(linear_config(), "LinearLR");
            build_handler(&config).unwrap()
        };

        assert!((handler(5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_handler_shared_across_threads() {
        let config = with_scheduler(cosine_config(), "CosineAnnealingLR");
        let handler = std::sync::Arc::new(build_handler(&config).unwrap());

        let workers: Vec<_> = (0..4u64)
            .map(|i| {
                let handler = std::sync::Arc::clone(&handler);
                std::thread::spawn(move || handler(i * 25))
            })
            .collect();
        let rates: Vec<f64> = workers.into_iter().map(|w| w.join().unwrap()).collect();

        for (i, rate) in rates.iter().enumerate() {
            assert_eq!(*rate, cosine_annealing_schedule(i as u64 * 25, &config));
        }
    }

    #[test]
    fn test_kind_serializes_as_name() {
        let yaml = serde_yaml::to_string(&SchedulerKind::CosineAnnealingLR).unwrap();
        assert_eq!(yaml.trim(), "CosineAnnealingLR");

        let kind: SchedulerKind = serde_yaml::from_str("LinearLR").unwrap();
        assert_eq!(kind, SchedulerKind::LinearLR);
    }
}
