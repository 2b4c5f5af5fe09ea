//! RL schedule - configuration and learning-rate scheduling for PPO-style training
//!
//! Two small pieces used by a reinforcement-learning training loop:
//!
//! - **Config**: loads a YAML run configuration and derives `NUM_UPDATES` and
//!   `MINIBATCH_SIZE` from the rollout sizes
//! - **Scheduler**: resolves the `SCHEDULER` name to a [`SchedulerKind`] and
//!   builds a `step -> learning rate` closure over the configuration
//!
//! # Example
//!
//! ```ignore
//! use rl_schedule::{Config, training::build_handler};
//!
//! let config = Config::load("configs/ppo.yaml")?;
//! let lr_at = build_handler(&config)?;
//! let lr = lr_at(step);
//! ```

pub mod config;
pub mod training;
pub mod utils;

// Re-export commonly used items
pub use config::{Config, ConfigValue};
pub use training::{build_handler, resolve_name, ScheduleFn, SchedulerKind};

/// Library error types
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Unknown scheduler name: {name}. Available options are: {available}")]
    UnknownScheduler { name: String, available: String },

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Missing required config key: {0}")]
    MissingKey(String),

    #[error("Invalid value for {key}: expected {expected}")]
    InvalidValue { key: String, expected: &'static str },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScheduleError {
    /// Unknown scheduler error listing every registered name
    pub fn unknown_scheduler(name: impl Into<String>) -> Self {
        Self::UnknownScheduler {
            name: name.into(),
            available: SchedulerKind::names().join(", "),
        }
    }
}

impl From<serde_yaml::Error> for ScheduleError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
