//! Learning rate scheduling for the training loop
pub mod scheduler;

pub use scheduler::{
    build_handler, cosine_annealing_schedule, linear_schedule, resolve_name, CosineParams,
    LinearParams, ScheduleFn, SchedulerKind,
};
