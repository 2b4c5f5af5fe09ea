//! Preview the learning rate schedule a run configuration produces
//!
//! Usage: cargo run --example schedule_preview -- [config.yaml] [points]
use rl_schedule::config::keys;
use rl_schedule::training::build_handler;
use rl_schedule::Config;

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "configs/ppo_cartpole.yaml".to_string());
    let points: u64 = match args.next() {
        Some(arg) => arg.parse()?,
        None => 10,
    };

    let config = Config::load(&config_path)?;
    let lr_at = build_handler(&config)?;

    // One optimizer step per minibatch per epoch
    let num_updates = config.get_i64(keys::NUM_UPDATES)?.max(1) as u64;
    let steps_per_update = config.get_i64_or(keys::NUM_MINIBATCHES, 1)?.max(1) as u64
        * config.get_i64_or(keys::UPDATE_EPOCHS, 1)?.max(1) as u64;
    let total_steps = num_updates * steps_per_update;

    log::info!("=== Learning rate schedule ({} optimizer steps) ===", total_steps);
    let stride = (total_steps / points.max(1)).max(1);
    for step in (0..=total_steps).step_by(stride as usize) {
        log::info!("  step {:>8}: lr = {:.6e}", step, lr_at(step));
    }

    Ok(())
}
