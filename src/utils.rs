//! Human-readable rendering of a run configuration
use crate::Config;

/// Renders a configuration for inspection
///
/// Implementations borrow the configuration and must not keep it.
pub trait ConfigPrinter {
    fn print(&self, config: &Config);
}

/// Writes the configuration to the `log` facade at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPrinter;

impl ConfigPrinter for LogPrinter {
    fn print(&self, config: &Config) {
        log::info!("Configuration ({} keys):", config.len());
        for line in config.to_string().lines() {
            log::info!("  {}", line);
        }
    }
}

/// Print a configuration with the default [`LogPrinter`]
pub fn print_config(config: &Config) {
    LogPrinter.print(config);
}
