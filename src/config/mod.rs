//! Alert Configuration Module
//!
//! Every threshold, window and timeout consumed by the core lives here as an
//! operator-tunable TOML value.
//!
//! ## Loading Order
//!
//! 1. `ALERTMATE_CONFIG` environment variable (path to TOML file)
//! 2. `alertmate.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! Library components take their config section explicitly. The binary
//! additionally stores the loaded config process-wide:
//!
//! ```ignore
//! config::init(AlertConfig::load());
//! let window = config::get().trigger.debounce_window();
//! ```

mod alert_config;
pub mod defaults;
pub mod validation;

pub use alert_config::*;

use std::sync::OnceLock;

static ALERT_CONFIG: OnceLock<AlertConfig> = OnceLock::new();

/// Initialize the global configuration. Later calls are ignored.
pub fn init(config: AlertConfig) {
    if ALERT_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get the global configuration, or the built-in defaults if `init()` was never called.
pub fn get() -> &'static AlertConfig {
    ALERT_CONFIG.get_or_init(|| {
        tracing::warn!("config::get() called before config::init(), using defaults");
        AlertConfig::default()
    })
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    ALERT_CONFIG.get().is_some()
}
