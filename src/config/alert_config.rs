//! Alert Configuration - all trigger thresholds and transport timeouts as TOML values
//!
//! Each section implements `Default` with the values from [`super::defaults`],
//! so running without a config file behaves exactly like the built-in constants.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::transport::mesh::MeshRole;
use crate::types::SubjectInfo;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "ALERTMATE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "alertmate.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AlertConfig {
    /// Identity placed in outbound alerts
    #[serde(default)]
    pub subject: SubjectInfo,

    #[serde(default)]
    pub trigger: TriggerConfig,

    #[serde(default)]
    pub mesh: MeshConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub cloud: CloudConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl AlertConfig {
    /// Load configuration using the standard search order:
    /// 1. `$ALERTMATE_CONFIG`
    /// 2. `./alertmate.toml`
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded alert config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded alert config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load and validate a specific TOML file.
    ///
    /// Unknown keys are logged as warnings (with a suggestion when one is close);
    /// impossible values are returned as [`ConfigError::Validation`].
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all values for internal consistency.
    ///
    /// Rules:
    /// - Intensity threshold must be finite and > 0
    /// - Debounce window must be shorter than the reset window
    /// - Confirm threshold must be >= 1
    /// - Every timeout must be > 0
    /// - Gateway URL must be http(s), cloud URL must be ws(s)
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();
        let t = &self.trigger;

        if !t.intensity_threshold.is_finite() || t.intensity_threshold <= 0.0 {
            errors.push(format!(
                "trigger.intensity_threshold must be a positive number (got {})",
                t.intensity_threshold
            ));
        }
        if t.debounce_window_ms >= t.reset_window_ms {
            errors.push(format!(
                "trigger.debounce_window_ms ({}) must be less than reset_window_ms ({})",
                t.debounce_window_ms, t.reset_window_ms
            ));
        }
        if t.confirm_threshold == 0 {
            errors.push("trigger.confirm_threshold must be >= 1".to_string());
        }

        Self::check_positive(self.mesh.discover_timeout_ms, "mesh.discover_timeout_ms", &mut errors);
        Self::check_positive(self.mesh.attempt_timeout_ms, "mesh.attempt_timeout_ms", &mut errors);
        Self::check_positive(self.gateway.status_timeout_ms, "gateway.status_timeout_ms", &mut errors);
        Self::check_positive(self.gateway.send_timeout_ms, "gateway.send_timeout_ms", &mut errors);
        Self::check_positive(self.cloud.connect_timeout_ms, "cloud.connect_timeout_ms", &mut errors);
        Self::check_positive(self.cloud.send_timeout_ms, "cloud.send_timeout_ms", &mut errors);
        Self::check_positive(self.cloud.reconnect_initial_ms, "cloud.reconnect_initial_ms", &mut errors);
        Self::check_positive(self.dispatch.progress_after_ms, "dispatch.progress_after_ms", &mut errors);

        if self.cloud.reconnect_max_ms < self.cloud.reconnect_initial_ms {
            errors.push(format!(
                "cloud.reconnect_max_ms ({}) must be >= reconnect_initial_ms ({})",
                self.cloud.reconnect_max_ms, self.cloud.reconnect_initial_ms
            ));
        }

        match reqwest::Url::parse(&self.gateway.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(format!(
                "gateway.base_url must use http or https (got '{}')",
                url.scheme()
            )),
            Err(e) => errors.push(format!(
                "gateway.base_url '{}' is not a valid URL: {e}",
                self.gateway.base_url
            )),
        }

        if !(self.cloud.url.starts_with("ws://") || self.cloud.url.starts_with("wss://")) {
            errors.push(format!(
                "cloud.url must start with ws:// or wss:// (got '{}')",
                self.cloud.url
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_positive(value: u64, name: &str, errors: &mut Vec<String>) {
        if value == 0 {
            errors.push(format!("{name} must be > 0"));
        }
    }

    /// Worst-case time for one dispatch to walk every transport.
    pub fn worst_case_dispatch(&self) -> Duration {
        self.mesh.attempt_timeout() + self.gateway.attempt_budget() + self.cloud.send_timeout()
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Trigger
// ============================================================================

/// Shake detection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default = "default_intensity_threshold")]
    pub intensity_threshold: f64,

    #[serde(default = "default_debounce_window_ms")]
    pub debounce_window_ms: u64,

    #[serde(default = "default_reset_window_ms")]
    pub reset_window_ms: u64,

    #[serde(default = "default_confirm_threshold")]
    pub confirm_threshold: u32,

    /// Cadence the sensor driver should deliver samples at
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
}

fn default_intensity_threshold() -> f64 { defaults::INTENSITY_THRESHOLD_G }
fn default_debounce_window_ms() -> u64 { defaults::DEBOUNCE_WINDOW_MS }
fn default_reset_window_ms() -> u64 { defaults::RESET_WINDOW_MS }
fn default_confirm_threshold() -> u32 { defaults::CONFIRM_THRESHOLD }
fn default_sample_interval_ms() -> u64 { defaults::SAMPLE_INTERVAL_MS }

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            intensity_threshold: default_intensity_threshold(),
            debounce_window_ms: default_debounce_window_ms(),
            reset_window_ms: default_reset_window_ms(),
            confirm_threshold: default_confirm_threshold(),
            sample_interval_ms: default_sample_interval_ms(),
        }
    }
}

impl TriggerConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

// ============================================================================
// Mesh
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Which paired peripheral to look for
    #[serde(default)]
    pub role: MeshRole,

    #[serde(default = "default_mesh_discover_timeout_ms")]
    pub discover_timeout_ms: u64,

    /// Outer budget for connect-if-needed plus the write
    #[serde(default = "default_mesh_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

fn default_mesh_discover_timeout_ms() -> u64 { defaults::MESH_DISCOVER_TIMEOUT_MS }
fn default_mesh_attempt_timeout_ms() -> u64 { defaults::MESH_ATTEMPT_TIMEOUT_MS }

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            role: MeshRole::default(),
            discover_timeout_ms: default_mesh_discover_timeout_ms(),
            attempt_timeout_ms: default_mesh_attempt_timeout_ms(),
        }
    }
}

impl MeshConfig {
    pub fn discover_timeout(&self) -> Duration {
        Duration::from_millis(self.discover_timeout_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

// ============================================================================
// Gateway
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,

    #[serde(default = "default_gateway_status_timeout_ms")]
    pub status_timeout_ms: u64,

    #[serde(default = "default_gateway_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// SSID named in "join the rescue network" messages
    #[serde(default = "default_gateway_network_name")]
    pub network_name: String,
}

fn default_gateway_base_url() -> String { defaults::GATEWAY_BASE_URL.to_string() }
fn default_gateway_status_timeout_ms() -> u64 { defaults::GATEWAY_STATUS_TIMEOUT_MS }
fn default_gateway_send_timeout_ms() -> u64 { defaults::GATEWAY_SEND_TIMEOUT_MS }
fn default_gateway_network_name() -> String { defaults::GATEWAY_NETWORK_NAME.to_string() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            status_timeout_ms: default_gateway_status_timeout_ms(),
            send_timeout_ms: default_gateway_send_timeout_ms(),
            network_name: default_gateway_network_name(),
        }
    }
}

impl GatewayConfig {
    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Probe plus send.
    pub fn attempt_budget(&self) -> Duration {
        self.status_timeout() + self.send_timeout()
    }
}

// ============================================================================
// Cloud
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    #[serde(default = "default_cloud_url")]
    pub url: String,

    #[serde(default = "default_cloud_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_cloud_send_timeout_ms")]
    pub send_timeout_ms: u64,

    #[serde(default = "default_cloud_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    #[serde(default = "default_cloud_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    /// 0 = never give up
    #[serde(default = "default_cloud_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

fn default_cloud_url() -> String { defaults::CLOUD_URL.to_string() }
fn default_cloud_connect_timeout_ms() -> u64 { defaults::CLOUD_CONNECT_TIMEOUT_MS }
fn default_cloud_send_timeout_ms() -> u64 { defaults::CLOUD_SEND_TIMEOUT_MS }
fn default_cloud_reconnect_initial_ms() -> u64 { defaults::CLOUD_RECONNECT_INITIAL_MS }
fn default_cloud_reconnect_max_ms() -> u64 { defaults::CLOUD_RECONNECT_MAX_MS }
fn default_cloud_max_reconnect_attempts() -> u32 { defaults::CLOUD_MAX_RECONNECT_ATTEMPTS }

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            url: default_cloud_url(),
            connect_timeout_ms: default_cloud_connect_timeout_ms(),
            send_timeout_ms: default_cloud_send_timeout_ms(),
            reconnect_initial_ms: default_cloud_reconnect_initial_ms(),
            reconnect_max_ms: default_cloud_reconnect_max_ms(),
            max_reconnect_attempts: default_cloud_max_reconnect_attempts(),
        }
    }
}

impl CloudConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Backoff before reconnect attempt `attempt` (1-based), without jitter.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self
            .reconnect_initial_ms
            .saturating_mul(1u64 << exp)
            .min(self.reconnect_max_ms);
        Duration::from_millis(ms)
    }
}

// ============================================================================
// Dispatch
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Emit "still trying" once an attempt runs this long, then again at the same interval
    #[serde(default = "default_progress_after_ms")]
    pub progress_after_ms: u64,
}

fn default_progress_after_ms() -> u64 { defaults::PROGRESS_AFTER_MS }

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            progress_after_ms: default_progress_after_ms(),
        }
    }
}

impl DispatchConfig {
    pub fn progress_after(&self) -> Duration {
        Duration::from_millis(self.progress_after_ms)
    }
}
