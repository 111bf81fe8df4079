//! System-wide default constants.
//!
//! Every tunable in `AlertConfig` falls back to one of these. The trigger
//! values were chosen empirically and are kept as tunable starting points.

// ============================================================================
// Trigger Detection
// ============================================================================

/// Minimum summed per-axis delta between consecutive samples to count as a shake (g).
pub const INTENSITY_THRESHOLD_G: f64 = 2.5;

/// Pulses closer than this to the previous one are mechanical bounce (ms).
pub const DEBOUNCE_WINDOW_MS: u64 = 250;

/// Silence longer than this starts a new sequence (ms).
pub const RESET_WINDOW_MS: u64 = 1_500;

/// Pulses needed to confirm a trigger.
pub const CONFIRM_THRESHOLD: u32 = 3;

/// Expected accelerometer cadence, informational for the sensor driver (ms).
pub const SAMPLE_INTERVAL_MS: u64 = 100;

// ============================================================================
// Radio Mesh
// ============================================================================

/// Advertisement scan timeout when looking for the paired peripheral (ms).
pub const MESH_DISCOVER_TIMEOUT_MS: u64 = 10_000;

/// Total budget for establishing (if needed) and writing over the mesh link (ms).
pub const MESH_ATTEMPT_TIMEOUT_MS: u64 = 10_000;

/// Share of the mesh attempt budget kept back for connect and write after a scan (ms).
pub const MESH_LINK_SETUP_RESERVE_MS: u64 = 2_000;

/// Queue depth for decoded inbound mesh messages.
pub const MESH_MESSAGE_QUEUE: usize = 32;

// ============================================================================
// Rescue Gateway
// ============================================================================

/// Default address of the gateway when it runs as a WiFi access point.
pub const GATEWAY_BASE_URL: &str = "http://192.168.4.1";

/// `GET /status` probe timeout (ms).
pub const GATEWAY_STATUS_TIMEOUT_MS: u64 = 2_000;

/// `POST /sos` timeout (ms).
pub const GATEWAY_SEND_TIMEOUT_MS: u64 = 5_000;

/// `GET /` connectivity test timeout (ms).
pub const GATEWAY_DESCRIBE_TIMEOUT_MS: u64 = 3_000;

/// SSID users must join to reach the gateway; used in user-facing messages.
pub const GATEWAY_NETWORK_NAME: &str = "AlertMate_SOS";

// ============================================================================
// Cloud Channel
// ============================================================================

pub const CLOUD_URL: &str = "ws://localhost:3000/ws";

/// WebSocket handshake timeout (ms).
pub const CLOUD_CONNECT_TIMEOUT_MS: u64 = 20_000;

/// Time allowed for one outbound frame to be written (ms).
pub const CLOUD_SEND_TIMEOUT_MS: u64 = 5_000;

/// First reconnect delay; doubles per consecutive failure (ms).
pub const CLOUD_RECONNECT_INITIAL_MS: u64 = 1_000;

/// Reconnect delay cap (ms).
pub const CLOUD_RECONNECT_MAX_MS: u64 = 30_000;

/// Consecutive failed connects before giving up. 0 = retry forever.
pub const CLOUD_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Random jitter added to each reconnect delay (ms).
pub const CLOUD_RECONNECT_JITTER_MS: u64 = 250;

/// Broadcast buffer for inbound messages; slow subscribers lag beyond this.
pub const CLOUD_INBOUND_BUFFER: usize = 64;

/// Outbound request queue depth.
pub const CLOUD_OUTBOUND_QUEUE: usize = 16;

// ============================================================================
// Dispatch
// ============================================================================

/// Emit a "still trying" progress event once an attempt runs this long (ms).
pub const PROGRESS_AFTER_MS: u64 = 3_000;

/// Monitor event queue depth.
pub const MONITOR_EVENT_QUEUE: usize = 64;
