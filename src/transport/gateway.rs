//! Gateway Client: HTTP client for the local rescue gateway
//!
//! The gateway is an access point on the rescue network (default
//! `http://192.168.4.1`) that relays alerts over long-range radio.
//!
//! - `GET /status`: `{"status": "online"}` when ready to relay
//! - `POST /sos`: JSON alert, replies `{"message": "..."}`
//! - `GET /`: free-form banner, used for setup diagnostics

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{defaults, GatewayConfig};
use crate::transport::{AlertTransport, TransportError};
use crate::types::{AlertPayload, FailureKind, Transport};

/// Ack text used when the gateway accepts without saying anything.
const DEFAULT_ACK: &str = "Alert relayed by gateway";

/// Why the gateway could not be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreachableCause {
    /// No answer in time; usually not joined to the rescue network
    Timeout,
    /// Host answered but refused the connection
    Refused,
    /// Any other transport-level failure (no route, DNS, reset)
    Network,
    /// Status probe answered, but not with `online`
    Offline,
}

impl std::fmt::Display for UnreachableCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnreachableCause::Timeout => write!(f, "timeout"),
            UnreachableCause::Refused => write!(f, "refused"),
            UnreachableCause::Network => write!(f, "network"),
            UnreachableCause::Offline => write!(f, "offline"),
        }
    }
}

/// Gateway client errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway unreachable ({cause}): {detail}")]
    Unreachable {
        cause: UnreachableCause,
        /// Rescue network SSID, for the user message
        network: String,
        detail: String,
    },

    #[error("Gateway rejected alert with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("HTTP client setup failed: {0}")]
    Setup(String),
}

impl GatewayError {
    pub fn kind(&self) -> FailureKind {
        match self {
            GatewayError::Unreachable { .. } => FailureKind::Unreachable,
            GatewayError::Rejected { .. } => FailureKind::Rejected,
            GatewayError::Setup(_) => FailureKind::Unavailable,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Unreachable { cause, network, .. } => match cause {
                UnreachableCause::Timeout => format!(
                    "Not connected to the rescue network. Connect to \"{network}\" WiFi first."
                ),
                UnreachableCause::Refused => {
                    "Rescue gateway is busy or not accepting alerts. Please try again.".to_string()
                }
                UnreachableCause::Network => {
                    format!("No network connection. Please connect to \"{network}\" WiFi.")
                }
                UnreachableCause::Offline => format!(
                    "Rescue gateway is offline. Connect to \"{network}\" WiFi first."
                ),
            },
            GatewayError::Rejected { message, .. } => {
                format!("Rescue gateway could not relay the alert: {message}")
            }
            GatewayError::Setup(_) => {
                "Failed to send alert via the rescue gateway. Please try again.".to_string()
            }
        }
    }
}

/// Body of `POST /sos`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySosRequest {
    pub user_id: String,
    pub phone: String,
    pub lat: f64,
    pub lon: f64,
    /// RFC 3339 creation time
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl From<&AlertPayload> for GatewaySosRequest {
    fn from(p: &AlertPayload) -> Self {
        Self {
            user_id: p.subject_id().to_string(),
            phone: p.phone().to_string(),
            lat: p.latitude(),
            lon: p.longitude(),
            timestamp: p.created_at().to_rfc3339(),
            accuracy: p.accuracy_m(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct StatusReply {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Default, Deserialize)]
struct SosReply {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl SosReply {
    fn text(self) -> Option<String> {
        self.message.or(self.error).filter(|m| !m.is_empty())
    }
}

/// Gateway acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayAck {
    pub message: String,
}

/// HTTP client for the rescue gateway
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    status_timeout: Duration,
    send_timeout: Duration,
    network_name: String,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        // Timeouts are per request; the probe and the send use different budgets
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::Setup(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            status_timeout: config.status_timeout(),
            send_timeout: config.send_timeout(),
            network_name: config.network_name.clone(),
        })
    }

    /// Probe `GET /status`. Any failure, including a non-`online` reply, is `false`.
    pub async fn check_online(&self) -> bool {
        match self.probe_status().await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Gateway not online");
                false
            }
        }
    }

    /// `GET /status` with the failure classified: timeout, refusal and other
    /// network errors stay distinct; any reachable but not `online` answer is `Offline`.
    pub async fn probe_status(&self) -> Result<(), GatewayError> {
        let resp = self
            .http
            .get(format!("{}/status", self.base_url))
            .timeout(self.status_timeout)
            .send()
            .await
            .map_err(|e| self.unreachable(&e))?;

        if !resp.status().is_success() {
            return Err(self.offline(format!("/status answered {}", resp.status())));
        }

        match resp.json::<StatusReply>().await {
            Ok(reply) if reply.status == "online" => Ok(()),
            Ok(reply) => Err(self.offline(format!("/status reports {:?}", reply.status))),
            Err(e) if e.is_timeout() => Err(self.unreachable(&e)),
            Err(e) => Err(self.offline(format!("/status reply unreadable: {e}"))),
        }
    }

    /// `POST /sos`. Returns the gateway's acknowledgement text.
    pub async fn send_alert(&self, payload: &AlertPayload) -> Result<GatewayAck, GatewayError> {
        let body = GatewaySosRequest::from(payload);

        let resp = self
            .http
            .post(format!("{}/sos", self.base_url))
            .timeout(self.send_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.unreachable(&e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.unreachable(&e))?;
        let message = serde_json::from_str::<SosReply>(&text)
            .ok()
            .and_then(SosReply::text);

        if status.is_success() {
            let message = message.unwrap_or_else(|| DEFAULT_ACK.to_string());
            info!(message = %message, "Gateway accepted alert");
            Ok(GatewayAck { message })
        } else {
            warn!(status = %status, "Gateway rejected alert");
            Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: message.unwrap_or_else(|| {
                    status.canonical_reason().unwrap_or("unknown error").to_string()
                }),
            })
        }
    }

    /// `GET /` banner, for confirming the gateway is the one we expect.
    pub async fn describe(&self) -> Result<String, GatewayError> {
        let resp = self
            .http
            .get(format!("{}/", self.base_url))
            .timeout(Duration::from_millis(defaults::GATEWAY_DESCRIBE_TIMEOUT_MS))
            .send()
            .await
            .map_err(|e| self.unreachable(&e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.unreachable(&e))?;
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: text,
            });
        }
        Ok(text)
    }

    /// One line for the user: what the gateway says, or why it could not be asked.
    pub async fn connection_report(&self) -> String {
        match self.describe().await {
            Ok(banner) => format!("Connected! Gateway says: {}", banner.trim()),
            Err(e) => format!("Not connected: {}", e.user_message()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    fn unreachable(&self, e: &reqwest::Error) -> GatewayError {
        let cause = if e.is_timeout() {
            UnreachableCause::Timeout
        } else if is_connection_refused(e) {
            UnreachableCause::Refused
        } else {
            UnreachableCause::Network
        };
        GatewayError::Unreachable {
            cause,
            network: self.network_name.clone(),
            detail: e.to_string(),
        }
    }

    fn offline(&self, detail: String) -> GatewayError {
        GatewayError::Unreachable {
            cause: UnreachableCause::Offline,
            network: self.network_name.clone(),
            detail,
        }
    }
}

fn is_connection_refused(e: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(e);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = err.source();
    }
    false
}

// ============================================================================
// Dispatcher adapter
// ============================================================================

/// Gateway step of the dispatch chain: status probe, then send.
pub struct GatewayTransport {
    client: GatewayClient,
    budget: Duration,
}

impl GatewayTransport {
    pub fn new(client: GatewayClient, config: &GatewayConfig) -> Self {
        Self {
            client,
            budget: config.attempt_budget(),
        }
    }
}

#[async_trait]
impl AlertTransport for GatewayTransport {
    fn transport(&self) -> Transport {
        Transport::Gateway
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    async fn attempt(&self, payload: &AlertPayload) -> Result<(), TransportError> {
        self.client.probe_status().await?;
        self.client.send_alert(payload).await?;
        Ok(())
    }
}
