//! Inbound cloud messages and their classified form

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A message as received on the cloud channel, before classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawMessage(pub Value);

impl RawMessage {
    /// Parse a text frame. Non-JSON text is kept verbatim as a JSON string
    /// so the router can still classify (as unknown) instead of failing.
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self(value),
            Err(_) => Self(Value::String(text.to_string())),
        }
    }

    /// The `type` discriminator, if present and a string.
    pub fn message_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String field, ignoring empty values.
    pub fn str_field(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Numeric field; accepts numbers and numeric strings.
    pub fn f64_field(&self, key: &str) -> Option<f64> {
        let v = match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        v.is_finite().then_some(v)
    }
}

impl From<Value> for RawMessage {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

// ============================================================================
// Classified Alerts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    Sos,
    CrowdAlert,
    HelpAccepted,
    Unknown,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::Sos => write!(f, "SOS"),
            AlertKind::CrowdAlert => write!(f, "Crowd Alert"),
            AlertKind::HelpAccepted => write!(f, "Help Accepted"),
            AlertKind::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStyle {
    /// High-visibility error styling
    Critical,
    Success,
}

/// How the host should get the user's attention for one alert kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeedbackPolicy {
    /// Alternating wait/vibrate durations in milliseconds, starting with a wait
    pub vibration_ms: &'static [u64],
    pub display_for: Duration,
    pub style: NotificationStyle,
}

/// A rendered notification, ready for the UI collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub policy: FeedbackPolicy,
}

/// One classified inbound alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundAlert {
    pub kind: AlertKind,
    pub originator_id: Option<String>,
    pub originator_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distance_km: Option<f64>,
}

impl InboundAlert {
    pub fn unknown() -> Self {
        Self {
            kind: AlertKind::Unknown,
            originator_id: None,
            originator_name: None,
            latitude: None,
            longitude: None,
            distance_km: None,
        }
    }
}
