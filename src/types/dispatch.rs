//! Dispatch outcome types: which transports were tried and why each ended

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Transport
// ============================================================================

/// The three delivery paths, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Short-range radio peripheral (single hop)
    Mesh,
    /// Local-network rescue gateway
    Gateway,
    /// Backend alert service over the persistent channel
    Cloud,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Mesh => write!(f, "mesh"),
            Transport::Gateway => write!(f, "gateway"),
            Transport::Cloud => write!(f, "cloud"),
        }
    }
}

// ============================================================================
// Failure Taxonomy
// ============================================================================

/// Category of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PermissionDenied,
    NotFound,
    Unreachable,
    Disconnected,
    ConnectFailed,
    WriteFailed,
    SendFailed,
    Rejected,
    NotConnected,
    /// Another operation already holds the resource (e.g. a concurrent connect)
    Busy,
    Timeout,
    Cancelled,
    /// The transport has no usable backend on this host
    Unavailable,
}

impl FailureKind {
    /// Whether a later dispatch may reasonably retry this transport automatically.
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureKind::PermissionDenied | FailureKind::Unavailable)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::PermissionDenied => "permission denied",
            FailureKind::NotFound => "not found",
            FailureKind::Unreachable => "unreachable",
            FailureKind::Disconnected => "disconnected",
            FailureKind::ConnectFailed => "connect failed",
            FailureKind::WriteFailed => "write failed",
            FailureKind::SendFailed => "send failed",
            FailureKind::Rejected => "rejected",
            FailureKind::NotConnected => "not connected",
            FailureKind::Busy => "busy",
            FailureKind::Timeout => "timed out",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// Why one attempt failed, in a form that survives serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    /// User-presentable explanation
    pub message: String,
}

impl FailureReason {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

// ============================================================================
// Attempt Log
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Pending,
    Success,
    Failed(FailureReason),
}

/// One entry of the dispatch attempt log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportAttempt {
    pub transport: Transport,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub outcome: AttemptOutcome,
}

impl TransportAttempt {
    pub fn start(transport: Transport) -> Self {
        Self {
            transport,
            started_at: Utc::now(),
            elapsed_ms: 0,
            outcome: AttemptOutcome::Pending,
        }
    }

    pub fn finish(&mut self, elapsed: Duration, outcome: AttemptOutcome) {
        self.elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.outcome = outcome;
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.outcome {
            AttemptOutcome::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

// ============================================================================
// Dispatch Result
// ============================================================================

/// The single definitive outcome of one dispatch call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResult {
    /// `None` when every transport failed
    pub transport_used: Option<Transport>,
    pub attempts: Vec<TransportAttempt>,
}

impl DispatchResult {
    pub fn delivered(&self) -> bool {
        self.transport_used.is_some()
    }

    /// One line for the user: where the alert went, or why it went nowhere.
    pub fn summary(&self) -> String {
        if let Some(transport) = self.transport_used {
            return format!("Alert delivered via {transport}");
        }
        if self.attempts.is_empty() {
            return "Alert not delivered: no transports configured".to_string();
        }
        let reasons: Vec<String> = self
            .attempts
            .iter()
            .filter_map(|a| a.failure().map(|r| format!("{}: {}", a.transport, r.message)))
            .collect();
        format!("Alert not delivered. {}", reasons.join("; "))
    }
}

/// Progress notifications emitted while a dispatch is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchProgress {
    Attempting { transport: Transport },
    /// The current attempt has been running for `elapsed_ms` without an answer
    StillTrying { transport: Transport, elapsed_ms: u64 },
    AttemptFailed { transport: Transport, reason: FailureReason },
    Delivered { transport: Transport },
    Exhausted,
}
