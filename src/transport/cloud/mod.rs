//! Cloud channel: persistent WebSocket to the backend alert service
//!
//! One background task owns the socket. Callers talk to it through channels:
//! outbound frames carry a oneshot write confirmation, inbound frames are
//! normalised to [`RawMessage`](crate::types::RawMessage) and broadcast to
//! every subscriber. The task reconnects with capped exponential backoff.

mod channel;
pub mod protocol;

pub use channel::{ChannelState, CloudChannel, CloudTransport};
pub use protocol::{CloudSosData, Frame, HelpResponse, HelperLocation};

use thiserror::Error;

use crate::types::FailureKind;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CloudError {
    #[error("Cloud channel not connected")]
    Disconnected,

    #[error("Cloud send failed: {0}")]
    SendFailed(String),

    #[error("Cloud channel closed")]
    Closed,

    #[error("Frame encoding failed: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for CloudError {
    fn from(e: serde_json::Error) -> Self {
        CloudError::Encode(e.to_string())
    }
}

impl CloudError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CloudError::Disconnected | CloudError::Closed => FailureKind::Disconnected,
            CloudError::SendFailed(_) | CloudError::Encode(_) => FailureKind::SendFailed,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            CloudError::Disconnected => "No internet connection to the alert service".to_string(),
            CloudError::SendFailed(_) | CloudError::Encode(_) => {
                "Alert service did not accept the alert".to_string()
            }
            CloudError::Closed => "Alert service connection has shut down".to_string(),
        }
    }
}
