//! Delivery transports
//!
//! Each transport has its own client and error type; [`AlertTransport`] is the
//! uniform seam the dispatcher drives them through, in fallback order.
//!
//! - [`mesh`]: short-range radio peripheral
//! - [`gateway`]: local-network rescue gateway over HTTP
//! - [`cloud`]: persistent WebSocket to the backend

pub mod cloud;
pub mod gateway;
pub mod mesh;

pub use cloud::{CloudChannel, CloudError, CloudTransport};
pub use gateway::{GatewayAck, GatewayClient, GatewayError, GatewayTransport, UnreachableCause};
pub use mesh::{MeshError, MeshRole, MeshTransport, RadioMeshClient};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::types::{AlertPayload, FailureKind, FailureReason, Transport};

/// One delivery path as seen by the dispatcher.
#[async_trait]
pub trait AlertTransport: Send + Sync {
    fn transport(&self) -> Transport;

    /// Upper bound the dispatcher enforces around one [`attempt`](Self::attempt).
    fn budget(&self) -> Duration;

    /// Try to deliver. Dropping the future abandons the attempt and must
    /// release whatever link or socket it was using.
    async fn attempt(&self, payload: &AlertPayload) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("{transport} gave no answer within {after:?}")]
    Timeout { transport: Transport, after: Duration },

    #[error("Attempt cancelled")]
    Cancelled,
}

impl TransportError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TransportError::Mesh(e) => e.kind(),
            TransportError::Gateway(e) => e.kind(),
            TransportError::Cloud(e) => e.kind(),
            TransportError::Timeout { .. } => FailureKind::Timeout,
            TransportError::Cancelled => FailureKind::Cancelled,
        }
    }

    /// Short explanation fit for the person holding the phone.
    pub fn user_message(&self) -> String {
        match self {
            TransportError::Mesh(e) => e.user_message(),
            TransportError::Gateway(e) => e.user_message(),
            TransportError::Cloud(e) => e.user_message(),
            TransportError::Timeout { transport, after } => {
                let what = match transport {
                    Transport::Mesh => "Rescue radio",
                    Transport::Gateway => "Rescue gateway",
                    Transport::Cloud => "Alert service",
                };
                format!("{what} did not answer within {}", format_wait(*after))
            }
            TransportError::Cancelled => "Alert was cancelled".to_string(),
        }
    }
}

/// `850ms` below a second, whole seconds above.
fn format_wait(after: Duration) -> String {
    if after < Duration::from_secs(1) {
        format!("{}ms", after.as_millis())
    } else {
        format!("{}s", after.as_secs_f64().round() as u64)
    }
}

impl From<&TransportError> for FailureReason {
    fn from(e: &TransportError) -> Self {
        FailureReason::new(e.kind(), e.user_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_reason_names_the_transport() {
        let err = TransportError::Timeout {
            transport: Transport::Mesh,
            after: Duration::from_secs(10),
        };
        let reason = FailureReason::from(&err);
        assert_eq!(reason.kind, FailureKind::Timeout);
        assert_eq!(reason.message, "Rescue radio did not answer within 10s");
    }

    #[test]
    fn sub_second_timeout_reads_in_milliseconds() {
        let err = TransportError::Timeout {
            transport: Transport::Gateway,
            after: Duration::from_millis(250),
        };
        assert_eq!(err.user_message(), "Rescue gateway did not answer within 250ms");
    }

    #[test]
    fn client_errors_keep_their_kind() {
        let err: TransportError = CloudError::Disconnected.into();
        assert_eq!(err.kind(), FailureKind::Disconnected);
        let err: TransportError = MeshError::PermissionDenied.into();
        assert_eq!(err.kind(), FailureKind::PermissionDenied);
    }
}
