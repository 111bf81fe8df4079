//! Short-range radio mesh transport
//!
//! Finds the nearest AlertMate peripheral for our role, keeps at most one
//! link to it, writes `SOS:` records and surfaces notifications as text.
//!
//! ## Backends
//!
//! - `btle` (feature `ble`): btleplug central on the host Bluetooth adapter
//! - [`NullRadio`]: every operation reports `Unavailable`

mod client;
pub mod radio;
pub mod wire;

#[cfg(feature = "ble")]
pub mod btle;

pub use client::{MeshConnection, MeshTransport, RadioMeshClient};
pub use radio::{host_radio, ActiveScan, GattCharacteristic, MeshRadio, NullRadio, PeerHandle};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::types::FailureKind;

/// Which side of the link this device plays; selects the advertised name to look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshRole {
    /// Person who raises alerts
    #[default]
    Subject,
    /// Guardian who receives them
    Responder,
}

impl MeshRole {
    /// Advertised local name of the peripheral serving this role.
    pub fn device_name(self) -> String {
        let suffix = match self {
            MeshRole::Subject => "USER",
            MeshRole::Responder => "GUARDIAN",
        };
        format!("{}{suffix}", wire::DEVICE_NAME_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeshError {
    #[error("Bluetooth permission denied")]
    PermissionDenied,

    #[error("No '{name}' peripheral found within {timeout:?}")]
    NotFound { name: String, timeout: Duration },

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Not connected to a mesh peripheral")]
    NotConnected,

    #[error("Another connect attempt is in progress")]
    ConnectInProgress,

    #[error("Radio error: {0}")]
    Radio(String),

    #[error("Radio unavailable: {0}")]
    Unavailable(String),
}

impl MeshError {
    pub fn kind(&self) -> FailureKind {
        match self {
            MeshError::PermissionDenied => FailureKind::PermissionDenied,
            MeshError::NotFound { .. } => FailureKind::NotFound,
            MeshError::ConnectFailed(_) | MeshError::Radio(_) => FailureKind::ConnectFailed,
            MeshError::WriteFailed(_) => FailureKind::WriteFailed,
            MeshError::NotConnected => FailureKind::NotConnected,
            MeshError::ConnectInProgress => FailureKind::Busy,
            MeshError::Unavailable(_) => FailureKind::Unavailable,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            MeshError::PermissionDenied => {
                "Bluetooth permission is required to reach the rescue radio".to_string()
            }
            MeshError::NotFound { .. } => "No rescue radio in range".to_string(),
            MeshError::ConnectFailed(_) | MeshError::Radio(_) => {
                "Could not connect to the rescue radio".to_string()
            }
            MeshError::WriteFailed(_) => "Rescue radio did not accept the alert".to_string(),
            MeshError::NotConnected => "Rescue radio is not connected".to_string(),
            MeshError::ConnectInProgress => "Rescue radio is busy connecting".to_string(),
            MeshError::Unavailable(_) => "No Bluetooth radio available on this device".to_string(),
        }
    }
}
