//! AlertMate: multi-transport emergency alert core
//!
//! Turns a deliberate shake of the phone into an alert, and gets that alert
//! out over whichever path still works: a short-range radio peripheral, a
//! local rescue gateway, or the backend over the internet.
//!
//! ## Architecture
//!
//! - **Detection**: accelerometer samples → shake pulses → confirmed trigger
//! - **Transport**: radio mesh (BLE), rescue gateway (HTTP), cloud channel (WebSocket)
//! - **Dispatch**: ordered, time-bounded fallback across transports with an attempt log
//! - **Inbound**: classification of cloud and mesh messages into typed alerts

pub mod config;
pub mod detection;
pub mod dispatch;
pub mod inbound;
pub mod transport;
pub mod types;

// Re-export configuration
pub use config::AlertConfig;

// Re-export commonly used types
pub use types::{
    AccelerationSample, AlertKind, AlertPayload, DispatchProgress, DispatchResult, FailureKind,
    FailureReason, GeoPoint, InboundAlert, Notification, RawMessage, SubjectInfo, Transport,
    TransportAttempt, TriggerContext, TriggerEvent,
};

// Re-export the main components
pub use detection::{SampleFilter, ShakeDetector, TriggerSequencer};
pub use dispatch::{AlertDispatcher, AlertMonitor, DispatchError, MonitorEvent};
pub use inbound::{InboundAlertRouter, RoutedAlert};
pub use transport::{
    AlertTransport, CloudChannel, GatewayClient, RadioMeshClient, TransportError,
};
