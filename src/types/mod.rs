//! Shared data structures for the emergency alert core
//!
//! - Motion: AccelerationSample, ShakePulse, TriggerState, TriggerEvent
//! - Alert: GeoPoint, AlertPayload, TriggerContext
//! - Dispatch: Transport, TransportAttempt, FailureReason, DispatchResult
//! - Inbound: RawMessage, InboundAlert, AlertKind, FeedbackPolicy

mod motion;
mod alert;
mod dispatch;
mod inbound;

pub use motion::*;
pub use alert::*;
pub use dispatch::*;
pub use inbound::*;
