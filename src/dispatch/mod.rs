//! Alert Dispatch
//!
//! ## Architecture
//!
//! - **AlertDispatcher**: mesh → gateway → cloud, each under its own budget,
//!   first success wins, one definitive [`DispatchResult`](crate::types::DispatchResult)
//! - **AlertMonitor**: sample source → shake detector → dispatcher, at most
//!   one dispatch in flight (later triggers are dropped and reported)
//! - **SampleSource**: where accelerometer samples come from

mod dispatcher;
mod monitor;
pub mod source;

pub use dispatcher::{AlertDispatcher, DispatchError};
pub use monitor::{AlertMonitor, LocationSource, MonitorEvent, MonitorStats, StaticLocation};
pub use source::{JsonLinesSource, ReplaySource, SampleEvent, SampleSource};
