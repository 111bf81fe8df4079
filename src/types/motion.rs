//! Motion types: raw accelerometer samples, shake pulses, trigger state

use serde::{Deserialize, Serialize};

/// One 3-axis accelerometer reading, in g-units.
///
/// Produced by the host sensor driver at a fixed cadence and consumed once
/// by the sample filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelerationSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Milliseconds on a monotonic clock (or Unix epoch ms)
    pub timestamp_ms: u64,
}

impl AccelerationSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp_ms: u64) -> Self {
        Self { x, y, z, timestamp_ms }
    }

    /// Sum of absolute per-axis differences to `previous`.
    pub fn delta_from(&self, previous: &Self) -> f64 {
        (self.x - previous.x).abs() + (self.y - previous.y).abs() + (self.z - previous.z).abs()
    }
}

/// A discrete shake detected between two consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShakePulse {
    pub magnitude: f64,
    pub timestamp_ms: u64,
}

/// Debounce/counting state owned by the trigger sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggerState {
    pub pulse_count: u32,
    pub last_pulse_at: Option<u64>,
}

impl TriggerState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_idle(&self) -> bool {
        self.pulse_count == 0 && self.last_pulse_at.is_none()
    }
}

/// A confirmed, intentional panic gesture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Timestamp of the pulse that completed the sequence
    pub fired_at_ms: u64,
    /// Number of pulses that made up the sequence
    pub pulses: u32,
    /// Strongest pulse magnitude seen in the sequence
    pub peak_magnitude: f64,
}
