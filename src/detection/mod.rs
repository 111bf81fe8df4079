//! Shake Trigger Detection
//!
//! ## Architecture
//!
//! - **SampleFilter**: accelerometer sample → optional shake pulse
//! - **TriggerSequencer**: shake pulses → confirmed trigger (debounce + reset windows)
//! - **ShakeDetector**: both stages behind one `observe()` call
//!
//! Pure in-memory state; no I/O and no error paths.

pub mod sample_filter;
pub mod sequencer;

pub use sample_filter::SampleFilter;
pub use sequencer::{PulseVerdict, SequencerSettings, TriggerSequencer};

use crate::config::TriggerConfig;
use crate::types::{AccelerationSample, TriggerEvent, TriggerState};
use tracing::{debug, info};

/// Sample-in, trigger-out detector. One instance per sensor stream.
#[derive(Debug, Clone)]
pub struct ShakeDetector {
    filter: SampleFilter,
    sequencer: TriggerSequencer,
}

impl ShakeDetector {
    pub fn new(config: &TriggerConfig) -> Self {
        Self {
            filter: SampleFilter::new(config.intensity_threshold),
            sequencer: TriggerSequencer::new(SequencerSettings::from(config)),
        }
    }

    /// Feed one sample; returns the trigger if this sample completed a sequence.
    pub fn observe(&mut self, sample: AccelerationSample) -> Option<TriggerEvent> {
        if self.sequencer.expire(sample.timestamp_ms) {
            debug!("Shake sequence expired after silence");
        }

        let pulse = self.filter.observe(sample)?;
        match self.sequencer.on_pulse(pulse) {
            PulseVerdict::Fired(event) => {
                info!(
                    pulses = event.pulses,
                    peak = event.peak_magnitude,
                    "Shake trigger confirmed"
                );
                Some(event)
            }
            PulseVerdict::Debounced => None,
            PulseVerdict::Started | PulseVerdict::Counted(_) => {
                debug!(
                    count = self.sequencer.state().pulse_count,
                    magnitude = pulse.magnitude,
                    "Shake detected"
                );
                None
            }
        }
    }

    pub fn state(&self) -> TriggerState {
        self.sequencer.state()
    }

    pub fn reset(&mut self) {
        self.filter.reset();
        self.sequencer.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Alternate between two orientations every `step_ms`, starting at `start`.
    fn shake(start: u64, step_ms: u64, n: usize) -> Vec<AccelerationSample> {
        (0..n)
            .map(|i| {
                let x = if i % 2 == 0 { 0.0 } else { 3.0 };
                AccelerationSample::new(x, 0.0, 1.0, start + step_ms * i as u64)
            })
            .collect()
    }

    #[test]
    fn deliberate_shake_fires_once() {
        let mut detector = ShakeDetector::new(&TriggerConfig::default());
        // Baseline + 3 direction changes 300ms apart
        let fired: Vec<_> = shake(0, 300, 4)
            .into_iter()
            .filter_map(|s| detector.observe(s))
            .collect();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].fired_at_ms, 900);
        assert!(detector.state().is_idle());
    }

    #[test]
    fn fast_jitter_is_debounced() {
        let mut detector = ShakeDetector::new(&TriggerConfig::default());
        // 100ms cadence: every other pulse lands inside the 250ms debounce window
        let fired = shake(0, 100, 6)
            .into_iter()
            .filter_map(|s| detector.observe(s))
            .count();
        assert_eq!(fired, 0);
        assert_eq!(detector.state().pulse_count, 2);
    }

    #[test]
    fn quiet_samples_expire_partial_sequence() {
        let mut detector = ShakeDetector::new(&TriggerConfig::default());
        for s in shake(0, 300, 3) {
            detector.observe(s);
        }
        assert_eq!(detector.state().pulse_count, 2);

        // Phone at rest for two seconds
        let rest = AccelerationSample::new(0.0, 0.0, 1.0, 2_500);
        assert!(detector.observe(rest).is_none());
        assert!(detector.state().is_idle());
    }

    #[test]
    fn single_jolt_never_fires() {
        let mut detector = ShakeDetector::new(&TriggerConfig::default());
        detector.observe(AccelerationSample::new(0.0, 0.0, 1.0, 0));
        assert!(detector.observe(AccelerationSample::new(4.0, 0.0, 1.0, 100)).is_none());
        assert_eq!(detector.state().pulse_count, 1);
    }
}
