//! Turns raw accelerometer samples into discrete shake pulses.

use crate::types::{AccelerationSample, ShakePulse};

/// Emits a [`ShakePulse`] whenever the summed per-axis change between two
/// consecutive samples exceeds the intensity threshold.
#[derive(Debug, Clone)]
pub struct SampleFilter {
    intensity_threshold: f64,
    previous: Option<AccelerationSample>,
}

impl SampleFilter {
    pub fn new(intensity_threshold: f64) -> Self {
        Self {
            intensity_threshold,
            previous: None,
        }
    }

    pub fn intensity_threshold(&self) -> f64 {
        self.intensity_threshold
    }

    /// Feed one sample. The first sample only establishes the baseline.
    ///
    /// The stored previous sample is overwritten on every call, pulse or not.
    pub fn observe(&mut self, sample: AccelerationSample) -> Option<ShakePulse> {
        let pulse = self.previous.and_then(|prev| {
            let delta = sample.delta_from(&prev);
            (delta > self.intensity_threshold).then_some(ShakePulse {
                magnitude: delta,
                timestamp_ms: sample.timestamp_ms,
            })
        });
        self.previous = Some(sample);
        pulse
    }

    /// Forget the baseline (e.g. after the sensor was paused).
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(x: f64, y: f64, z: f64, t: u64) -> AccelerationSample {
        AccelerationSample::new(x, y, z, t)
    }

    #[test]
    fn first_sample_is_baseline_only() {
        let mut filter = SampleFilter::new(2.5);
        assert!(filter.observe(s(5.0, 5.0, 5.0, 0)).is_none());
    }

    #[test]
    fn emits_pulse_above_threshold_with_delta_magnitude() {
        let mut filter = SampleFilter::new(2.5);
        filter.observe(s(0.0, 0.0, 1.0, 0));
        let pulse = filter.observe(s(2.0, -1.0, 1.5, 100)).unwrap();
        assert!((pulse.magnitude - 3.5).abs() < 1e-9);
        assert_eq!(pulse.timestamp_ms, 100);
    }

    #[test]
    fn delta_equal_to_threshold_is_not_a_pulse() {
        let mut filter = SampleFilter::new(2.5);
        filter.observe(s(0.0, 0.0, 0.0, 0));
        assert!(filter.observe(s(2.5, 0.0, 0.0, 100)).is_none());
    }

    #[test]
    fn previous_sample_updates_even_without_pulse() {
        let mut filter = SampleFilter::new(2.5);
        filter.observe(s(0.0, 0.0, 0.0, 0));
        // Gradual drift: each step below threshold
        assert!(filter.observe(s(2.0, 0.0, 0.0, 100)).is_none());
        assert!(filter.observe(s(4.0, 0.0, 0.0, 200)).is_none());
        // Compared against x=4.0, not the original baseline
        assert!(filter.observe(s(6.0, 0.0, 0.0, 300)).is_none());
    }

    #[test]
    fn reset_drops_baseline() {
        let mut filter = SampleFilter::new(2.5);
        filter.observe(s(0.0, 0.0, 0.0, 0));
        filter.reset();
        assert!(filter.observe(s(9.0, 9.0, 9.0, 100)).is_none());
    }
}
