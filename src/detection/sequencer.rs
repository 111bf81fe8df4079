//! Windowed debounce: counts shake pulses into a confirmed trigger.
//!
//! Transitions on a pulse at `t`:
//!
//! | condition                          | effect                          |
//! |------------------------------------|---------------------------------|
//! | no previous pulse, or gap > reset  | count = 1, last = t             |
//! | gap <= debounce                    | ignored (bounce of same shake)  |
//! | otherwise                          | count += 1, last = t            |
//!
//! Reaching the confirm threshold fires once and returns to `{0, none}`.

use crate::types::{ShakePulse, TriggerEvent, TriggerState};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequencerSettings {
    pub debounce_window_ms: u64,
    pub reset_window_ms: u64,
    pub confirm_threshold: u32,
}

impl From<&crate::config::TriggerConfig> for SequencerSettings {
    fn from(c: &crate::config::TriggerConfig) -> Self {
        Self {
            debounce_window_ms: c.debounce_window_ms,
            reset_window_ms: c.reset_window_ms,
            confirm_threshold: c.confirm_threshold,
        }
    }
}

/// What a single pulse did to the sequencer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PulseVerdict {
    /// Started a fresh sequence at count 1
    Started,
    /// Counted towards the current sequence
    Counted(u32),
    /// Within the debounce window of the previous pulse
    Debounced,
    /// Completed the sequence
    Fired(TriggerEvent),
}

#[derive(Debug, Clone)]
pub struct TriggerSequencer {
    settings: SequencerSettings,
    state: TriggerState,
    peak_magnitude: f64,
}

impl TriggerSequencer {
    pub fn new(settings: SequencerSettings) -> Self {
        Self {
            settings,
            state: TriggerState::default(),
            peak_magnitude: 0.0,
        }
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn settings(&self) -> SequencerSettings {
        self.settings
    }

    /// Process one pulse.
    pub fn on_pulse(&mut self, pulse: ShakePulse) -> PulseVerdict {
        let t = pulse.timestamp_ms;

        let verdict = match self.state.last_pulse_at {
            Some(last) if t.saturating_sub(last) <= self.settings.debounce_window_ms => {
                return PulseVerdict::Debounced;
            }
            Some(last) if t.saturating_sub(last) <= self.settings.reset_window_ms => {
                self.state.pulse_count += 1;
                self.peak_magnitude = self.peak_magnitude.max(pulse.magnitude);
                PulseVerdict::Counted(self.state.pulse_count)
            }
            _ => {
                self.state.pulse_count = 1;
                self.peak_magnitude = pulse.magnitude;
                PulseVerdict::Started
            }
        };
        self.state.last_pulse_at = Some(t);

        if self.state.pulse_count >= self.settings.confirm_threshold {
            let event = TriggerEvent {
                fired_at_ms: t,
                pulses: self.state.pulse_count,
                peak_magnitude: self.peak_magnitude,
            };
            self.reset();
            return PulseVerdict::Fired(event);
        }
        verdict
    }

    /// Drop a stale sequence once the silence since the last pulse exceeds the reset window.
    ///
    /// Returns true if state was reset.
    pub fn expire(&mut self, now_ms: u64) -> bool {
        match self.state.last_pulse_at {
            Some(last) if now_ms.saturating_sub(last) > self.settings.reset_window_ms => {
                self.reset();
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.state.reset();
        self.peak_magnitude = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SequencerSettings {
        SequencerSettings {
            debounce_window_ms: 250,
            reset_window_ms: 1500,
            confirm_threshold: 3,
        }
    }

    fn pulse(t: u64) -> ShakePulse {
        ShakePulse {
            magnitude: 3.0,
            timestamp_ms: t,
        }
    }

    #[test]
    fn bounces_within_debounce_never_count_past_one() {
        let mut seq = TriggerSequencer::new(settings());
        assert_eq!(seq.on_pulse(pulse(1_000)), PulseVerdict::Started);
        for t in [1_100, 1_200, 1_250] {
            assert_eq!(seq.on_pulse(pulse(t)), PulseVerdict::Debounced);
            assert_eq!(seq.state().pulse_count, 1);
        }
        // Debounced pulses do not move lastPulseAt
        assert_eq!(seq.state().last_pulse_at, Some(1_000));
    }

    #[test]
    fn three_spaced_pulses_fire_exactly_once_then_restart() {
        let mut seq = TriggerSequencer::new(settings());
        assert_eq!(seq.on_pulse(pulse(0)), PulseVerdict::Started);
        assert_eq!(seq.on_pulse(pulse(400)), PulseVerdict::Counted(2));
        let PulseVerdict::Fired(event) = seq.on_pulse(pulse(800)) else {
            panic!("third pulse should fire");
        };
        assert_eq!(event.fired_at_ms, 800);
        assert_eq!(event.pulses, 3);
        assert!(seq.state().is_idle());

        // Fourth pulse begins a new sequence
        assert_eq!(seq.on_pulse(pulse(1_200)), PulseVerdict::Started);
        assert_eq!(seq.state().pulse_count, 1);
    }

    #[test]
    fn gap_beyond_reset_window_restarts_count() {
        let mut seq = TriggerSequencer::new(settings());
        seq.on_pulse(pulse(0));
        seq.on_pulse(pulse(500));
        assert_eq!(seq.state().pulse_count, 2);
        assert_eq!(seq.on_pulse(pulse(2_001)), PulseVerdict::Started);
        assert_eq!(seq.state().pulse_count, 1);
    }

    #[test]
    fn gap_exactly_at_reset_window_still_counts() {
        let mut seq = TriggerSequencer::new(settings());
        seq.on_pulse(pulse(0));
        assert_eq!(seq.on_pulse(pulse(1_500)), PulseVerdict::Counted(2));
    }

    #[test]
    fn expire_resets_after_silence() {
        let mut seq = TriggerSequencer::new(settings());
        seq.on_pulse(pulse(0));
        seq.on_pulse(pulse(400));
        assert!(!seq.expire(1_900));
        assert_eq!(seq.state().pulse_count, 2);
        assert!(seq.expire(1_901));
        assert!(seq.state().is_idle());
    }

    #[test]
    fn threshold_of_one_fires_on_first_pulse() {
        let mut seq = TriggerSequencer::new(SequencerSettings {
            confirm_threshold: 1,
            ..settings()
        });
        assert!(matches!(seq.on_pulse(pulse(10)), PulseVerdict::Fired(_)));
    }

    #[test]
    fn peak_magnitude_tracks_strongest_pulse() {
        let mut seq = TriggerSequencer::new(settings());
        seq.on_pulse(ShakePulse { magnitude: 3.0, timestamp_ms: 0 });
        seq.on_pulse(ShakePulse { magnitude: 6.5, timestamp_ms: 300 });
        let PulseVerdict::Fired(event) = seq.on_pulse(ShakePulse { magnitude: 4.0, timestamp_ms: 600 }) else {
            panic!("expected fire");
        };
        assert!((event.peak_magnitude - 6.5).abs() < 1e-9);
    }
}
