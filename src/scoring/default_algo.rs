//! Reference scoring implementation.

use super::{ScoringAlgorithm, TONE_BASE_HZ, TONE_EPSILON};

/// The portable algorithm: exact `log2` tone mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultScoring;

impl ScoringAlgorithm for DefaultScoring {
    fn pitch_to_tone(&self, pitch: f64) -> f64 {
        if pitch <= 0.0 {
            return 0.0;
        }
        (pitch / TONE_BASE_HZ + TONE_EPSILON).log2().max(0.0) * 12.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_frequency_maps_to_tone_zero() {
        let algo = DefaultScoring;
        assert!(algo.pitch_to_tone(TONE_BASE_HZ).abs() < 1e-4);
    }

    #[test]
    fn octave_up_is_twelve_tones() {
        let algo = DefaultScoring;
        let octave = algo.pitch_to_tone(110.0);
        assert!((octave - 12.0).abs() < 1e-4);
    }

    #[test]
    fn tone_is_monotonic_in_pitch() {
        let algo = DefaultScoring;
        let mut last = -1.0;
        for pitch in (55..2000).step_by(55) {
            let tone = algo.pitch_to_tone(f64::from(pitch));
            assert!(tone > last);
            last = tone;
        }
    }

    #[test]
    fn unvoiced_and_subsonic_clamp_to_zero() {
        let algo = DefaultScoring;
        assert_eq!(algo.pitch_to_tone(0.0), 0.0);
        assert_eq!(algo.pitch_to_tone(-10.0), 0.0);
        // Below the base frequency the scale floors at 0.
        assert_eq!(algo.pitch_to_tone(30.0), 0.0);
    }
}
