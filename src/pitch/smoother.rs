//! Exponential voice-pitch smoothing.

/// Maximum accumulated offset, as a fraction of the largest reference
/// pitch seen in the song.
const OFFSET_CLAMP_RATIO: f64 = 0.4;

/// Gap below which the raw pitch is considered already on target.
const BYPASS_GAP: f64 = 1.0;

/// Ramp weights applied to the offset for the first few samples after a
/// reset, so a single outlier cannot swing the corrected pitch.
const RAMP_WEIGHTS: [f64; 5] = [0.5, 0.6, 0.7, 0.8, 0.9];

/// Pulls raw microphone pitch toward the reference pitch with an
/// exponentially decaying running offset.
///
/// The smoother is stateful: each voiced sample folds the current gap to
/// the reference into a running offset (weighted `(n-1)/n`, so early
/// samples count more), and the corrected pitch is the raw pitch plus a
/// ramped share of that offset. [`reset`](Self::reset) clears the state;
/// when it runs is governed by
/// [`SmootherResetPolicy`](crate::config::SmootherResetPolicy).
#[derive(Debug, Clone, Default)]
pub struct PitchSmoother {
    offset: f64,
    n: u32,
}

impl PitchSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the accumulated offset and sample count.
    pub fn reset(&mut self) {
        self.offset = 0.0;
        self.n = 0;
    }

    /// Correct one raw pitch sample against the reference pitch for the
    /// current position.
    ///
    /// `ref_max` is the largest reference pitch in the whole song and
    /// bounds both the offset and the returned value. Returns 0 when
    /// either the raw pitch or the reference is unvoiced; unvoiced
    /// samples do not advance the smoother state.
    pub fn correct(&mut self, pitch: f64, ref_pitch: f64, ref_max: f64) -> f64 {
        if pitch <= 0.0 || ref_pitch <= 0.0 {
            return 0.0;
        }

        self.n += 1;
        let n = f64::from(self.n);
        self.offset = self.offset * (n - 1.0) / n + (ref_pitch - pitch) / n;
        let clamp = OFFSET_CLAMP_RATIO * ref_max;
        self.offset = self.offset.clamp(-clamp, clamp);

        // Close enough already; correcting would only add wobble.
        if (ref_pitch - pitch).abs() < BYPASS_GAP {
            return pitch.min(ref_max);
        }

        let weight = RAMP_WEIGHTS
            .get(self.n as usize - 1)
            .copied()
            .unwrap_or(1.0);
        (pitch + weight * self.offset).min(ref_max)
    }
}
