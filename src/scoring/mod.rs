//! Pluggable scoring algorithms.
//!
//! The per-sample math (pitch to tone, tone distance to a normalized
//! score) and the per-line aggregation (tone buckets over the collected
//! samples) live as default methods on [`ScoringAlgorithm`];
//! implementations only have to supply `pitch_to_tone`.

mod default_algo;
mod fast_algo;

pub use default_algo::DefaultScoring;
pub use fast_algo::FastScoring;

use crate::config::ScoringMethod;
use crate::model::Line;

/// Lowest reference frequency on the tone scale (A1).
const TONE_BASE_HZ: f64 = 55.0;

/// Guards `log2(0)` for exactly-55 Hz input.
const TONE_EPSILON: f64 = 1e-6;

/// One collected voice sample, positioned at an absolute timestamp.
///
/// `score` is `None` for a placeholder: a position where reference pitch
/// existed but no voice sample arrived. Placeholders keep the tone walk
/// moving during aggregation but never contribute to an average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredSample {
    pub ms: u64,
    pub score: Option<f64>,
}

/// Converts pitch pairs to normalized scores and aggregates them into
/// per-line scores.
pub trait ScoringAlgorithm: Send {
    /// Map a frequency in Hz onto the semitone scale anchored at
    /// [`TONE_BASE_HZ`]. Must return 0 for unvoiced (`<= 0`) input.
    fn pitch_to_tone(&self, pitch: f64) -> f64;

    /// Score one voice sample against its reference pitch.
    ///
    /// The result is the tone-distance score in `[0, 1]`, with `level`
    /// scaling the penalty and `compensation_offset` added afterwards.
    /// Scores under `minimum_score` snap to 0.
    fn score_pitch(
        &self,
        minimum_score: f64,
        level: u8,
        compensation_offset: i8,
        voice_pitch: f64,
        ref_pitch: f64,
    ) -> f64 {
        if voice_pitch <= 0.0 || ref_pitch <= 0.0 {
            return 0.0;
        }
        let gap = (self.pitch_to_tone(voice_pitch) - self.pitch_to_tone(ref_pitch)).abs();
        let mut score = 1.0 - f64::from(level) * gap / 100.0 + f64::from(compensation_offset) / 100.0;
        if score < minimum_score {
            score = 0.0;
        }
        score.min(1.0)
    }

    /// Aggregate the samples collected while `line` played into the
    /// line's score on the `[0, max_line_score]` scale.
    ///
    /// Samples are walked in time order against a forward-only tone
    /// cursor: a voiced sample inside the cursor tone's window joins its
    /// bucket, and a sample past that window closes the bucket out with
    /// its average, or 0 when nothing was sung, before the cursor
    /// advances. Tones the sample stream never reached stay unscored.
    /// The line score is the mean of the closed buckets, so short and
    /// long tones weigh equally and a tone the singer skipped drags the
    /// line down.
    fn score_line(&self, samples: &[ScoredSample], line: &Line) -> u32 {
        let tones = &line.tones;
        let mut bucket_means: Vec<f64> = Vec::with_capacity(tones.len());
        let mut bucket_total = 0.0;
        let mut bucket_len = 0usize;
        let mut tone_idx = 0usize;

        for sample in samples {
            while tone_idx < tones.len() && sample.ms > tones[tone_idx].end_ms {
                bucket_means.push(if bucket_len > 0 {
                    bucket_total / bucket_len as f64
                } else {
                    0.0
                });
                bucket_total = 0.0;
                bucket_len = 0;
                tone_idx += 1;
            }
            if tone_idx == tones.len() {
                break;
            }
            if sample.ms >= tones[tone_idx].begin_ms {
                if let Some(score) = sample.score {
                    bucket_total += score;
                    bucket_len += 1;
                }
            }
        }
        if tone_idx < tones.len() {
            bucket_means.push(if bucket_len > 0 {
                bucket_total / bucket_len as f64
            } else {
                0.0
            });
        }

        if bucket_means.is_empty() {
            return 0;
        }
        let mean = bucket_means.iter().sum::<f64>() / bucket_means.len() as f64;
        (mean * f64::from(self.max_line_score())) as u32
    }

    /// The score of a perfectly sung line.
    fn max_line_score(&self) -> u32 {
        100
    }
}

/// Build the algorithm an [`EngineConfig`](crate::config::EngineConfig)
/// selects.
pub fn algorithm_for(method: ScoringMethod) -> Box<dyn ScoringAlgorithm> {
    match method {
        ScoringMethod::Default => Box::new(DefaultScoring),
        ScoringMethod::Fast => Box::new(FastScoring),
    }
}
