//! Construction-time configuration for the scoring engine and parsers.

use crate::error::KaraError;

/// Which scoring implementation the engine should use.
///
/// Both produce the same scale of results; `Fast` trades a few decimal
/// places of log2 precision for branch-free integer math, for hosts that
/// call [`crate::ScoringEngine::set_pitch`] at a high rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoringMethod {
    /// Portable reference implementation.
    #[default]
    Default,
    /// Accelerated implementation using a polynomial log2 approximation.
    Fast,
}

/// When the voice-pitch smoother forgets its accumulated offset.
///
/// The smoother builds up a per-singer offset over consecutive samples.
/// Resetting per line keeps one badly sung line from biasing the next;
/// resetting per song lets the offset converge on the singer's overall
/// intonation. The original behavior is `PerSong`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmootherResetPolicy {
    /// Reset only on `prepare()`/`reset()`.
    #[default]
    PerSong,
    /// Additionally reset whenever a line completes.
    PerLine,
}

/// Tunables for the scoring engine, fixed at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Scoring difficulty (0-100, default 10). Higher values punish pitch
    /// deviation harder.
    pub level: u8,

    /// Score compensation offset (-100 to 100, default 0), added to every
    /// normalized sample score.
    pub compensation_offset: i8,

    /// Floor below which a normalized sample score snaps to 0 (default 0.0,
    /// range [0, 1]).
    pub minimum_score_per_tone: f64,

    /// Seed added to the cumulative score (default 0).
    pub initial_score: f64,

    /// Scoring implementation to use.
    pub method: ScoringMethod,

    /// Smoother reset policy.
    pub smoother_reset: SmootherResetPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            level: 10,
            compensation_offset: 0,
            minimum_score_per_tone: 0.0,
            initial_score: 0.0,
            method: ScoringMethod::Default,
            smoother_reset: SmootherResetPolicy::PerSong,
        }
    }
}

impl EngineConfig {
    /// Check all values against their documented ranges.
    ///
    /// Out-of-range values are a programming error, not recoverable data,
    /// so engine construction fails fast on them.
    pub fn validate(&self) -> Result<(), KaraError> {
        if self.level > 100 {
            return Err(KaraError::InvalidConfig(format!(
                "level must be 0-100, got {}",
                self.level
            )));
        }
        if !(-100..=100).contains(&self.compensation_offset) {
            return Err(KaraError::InvalidConfig(format!(
                "compensation_offset must be -100 to 100, got {}",
                self.compensation_offset
            )));
        }
        if !(0.0..=1.0).contains(&self.minimum_score_per_tone) {
            return Err(KaraError::InvalidConfig(format!(
                "minimum_score_per_tone must be within [0, 1], got {}",
                self.minimum_score_per_tone
            )));
        }
        if self.initial_score < 0.0 {
            return Err(KaraError::InvalidConfig(format!(
                "initial_score must not be negative, got {}",
                self.initial_score
            )));
        }
        Ok(())
    }
}

/// Tunables for the lyric parsers.
#[derive(Debug, Clone)]
pub struct ParseConfig {
    /// Latin-script sentences longer than this many tones are split into
    /// separate lines for readability (default 5).
    pub latin_split_threshold: usize,

    /// Length of the tones synthesized for plain timed-text lines when a
    /// separate pitch track supplies the reference pitch (default 100 ms).
    pub synth_tone_ms: u64,

    /// Whether KRC copyright banner lines (lines that end before the first
    /// pitch sample) are dropped from the timeline (default true).
    pub drop_copyright_lines: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            latin_split_threshold: 5,
            synth_tone_ms: 100,
            drop_copyright_lines: true,
        }
    }
}
