//! Callback surface toward the rendering/UI layer.

use crate::model::Line;

/// Events the engine reports to its host while a song plays.
///
/// Every method has a no-op default so hosts implement only what they
/// render. Callbacks must return quickly and must not call back into
/// the engine; the engine invokes them synchronously from inside its
/// own state transitions.
pub trait ScoringListener {
    /// A line has been sung to completion and scored.
    ///
    /// Fires at most once per line, in ascending index order.
    fn on_line_finished(
        &mut self,
        line: &Line,
        score: u32,
        cumulative_score: u32,
        perfect_score: u32,
        index: usize,
        total_lines: usize,
    ) {
        let _ = (line, score, cumulative_score, perfect_score, index, total_lines);
    }

    /// Playback has moved onto a position with a new reference pitch.
    fn on_ref_pitch_update(&mut self, ref_pitch: f64, total_ref_pitch_count: usize, progress: u64) {
        let _ = (ref_pitch, total_ref_pitch_count, progress);
    }

    /// A microphone sample has been smoothed and scored.
    fn on_pitch_and_score_update(
        &mut self,
        corrected_pitch: f64,
        score: f64,
        within_active_tone: bool,
        progress: u64,
    ) {
        let _ = (corrected_pitch, score, within_active_tone, progress);
    }

    /// The singer has gone quiet or the song restarted; clear any live
    /// pitch indicator.
    fn reset_ui(&mut self) {}

    /// Engine state changed in a way that needs a redraw (e.g. seek).
    fn request_refresh_ui(&mut self) {}
}

/// Listener that ignores every event, for hosts that only want the
/// final scores.
#[derive(Debug, Default)]
pub struct NoopListener;

impl ScoringListener for NoopListener {}
