//! # Scoring Engine
//!
//! The synchronization state machine that ties everything together:
//! it receives player progress and microphone pitch from the host,
//! locates the active tone on the [`Timeline`](crate::model::Timeline),
//! smooths and scores each voice sample, detects line completions, and
//! reports results through a [`ScoringListener`].
//!
//! ## Call model
//! Single-threaded and synchronous: the host drives `set_progress`,
//! `set_pitch`, `drag_to`, and `reset` from one timer/audio thread,
//! and every call is a pure state transform that returns before the
//! next may begin. The engine never blocks and performs no I/O.
//!
//! ## Robustness
//! Progress streams from real players drift, drop, and burst. The
//! engine estimates the inter-call delta (clamped to a sane range),
//! debounces unvoiced microphone frames, fires each line's completion
//! at most once, and recovers from seeks without replaying audio.
//!
//! ## Example
//! ```rust
//! use kara::{EngineConfig, NoopListener, ScoringEngine};
//!
//! let mut engine = ScoringEngine::new(EngineConfig::default(), Box::new(NoopListener))?;
//! let timeline = kara::parse(
//!     b"[00:01.00]first line\n[00:05.00]second line\n",
//!     None,
//! )?;
//! engine.prepare(timeline);
//! for t in (0..10_000u64).step_by(20) {
//!     engine.set_progress(t);
//! }
//! assert_eq!(engine.cumulative_score(), 0); // no pitch data, no points
//! # Ok::<(), kara::KaraError>(())
//! ```

mod listener;


pub use listener::{NoopListener, ScoringListener};

use std::collections::BTreeMap;

use log::{debug, error, warn};

use crate::config::{EngineConfig, SmootherResetPolicy};
use crate::error::KaraError;
use crate::model::{SourceFormat, Timeline};
use crate::pitch::PitchSmoother;
use crate::scoring::{algorithm_for, ScoredSample, ScoringAlgorithm};

/// Fallback inter-call delta when the observed spacing is unusable.
const DEFAULT_DELTA_MS: u64 = 20;

/// Observed deltas above this are treated as seeks/stalls, not spacing.
const MAX_DELTA_MS: u64 = 100;

/// Unvoiced frames tolerated before the UI is told the singer stopped.
const ZERO_PITCH_DEBOUNCE: u32 = 10;

/// Reference pitch floor used to seed the running minimum.
const MIN_REF_PITCH_SEED: f64 = 100.0;

/// One window of constant reference pitch inside a line.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RefSpan {
    begin_ms: u64,
    end_ms: u64,
    pitch: f64,
}

impl RefSpan {
    fn contains(&self, ms: u64) -> bool {
        ms >= self.begin_ms && ms <= self.end_ms
    }
}

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No timeline loaded, or `reset()` called; calls are ignored.
    Idle,
    /// `prepare()` succeeded; waiting for the first progress update.
    Prepared,
    /// Progress updates are flowing.
    Running,
}

/// Real-time karaoke scoring state machine.
///
/// Construct once per listener, then [`prepare`](Self::prepare) a
/// timeline per song. See the module docs for the call model.
pub struct ScoringEngine {
    config: EngineConfig,
    algorithm: Box<dyn ScoringAlgorithm>,
    listener: Box<dyn ScoringListener>,
    smoother: PitchSmoother,

    timeline: Timeline,
    /// Per-line reference pitch windows, parallel to `timeline.lines`.
    ref_spans: Vec<Vec<RefSpan>>,
    total_ref_pitch_count: usize,
    min_ref_pitch: f64,
    max_ref_pitch: f64,
    end_of_lyrics_ms: u64,
    perfect_score: u32,

    phase: Phase,
    progress_ms: u64,
    delta_ms: u64,
    current_line: Option<usize>,
    /// Cached active span so steady progress avoids re-searching.
    current_span: Option<RefSpan>,
    /// Voice samples for the line currently being sung, keyed by
    /// timestamp. `None` marks a scoreable position that received no
    /// voice sample.
    samples: BTreeMap<u64, Option<f64>>,
    /// Scores of completed lines; doubles as the fired-once guard and
    /// as the cache consulted on seek.
    line_scores: BTreeMap<usize, u32>,
    cumulative: f64,
    zero_pitch_streak: u32,
}

impl ScoringEngine {
    /// Build an engine. Fails fast on an out-of-range configuration.
    pub fn new(
        config: EngineConfig,
        listener: Box<dyn ScoringListener>,
    ) -> Result<Self, KaraError> {
        config.validate()?;
        let algorithm = algorithm_for(config.method);
        Ok(Self {
            config,
            algorithm,
            listener,
            smoother: PitchSmoother::new(),
            timeline: Timeline::empty(SourceFormat::PlainTimedText),
            ref_spans: Vec::new(),
            total_ref_pitch_count: 0,
            min_ref_pitch: MIN_REF_PITCH_SEED,
            max_ref_pitch: 0.0,
            end_of_lyrics_ms: 0,
            perfect_score: 0,
            phase: Phase::Idle,
            progress_ms: 0,
            delta_ms: DEFAULT_DELTA_MS,
            current_line: None,
            current_span: None,
            samples: BTreeMap::new(),
            line_scores: BTreeMap::new(),
            cumulative: 0.0,
            zero_pitch_streak: 0,
        })
    }

    /// Load a timeline for one playback session, replacing any previous
    /// one. Never fails: an unusable timeline is swapped for the empty
    /// one and logged, and the engine keeps accepting calls safely.
    pub fn prepare(&mut self, timeline: Timeline) {
        self.reset_state();

        let mut timeline = timeline;
        if timeline.is_empty() {
            error!("prepare called with an empty timeline, scoring disabled");
            timeline = Timeline::empty(timeline.format);
        }
        normalize_line_overlaps(&mut timeline);

        self.ref_spans = build_ref_spans(&timeline);
        self.total_ref_pitch_count = self.ref_spans.iter().map(Vec::len).sum();
        self.min_ref_pitch = MIN_REF_PITCH_SEED;
        self.max_ref_pitch = 0.0;
        for span in self.ref_spans.iter().flatten() {
            self.min_ref_pitch = self.min_ref_pitch.min(span.pitch);
            self.max_ref_pitch = self.max_ref_pitch.max(span.pitch);
        }

        self.end_of_lyrics_ms = timeline.lines.last().map_or(0, |l| l.end_ms());
        self.perfect_score =
            self.algorithm.max_line_score() * timeline.lines.len() as u32;
        self.cumulative = self.config.initial_score;
        self.timeline = timeline;
        self.phase = Phase::Prepared;
        debug!(
            "prepared timeline: {} line(s), {} reference pitch window(s), end at {}ms",
            self.timeline.lines.len(),
            self.total_ref_pitch_count,
            self.end_of_lyrics_ms
        );
    }

    /// Player progress update, absolute milliseconds.
    ///
    /// `t == 0` restarts the session: accumulated scores are dropped and
    /// the UI is told to reset. Otherwise the engine relocates the
    /// active tone and fires any due line completion.
    pub fn set_progress(&mut self, t: u64) {
        if self.phase == Phase::Idle {
            return;
        }
        self.advance(t);
        // Every accepted progress update asks the host to repaint.
        self.listener.request_refresh_ui();
    }

    fn advance(&mut self, t: u64) {
        if t == 0 {
            self.restart();
            return;
        }

        // Estimate call spacing. A repeated timestamp is no spacing
        // sample at all; a jump past MAX means a stall or a seek.
        self.delta_ms = match t.saturating_sub(self.progress_ms) {
            0 => self.delta_ms,
            d if d <= MAX_DELTA_MS => d,
            _ => DEFAULT_DELTA_MS,
        };
        self.progress_ms = t;
        self.phase = Phase::Running;

        if self.timeline.is_empty() {
            return;
        }

        self.locate(t);
        if self.current_span.is_some_and(|span| span.contains(t)) {
            // Pencil in a placeholder so silence inside a scoreable
            // window still walks the line's tones during aggregation.
            self.samples.entry(t).or_insert(None);
        }
        self.detect_line_finish(t);
    }

    /// Microphone pitch sample at absolute time `t`.
    ///
    /// Unvoiced input (`pitch <= 0`) is debounced: only after
    /// [`ZERO_PITCH_DEBOUNCE`] consecutive unvoiced frames is the UI
    /// reset, so single-frame detection glitches cost nothing.
    pub fn set_pitch(&mut self, pitch: f64, t: u64) {
        if self.phase == Phase::Idle || self.timeline.is_empty() {
            return;
        }

        if pitch <= 0.0 {
            self.zero_pitch_streak += 1;
            if self.zero_pitch_streak >= ZERO_PITCH_DEBOUNCE {
                self.zero_pitch_streak = 0;
                self.listener.reset_ui();
            }
            return;
        }
        self.zero_pitch_streak = 0;

        let ref_pitch = self.ref_pitch_at(t);
        if ref_pitch <= 0.0 {
            // Nothing to sing here; a lit pitch indicator would mislead.
            self.listener.reset_ui();
            return;
        }

        let corrected = self.smoother.correct(pitch, ref_pitch, self.max_ref_pitch);
        let score = self.algorithm.score_pitch(
            self.config.minimum_score_per_tone,
            self.config.level,
            self.config.compensation_offset,
            corrected,
            ref_pitch,
        );
        self.samples.insert(t, Some(score));

        let within_active_tone = self
            .current_span
            .is_some_and(|span| span.contains(t));
        self.listener
            .on_pitch_and_score_update(corrected, score, within_active_tone, t);
        self.listener.request_refresh_ui();
    }

    /// The host seeked/dragged to `new_t`.
    ///
    /// Lines whose end lies at or past the new position have not been
    /// sung from here, so their cached scores are dropped and the
    /// cumulative score is rebuilt from the survivors. Never re-fires
    /// `on_line_finished`.
    pub fn drag_to(&mut self, new_t: u64) {
        if self.phase == Phase::Idle {
            return;
        }

        for line in &mut self.timeline.lines {
            for tone in &mut line.tones {
                tone.highlighted = false;
            }
        }

        let lines = &self.timeline.lines;
        self.line_scores.retain(|&i, _| lines[i].end_ms() < new_t);
        self.cumulative = self.config.initial_score
            + self.line_scores.values().map(|&s| f64::from(s)).sum::<f64>();

        self.samples.clear();
        self.smoother.reset();
        self.zero_pitch_streak = 0;
        self.current_line = None;
        self.current_span = None;
        self.progress_ms = new_t;
        debug!(
            "drag to {}ms, {} cached line score(s) kept",
            new_t,
            self.line_scores.len()
        );
        self.listener.request_refresh_ui();
    }

    /// "Song stopped": clears all per-session state but keeps the
    /// loaded timeline, so the host may `prepare` again or discard the
    /// engine.
    pub fn reset(&mut self) {
        self.reset_state();
        self.phase = Phase::Idle;
        self.listener.reset_ui();
    }

    /// The cumulative score so far (initial seed plus finished lines).
    pub fn cumulative_score(&self) -> u32 {
        self.cumulative as u32
    }

    /// The score of a perfect performance of the loaded timeline.
    pub fn perfect_score(&self) -> u32 {
        self.perfect_score
    }

    /// Scores of completed lines, by line index.
    pub fn line_scores(&self) -> &BTreeMap<usize, u32> {
        &self.line_scores
    }

    /// Lowest voiced reference pitch observed in the loaded timeline.
    pub fn min_ref_pitch(&self) -> f64 {
        self.min_ref_pitch
    }

    /// Highest reference pitch observed in the loaded timeline.
    pub fn max_ref_pitch(&self) -> f64 {
        self.max_ref_pitch
    }

    /// The loaded timeline.
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    fn reset_state(&mut self) {
        self.smoother.reset();
        self.progress_ms = 0;
        self.delta_ms = DEFAULT_DELTA_MS;
        self.current_line = None;
        self.current_span = None;
        self.samples.clear();
        self.line_scores.clear();
        self.cumulative = self.config.initial_score;
        self.zero_pitch_streak = 0;
    }

    /// Progress went back to zero mid-session: the player restarted the
    /// song. Accumulated scores belong to the abandoned run.
    fn restart(&mut self) {
        debug!("progress back at zero, restarting session");
        self.samples.clear();
        self.line_scores.clear();
        self.cumulative = self.config.initial_score;
        self.current_line = None;
        self.current_span = None;
        self.smoother.reset();
        self.zero_pitch_streak = 0;
        self.progress_ms = 0;
        self.listener.reset_ui();
    }

    /// Re-locate the active line and reference span for `t`. Steady
    /// forward progress inside the cached span is free.
    fn locate(&mut self, t: u64) {
        if self.current_span.is_some_and(|span| span.contains(t)) {
            return;
        }

        // Track which line is being sung; between lines the previous
        // index is kept so its completion can still be detected.
        let located = self
            .timeline
            .lines
            .iter()
            .position(|l| t >= l.start_ms() && t <= l.end_ms());
        if let Some(i) = located {
            self.current_line = Some(i);
            for tone in &mut self.timeline.lines[i].tones {
                if tone.contains(t) {
                    tone.highlighted = true;
                }
            }
        }

        let span = self
            .current_line
            .and_then(|i| self.ref_spans[i].iter().find(|s| s.contains(t)))
            .copied();
        if span != self.current_span {
            self.current_span = span;
            if let Some(span) = span {
                self.listener
                    .on_ref_pitch_update(span.pitch, self.total_ref_pitch_count, t);
            }
        }
    }

    /// Fire `on_line_finished` if `t` shows the current line is done.
    ///
    /// A line counts as finished when progress passed its end mark, or
    /// is within one delta-estimate of the next line's start (pre-fire,
    /// so short final sample windows are not missed). The score cache
    /// entry guards against firing twice.
    fn detect_line_finish(&mut self, t: u64) {
        let Some(i) = self.current_line else {
            return;
        };
        if self.line_scores.contains_key(&i) {
            return;
        }
        if t < self.timeline.verse_start_ms || t > self.end_of_lyrics_ms + 2 * self.delta_ms {
            return;
        }

        let past_end = t > self.timeline.lines[i].end_ms();
        let near_next = self
            .timeline
            .lines
            .get(i + 1)
            .is_some_and(|next| t + self.delta_ms >= next.start_ms());
        if !past_end && !near_next {
            return;
        }

        let collected: Vec<ScoredSample> = self
            .samples
            .iter()
            .map(|(&ms, &score)| ScoredSample { ms, score })
            .collect();
        let score = self
            .algorithm
            .score_line(&collected, &self.timeline.lines[i]);
        self.cumulative += f64::from(score);
        self.line_scores.insert(i, score);
        self.samples.clear();
        // The span cache stays: the tail of the line may still be
        // playing, and re-acquiring it must not look like a new window.
        self.current_line = None;
        if self.config.smoother_reset == SmootherResetPolicy::PerLine {
            self.smoother.reset();
        }

        debug!("line {} finished with score {}", i, score);
        self.listener.on_line_finished(
            &self.timeline.lines[i],
            score,
            self.cumulative as u32,
            self.perfect_score,
            i,
            self.timeline.lines.len(),
        );
    }

    /// Reference pitch at `t`: the cached span when it matches, a full
    /// search otherwise, 0 when nothing is meant to be sung.
    fn ref_pitch_at(&self, t: u64) -> f64 {
        if let Some(span) = self.current_span {
            if span.contains(t) {
                return span.pitch;
            }
        }
        self.ref_spans
            .iter()
            .flatten()
            .find(|s| s.contains(t))
            .map_or(0.0, |s| s.pitch)
    }
}

/// Clamp tone windows so no line starts before the previous one ends;
/// overlapping source data would make tone location ambiguous.
fn normalize_line_overlaps(timeline: &mut Timeline) {
    for i in 1..timeline.lines.len() {
        let prev_end = timeline.lines[i - 1].end_ms();
        let line = &mut timeline.lines[i];
        if line.start_ms() < prev_end {
            warn!(
                "line {} starts at {}ms before previous line ends at {}ms, clamping",
                i,
                line.start_ms(),
                prev_end
            );
            for tone in &mut line.tones {
                tone.begin_ms = tone.begin_ms.max(prev_end);
                tone.end_ms = tone.end_ms.max(tone.begin_ms);
            }
        }
    }
}

/// Build the per-line reference pitch windows every scoring path reads.
///
/// With a separate pitch track, a line's windows come from the voiced
/// track samples whose grid window falls fully inside the line; without
/// one, each tone with a positive reference pitch is its own window.
fn build_ref_spans(timeline: &Timeline) -> Vec<Vec<RefSpan>> {
    let mut spans: Vec<Vec<RefSpan>> = Vec::with_capacity(timeline.lines.len());

    if let Some(track) = timeline.pitch_track.as_ref().filter(|t| !t.is_empty()) {
        for line in &timeline.lines {
            let mut line_spans = Vec::new();
            for (idx, &pitch) in track.samples.iter().enumerate() {
                if pitch <= 0.0 {
                    continue;
                }
                let (begin, end) = track.sample_window(idx);
                if begin >= line.start_ms() && end <= line.end_ms() {
                    line_spans.push(RefSpan {
                        begin_ms: begin,
                        end_ms: end,
                        pitch,
                    });
                }
            }
            spans.push(line_spans);
        }
    } else {
        for line in &timeline.lines {
            spans.push(
                line.tones
                    .iter()
                    .filter(|t| t.ref_pitch > 0)
                    .map(|t| RefSpan {
                        begin_ms: t.begin_ms,
                        end_ms: t.end_ms,
                        pitch: f64::from(t.ref_pitch),
                    })
                    .collect(),
            );
        }
    }
    spans
}
