//! Lyric timeline data model.
//!
//! A [`Timeline`] is built once by a parser and then owned exclusively by
//! the scoring engine for one playback session: [`Line`]s of timed
//! [`Tone`]s, plus an optional separately sampled
//! [`PitchTrack`](crate::pitch::PitchTrack) for formats that decouple
//! words from pitch.

use crate::pitch::PitchTrack;

/// Script/language of a tone's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    /// CJK scripts (the default for sources that carry no language tag).
    Cjk,
    /// Latin scripts.
    Latin,
}

/// First CJK unified ideograph code point.
const CJK_RANGE_START: u32 = 19968;
/// One past the last code point treated as CJK.
const CJK_RANGE_END: u32 = 40869;

impl Language {
    /// Classify a word by its code points: any character outside the CJK
    /// unified ideograph range makes the whole word Latin.
    pub fn of_word(word: &str) -> Language {
        for c in word.chars() {
            if !(CJK_RANGE_START..CJK_RANGE_END).contains(&(c as u32)) {
                return Language::Latin;
            }
        }
        Language::Cjk
    }
}

/// A single timed syllable/word unit with its reference pitch.
#[derive(Debug, Clone, PartialEq)]
pub struct Tone {
    /// Start time in milliseconds.
    pub begin_ms: u64,
    /// End time in milliseconds. Invariant: `begin_ms <= end_ms`.
    pub end_ms: u64,
    /// Text content.
    pub text: String,
    /// Script of the text.
    pub language: Language,
    /// Expected pitch from the song's source, 0 when the source has none.
    pub ref_pitch: i32,
    /// Whether this tone came from a `<monolog>` element.
    pub monolog: bool,
    /// Highlight state, cleared by the engine on drag/seek.
    pub highlighted: bool,
}

impl Tone {
    pub fn new(begin_ms: u64, end_ms: u64, text: impl Into<String>) -> Self {
        Self {
            begin_ms,
            end_ms,
            text: text.into(),
            language: Language::Cjk,
            ref_pitch: 0,
            monolog: false,
            highlighted: false,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.begin_ms)
    }

    /// Whether `ms` falls inside this tone's window (inclusive bounds).
    pub fn contains(&self, ms: u64) -> bool {
        ms >= self.begin_ms && ms <= self.end_ms
    }
}

/// An ordered, non-empty sequence of tones forming one lyric line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Line {
    pub tones: Vec<Tone>,
}

impl Line {
    pub fn new(tones: Vec<Tone>) -> Self {
        Self { tones }
    }

    /// Start of the line: the first tone's begin, or 0 for an empty line.
    pub fn start_ms(&self) -> u64 {
        self.tones.first().map_or(0, |t| t.begin_ms)
    }

    /// End of the line: the last tone's end, or 0 for an empty line.
    pub fn end_ms(&self) -> u64 {
        self.tones.last().map_or(0, |t| t.end_ms)
    }

    /// The line's text, all tones concatenated.
    pub fn text(&self) -> String {
        self.tones.iter().map(|t| t.text.as_str()).collect()
    }
}

/// Which source format a timeline was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// `[mm:ss.xx]` timed text, one tone per line until re-cut against a
    /// pitch track.
    PlainTimedText,
    /// Tone-timed XML (`<song><midi_lrc>...`).
    ToneXml,
    /// KRC word timing plus a separately sampled pitch payload.
    Krc,
}

/// A parsed song: ordered lyric lines and, for formats that carry it, a
/// separate reference pitch track.
#[derive(Debug, Clone)]
pub struct Timeline {
    pub format: SourceFormat,
    /// Song title, when the source declares one.
    pub title: Option<String>,
    /// Artist, when the source declares one.
    pub artist: Option<String>,
    /// Lyric lines in ascending time order.
    pub lines: Vec<Line>,
    /// When the first reference pitch occurs (end of the instrumental
    /// prelude).
    pub verse_start_ms: u64,
    /// Total duration covered by the lyrics in milliseconds.
    pub duration_ms: u64,
    /// Interval-sampled reference pitch, for formats that decouple pitch
    /// from words.
    pub pitch_track: Option<PitchTrack>,
    /// Number of leading copyright-banner lines dropped during parsing.
    pub copyright_line_count: usize,
}

impl Timeline {
    /// The built-in no-op timeline the engine substitutes for invalid
    /// input.
    pub fn empty(format: SourceFormat) -> Self {
        Self {
            format,
            title: None,
            artist: None,
            lines: Vec::new(),
            verse_start_ms: 0,
            duration_ms: 0,
            pitch_track: None,
            copyright_line_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether any reference pitch exists to score against, either on the
    /// tones themselves or in a separate track.
    pub fn has_pitch(&self) -> bool {
        if self.pitch_track.as_ref().is_some_and(|t| !t.is_empty()) {
            return true;
        }
        self.lines
            .iter()
            .any(|l| l.tones.iter().any(|t| t.ref_pitch > 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_of_word_classifies_scripts() {
        assert_eq!(Language::of_word("星"), Language::Cjk);
        assert_eq!(Language::of_word("晴天"), Language::Cjk);
        assert_eq!(Language::of_word("hello"), Language::Latin);
        // Mixed content counts as Latin.
        assert_eq!(Language::of_word("星s"), Language::Latin);
    }

    #[test]
    fn line_bounds_come_from_first_and_last_tone() {
        let line = Line::new(vec![
            Tone::new(1000, 1400, "a"),
            Tone::new(1400, 2000, "b"),
        ]);
        assert_eq!(line.start_ms(), 1000);
        assert_eq!(line.end_ms(), 2000);
        assert_eq!(line.text(), "ab");
    }

    #[test]
    fn empty_timeline_has_no_pitch() {
        let timeline = Timeline::empty(SourceFormat::ToneXml);
        assert!(timeline.is_empty());
        assert!(!timeline.has_pitch());
    }
}
