//! Plain timed-text lyric parser.
//!
//! Source shape: `[mm:ss.xx]text` lines, where a line may repeat its
//! text under several timestamps (`[00:10.00][01:10.00]chorus`). The
//! format carries start marks only, so each line ends where the next
//! begins; the last line's end is unknowable and gets a fixed tail.
//! When a binary pitch track accompanies the lyric, every line is
//! re-cut into short fixed-width tones whose reference pitch is the
//! track's average over the tone window.

use log::warn;

use crate::config::ParseConfig;
use crate::error::KaraError;
use crate::model::{Language, Line, SourceFormat, Timeline, Tone};
use crate::pitch::PitchTrack;

/// Tail appended to the last line, whose true end the format omits.
const FAKED_LAST_LINE_MS: u64 = 8765;

pub(super) fn parse(
    lyric_data: &[u8],
    pitch_data: Option<&[u8]>,
    config: &ParseConfig,
) -> Result<Timeline, KaraError> {
    let content = String::from_utf8_lossy(lyric_data);

    let mut entries: Vec<(u64, String)> = Vec::new();
    for raw in content.lines() {
        parse_line(raw.trim(), &mut entries);
    }
    if entries.is_empty() {
        return Err(KaraError::InvalidLyric(
            "timed text holds no [mm:ss.xx] lines".into(),
        ));
    }
    // Repeated-timestamp lines arrive out of order.
    entries.sort_by_key(|(start, _)| *start);

    let mut lines: Vec<Line> = entries
        .iter()
        .map(|(start, text)| {
            let mut tone = Tone::new(*start, *start, text.clone());
            tone.language = Language::of_word(text);
            Line::new(vec![tone])
        })
        .collect();

    // Each line runs until the next one starts.
    for i in 0..lines.len() - 1 {
        let next_start = lines[i + 1].start_ms();
        lines[i].tones[0].end_ms = next_start;
    }
    if let Some(last) = lines.last_mut() {
        last.tones[0].end_ms = last.tones[0].begin_ms + FAKED_LAST_LINE_MS;
    }

    let mut timeline = Timeline::empty(SourceFormat::PlainTimedText);
    timeline.verse_start_ms = lines[0].start_ms();
    timeline.duration_ms = lines.last().map_or(0, |l| l.end_ms());
    timeline.lines = lines;

    if let Some(bytes) = pitch_data {
        let mut track = PitchTrack::from_binary(bytes);
        if track.is_empty() {
            warn!("binary pitch payload unusable, timed text stays pitchless");
        } else {
            // The binary file's sample 0 sits at the first sung word.
            track.origin_ms = timeline.verse_start_ms;
            recut_lines(&mut timeline.lines, &track, config.synth_tone_ms);
        }
    }

    Ok(timeline)
}

/// Split each line (except the open-ended last one) into fixed-width
/// tones carrying the pitch track's average over their window. The
/// original word text stays on the first tone of its line.
fn recut_lines(lines: &mut [Line], track: &PitchTrack, synth_tone_ms: u64) {
    let line_count = lines.len();
    for line in lines.iter_mut().take(line_count - 1) {
        let start = line.start_ms();
        let end = line.end_ms();
        let text = line.tones[0].text.clone();
        let language = line.tones[0].language;

        let count = ((end - start) / synth_tone_ms).max(1);
        let mut tones = Vec::with_capacity(count as usize);
        for j in 0..count {
            let begin = start + j * synth_tone_ms;
            let tone_end = begin + synth_tone_ms - 1;
            let mut tone = Tone::new(begin, tone_end, if j == 0 { text.as_str() } else { "" });
            tone.language = language;
            tone.ref_pitch = track.range_average(begin, tone_end) as i32;
            tones.push(tone);
        }
        line.tones = tones;
    }
}

/// Parse one `[mm:ss.xx]...[mm:ss.xx]text` line into (start, text)
/// entries, one per timestamp. Lines without a timestamp or without
/// text are skipped.
fn parse_line(line: &str, entries: &mut Vec<(u64, String)>) {
    let mut rest = line;
    let mut starts = Vec::new();
    while let Some(inner_end) = rest.strip_prefix('[').and_then(|r| r.find(']')) {
        let Some(start) = parse_timestamp(&rest[1..inner_end + 1]) else {
            break;
        };
        starts.push(start);
        rest = &rest[inner_end + 2..];
    }
    let text = rest.trim();
    if text.is_empty() {
        return;
    }
    for start in starts {
        entries.push((start, text.to_string()));
    }
}

/// Parse `mm:ss.xx` or `mm:ss.xxx` into milliseconds.
fn parse_timestamp(stamp: &str) -> Option<u64> {
    let (minutes, rest) = stamp.split_once(':')?;
    let (seconds, fraction) = rest.split_once('.')?;
    if minutes.len() != 2 || seconds.len() != 2 || !(2..=3).contains(&fraction.len()) {
        return None;
    }
    let minutes: u64 = minutes.parse().ok()?;
    let seconds: u64 = seconds.parse().ok()?;
    let mut millis: u64 = fraction.parse().ok()?;
    if fraction.len() == 2 {
        millis *= 10;
    }
    Some(minutes * 60_000 + seconds * 1_000 + millis)
}
