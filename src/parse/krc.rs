//! KRC lyric parser.
//!
//! Text shape: `[key:value]` metadata headers followed by data lines of
//! the form `[lineStart,lineDuration]<offset,duration,pitch>word...`,
//! all times in milliseconds with tone offsets relative to the line
//! start. The reference pitch arrives separately as the KRC JSON
//! payload; its first sample marks the end of the instrumental prelude,
//! and lyric lines that end before it are copyright banners, not
//! singable content.

use std::collections::HashMap;

use log::{debug, warn};

use crate::config::ParseConfig;
use crate::error::KaraError;
use crate::model::{Line, SourceFormat, Timeline, Tone};
use crate::pitch::PitchTrack;

/// Whether a line is a KRC data line: a `[start,duration]` header
/// followed by at least one `<offset,duration,pitch>` word mark.
pub(super) fn is_krc_data_line(line: &str) -> bool {
    let line = line.trim();
    if !line.starts_with('[') {
        return false;
    }
    let Some(end) = line.find(']') else {
        return false;
    };
    line[1..end].split(',').count() == 2 && line[end..].contains('<') && line[end..].contains('>')
}

pub(super) fn parse(
    lyric_data: &[u8],
    pitch_data: Option<&[u8]>,
    config: &ParseConfig,
) -> Result<Timeline, KaraError> {
    let content = String::from_utf8_lossy(lyric_data);

    let mut metadata: HashMap<&str, &str> = HashMap::new();
    let mut lines: Vec<Line> = Vec::new();
    let mut duration_ms = 0u64;

    for raw in content.lines() {
        let raw = raw.trim();
        if !raw.starts_with('[') {
            continue;
        }
        if is_krc_data_line(raw) {
            let offset = metadata
                .get("offset")
                .and_then(|v| v.trim().parse::<i64>().ok())
                .unwrap_or(0);
            match parse_data_line(raw, offset) {
                Some((line, line_end)) => {
                    duration_ms = duration_ms.max(line_end);
                    lines.push(line);
                }
                None => warn!("skipping unparsable krc line: {}", raw),
            }
        } else if let Some(colon) = raw.find(':') {
            // Metadata header, e.g. `[ti:星晴]`.
            let key = &raw[1..colon];
            let value = raw[colon + 1..].trim_end_matches(']');
            metadata.insert(key, value);
        }
    }

    if lines.is_empty() {
        return Err(KaraError::InvalidLyric(
            "krc payload holds no timed lines".into(),
        ));
    }

    let mut timeline = Timeline::empty(SourceFormat::Krc);
    timeline.title = metadata.get("ti").map(|s| s.to_string());
    timeline.artist = metadata.get("ar").map(|s| s.to_string());
    timeline.lines = lines;
    timeline.duration_ms = duration_ms;

    let track = pitch_data.map(PitchTrack::from_krc_json).unwrap_or_default();
    if track.is_empty() {
        warn!("krc pitch payload missing or unusable, scoring will be inert");
    } else {
        timeline.verse_start_ms = track.origin_ms;
        timeline.pitch_track = Some(track);

        if config.drop_copyright_lines {
            // Leading lines that finish before the first reference pitch
            // sample cannot be sung; typically the title/copyright banner.
            let banner_count = timeline
                .lines
                .iter()
                .take_while(|l| l.end_ms() < timeline.verse_start_ms)
                .count();
            if banner_count > 0 {
                debug!("dropping {} copyright banner line(s)", banner_count);
                timeline.lines.drain(..banner_count);
                timeline.copyright_line_count = banner_count;
            }
            if timeline.lines.is_empty() {
                return Err(KaraError::InvalidLyric(
                    "krc payload holds only copyright banner lines".into(),
                ));
            }
        }
    }

    Ok(timeline)
}

/// Parse one `[start,duration]<offset,dur,pitch>word...` line. Returns
/// the line and its declared end mark (start + header duration, which
/// may extend past the last tone).
fn parse_data_line(line: &str, offset_ms: i64) -> Option<(Line, u64)> {
    let header_end = line.find(']')?;
    let mut header = line[1..header_end].split(',');
    let start: i64 = header.next()?.trim().parse().ok()?;
    let duration: u64 = header.next()?.trim().parse().ok()?;
    let line_start = (start + offset_ms).max(0) as u64;

    let mut tones = Vec::new();
    for mark in line[header_end + 1..].split('<').filter(|s| !s.is_empty()) {
        let (timing, word) = mark.split_once('>')?;
        let mut parts = timing.split(',');
        let tone_offset: u64 = parts.next()?.trim().parse().ok()?;
        let tone_duration: u64 = parts.next()?.trim().parse().ok()?;
        let pitch: f64 = parts.next()?.trim().parse().ok()?;
        if parts.next().is_some() {
            return None;
        }

        let begin = line_start + tone_offset;
        let mut tone = Tone::new(begin, begin + tone_duration, word);
        tone.ref_pitch = pitch as i32;
        tones.push(tone);
    }
    if tones.is_empty() {
        return None;
    }
    Some((Line::new(tones), line_start + duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "[id:$00000000]\n[ti:星晴]\n[ar:某人]\n[offset:0]\n[0,1600]<0,177,0>星<177,200,0>晴\n[1600,2400]<0,300,0>天<300,500,0>晴\n";

    fn pitch_payload(first_start: u64) -> Vec<u8> {
        format!(
            r#"{{"pitchDatas":[{{"pitch":200.0,"startTime":{},"duration":100}}]}}"#,
            first_start
        )
        .into_bytes()
    }

    #[test]
    fn parses_metadata_and_lines() {
        let timeline = parse(SAMPLE.as_bytes(), None, &ParseConfig::default()).unwrap();
        assert_eq!(timeline.title.as_deref(), Some("星晴"));
        assert_eq!(timeline.artist.as_deref(), Some("某人"));
        assert_eq!(timeline.lines.len(), 2);
        let first = &timeline.lines[0];
        assert_eq!(first.tones[0].begin_ms, 0);
        assert_eq!(first.tones[0].end_ms, 177);
        assert_eq!(first.tones[1].begin_ms, 177);
        assert_eq!(first.text(), "星晴");
        // Duration comes from the last line's declared header window.
        assert_eq!(timeline.duration_ms, 4000);
    }

    #[test]
    fn applies_offset_metadata_to_line_starts() {
        let shifted = SAMPLE.replace("[offset:0]", "[offset:500]");
        let timeline = parse(shifted.as_bytes(), None, &ParseConfig::default()).unwrap();
        assert_eq!(timeline.lines[0].start_ms(), 500);
        assert_eq!(timeline.lines[1].start_ms(), 2100);
    }

    #[test]
    fn pitch_payload_sets_verse_start_and_drops_banner() {
        // First sample at 1600: the whole first line is a banner.
        let timeline = parse(
            SAMPLE.as_bytes(),
            Some(&pitch_payload(1600)),
            &ParseConfig::default(),
        )
        .unwrap();
        assert_eq!(timeline.verse_start_ms, 1600);
        assert_eq!(timeline.copyright_line_count, 1);
        assert_eq!(timeline.lines.len(), 1);
        assert_eq!(timeline.lines[0].start_ms(), 1600);
    }

    #[test]
    fn banner_kept_when_policy_disabled() {
        let config = ParseConfig {
            drop_copyright_lines: false,
            ..ParseConfig::default()
        };
        let timeline = parse(SAMPLE.as_bytes(), Some(&pitch_payload(1600)), &config).unwrap();
        assert_eq!(timeline.lines.len(), 2);
        assert_eq!(timeline.copyright_line_count, 0);
    }

    #[test]
    fn payload_without_data_lines_is_rejected() {
        assert!(parse(b"[ti:only metadata]\n", None, &ParseConfig::default()).is_err());
    }
}
