//! Lyric source parsers.
//!
//! Three source formats are normalized into one [`Timeline`]:
//!
//! - tone-timed XML (`<song><midi_lrc>...`), where every tone carries
//!   its own reference pitch,
//! - KRC word timing (`[start,duration]<offset,dur,pitch>word...`) with
//!   a separately downloaded JSON pitch payload,
//! - plain timed text (`[mm:ss.xx]line`), optionally re-cut against a
//!   binary pitch track.
//!
//! Format detection sniffs the payload itself rather than trusting file
//! extensions, since hosts routinely hand over raw download buffers.

mod krc;
mod lrc;
mod xml;

use log::{debug, warn};

use crate::config::ParseConfig;
use crate::error::KaraError;
use crate::model::{SourceFormat, Timeline};
use crate::pitch::PitchTrack;

/// Sniff the source format from the payload's first non-empty line.
pub fn probe(lyric_data: &[u8]) -> SourceFormat {
    let text = String::from_utf8_lossy(lyric_data);
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    if first_line.contains("xml") || first_line.contains("<song>") {
        return SourceFormat::ToneXml;
    }
    // KRC data lines carry `<offset,duration,pitch>` word marks; plain
    // timed text never does.
    if first_line.starts_with('[') && text.lines().any(krc::is_krc_data_line) {
        return SourceFormat::Krc;
    }
    SourceFormat::PlainTimedText
}

/// Parse lyric bytes (and an optional pitch payload) into a [`Timeline`]
/// with the default [`ParseConfig`].
pub fn parse(lyric_data: &[u8], pitch_data: Option<&[u8]>) -> Result<Timeline, KaraError> {
    parse_with_config(lyric_data, pitch_data, &ParseConfig::default())
}

/// Parse lyric bytes with explicit parser tunables.
///
/// For [`SourceFormat::Krc`] the pitch payload is the KRC JSON variant;
/// for the other formats it is the binary pitch file. A missing or
/// malformed pitch payload is not an error, the timeline just carries no
/// reference pitch beyond what the lyric source itself declares.
pub fn parse_with_config(
    lyric_data: &[u8],
    pitch_data: Option<&[u8]>,
    config: &ParseConfig,
) -> Result<Timeline, KaraError> {
    if lyric_data.is_empty() {
        return Err(KaraError::InvalidLyric("empty lyric payload".into()));
    }

    let format = probe(lyric_data);
    debug!("probed lyric format: {:?}", format);

    match format {
        SourceFormat::ToneXml => {
            let mut timeline = xml::parse(lyric_data, config)?;
            if let Some(bytes) = pitch_data {
                let track = PitchTrack::from_binary(bytes);
                if track.is_empty() {
                    warn!("binary pitch payload unusable, keeping tone pitch only");
                } else {
                    timeline.pitch_track = Some(track);
                }
            }
            Ok(timeline)
        }
        SourceFormat::Krc => krc::parse(lyric_data, pitch_data, config),
        SourceFormat::PlainTimedText => lrc::parse(lyric_data, pitch_data, config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_recognizes_all_formats() {
        assert_eq!(
            probe(b"<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<song>"),
            SourceFormat::ToneXml
        );
        assert_eq!(probe(b"<song><midi_lrc>"), SourceFormat::ToneXml);
        assert_eq!(
            probe("[ti:星晴]\n[0,1600]<0,177,50>word".as_bytes()),
            SourceFormat::Krc
        );
        assert_eq!(probe(b"[00:17.65]some words"), SourceFormat::PlainTimedText);
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(matches!(
            parse(b"", None),
            Err(KaraError::InvalidLyric(_))
        ));
    }
}
