//! Tone-timed XML lyric parser.
//!
//! Source shape: `<song>` holding `<general>` metadata and a
//! `<midi_lrc>` of `<paragraph>`/`<sentence>` groups, where each
//! `<sentence>` holds `<tone begin=".." end=".." pitch=".." lang="..">`
//! elements with a `<word>` child, or `<monolog>` elements carrying
//! their text directly. Times are fractional seconds.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::config::ParseConfig;
use crate::error::KaraError;
use crate::model::{Language, Line, SourceFormat, Timeline, Tone};

/// Where character data currently belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    None,
    Title,
    Artist,
    Word,
    Monolog,
}

/// A tone element mid-parse: the attributes are known, the word text and
/// final language are not.
struct PendingTone {
    tone: Tone,
    lang_declared: bool,
}

pub(super) fn parse(data: &[u8], config: &ParseConfig) -> Result<Timeline, KaraError> {
    let mut reader = Reader::from_reader(data);
    reader.trim_text(true);

    let mut timeline = Timeline::empty(SourceFormat::ToneXml);
    let mut target = TextTarget::None;
    let mut pending: Option<PendingTone> = None;
    let mut current_line: Vec<Tone> = Vec::new();

    // Latin sentences are split for readability once they exceed the
    // threshold; the counter restarts on each split and each sentence.
    let mut tone_index = 0usize;
    let mut latin_run = false;

    let mut buf = Vec::new();
    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| KaraError::InvalidLyric(format!("malformed lyric xml: {}", e)))?;
        match event {
            Event::Start(e) => match e.name().as_ref() {
                b"name" => target = TextTarget::Title,
                b"singer" => target = TextTarget::Artist,
                b"word" => target = TextTarget::Word,
                b"tone" | b"monolog" => {
                    let is_monolog = e.name().as_ref() == b"monolog";
                    let (tone, lang_declared, latin_attr) = read_tone_start(&e, is_monolog)?;

                    tone_index += 1;
                    if (latin_run || latin_attr)
                        && tone_index > config.latin_split_threshold
                        && !current_line.is_empty()
                    {
                        timeline.lines.push(Line::new(std::mem::take(&mut current_line)));
                        tone_index = 0;
                    }

                    if is_monolog {
                        target = TextTarget::Monolog;
                    }
                    pending = Some(PendingTone { tone, lang_declared });
                }
                _ => {}
            },
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| KaraError::InvalidLyric(format!("malformed lyric xml: {}", e)))?;
                match target {
                    TextTarget::Title => timeline.title = Some(text.into_owned()),
                    TextTarget::Artist => timeline.artist = Some(text.into_owned()),
                    TextTarget::Word | TextTarget::Monolog => {
                        if let Some(p) = pending.as_mut() {
                            p.tone.text.push_str(&text);
                        }
                    }
                    TextTarget::None => {}
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"name" | b"singer" | b"word" => target = TextTarget::None,
                b"tone" | b"monolog" => {
                    target = TextTarget::None;
                    if let Some(mut p) = pending.take() {
                        // Some sources drop the lang attribute; fall back
                        // to the character-range heuristic on the word.
                        if !p.lang_declared {
                            p.tone.language = Language::of_word(&p.tone.text);
                        }
                        latin_run = p.tone.language == Language::Latin;
                        current_line.push(p.tone);
                    }
                }
                b"sentence" => {
                    if !current_line.is_empty() {
                        timeline.lines.push(Line::new(std::mem::take(&mut current_line)));
                    }
                    tone_index = 0;
                    latin_run = false;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if timeline.lines.is_empty() {
        return Err(KaraError::InvalidLyric(
            "lyric xml holds no timed sentences".into(),
        ));
    }

    timeline.verse_start_ms = timeline.lines[0].start_ms();
    timeline.duration_ms = timeline.lines.last().map_or(0, |l| l.end_ms());
    Ok(timeline)
}

/// Decode a `<tone>`/`<monolog>` start tag's attributes.
///
/// Returns the half-built tone, whether `lang` was declared, and whether
/// the declared language is Latin.
fn read_tone_start(
    e: &BytesStart<'_>,
    is_monolog: bool,
) -> Result<(Tone, bool, bool), KaraError> {
    let mut begin_ms = None;
    let mut end_ms = None;
    let mut ref_pitch = 0i32;
    let mut lang_declared = false;
    let mut language = Language::Cjk;

    for attr in e.attributes() {
        let attr =
            attr.map_err(|e| KaraError::InvalidLyric(format!("malformed lyric xml: {}", e)))?;
        let value = attr
            .unescape_value()
            .map_err(|e| KaraError::InvalidLyric(format!("malformed lyric xml: {}", e)))?;
        match attr.key.as_ref() {
            // Times come as fractional seconds.
            b"begin" => begin_ms = value.trim().parse::<f64>().ok().map(|s| (s * 1000.0) as u64),
            b"end" => end_ms = value.trim().parse::<f64>().ok().map(|s| (s * 1000.0) as u64),
            b"pitch" => ref_pitch = value.trim().parse().unwrap_or(0),
            b"lang" => {
                lang_declared = true;
                // "1" marks CJK in this format.
                if value.as_ref() != "1" {
                    language = Language::Latin;
                }
            }
            _ => {}
        }
    }

    let (begin_ms, end_ms) = match (begin_ms, end_ms) {
        (Some(b), Some(e)) if e >= b => (b, e),
        _ => {
            return Err(KaraError::InvalidLyric(
                "tone element without a valid begin/end window".into(),
            ))
        }
    };

    let mut tone = Tone::new(begin_ms, end_ms, "");
    tone.language = language;
    tone.ref_pitch = ref_pitch;
    tone.monolog = is_monolog;
    Ok((tone, lang_declared, lang_declared && language == Language::Latin))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<song>
  <general>
    <name>Clear Day</name>
    <singer>Somebody</singer>
  </general>
  <midi_lrc>
    <paragraph>
      <sentence>
        <tone begin="1.0" end="1.4" pitch="50" lang="1"><word>星</word></tone>
        <tone begin="1.4" end="2.0" pitch="52" lang="1"><word>晴</word></tone>
      </sentence>
      <sentence>
        <tone begin="3.0" end="3.5" pitch="48"><word>天</word></tone>
      </sentence>
    </paragraph>
  </midi_lrc>
</song>"#;

    #[test]
    fn parses_sentences_and_metadata() {
        let timeline = parse(SAMPLE.as_bytes(), &ParseConfig::default()).unwrap();
        assert_eq!(timeline.title.as_deref(), Some("Clear Day"));
        assert_eq!(timeline.artist.as_deref(), Some("Somebody"));
        assert_eq!(timeline.lines.len(), 2);
        let first = &timeline.lines[0];
        assert_eq!(first.tones.len(), 2);
        assert_eq!(first.tones[0].begin_ms, 1000);
        assert_eq!(first.tones[0].end_ms, 1400);
        assert_eq!(first.tones[0].ref_pitch, 50);
        assert_eq!(first.tones[0].text, "星");
        assert_eq!(timeline.verse_start_ms, 1000);
        assert_eq!(timeline.duration_ms, 3500);
    }

    #[test]
    fn missing_lang_falls_back_to_word_heuristic() {
        let timeline = parse(SAMPLE.as_bytes(), &ParseConfig::default()).unwrap();
        assert_eq!(timeline.lines[1].tones[0].language, Language::Cjk);
    }

    #[test]
    fn long_latin_sentences_split_at_threshold() {
        let mut tones = String::new();
        for i in 0..8 {
            let begin = 1.0 + i as f64;
            tones.push_str(&format!(
                r#"<tone begin="{}" end="{}" pitch="40" lang="2"><word>la </word></tone>"#,
                begin,
                begin + 0.5
            ));
        }
        let xml = format!(
            "<song><midi_lrc><paragraph><sentence>{}</sentence></paragraph></midi_lrc></song>",
            tones
        );
        let timeline = parse(xml.as_bytes(), &ParseConfig::default()).unwrap();
        assert_eq!(timeline.lines.len(), 2);
        assert_eq!(timeline.lines[0].tones.len(), 5);
        assert_eq!(timeline.lines[1].tones.len(), 3);
    }

    #[test]
    fn monolog_text_is_read_directly() {
        let xml = r#"<song><midi_lrc><paragraph><sentence>
            <monolog begin="1.0" end="2.0" pitch="44" lang="1">說白</monolog>
        </sentence></paragraph></midi_lrc></song>"#;
        let timeline = parse(xml.as_bytes(), &ParseConfig::default()).unwrap();
        let tone = &timeline.lines[0].tones[0];
        assert!(tone.monolog);
        assert_eq!(tone.text, "說白");
        assert_eq!(tone.ref_pitch, 44);
    }

    #[test]
    fn xml_without_sentences_is_rejected() {
        let xml = b"<song><midi_lrc></midi_lrc></song>";
        assert!(parse(xml, &ParseConfig::default()).is_err());
    }
}
