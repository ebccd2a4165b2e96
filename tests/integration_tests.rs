//! Integration tests for the karaoke scoring pipeline
//!
//! Tests the full flow from raw lyric/pitch payloads through parsing,
//! engine preparation, a synthetic playback session, and final scores.

use std::cell::RefCell;
use std::rc::Rc;

use kara::{
    parse, prepare_engine, EngineConfig, Line, NoopListener, ScoringListener, SourceFormat,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Records line completions for assertions.
#[derive(Default)]
struct LineRecorder {
    finished: Rc<RefCell<Vec<(usize, u32, u32)>>>,
}

impl ScoringListener for LineRecorder {
    fn on_line_finished(
        &mut self,
        _line: &Line,
        score: u32,
        cumulative_score: u32,
        _perfect_score: u32,
        index: usize,
        _total_lines: usize,
    ) {
        self.finished
            .borrow_mut()
            .push((index, score, cumulative_score));
    }
}

fn binary_pitch_file(interval_ms: i32, samples: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&1i32.to_le_bytes());
    bytes.extend_from_slice(&interval_ms.to_le_bytes());
    bytes.extend_from_slice(&0i32.to_le_bytes());
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

const XML_SONG: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<song>
  <general><name>Test Song</name><singer>Tester</singer></general>
  <midi_lrc>
    <paragraph>
      <sentence>
        <tone begin="1.0" end="2.0" pitch="220" lang="1"><word>一</word></tone>
        <tone begin="2.0" end="3.0" pitch="220" lang="1"><word>二</word></tone>
      </sentence>
      <sentence>
        <tone begin="4.0" end="5.0" pitch="220" lang="1"><word>三</word></tone>
      </sentence>
    </paragraph>
  </midi_lrc>
</song>"#;

#[test]
fn test_xml_song_perfect_playthrough() {
    init_logging();
    let recorder = LineRecorder::default();
    let finished = recorder.finished.clone();

    let mut engine = prepare_engine(
        XML_SONG.as_bytes(),
        None,
        EngineConfig::default(),
        Box::new(recorder),
    )
    .expect("should parse and prepare the xml song");

    assert_eq!(engine.timeline().format, SourceFormat::ToneXml);
    assert_eq!(engine.timeline().title.as_deref(), Some("Test Song"));
    assert_eq!(engine.perfect_score(), 200);

    let mut t = 0u64;
    while t <= 5200 {
        engine.set_progress(t);
        engine.set_pitch(220.0, t);
        t += 20;
    }

    let finished = finished.borrow();
    assert_eq!(finished.len(), 2);
    assert_eq!(finished[0], (0, 100, 100));
    assert_eq!(finished[1], (1, 100, 200));
    assert_eq!(engine.cumulative_score(), 200);
}

#[test]
fn test_krc_song_with_json_pitch_payload() {
    init_logging();
    let krc = "[ti:测试]\n[ar:人]\n[0,1000]<0,500,0>版<500,500,0>权\n[2000,2000]<0,1000,0>真<1000,1000,0>词\n";
    let pitch = br#"{
        "version": 1,
        "interval": 50,
        "pitchDatas": [
            {"pitch": 200.0, "startTime": 2000, "duration": 2000}
        ]
    }"#;

    let timeline = parse(krc.as_bytes(), Some(pitch)).expect("krc should parse");
    assert_eq!(timeline.format, SourceFormat::Krc);
    // The banner line ends before the first pitch sample and is dropped.
    assert_eq!(timeline.copyright_line_count, 1);
    assert_eq!(timeline.lines.len(), 1);
    assert_eq!(timeline.verse_start_ms, 2000);
    assert!(timeline.has_pitch());

    let recorder = LineRecorder::default();
    let finished = recorder.finished.clone();
    let mut engine = kara::ScoringEngine::new(EngineConfig::default(), Box::new(recorder)).unwrap();
    engine.prepare(timeline);

    let mut t = 0u64;
    while t <= 4500 {
        engine.set_progress(t);
        engine.set_pitch(200.0, t);
        t += 20;
    }

    let finished = finished.borrow();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].1, 100);
}

#[test]
fn test_timed_text_with_binary_pitch_track() {
    init_logging();
    let lrc = "[00:01.00]first\n[00:03.00]second\n[00:05.00]last\n";
    // 10ms samples covering 4s from the first line's start.
    let pitch = binary_pitch_file(10, &vec![180.0; 400]);

    let timeline = parse(lrc.as_bytes(), Some(&pitch)).expect("timed text should parse");
    assert_eq!(timeline.format, SourceFormat::PlainTimedText);
    assert_eq!(timeline.lines.len(), 3);
    // Re-cut into 100ms tones carrying the track's pitch.
    assert_eq!(timeline.lines[0].tones.len(), 20);
    assert_eq!(timeline.lines[0].tones[0].ref_pitch, 180);
    assert!(timeline.has_pitch());

    let mut engine =
        kara::ScoringEngine::new(EngineConfig::default(), Box::new(NoopListener)).unwrap();
    engine.prepare(timeline);
    let mut t = 0u64;
    while t <= 3500 {
        engine.set_progress(t);
        engine.set_pitch(180.0, t);
        t += 20;
    }
    // First line (1000-3000ms) sung perfectly.
    assert_eq!(engine.line_scores().get(&0), Some(&100));
}

#[test]
fn test_unparsable_payload_surfaces_an_error() {
    assert!(parse(b"complete garbage", None).is_err());
    assert!(parse(b"", None).is_err());
}

#[test]
fn test_seek_and_resume_keeps_scores_consistent() {
    let recorder = LineRecorder::default();
    let finished = recorder.finished.clone();
    let mut engine = prepare_engine(
        XML_SONG.as_bytes(),
        None,
        EngineConfig::default(),
        Box::new(recorder),
    )
    .unwrap();

    let mut t = 0u64;
    while t <= 5200 {
        engine.set_progress(t);
        engine.set_pitch(220.0, t);
        t += 20;
    }
    assert_eq!(engine.cumulative_score(), 200);

    // Seek back before the second line: its score is forfeit, the
    // first line's is kept.
    engine.drag_to(3500);
    assert_eq!(engine.cumulative_score(), 100);

    let mut t = 3500u64;
    while t <= 5200 {
        engine.set_progress(t);
        engine.set_pitch(220.0, t);
        t += 20;
    }
    assert_eq!(engine.cumulative_score(), 200);

    // Line 1 finished twice across the two passes, line 0 only once.
    let indices: Vec<usize> = finished.borrow().iter().map(|f| f.0).collect();
    assert_eq!(indices, vec![0, 1, 1]);
}
