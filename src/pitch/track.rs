//! Interval-sampled reference pitch tracks.
//!
//! Two wire formats feed the same model: a little-endian binary file
//! (12-byte header, then f64 samples to EOF) and the KRC JSON payload
//! (`pitchDatas` records with explicit start/duration windows, flattened
//! onto the interval grid). Decoding never fails — malformed input logs
//! and yields the empty track so the rest of the pipeline degrades
//! gracefully.

use log::{debug, warn};
use serde::Deserialize;

/// Grid interval used for KRC payloads that do not declare one.
const DEFAULT_KRC_INTERVAL_MS: u32 = 10;

/// A sequence of reference pitch samples at a fixed time interval.
///
/// Sample `i` represents the reference pitch at
/// `origin_ms + i * interval_ms`. A value of `0.0` is the not-voiced
/// sentinel, never a playable pitch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PitchTrack {
    /// Format version from the source file header.
    pub version: i32,
    /// Milliseconds between consecutive samples; 0 only for the empty
    /// track.
    pub interval_ms: u32,
    /// Absolute timestamp of sample 0.
    pub origin_ms: u64,
    /// Pitch samples, 0.0 where nothing is voiced.
    pub samples: Vec<f64>,
}

/// One record of the KRC JSON pitch payload.
#[derive(Debug, Clone, Copy, Deserialize)]
struct KrcPitchRecord {
    pitch: f64,
    #[serde(rename = "startTime")]
    start_time: u64,
    duration: u64,
}

/// The KRC JSON pitch payload. Only `pitchDatas` is required; the path
/// and offset fields travel with downloaded assets and are ignored here.
#[derive(Debug, Clone, Deserialize)]
struct KrcPitchPayload {
    #[serde(default)]
    version: i32,
    #[serde(default)]
    interval: u32,
    #[serde(default)]
    #[allow(dead_code)]
    reserved: i32,
    #[serde(default, rename = "lyricPath")]
    #[allow(dead_code)]
    lyric_path: Option<String>,
    #[serde(default, rename = "pitchPath")]
    #[allow(dead_code)]
    pitch_path: Option<String>,
    #[serde(default, rename = "songOffsetBegin")]
    #[allow(dead_code)]
    song_offset_begin: i64,
    #[serde(default, rename = "lyricOffset")]
    #[allow(dead_code)]
    lyric_offset: i64,
    #[serde(rename = "pitchDatas")]
    pitch_datas: Vec<KrcPitchRecord>,
}

impl PitchTrack {
    /// The empty track returned for malformed input.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() || self.interval_ms == 0
    }

    /// Decode the binary pitch file format: little-endian
    /// `i32 version, i32 interval, i32 reserved`, then f64 samples until
    /// the buffer is exhausted. A trailing partial 8-byte chunk is
    /// ignored. Samples are rounded to 3 decimal places on ingestion.
    pub fn from_binary(bytes: &[u8]) -> Self {
        if bytes.len() < 12 {
            warn!(
                "pitch file too short for header ({} bytes), using empty track",
                bytes.len()
            );
            return Self::empty();
        }

        let version = i32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let interval = i32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let reserved = i32::from_le_bytes(bytes[8..12].try_into().unwrap());
        debug!(
            "pitch file header: version={} interval={} reserved={}",
            version, interval, reserved
        );

        if interval <= 0 {
            warn!("pitch file declares interval {}, using empty track", interval);
            return Self::empty();
        }

        let samples = bytes[12..]
            .chunks_exact(8)
            .map(|chunk| {
                let pitch = f64::from_le_bytes(chunk.try_into().unwrap());
                (pitch * 1000.0).round() / 1000.0
            })
            .collect();

        Self {
            version,
            interval_ms: interval as u32,
            origin_ms: 0,
            samples,
        }
    }

    /// Decode the KRC JSON pitch payload and flatten its windowed records
    /// onto the interval grid, anchored at the first record's start time.
    pub fn from_krc_json(bytes: &[u8]) -> Self {
        let payload: KrcPitchPayload = match serde_json::from_slice(bytes) {
            Ok(p) => p,
            Err(e) => {
                warn!("krc pitch payload rejected: {}, using empty track", e);
                return Self::empty();
            }
        };

        if payload.pitch_datas.is_empty() {
            warn!("krc pitch payload holds no samples, using empty track");
            return Self::empty();
        }

        let interval = if payload.interval > 0 {
            payload.interval
        } else {
            DEFAULT_KRC_INTERVAL_MS
        };
        let origin = payload.pitch_datas.iter().map(|r| r.start_time).min().unwrap_or(0);
        let end = payload
            .pitch_datas
            .iter()
            .map(|r| r.start_time + r.duration)
            .max()
            .unwrap_or(origin);

        let slots = ((end - origin) as usize).div_ceil(interval as usize);
        let mut samples = vec![0.0; slots];
        for record in &payload.pitch_datas {
            let from = (record.start_time - origin) as usize / interval as usize;
            let to = ((record.start_time + record.duration - origin) as usize)
                .div_ceil(interval as usize);
            for slot in samples.iter_mut().take(to.min(slots)).skip(from) {
                *slot = record.pitch;
            }
        }

        Self {
            version: payload.version,
            interval_ms: interval,
            origin_ms: origin,
            samples,
        }
    }

    /// Average of the voiced (`> 0`) samples whose index falls in
    /// `[⌊(from-origin)/interval⌋, ⌊(to-origin)/interval⌋)`. Returns 0
    /// when the window holds no voiced sample.
    pub fn range_average(&self, from_ms: u64, to_ms: u64) -> f64 {
        if self.is_empty() || to_ms <= from_ms {
            return 0.0;
        }
        let interval = u64::from(self.interval_ms);
        let from_idx = (from_ms.saturating_sub(self.origin_ms) / interval) as usize;
        let to_idx = (to_ms.saturating_sub(self.origin_ms) / interval) as usize;

        let mut total = 0.0;
        let mut voiced = 0usize;
        for idx in from_idx..to_idx.min(self.samples.len()) {
            let pitch = self.samples[idx];
            if pitch > 0.0 {
                total += pitch;
                voiced += 1;
            }
        }
        if voiced > 0 {
            total / voiced as f64
        } else {
            0.0
        }
    }

    /// The sample covering `ms`, or 0 when outside the track or unvoiced.
    pub fn pitch_at(&self, ms: u64) -> f64 {
        if self.is_empty() || ms < self.origin_ms {
            return 0.0;
        }
        let idx = ((ms - self.origin_ms) / u64::from(self.interval_ms)) as usize;
        self.samples.get(idx).copied().unwrap_or(0.0)
    }

    /// Absolute window of sample `idx` on the interval grid.
    pub fn sample_window(&self, idx: usize) -> (u64, u64) {
        let interval = u64::from(self.interval_ms);
        let begin = self.origin_ms + idx as u64 * interval;
        (begin, begin + interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_track(version: i32, interval: i32, samples: &[f64]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&version.to_le_bytes());
        bytes.extend_from_slice(&interval.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn decodes_binary_header_and_samples() {
        let bytes = binary_track(1, 20, &[55.0]);
        let track = PitchTrack::from_binary(&bytes);
        assert_eq!(track.version, 1);
        assert_eq!(track.interval_ms, 20);
        assert_eq!(track.samples, vec![55.0]);
        // A window covering only that sample averages to it.
        assert_eq!(track.range_average(0, 20), 55.0);
    }

    #[test]
    fn ignores_trailing_partial_chunk() {
        let mut bytes = binary_track(1, 20, &[55.0, 66.0]);
        bytes.extend_from_slice(&[0x01, 0x02, 0x03]);
        let track = PitchTrack::from_binary(&bytes);
        assert_eq!(track.samples.len(), 2);
    }

    #[test]
    fn rounds_samples_to_three_decimals() {
        let bytes = binary_track(1, 20, &[123.456_789]);
        let track = PitchTrack::from_binary(&bytes);
        assert_eq!(track.samples, vec![123.457]);
    }

    #[test]
    fn malformed_binary_degrades_to_empty() {
        assert!(PitchTrack::from_binary(&[]).is_empty());
        assert!(PitchTrack::from_binary(&[1, 2, 3]).is_empty());
        // Zero interval would divide by zero downstream; rejected.
        let bytes = binary_track(1, 0, &[55.0]);
        assert!(PitchTrack::from_binary(&bytes).is_empty());
    }

    #[test]
    fn range_average_skips_unvoiced_samples() {
        let bytes = binary_track(1, 10, &[0.0, 100.0, 200.0, 0.0]);
        let track = PitchTrack::from_binary(&bytes);
        assert_eq!(track.range_average(0, 40), 150.0);
        // Window of only unvoiced samples guards the division.
        assert_eq!(track.range_average(30, 40), 0.0);
    }

    #[test]
    fn decodes_krc_json_payload() {
        let json = br#"{
            "version": 1,
            "interval": 10,
            "reserved": 0,
            "pitchDatas": [
                {"pitch": 201.5, "startTime": 1000, "duration": 20},
                {"pitch": 150.0, "startTime": 1020, "duration": 10}
            ]
        }"#;
        let track = PitchTrack::from_krc_json(json);
        assert_eq!(track.interval_ms, 10);
        assert_eq!(track.origin_ms, 1000);
        assert_eq!(track.samples, vec![201.5, 201.5, 150.0]);
        assert_eq!(track.pitch_at(1005), 201.5);
        assert_eq!(track.pitch_at(1025), 150.0);
        assert_eq!(track.pitch_at(990), 0.0);
    }

    #[test]
    fn malformed_krc_json_degrades_to_empty() {
        assert!(PitchTrack::from_krc_json(b"not json").is_empty());
        assert!(PitchTrack::from_krc_json(br#"{"pitchDatas": []}"#).is_empty());
    }
}
