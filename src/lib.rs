pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod parse;
pub mod pitch;
pub mod scoring;

pub use config::{EngineConfig, ParseConfig, ScoringMethod, SmootherResetPolicy};
pub use engine::{NoopListener, ScoringEngine, ScoringListener};
pub use error::KaraError;
pub use model::{Language, Line, SourceFormat, Timeline, Tone};
pub use parse::{parse, parse_with_config, probe};
pub use pitch::{PitchSmoother, PitchTrack};
pub use scoring::{DefaultScoring, FastScoring, ScoredSample, ScoringAlgorithm};

/// Parse lyric data and build a ready-to-play engine in one step.
/// This is the main entry point for the library.
pub fn prepare_engine(
    lyric_data: &[u8],
    pitch_data: Option<&[u8]>,
    config: EngineConfig,
    listener: Box<dyn ScoringListener>,
) -> Result<ScoringEngine, KaraError> {
    let timeline = parse(lyric_data, pitch_data)?;
    let mut engine = ScoringEngine::new(config, listener)?;
    engine.prepare(timeline);
    Ok(engine)
}
