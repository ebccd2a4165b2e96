//! Reference pitch tracks and voice-pitch smoothing.

mod smoother;
mod track;

pub use smoother::PitchSmoother;
pub use track::PitchTrack;
