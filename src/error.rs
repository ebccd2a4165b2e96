//! # Error Types
//!
//! All error types for the karaoke scoring crate.
//!
//! Data problems (malformed pitch files, jittery progress timestamps) are
//! deliberately *not* errors — those paths log and degrade so a live
//! performance never aborts. Only two things surface as `Err`:
//!
//! - `InvalidLyric` - lyric bytes that cannot produce any timeline at all
//! - `InvalidConfig` - out-of-range construction parameters (programmer
//!   error, fails fast)

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KaraError {
    /// Lyric data that cannot be turned into a timeline.
    ///
    /// Occurs when the payload matches no known format, or a recognized
    /// format yields no usable lines or timestamps.
    #[error("invalid lyric data: {0}")]
    InvalidLyric(String),

    /// A construction-time configuration value outside its documented range.
    ///
    /// # Example
    /// ```
    /// # use kara::{EngineConfig, KaraError};
    /// let cfg = EngineConfig { level: 255, ..EngineConfig::default() };
    /// assert!(matches!(cfg.validate(), Err(KaraError::InvalidConfig(_))));
    /// ```
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
