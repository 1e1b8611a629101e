use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures while turning a chart file into a [`crate::game::chart::Chart`].
#[derive(Debug, Error)]
pub enum ChartError {
    /// Missing or malformed fields. Fatal to session start.
    #[error("malformed chart: {0}")]
    Format(String),

    /// The chart could not be read at all. The caller returns to the menu.
    #[error("failed to read chart '{}': {source}", path.display())]
    Fetch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The playback engine refused to start (or resume), e.g. blocked by an
/// autoplay policy. Recoverable by retrying on a user gesture.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("audio playback could not start: {reason}")]
pub struct AudioStartError {
    pub reason: String,
}

impl AudioStartError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    /// No tap could be associated with a cue. The stored offset is left alone.
    #[error("no valid timing detected across {taps} taps; try following the beeps more closely")]
    Incomplete { taps: usize },

    #[error("calibration is not running")]
    NotRunning,

    /// The detected offset could not be stored.
    #[error(transparent)]
    Rejected(#[from] ConfigError),
}

/// Rejected settings input. The `Display` text is shown to the user as-is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("delay must be between {min} ms and {max} ms (got {value} ms)")]
    OffsetOutOfRange { value: i64, min: i32, max: i32 },

    #[error("'{0}' is not a whole number of milliseconds")]
    InvalidNumber(String),
}

#[derive(Debug, Error)]
pub enum ScoreStoreError {
    #[error("score file I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("score record could not be encoded: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("score record could not be decoded: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}
