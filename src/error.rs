use std::path::PathBuf;

use thiserror::Error;

/// Resource and input failures surfaced to the caller.
///
/// Detection absence and unknown gestures are not errors and never show up
/// here; recognition failures are folded into
/// [`RecognitionOutcome`](crate::recognition::RecognitionOutcome) instead.
#[derive(Debug, Error)]
pub enum SketchError {
    #[error("invalid canvas dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("nothing to save")]
    NothingToSave,

    #[error("canvas not initialized")]
    CanvasUninitialized,

    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid color {0:?}, expected #RRGGBB")]
    InvalidColor(String),

    #[error("unknown prompt profile {0:?}")]
    UnknownPromptProfile(String),

    #[error("malformed replay record on line {line}: {source}")]
    Replay {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "camera")]
    #[error(transparent)]
    Ffmpeg(#[from] ffmpeg_next::Error),
}

pub type Result<T> = std::result::Result<T, SketchError>;
