//! Air-drawing pipeline: finger states from a hand detector are smoothed,
//! classified into gestures and debounced, then drive a persistent drawing
//! canvas composited over the camera frame. The canvas can be saved as PNG
//! or sent to a vision-language model for recognition.

pub mod app;
pub mod canvas;
pub mod constants;
pub mod error;
pub mod gemini;
pub mod gesture;
pub mod recognition;
pub mod renderer;
pub mod session;
pub mod smoothing;
pub mod source;
pub mod types;
pub mod utils;

#[cfg(feature = "camera")]
pub mod video;

#[cfg(test)]
mod tests;

pub use app::{App, FrameEvent, FrameOutput};
pub use canvas::{CanvasSurface, DrawingStatistics};
pub use error::{Result, SketchError};
pub use gemini::GeminiClient;
pub use gesture::{GestureClassifier, GestureDebouncer, GestureFrame, GestureTracker};
pub use recognition::{
    BackendError, PromptProfile, RecognitionBackend, RecognitionDispatcher, RecognitionOutcome,
};
pub use session::{SessionAnalytics, SessionReport};
pub use smoothing::GestureSmoother;
pub use source::{FingerStateReader, FrameSource, ReplayReader};
pub use types::{FingerState, GestureLabel, GesturePattern, HandReading, Point, SketchConfig};
