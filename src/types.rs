use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BRUSH_COLOR, DEFAULT_BRUSH_THICKNESS, DEFAULT_CANVAS_ALPHA, DEFAULT_MODEL,
    FINGER_COUNT, GESTURE_THRESHOLD_SEC, HAND_LANDMARK_COUNT, INDEX_FINGER_TIP,
    MAX_GESTURE_THRESHOLD_SEC, MAX_REQUEST_TIMEOUT_SEC, MAX_SMOOTHING_BUFFER_SIZE,
    REQUEST_TIMEOUT_SEC, SMOOTHING_BUFFER_SIZE,
};
use crate::error::{Result, SketchError};
use crate::recognition::PromptProfile;
use crate::renderer::Effects;

/// Which fingers are extended, ordered thumb, index, middle, ring, pinky.
///
/// Serialized as an array of five `0`/`1` values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u8; 5]", into = "[u8; 5]")]
pub struct FingerState(pub [bool; FINGER_COUNT]);

impl FingerState {
    /// All fingers down. Also the smoothed result when no hand is visible.
    pub const NEUTRAL: FingerState = FingerState([false; FINGER_COUNT]);

    pub const fn new(fingers: [bool; FINGER_COUNT]) -> Self {
        Self(fingers)
    }

    pub fn is_up(&self, finger: usize) -> bool {
        self.0[finger]
    }

    pub fn up_count(&self) -> usize {
        self.0.iter().filter(|&&up| up).count()
    }
}

impl From<[u8; 5]> for FingerState {
    fn from(bits: [u8; 5]) -> Self {
        FingerState(bits.map(|b| b != 0))
    }
}

impl From<FingerState> for [u8; 5] {
    fn from(state: FingerState) -> Self {
        state.0.map(u8::from)
    }
}

impl fmt::Display for FingerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits: [u8; 5] = (*self).into();
        write!(
            f,
            "[{},{},{},{},{}]",
            bits[0], bits[1], bits[2], bits[3], bits[4]
        )
    }
}

/// Pixel position on the canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Round a sub-pixel landmark position to the nearest pixel.
    pub fn from_landmark(x: f32, y: f32) -> Self {
        Self {
            x: x.round() as i32,
            y: y.round() as i32,
        }
    }
}

/// One frame's output of the hand detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandReading {
    pub fingers: FingerState,
    /// Landmarks in pixel coordinates; index 8 is the index fingertip.
    #[serde(default)]
    pub landmarks: Vec<(f32, f32)>,
}

impl HandReading {
    pub fn new(fingers: FingerState, landmarks: Vec<(f32, f32)>) -> Self {
        Self { fingers, landmarks }
    }

    /// Reading with only a fingertip position, for detectors that do not
    /// report the full hand.
    pub fn with_cursor(fingers: FingerState, tip: Point) -> Self {
        let mut landmarks = vec![(0.0, 0.0); HAND_LANDMARK_COUNT];
        landmarks[INDEX_FINGER_TIP] = (tip.x as f32, tip.y as f32);
        Self { fingers, landmarks }
    }

    /// Index fingertip, used as the drawing cursor.
    pub fn cursor(&self) -> Option<Point> {
        self.landmarks
            .get(INDEX_FINGER_TIP)
            .map(|&(x, y)| Point::from_landmark(x, y))
    }
}

/// Named gesture produced by classification and debouncing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GestureLabel {
    Draw,
    Clear,
    Recognize,
    Save,
    Stop,
    Idle,
    Unknown,
}

impl GestureLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GestureLabel::Draw => "DRAW",
            GestureLabel::Clear => "CLEAR",
            GestureLabel::Recognize => "RECOGNIZE",
            GestureLabel::Save => "SAVE",
            GestureLabel::Stop => "STOP",
            GestureLabel::Idle => "IDLE",
            GestureLabel::Unknown => "UNKNOWN",
        }
    }

    /// Whether this label maps to a user action (counted in analytics).
    pub fn is_actionable(&self) -> bool {
        !matches!(self, GestureLabel::Idle | GestureLabel::Unknown)
    }
}

impl fmt::Display for GestureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Entry of the gesture pattern table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GesturePattern {
    pub label: GestureLabel,
    pub fingers: FingerState,
    #[serde(default)]
    pub description: String,
}

impl GesturePattern {
    pub fn new(label: GestureLabel, fingers: [u8; 5], description: &str) -> Self {
        Self {
            label,
            fingers: FingerState::from(fingers),
            description: description.to_string(),
        }
    }
}

/// Application configuration.
///
/// Every field has a default, so a config file only needs to name the
/// values it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SketchConfig {
    /// Capture device number, opened as `/dev/video<N>` by `run --camera`
    pub camera_index: u32,
    /// Brush color as `#RRGGBB`
    pub brush_color: String,
    /// Brush thickness in pixels
    pub brush_thickness: u32,
    /// Canvas weight when blending over the frame (frame gets the rest)
    pub canvas_alpha: f32,
    /// Seconds a gesture has to be held before it is acted on
    pub gesture_threshold: f64,
    /// Smoothing window length in samples
    pub buffer_size: usize,
    /// Save the drawing periodically
    pub auto_save: bool,
    /// Auto-save period in seconds
    pub save_interval: u64,
    /// Directory for saved drawings
    pub drawings_dir: PathBuf,
    pub prompt_profile: PromptProfile,
    /// Vision model name
    pub model: String,
    pub request_timeout_sec: f64,
    /// Where recognition history is persisted; `None` keeps it in memory
    pub history_file: Option<PathBuf>,
    /// Log verbosity level: 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace
    pub log_level: i32,
    /// Gesture pattern table; empty means the built-in table
    pub gestures: Vec<GesturePattern>,
    pub effects: Effects,
}

impl Default for SketchConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            brush_color: DEFAULT_BRUSH_COLOR.to_string(),
            brush_thickness: DEFAULT_BRUSH_THICKNESS,
            canvas_alpha: DEFAULT_CANVAS_ALPHA,
            gesture_threshold: GESTURE_THRESHOLD_SEC,
            buffer_size: SMOOTHING_BUFFER_SIZE,
            auto_save: false,
            save_interval: 30,
            drawings_dir: PathBuf::from("saved_drawings"),
            prompt_profile: PromptProfile::Simple,
            model: DEFAULT_MODEL.to_string(),
            request_timeout_sec: REQUEST_TIMEOUT_SEC,
            history_file: None,
            log_level: 3, // Info level by default
            gestures: Vec::new(),
            effects: Effects::default(),
        }
    }
}

impl SketchConfig {
    /// Reject numeric settings that the pipeline cannot represent.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.gesture_threshold;
        if !threshold.is_finite() || !(0.0..=MAX_GESTURE_THRESHOLD_SEC).contains(&threshold) {
            return Err(SketchError::InvalidConfig(format!(
                "gesture_threshold must be between 0 and {MAX_GESTURE_THRESHOLD_SEC} seconds, got {threshold}"
            )));
        }
        let timeout = self.request_timeout_sec;
        if !timeout.is_finite() || timeout <= 0.0 || timeout > MAX_REQUEST_TIMEOUT_SEC {
            return Err(SketchError::InvalidConfig(format!(
                "request_timeout_sec must be in (0, {MAX_REQUEST_TIMEOUT_SEC}] seconds, got {timeout}"
            )));
        }
        if !(1..=MAX_SMOOTHING_BUFFER_SIZE).contains(&self.buffer_size) {
            return Err(SketchError::InvalidConfig(format!(
                "buffer_size must be between 1 and {MAX_SMOOTHING_BUFFER_SIZE}, got {}",
                self.buffer_size
            )));
        }
        Ok(())
    }

    /// Capture device path for `camera_index`.
    pub fn camera_device(&self) -> String {
        format!("/dev/video{}", self.camera_index)
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        match self.log_level {
            i32::MIN..=0 => log::LevelFilter::Off,
            1 => log::LevelFilter::Error,
            2 => log::LevelFilter::Warn,
            3 => log::LevelFilter::Info,
            4 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
