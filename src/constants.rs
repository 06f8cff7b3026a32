//! Documented constants for gesture handling and canvas bookkeeping.
//!
//! These values reproduce the behaviour users of the air-drawing tool are
//! used to: a gesture has to be held for half a second, the smoother looks at
//! the last five detector readings, and so on.

// ============================================================================
// Gesture Constants
// ============================================================================

/// Number of finger-state samples kept by the smoother.
///
/// **Rationale**: At a typical webcam rate of 25-30 fps, five samples cover
/// roughly 170-200ms. A majority over five needs three agreeing readings, so
/// one or two misdetected frames cannot flip a finger.
pub const SMOOTHING_BUFFER_SIZE: usize = 5;

/// Seconds a classified gesture must be held before it becomes active.
///
/// **Rationale**: 0.5s is long enough that passing through a pose while
/// changing hand shape does not fire it, and short enough that deliberate
/// gestures feel immediate.
pub const GESTURE_THRESHOLD_SEC: f64 = 0.5;

/// Upper bound accepted for a configured smoothing window.
///
/// **Rationale**: 120 samples is four seconds at 30fps; anything longer lags
/// so far behind the hand that gestures stop working.
pub const MAX_SMOOTHING_BUFFER_SIZE: usize = 120;

/// Upper bound accepted for a configured gesture threshold, in seconds.
pub const MAX_GESTURE_THRESHOLD_SEC: f64 = 60.0;

/// Number of fingers in a finger-state vector (thumb to pinky).
pub const FINGER_COUNT: usize = 5;

/// Landmark index of the index fingertip in the 21-point hand model.
pub const INDEX_FINGER_TIP: usize = 8;

/// Number of landmarks produced per detected hand.
pub const HAND_LANDMARK_COUNT: usize = 21;

// ============================================================================
// Canvas Constants
// ============================================================================

/// Maximum number of full-frame snapshots kept for undo.
///
/// **Rationale**: Each snapshot is a full RGB frame (about 2.7MB at 720p),
/// so ten steps stay under 30MB while covering accidental clears.
pub const MAX_UNDO_STEPS: usize = 10;

/// Default brush thickness in pixels.
pub const DEFAULT_BRUSH_THICKNESS: u32 = 10;

/// Default brush color (magenta), as `#RRGGBB`.
pub const DEFAULT_BRUSH_COLOR: &str = "#FF00FF";

/// Default weight of the canvas when blended over the camera frame.
///
/// The frame weight is always `1.0 - canvas_alpha`.
pub const DEFAULT_CANVAS_ALPHA: f32 = 0.3;

/// Coverage (percent) above which canvas utilization is reported as "High".
pub const UTILIZATION_HIGH_PERCENT: f64 = 25.0;

/// Coverage (percent) above which canvas utilization is reported as "Medium".
pub const UTILIZATION_MEDIUM_PERCENT: f64 = 10.0;

// ============================================================================
// Recognition Constants
// ============================================================================

/// Number of recognition results kept in history.
pub const HISTORY_LIMIT: usize = 100;

/// Default timeout for a single recognition request.
///
/// **Rationale**: Vision model round trips are usually 1-5s. 30s leaves room
/// for slow responses without hanging the frame loop indefinitely.
pub const REQUEST_TIMEOUT_SEC: f64 = 30.0;

/// Upper bound accepted for a configured request timeout, in seconds.
pub const MAX_REQUEST_TIMEOUT_SEC: f64 = 600.0;

/// Default generative model used for recognition.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Extra context appended to every recognition prompt.
pub const SKETCH_CONTEXT: &str = "Additional context:
- This is a hand-drawn sketch
- It may be simple or rough
- Focus on the main recognizable elements
- If uncertain, provide your best guess with confidence level";

// ============================================================================
// Session Constants
// ============================================================================

/// Frame times kept for the rolling FPS estimate.
pub const FPS_WINDOW: usize = 30;

/// Gesture count above which a session counts as highly productive.
pub const EFFICIENCY_HIGH_GESTURES: u64 = 50;

/// Gesture count above which a session counts as moderately productive.
pub const EFFICIENCY_MEDIUM_GESTURES: u64 = 20;
