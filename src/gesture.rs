use std::time::{Duration, Instant};

use crate::constants::GESTURE_THRESHOLD_SEC;
use crate::smoothing::GestureSmoother;
use crate::types::{FingerState, GestureLabel, GesturePattern, HandReading, Point};

/// Built-in gesture table, in match order.
pub fn default_patterns() -> Vec<GesturePattern> {
    vec![
        GesturePattern::new(
            GestureLabel::Draw,
            [0, 1, 0, 0, 0],
            "Point with index finger to draw",
        ),
        GesturePattern::new(
            GestureLabel::Clear,
            [1, 0, 0, 0, 0],
            "Thumbs up to clear canvas",
        ),
        GesturePattern::new(
            GestureLabel::Recognize,
            [1, 1, 1, 1, 0],
            "Four fingers up for AI recognition",
        ),
        GesturePattern::new(
            GestureLabel::Save,
            [0, 1, 1, 0, 0],
            "Peace sign to save drawing",
        ),
        GesturePattern::new(
            GestureLabel::Stop,
            [0, 0, 0, 0, 0],
            "Closed fist to stop drawing",
        ),
    ]
}

/// Exact-match lookup of a finger state in an ordered pattern table.
#[derive(Debug, Clone)]
pub struct GestureClassifier {
    patterns: Vec<GesturePattern>,
}

impl Default for GestureClassifier {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
        }
    }
}

impl GestureClassifier {
    /// Build a classifier from a custom table. An empty table falls back to
    /// the built-in one.
    pub fn with_patterns(patterns: Vec<GesturePattern>) -> Self {
        if patterns.is_empty() {
            return Self::default();
        }
        // IDLE and UNKNOWN are outputs of the pipeline, never table entries
        let patterns: Vec<GesturePattern> = patterns
            .into_iter()
            .filter(|p| {
                let keep = p.label.is_actionable();
                if !keep {
                    log::warn!("Ignoring gesture pattern for reserved label {}", p.label);
                }
                keep
            })
            .collect();
        Self { patterns }
    }

    /// First matching entry wins; no match is `Unknown`.
    pub fn classify(&self, fingers: &FingerState) -> GestureLabel {
        self.patterns
            .iter()
            .find(|p| p.fingers == *fingers)
            .map(|p| p.label)
            .unwrap_or(GestureLabel::Unknown)
    }

    pub fn patterns(&self) -> &[GesturePattern] {
        &self.patterns
    }
}

/// Emits a label only after it has been classified continuously for the
/// dwell threshold; reports `Idle` otherwise.
#[derive(Debug, Clone)]
pub struct GestureDebouncer {
    last_label: Option<GestureLabel>,
    since: Option<Instant>,
    threshold: Duration,
}

impl Default for GestureDebouncer {
    fn default() -> Self {
        Self::new(Duration::from_secs_f64(GESTURE_THRESHOLD_SEC))
    }
}

impl GestureDebouncer {
    pub fn new(threshold: Duration) -> Self {
        Self {
            last_label: None,
            since: None,
            threshold,
        }
    }

    /// Negative or NaN thresholds become zero; values too large for a
    /// `Duration` fall back to the default dwell.
    pub fn from_secs(threshold_sec: f64) -> Self {
        let threshold = Duration::try_from_secs_f64(threshold_sec.max(0.0)).unwrap_or_else(|_| {
            log::warn!("Gesture threshold {threshold_sec}s out of range, using {GESTURE_THRESHOLD_SEC}s");
            Duration::from_secs_f64(GESTURE_THRESHOLD_SEC)
        });
        Self::new(threshold)
    }

    pub fn update(&mut self, label: GestureLabel, now: Instant) -> GestureLabel {
        let since = match (self.last_label, self.since) {
            (Some(last), Some(since)) if last == label => since,
            _ => {
                self.last_label = Some(label);
                self.since = Some(now);
                return GestureLabel::Idle;
            }
        };

        if now.saturating_duration_since(since) >= self.threshold {
            label
        } else {
            GestureLabel::Idle
        }
    }

    /// How long the current label has been held.
    pub fn held_for(&self, now: Instant) -> Duration {
        self.since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default()
    }

    pub fn last_label(&self) -> Option<GestureLabel> {
        self.last_label
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn reset(&mut self) {
        self.last_label = None;
        self.since = None;
    }
}

/// Result of running one detector reading through the gesture pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureFrame {
    pub smoothed: FingerState,
    /// Classification of the smoothed state before debouncing
    pub raw_label: GestureLabel,
    /// Debounced gesture; `Idle` until a label has been held long enough
    pub active: GestureLabel,
    /// Index fingertip of this frame, if a hand was visible
    pub cursor: Option<Point>,
    pub hand_visible: bool,
}

/// Smoother, classifier and debouncer chained in that order.
#[derive(Debug, Clone, Default)]
pub struct GestureTracker {
    smoother: GestureSmoother,
    classifier: GestureClassifier,
    debouncer: GestureDebouncer,
}

impl GestureTracker {
    pub fn new(
        smoother: GestureSmoother,
        classifier: GestureClassifier,
        debouncer: GestureDebouncer,
    ) -> Self {
        Self {
            smoother,
            classifier,
            debouncer,
        }
    }

    pub fn process(&mut self, reading: Option<&HandReading>, now: Instant) -> GestureFrame {
        let smoothed = self.smoother.observe(reading.map(|r| r.fingers));

        // Hand loss counts as UNKNOWN so the dwell timer restarts
        let raw_label = match reading {
            Some(_) => self.classifier.classify(&smoothed),
            None => GestureLabel::Unknown,
        };
        let active = self.debouncer.update(raw_label, now);

        log::trace!(
            "gesture: smoothed={} raw={} active={}",
            smoothed,
            raw_label,
            active
        );

        GestureFrame {
            smoothed,
            raw_label,
            active,
            cursor: reading.and_then(HandReading::cursor),
            hand_visible: reading.is_some(),
        }
    }

    pub fn confidence(&self) -> f32 {
        self.smoother.confidence()
    }

    pub fn classifier(&self) -> &GestureClassifier {
        &self.classifier
    }

    pub fn reset(&mut self) {
        self.smoother.reset();
        self.debouncer.reset();
    }
}
