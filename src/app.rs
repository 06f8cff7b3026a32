use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};

use crate::canvas::CanvasSurface;
use crate::error::{Result, SketchError};
use crate::gesture::{GestureClassifier, GestureDebouncer, GestureFrame, GestureTracker};
use crate::recognition::{
    FailureKind, PromptProfile, RecognitionBackend, RecognitionDispatcher, RecognitionOutcome,
};
use crate::renderer;
use crate::session::{FrameClock, SessionAnalytics, SessionReport};
use crate::smoothing::GestureSmoother;
use crate::types::{GestureLabel, HandReading, Point, SketchConfig};
use crate::utils;

/// Side effects of a processed frame, for the caller to display.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    CanvasInitialized { width: u32, height: u32 },
    Cleared,
    Saved(PathBuf),
    AutoSaved(PathBuf),
    SaveFailed(String),
    Recognition(RecognitionOutcome),
}

#[derive(Debug, Clone)]
pub struct FrameOutput {
    /// Camera frame with the canvas blended on top
    pub composite: RgbImage,
    pub gesture: GestureFrame,
    pub events: Vec<FrameEvent>,
}

/// All state of one drawing session.
///
/// Frames go in through [`process_frame`](Self::process_frame) one at a
/// time; nothing here is shared, so no locking is involved.
pub struct App {
    config: SketchConfig,
    brush_color: Rgb<u8>,
    tracker: GestureTracker,
    canvas: Option<CanvasSurface>,
    dispatcher: RecognitionDispatcher,
    analytics: SessionAnalytics,
    clock: FrameClock,
    previous_active: GestureLabel,
    last_recognition: Option<RecognitionOutcome>,
    last_auto_save: Option<Instant>,
}

impl App {
    /// Start a session. Fails on an unparsable brush color or on numeric
    /// settings out of range.
    pub fn start(config: SketchConfig, backend: Option<Box<dyn RecognitionBackend>>) -> Result<Self> {
        config.validate()?;
        let brush_color = utils::hex_to_rgb(&config.brush_color)?;

        let tracker = GestureTracker::new(
            GestureSmoother::new(config.buffer_size),
            GestureClassifier::with_patterns(config.gestures.clone()),
            GestureDebouncer::from_secs(config.gesture_threshold),
        );

        let mut dispatcher = RecognitionDispatcher::new(backend);
        if let Some(path) = &config.history_file {
            dispatcher = dispatcher.with_history_file(path.clone());
        }
        dispatcher.set_prompt_profile(config.prompt_profile);

        log::info!(
            "Session started (threshold {:.2}s, window {}, recognition {})",
            config.gesture_threshold,
            config.buffer_size,
            if dispatcher.is_configured() { "on" } else { "off" }
        );

        Ok(Self {
            config,
            brush_color,
            tracker,
            canvas: None,
            dispatcher,
            analytics: SessionAnalytics::start(),
            clock: FrameClock::default(),
            previous_active: GestureLabel::Idle,
            last_recognition: None,
            last_auto_save: None,
        })
    }

    /// Run one frame through the pipeline and act on the debounced gesture.
    ///
    /// DRAW acts on every frame it is active; CLEAR, SAVE and RECOGNIZE act
    /// once when they become active.
    pub fn process_frame(
        &mut self,
        frame: &RgbImage,
        reading: Option<&HandReading>,
        now: Instant,
    ) -> FrameOutput {
        let mut events = Vec::new();
        self.clock.tick(now);

        if self.canvas.is_none() {
            self.init_canvas(frame.width(), frame.height(), &mut events);
        }

        let gesture = self.tracker.process(reading, now);
        let active = gesture.active;
        let activated = active != self.previous_active && active.is_actionable();
        if activated {
            log::debug!("Gesture activated: {}", active);
            self.analytics.track_gesture(active);
        }

        match active {
            GestureLabel::Draw => match gesture.cursor {
                Some(tip) => self.draw_to(tip),
                None => self.lift_pen(),
            },
            _ => self.lift_pen(),
        }

        if activated {
            match active {
                GestureLabel::Clear => {
                    if self.clear() {
                        events.push(FrameEvent::Cleared);
                    }
                }
                GestureLabel::Save => match self.save(None) {
                    Ok(path) => events.push(FrameEvent::Saved(path)),
                    Err(e) => {
                        log::warn!("Save failed: {}", e);
                        events.push(FrameEvent::SaveFailed(e.to_string()));
                    }
                },
                GestureLabel::Recognize => {
                    let outcome = self.recognize();
                    events.push(FrameEvent::Recognition(outcome));
                }
                _ => {}
            }
        }

        self.auto_save(now, &mut events);
        self.previous_active = active;

        let composite = match self.canvas.as_mut() {
            Some(canvas) => {
                let mut out = canvas.composite_with(frame, &self.config.effects);
                renderer::draw_brush_swatch(&mut out, canvas.brush_color());
                out
            }
            None => frame.clone(),
        };

        FrameOutput {
            composite,
            gesture,
            events,
        }
    }

    fn init_canvas(&mut self, width: u32, height: u32, events: &mut Vec<FrameEvent>) {
        match CanvasSurface::new(width, height) {
            Ok(mut canvas) => {
                canvas.update_settings(
                    self.brush_color,
                    self.config.brush_thickness,
                    self.config.canvas_alpha,
                );
                log::info!("Canvas initialized at {}x{}", width, height);
                self.canvas = Some(canvas);
                events.push(FrameEvent::CanvasInitialized { width, height });
            }
            Err(e) => log::warn!("Cannot create canvas: {}", e),
        }
    }

    fn auto_save(&mut self, now: Instant, events: &mut Vec<FrameEvent>) {
        if !self.config.auto_save {
            return;
        }
        let interval = Duration::from_secs(self.config.save_interval.max(1));
        let last = *self.last_auto_save.get_or_insert(now);
        if now.saturating_duration_since(last) < interval {
            return;
        }
        self.last_auto_save = Some(now);

        match self.canvas.as_ref() {
            Some(canvas) if !canvas.is_blank() => {
                match canvas.save_png(&self.config.drawings_dir, None) {
                    Ok(path) => events.push(FrameEvent::AutoSaved(path)),
                    Err(e) => {
                        log::warn!("Auto-save failed: {}", e);
                        events.push(FrameEvent::SaveFailed(e.to_string()));
                    }
                }
            }
            _ => {}
        }
    }

    /// Draw towards `point`. Logged no-op before the first frame.
    pub fn draw_to(&mut self, point: Point) {
        match self.canvas.as_mut() {
            Some(canvas) => canvas.draw_to(point),
            None => log::warn!("draw_to({}, {}) before canvas initialization", point.x, point.y),
        }
    }

    pub fn lift_pen(&mut self) {
        if let Some(canvas) = self.canvas.as_mut() {
            canvas.lift_pen();
        }
    }

    /// Clear the canvas; `false` if there is no canvas yet.
    pub fn clear(&mut self) -> bool {
        match self.canvas.as_mut() {
            Some(canvas) => {
                canvas.clear();
                true
            }
            None => false,
        }
    }

    pub fn undo(&mut self) -> bool {
        self.canvas.as_mut().is_some_and(CanvasSurface::undo)
    }

    /// Save the drawing into the configured drawings directory.
    pub fn save(&self, filename: Option<&str>) -> Result<PathBuf> {
        let canvas = self.canvas.as_ref().ok_or(SketchError::CanvasUninitialized)?;
        canvas.save_png(&self.config.drawings_dir, filename)
    }

    /// Recognize the current canvas. Never fails; see [`RecognitionOutcome`].
    pub fn recognize(&mut self) -> RecognitionOutcome {
        let outcome = match self.canvas.as_ref() {
            Some(canvas) => {
                let snapshot = canvas.snapshot();
                self.dispatcher.recognize(&snapshot)
            }
            None => RecognitionOutcome::Failed {
                kind: FailureKind::NoImage,
                message: "No image to analyze".to_string(),
            },
        };
        log::info!("Recognition: {}", outcome.display_text());
        self.last_recognition = Some(outcome.clone());
        outcome
    }

    pub fn set_prompt_profile(&mut self, profile: PromptProfile) {
        self.dispatcher.set_prompt_profile(profile);
    }

    /// Forget gesture state, e.g. after the camera was switched.
    pub fn reset_gestures(&mut self) {
        self.tracker.reset();
        self.previous_active = GestureLabel::Idle;
    }

    pub fn canvas(&self) -> Option<&CanvasSurface> {
        self.canvas.as_ref()
    }

    pub fn canvas_mut(&mut self) -> Option<&mut CanvasSurface> {
        self.canvas.as_mut()
    }

    pub fn dispatcher(&self) -> &RecognitionDispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut RecognitionDispatcher {
        &mut self.dispatcher
    }

    pub fn analytics(&self) -> &SessionAnalytics {
        &self.analytics
    }

    pub fn config(&self) -> &SketchConfig {
        &self.config
    }

    pub fn last_recognition(&self) -> Option<&RecognitionOutcome> {
        self.last_recognition.as_ref()
    }

    pub fn gesture_confidence(&self) -> f32 {
        self.tracker.confidence()
    }

    pub fn fps(&self) -> f64 {
        self.clock.fps()
    }

    pub fn report(&self) -> SessionReport {
        self.analytics.report(
            self.canvas.as_ref().map(CanvasSurface::statistics),
            self.dispatcher.stats(),
        )
    }

    /// End the session, writing the report to `report_path` when given.
    pub fn finish(self, report_path: Option<&Path>) -> Result<SessionReport> {
        let report = self.report();
        if let Some(path) = report_path {
            report.write(path)?;
        }
        log::info!(
            "Session finished after {:.1} min, {} gestures",
            report.session_info.duration_minutes,
            report.gesture_analytics.total_gestures
        );
        Ok(report)
    }
}
