use std::cell::{Cell, RefCell};
use std::fs;
use std::rc::Rc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{Rgb, RgbImage};
use reqwest::StatusCode;

use crate::app::{App, FrameEvent};
use crate::canvas::{CanvasSurface, DEFAULT_BRUSH};
use crate::constants::{HISTORY_LIMIT, MAX_UNDO_STEPS, SKETCH_CONTEXT};
use crate::error::SketchError;
use crate::gemini::{classify_status, parse_response, GeminiClient};
use crate::gesture::{GestureClassifier, GestureDebouncer, GestureTracker};
use crate::recognition::{
    content_hash, BackendError, ExportFormat, FailureKind, PromptProfile, RecognitionBackend,
    RecognitionDispatcher, RecognitionOutcome, RecognitionStats,
};
use crate::renderer::{self, Effects};
use crate::session::{FrameClock, SessionAnalytics};
use crate::smoothing::GestureSmoother;
use crate::source::{BlankFrameSource, FingerStateReader, FrameSource, ReplayReader};
use crate::types::{FingerState, GestureLabel, GesturePattern, HandReading, Point, SketchConfig};
use crate::utils;

// ============================================================================
// Helpers
// ============================================================================

fn fs_bits(bits: [u8; 5]) -> FingerState {
    FingerState::from(bits)
}

const DRAW: [u8; 5] = [0, 1, 0, 0, 0];
const CLEAR: [u8; 5] = [1, 0, 0, 0, 0];
const RECOGNIZE: [u8; 5] = [1, 1, 1, 1, 0];
const SAVE: [u8; 5] = [0, 1, 1, 0, 0];

fn hand(bits: [u8; 5], x: i32, y: i32) -> HandReading {
    HandReading::with_cursor(fs_bits(bits), Point::new(x, y))
}

fn ms(base: Instant, millis: u64) -> Instant {
    base + Duration::from_millis(millis)
}

/// Backend that counts calls and remembers the last prompt.
struct FakeBackend {
    calls: Rc<Cell<usize>>,
    last_prompt: Rc<RefCell<String>>,
    reply: String,
}

impl FakeBackend {
    fn new(reply: &str) -> (Self, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let backend = Self {
            calls: calls.clone(),
            last_prompt: Rc::new(RefCell::new(String::new())),
            reply: reply.to_string(),
        };
        (backend, calls)
    }
}

impl RecognitionBackend for FakeBackend {
    fn describe(&self, prompt: &str, png: &[u8]) -> Result<String, BackendError> {
        assert!(png.starts_with(b"\x89PNG"));
        self.calls.set(self.calls.get() + 1);
        *self.last_prompt.borrow_mut() = prompt.to_string();
        Ok(self.reply.clone())
    }
}

struct TimeoutBackend;

impl RecognitionBackend for TimeoutBackend {
    fn describe(&self, _prompt: &str, _png: &[u8]) -> Result<String, BackendError> {
        Err(BackendError::Timeout)
    }
}

fn sketch_with_pixel(value: u8) -> RgbImage {
    let mut img = RgbImage::new(8, 8);
    img.put_pixel(3, 3, Rgb([value, 0, 0]));
    img
}

/// Config for driving the App at 100 ms per frame: no smoothing lag, and a
/// gesture becomes active on its second frame.
fn app_config(dir: &std::path::Path) -> SketchConfig {
    SketchConfig {
        buffer_size: 1,
        gesture_threshold: 0.05,
        drawings_dir: dir.to_path_buf(),
        ..SketchConfig::default()
    }
}

// ============================================================================
// Smoothing
// ============================================================================

#[test]
fn test_smoother_majority_vote() {
    let mut smoother = GestureSmoother::new(5);

    // Index up in 3 of 5 samples wins
    for bits in [DRAW, DRAW, [0; 5], DRAW, [0; 5]] {
        smoother.observe(Some(fs_bits(bits)));
    }
    assert_eq!(smoother.smoothed(), fs_bits(DRAW));

    // Index up in 2 of 5 samples loses
    let mut smoother = GestureSmoother::new(5);
    for bits in [DRAW, [0; 5], [0; 5], DRAW, [0; 5]] {
        smoother.observe(Some(fs_bits(bits)));
    }
    assert_eq!(smoother.smoothed(), FingerState::NEUTRAL);
}

#[test]
fn test_smoother_window_slides() {
    let mut smoother = GestureSmoother::new(3);
    for _ in 0..3 {
        smoother.observe(Some(fs_bits(DRAW)));
    }
    assert_eq!(smoother.len(), 3);

    // Two newer samples outvote the oldest
    smoother.observe(Some(fs_bits(CLEAR)));
    let result = smoother.observe(Some(fs_bits(CLEAR)));
    assert_eq!(smoother.len(), 3);
    assert_eq!(result, fs_bits(CLEAR));
}

#[test]
fn test_smoother_hand_loss_resets() {
    let mut smoother = GestureSmoother::default();
    for _ in 0..4 {
        smoother.observe(Some(fs_bits(RECOGNIZE)));
    }

    let result = smoother.observe(None);
    assert_eq!(result, FingerState::NEUTRAL);
    assert!(smoother.is_empty());

    // History before the loss does not leak into the next vote
    let result = smoother.observe(Some(fs_bits(DRAW)));
    assert_eq!(result, fs_bits(DRAW));
}

#[test]
fn test_smoother_confidence() {
    let mut smoother = GestureSmoother::new(5);
    for _ in 0..4 {
        smoother.observe(Some(fs_bits(DRAW)));
    }
    assert_eq!(smoother.confidence(), 0.0);

    smoother.observe(Some(fs_bits(DRAW)));
    assert!((smoother.confidence() - 1.0).abs() < 1e-6);

    smoother.observe(Some(fs_bits(SAVE)));
    assert!((smoother.confidence() - 0.2).abs() < 1e-6);
}

// ============================================================================
// Classification & Debouncing
// ============================================================================

#[test]
fn test_classify_default_table() {
    let classifier = GestureClassifier::default();

    assert_eq!(classifier.classify(&fs_bits(DRAW)), GestureLabel::Draw);
    assert_eq!(classifier.classify(&fs_bits(CLEAR)), GestureLabel::Clear);
    assert_eq!(classifier.classify(&fs_bits(RECOGNIZE)), GestureLabel::Recognize);
    assert_eq!(classifier.classify(&fs_bits(SAVE)), GestureLabel::Save);
    assert_eq!(classifier.classify(&fs_bits([0; 5])), GestureLabel::Stop);
    assert_eq!(classifier.classify(&fs_bits([1, 1, 1, 1, 1])), GestureLabel::Unknown);
}

#[test]
fn test_classify_custom_table() {
    let classifier = GestureClassifier::with_patterns(vec![
        GesturePattern::new(GestureLabel::Draw, [1, 1, 0, 0, 0], "pinch"),
        GesturePattern::new(GestureLabel::Idle, [0, 0, 0, 0, 1], "reserved"),
    ]);

    assert_eq!(classifier.patterns().len(), 1);
    assert_eq!(classifier.classify(&fs_bits([1, 1, 0, 0, 0])), GestureLabel::Draw);
    assert_eq!(classifier.classify(&fs_bits(DRAW)), GestureLabel::Unknown);
    assert_eq!(classifier.classify(&fs_bits([0, 0, 0, 0, 1])), GestureLabel::Unknown);

    // Empty table means the built-in one
    let fallback = GestureClassifier::with_patterns(Vec::new());
    assert_eq!(fallback.classify(&fs_bits(DRAW)), GestureLabel::Draw);
}

#[test]
fn test_debouncer_threshold() {
    let t0 = Instant::now();
    let mut debouncer = GestureDebouncer::from_secs(0.5);

    assert_eq!(debouncer.update(GestureLabel::Draw, t0), GestureLabel::Idle);
    assert_eq!(debouncer.update(GestureLabel::Draw, ms(t0, 400)), GestureLabel::Idle);
    assert_eq!(debouncer.update(GestureLabel::Draw, ms(t0, 500)), GestureLabel::Draw);
    assert_eq!(debouncer.update(GestureLabel::Draw, ms(t0, 900)), GestureLabel::Draw);
    assert_eq!(debouncer.held_for(ms(t0, 900)), Duration::from_millis(900));
}

#[test]
fn test_debouncer_label_change_restarts_timer() {
    let t0 = Instant::now();
    let mut debouncer = GestureDebouncer::from_secs(0.5);

    debouncer.update(GestureLabel::Draw, t0);
    debouncer.update(GestureLabel::Draw, ms(t0, 400));
    assert_eq!(debouncer.update(GestureLabel::Clear, ms(t0, 450)), GestureLabel::Idle);
    assert_eq!(debouncer.update(GestureLabel::Clear, ms(t0, 900)), GestureLabel::Idle);
    assert_eq!(debouncer.update(GestureLabel::Clear, ms(t0, 950)), GestureLabel::Clear);
    assert_eq!(debouncer.last_label(), Some(GestureLabel::Clear));
}

#[test]
fn test_tracker_hand_loss_is_unknown() {
    let t0 = Instant::now();
    let mut tracker = GestureTracker::new(
        GestureSmoother::new(1),
        GestureClassifier::default(),
        GestureDebouncer::from_secs(0.0),
    );

    let reading = hand(DRAW, 12, 34);
    tracker.process(Some(&reading), t0);
    let frame = tracker.process(Some(&reading), ms(t0, 10));
    assert_eq!(frame.active, GestureLabel::Draw);
    assert_eq!(frame.cursor, Some(Point::new(12, 34)));
    assert!(frame.hand_visible);

    let frame = tracker.process(None, ms(t0, 20));
    assert_eq!(frame.raw_label, GestureLabel::Unknown);
    assert_eq!(frame.active, GestureLabel::Idle);
    assert_eq!(frame.smoothed, FingerState::NEUTRAL);
    assert_eq!(frame.cursor, None);
    assert!(!frame.hand_visible);
}

// ============================================================================
// Canvas
// ============================================================================

#[test]
fn test_canvas_rejects_zero_size() {
    assert!(matches!(
        CanvasSurface::new(0, 10),
        Err(SketchError::InvalidDimensions { width: 0, height: 10 })
    ));
}

#[test]
fn test_canvas_draw_clear_undo_scenario() {
    let mut canvas = CanvasSurface::new(100, 100).unwrap();

    // Dot on first contact
    canvas.draw_to(Point::new(10, 10));
    assert_eq!(canvas.total_stroke_count(), 1);
    assert_eq!(*canvas.pixels().get_pixel(10, 10), DEFAULT_BRUSH);

    // Line from the previous point
    canvas.draw_to(Point::new(20, 10));
    assert_eq!(canvas.total_stroke_count(), 2);
    for x in 10..=20 {
        assert_eq!(*canvas.pixels().get_pixel(x, 10), DEFAULT_BRUSH);
    }
    let drawn = canvas.snapshot();

    canvas.clear();
    assert!(canvas.is_blank());
    assert_eq!(canvas.undo_depth(), 1);
    assert_eq!(canvas.total_stroke_count(), 0);
    assert_eq!(canvas.previous_point(), None);

    assert!(canvas.undo());
    assert_eq!(canvas.pixels().as_raw(), drawn.as_raw());
    assert!(!canvas.undo());
}

#[test]
fn test_canvas_lift_pen_starts_new_stroke() {
    let mut canvas = CanvasSurface::new(100, 100).unwrap();
    canvas.update_settings(Rgb([0, 255, 0]), 4, 0.3);

    canvas.draw_to(Point::new(10, 10));
    canvas.lift_pen();
    canvas.draw_to(Point::new(50, 10));

    // No line between the two dots
    assert_eq!(*canvas.pixels().get_pixel(30, 10), Rgb([0, 0, 0]));
    assert_eq!(*canvas.pixels().get_pixel(50, 10), Rgb([0, 255, 0]));
}

#[test]
fn test_canvas_draw_off_canvas_is_clipped() {
    let mut canvas = CanvasSurface::new(20, 20).unwrap();
    canvas.draw_to(Point::new(-50, -50));
    canvas.draw_to(Point::new(100, 100));
    assert_eq!(canvas.total_stroke_count(), 2);
    assert_eq!(*canvas.pixels().get_pixel(10, 10), DEFAULT_BRUSH);
}

#[test]
fn test_canvas_clear_idempotent_and_capped() {
    let mut canvas = CanvasSurface::new(10, 10).unwrap();
    canvas.clear();
    let once = canvas.snapshot();
    canvas.clear();
    assert_eq!(canvas.pixels().as_raw(), once.as_raw());
    assert_eq!(canvas.undo_depth(), 2);

    for _ in 0..(MAX_UNDO_STEPS + 5) {
        canvas.clear();
    }
    assert_eq!(canvas.undo_depth(), MAX_UNDO_STEPS);
}

#[test]
fn test_canvas_composite_blends_and_resizes() {
    let mut canvas = CanvasSurface::new(10, 10).unwrap();
    let frame = RgbImage::from_pixel(20, 10, Rgb([100, 100, 100]));

    let out = canvas.composite_onto(&frame);
    assert_eq!(out.dimensions(), (20, 10));
    assert_eq!(canvas.dimensions(), (20, 10));
    // Blank canvas: frame weighted by 0.7
    assert_eq!(*out.get_pixel(0, 0), Rgb([70, 70, 70]));

    canvas.update_settings(Rgb([200, 0, 0]), 2, 0.5);
    canvas.draw_to(Point::new(5, 5));
    let out = canvas.composite_onto(&frame);
    assert_eq!(*out.get_pixel(5, 5), Rgb([150, 50, 50]));
}

#[test]
fn test_canvas_save_and_load_png() {
    let dir = tempfile::tempdir().unwrap();
    let mut canvas = CanvasSurface::new(32, 32).unwrap();

    // Blank canvas is not saved
    assert!(matches!(
        canvas.save_png(dir.path(), None),
        Err(SketchError::NothingToSave)
    ));

    canvas.draw_to(Point::new(16, 16));
    let path = canvas.save_png(dir.path(), Some("sketch.png")).unwrap();
    assert!(path.exists());

    let mut loaded = CanvasSurface::new(32, 32).unwrap();
    loaded.load_png(&path).unwrap();
    assert_eq!(loaded.pixels().as_raw(), canvas.pixels().as_raw());
    let lit = canvas.pixels().pixels().filter(|p| p.0 != [0, 0, 0]).count() as u64;
    assert_eq!(loaded.total_stroke_count(), lit);

    assert!(matches!(
        loaded.load_png(&dir.path().join("missing.png")),
        Err(SketchError::NotFound(_))
    ));
}

#[test]
fn test_canvas_save_default_name() {
    let dir = tempfile::tempdir().unwrap();
    let mut canvas = CanvasSurface::new(16, 16).unwrap();
    canvas.draw_to(Point::new(8, 8));

    let path = canvas.save_png(dir.path(), None).unwrap();
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("drawing_"));
    assert!(name.ends_with(".png"));
    // drawing_YYYYMMDD_HHMMSS.png
    assert_eq!(name.len(), "drawing_".len() + 15 + ".png".len());
}

#[test]
fn test_canvas_base64_export() {
    let mut canvas = CanvasSurface::new(16, 16).unwrap();
    canvas.draw_to(Point::new(8, 8));

    let encoded = canvas.export_png_base64().unwrap();
    let bytes = BASE64.decode(encoded).unwrap();
    assert!(bytes.starts_with(b"\x89PNG"));
    let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
    assert_eq!(decoded.as_raw(), canvas.pixels().as_raw());
}

#[test]
fn test_canvas_statistics() {
    let mut canvas = CanvasSurface::new(100, 100).unwrap();
    canvas.update_settings(DEFAULT_BRUSH, 4, 0.3);

    canvas.draw_to(Point::new(10, 10));
    canvas.lift_pen();
    canvas.draw_to(Point::new(50, 50));

    let stats = canvas.statistics();
    assert_eq!(stats.total_points, 2);
    // Radius-2 disc covers 13 pixels
    assert_eq!(stats.drawn_pixels, 26);
    assert_eq!(stats.num_objects, 2);
    assert_eq!(stats.drawing_area, 45 * 45);
    assert_eq!(stats.canvas_size, "100x100");
    assert_eq!(stats.drawing_actions, 2);
    assert_eq!(stats.canvas_utilization, "Low");
    assert!((stats.canvas_coverage - 0.26).abs() < 1e-9);

    let blank = CanvasSurface::new(10, 10).unwrap().statistics();
    assert_eq!(blank.num_objects, 0);
    assert_eq!(blank.drawing_area, 0);
    assert_eq!(blank.drawing_density, 0.0);
}

// ============================================================================
// Rendering
// ============================================================================

#[test]
fn test_brush_swatch_position() {
    let mut img = RgbImage::new(200, 100);
    renderer::draw_brush_swatch(&mut img, Rgb([0, 0, 255]));
    assert_eq!(*img.get_pixel(150, 30), Rgb([0, 0, 255]));
    assert_eq!(*img.get_pixel(10, 90), Rgb([0, 0, 0]));

    // Too small for the swatch: untouched
    let mut tiny = RgbImage::new(20, 20);
    renderer::draw_brush_swatch(&mut tiny, Rgb([0, 0, 255]));
    assert!(tiny.as_raw().iter().all(|&b| b == 0));
}

#[test]
fn test_effects_keep_dimensions() {
    let mut canvas = RgbImage::new(30, 30);
    renderer::draw_filled_disc(&mut canvas, Point::new(15, 15), 4, Rgb([255, 255, 255]));

    let effects = Effects {
        blur: true,
        glow: true,
        shadow: true,
    };
    let out = renderer::apply_effects(&canvas, &effects);
    assert_eq!(out.dimensions(), canvas.dimensions());
    assert!(out.get_pixel(15, 15)[0] > 0);

    // No effects is a plain copy
    let plain = renderer::apply_effects(&canvas, &Effects::default());
    assert_eq!(plain.as_raw(), canvas.as_raw());
}

// ============================================================================
// Recognition
// ============================================================================

#[test]
fn test_recognition_not_configured() {
    let mut dispatcher = RecognitionDispatcher::new(None);
    let outcome = dispatcher.recognize(&sketch_with_pixel(1));

    assert_eq!(
        outcome,
        RecognitionOutcome::Failed {
            kind: FailureKind::NotConfigured,
            message: "AI not configured. Please provide API key.".to_string(),
        }
    );
    assert!(!dispatcher.stats().api_configured);
}

#[test]
fn test_recognition_cache_dedupes_identical_snapshots() {
    let (backend, calls) = FakeBackend::new("a house");
    let mut dispatcher = RecognitionDispatcher::new(Some(Box::new(backend)));

    let first = dispatcher.recognize(&sketch_with_pixel(10));
    assert!(matches!(first, RecognitionOutcome::Recognized { ref text, .. } if text == "a house"));

    let second = dispatcher.recognize(&sketch_with_pixel(10));
    assert_eq!(
        second,
        RecognitionOutcome::Cached {
            text: "a house".to_string()
        }
    );
    assert_eq!(second.display_text(), "a house (cached)");
    assert_eq!(calls.get(), 1);

    // One pixel differs: new request
    dispatcher.recognize(&sketch_with_pixel(11));
    assert_eq!(calls.get(), 2);
    assert_eq!(dispatcher.cache_len(), 2);

    dispatcher.clear_cache();
    dispatcher.recognize(&sketch_with_pixel(10));
    assert_eq!(calls.get(), 3);
}

#[test]
fn test_recognition_prompt_includes_context() {
    let (backend, _calls) = FakeBackend::new("tree");
    let last_prompt = backend.last_prompt.clone();
    let mut dispatcher = RecognitionDispatcher::new(Some(Box::new(backend)));
    dispatcher.set_prompt_profile(PromptProfile::Creative);

    dispatcher.recognize(&sketch_with_pixel(1));
    let prompt = last_prompt.borrow().clone();
    assert!(prompt.starts_with(PromptProfile::Creative.prompt()));
    assert!(prompt.ends_with(SKETCH_CONTEXT));

    dispatcher.recognize_with_prompt(&sketch_with_pixel(2), Some("Count the circles."));
    assert!(last_prompt.borrow().starts_with("Count the circles."));

    // Complexity requests bypass the cache
    let outcome = dispatcher.analyze_complexity(&sketch_with_pixel(1));
    assert!(outcome.is_success());
    assert!(last_prompt.borrow().contains("complexity"));
}

#[test]
fn test_recognition_backend_failure_is_an_outcome() {
    let mut dispatcher = RecognitionDispatcher::new(Some(Box::new(TimeoutBackend)));
    let outcome = dispatcher.recognize(&sketch_with_pixel(1));

    assert_eq!(
        outcome,
        RecognitionOutcome::Failed {
            kind: FailureKind::Timeout,
            message: "AI recognition error: request timed out".to_string(),
        }
    );
    assert_eq!(dispatcher.cache_len(), 0);
    assert_eq!(dispatcher.history_len(), 0);
}

#[test]
fn test_recognition_empty_reply_not_cached() {
    let (backend, calls) = FakeBackend::new("   ");
    let mut dispatcher = RecognitionDispatcher::new(Some(Box::new(backend)));

    let outcome = dispatcher.recognize(&sketch_with_pixel(1));
    assert_eq!(outcome.display_text(), "No response from AI");
    dispatcher.recognize(&sketch_with_pixel(1));
    assert_eq!(calls.get(), 2);
    assert_eq!(dispatcher.cache_len(), 0);
}

#[test]
fn test_content_hash_includes_dimensions() {
    let wide = RgbImage::new(2, 1);
    let tall = RgbImage::new(1, 2);
    assert_ne!(content_hash(&wide), content_hash(&tall));
    assert_eq!(content_hash(&wide), content_hash(&RgbImage::new(2, 1)));
}

#[test]
fn test_history_capped_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let history_path = dir.path().join("history.json");

    let (backend, _calls) = FakeBackend::new("shape");
    let mut dispatcher =
        RecognitionDispatcher::new(Some(Box::new(backend))).with_history_file(history_path.clone());
    for i in 0..(HISTORY_LIMIT + 5) {
        let mut img = RgbImage::new(4, 4);
        img.put_pixel(0, 0, Rgb([i as u8, 1, 0]));
        dispatcher.recognize(&img);
    }
    assert_eq!(dispatcher.history_len(), HISTORY_LIMIT);

    let stats = dispatcher.stats();
    assert_eq!(stats.total_recognitions, HISTORY_LIMIT);
    assert_eq!(stats.prompt_type_usage.get("simple"), Some(&HISTORY_LIMIT));

    let reloaded = RecognitionDispatcher::new(None).with_history_file(history_path.clone());
    assert_eq!(reloaded.history_len(), HISTORY_LIMIT);

    let mut reloaded = reloaded;
    reloaded.clear_history();
    assert_eq!(reloaded.history_len(), 0);
    assert!(!history_path.exists());
}

#[test]
fn test_history_export_csv_escapes() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, _calls) = FakeBackend::new("a cat, sitting");
    let mut dispatcher = RecognitionDispatcher::new(Some(Box::new(backend)));
    dispatcher.recognize(&sketch_with_pixel(1));

    let path = dispatcher.export(ExportFormat::Csv, dir.path()).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("Timestamp,Result,Processing Time,Prompt Type"));
    let row = lines.next().unwrap();
    assert!(row.contains("\"a cat, sitting\""));
    assert!(row.ends_with(",simple"));

    let path = dispatcher.export(ExportFormat::Json, dir.path()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(doc["total_entries"], 1);
    assert_eq!(doc["history"][0]["result"], "a cat, sitting");
}

#[test]
fn test_prompt_profile_parse() {
    assert_eq!("Detailed".parse::<PromptProfile>().unwrap(), PromptProfile::Detailed);
    assert_eq!(" educational ".parse::<PromptProfile>().unwrap(), PromptProfile::Educational);
    assert!(matches!(
        "poetic".parse::<PromptProfile>(),
        Err(SketchError::UnknownPromptProfile(_))
    ));
}

// ============================================================================
// Gemini backend
// ============================================================================

#[test]
fn test_gemini_parse_response() {
    let body = r#"{"candidates":[{"content":{"parts":[{"text":"A "},{"text":"bicycle\n"}]}}]}"#;
    assert_eq!(parse_response(body).unwrap(), "A bicycle");

    assert!(matches!(
        parse_response(r#"{"candidates":[]}"#),
        Err(BackendError::EmptyResponse)
    ));
    assert!(matches!(
        parse_response("<html>"),
        Err(BackendError::MalformedResponse(_))
    ));
}

#[test]
fn test_gemini_status_classification() {
    assert_eq!(
        classify_status(StatusCode::FORBIDDEN, String::new()).kind(),
        FailureKind::Authentication
    );
    assert_eq!(
        classify_status(StatusCode::BAD_REQUEST, "API_KEY_INVALID".to_string()).kind(),
        FailureKind::Authentication
    );
    assert_eq!(
        classify_status(StatusCode::GATEWAY_TIMEOUT, String::new()).kind(),
        FailureKind::Timeout
    );
    assert_eq!(
        classify_status(StatusCode::SERVICE_UNAVAILABLE, String::new()).kind(),
        FailureKind::Unavailable
    );
}

#[test]
fn test_gemini_blank_key_rejected() {
    assert!(matches!(
        GeminiClient::new("  ", None, None),
        Err(BackendError::NotConfigured)
    ));
}

#[test]
fn test_gemini_failure_text_hides_api_key() {
    // Nothing listens on port 1, so the request fails in transport
    let client = GeminiClient::new("SECRETKEY123", None, Some(2.0))
        .unwrap()
        .with_base_url("http://127.0.0.1:1");
    let mut dispatcher = RecognitionDispatcher::new(Some(Box::new(client)));

    let outcome = dispatcher.recognize(&sketch_with_pixel(1));
    assert!(!outcome.is_success());
    let text = outcome.display_text();
    assert!(text.starts_with("AI recognition error:"));
    assert!(!text.contains("SECRETKEY123"));
    assert!(!text.contains("key="));
}

#[test]
fn test_gemini_accepts_extreme_timeout() {
    assert!(GeminiClient::new("k", None, Some(1e300)).is_ok());
    assert!(GeminiClient::new("k", None, Some(f64::NAN)).is_ok());
}

// ============================================================================
// Config & Utils
// ============================================================================

#[test]
fn test_config_out_of_range_numbers_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let bad_configs = [
        SketchConfig {
            gesture_threshold: 1e300,
            ..SketchConfig::default()
        },
        SketchConfig {
            gesture_threshold: f64::NAN,
            ..SketchConfig::default()
        },
        SketchConfig {
            gesture_threshold: -1.0,
            ..SketchConfig::default()
        },
        SketchConfig {
            buffer_size: usize::MAX,
            ..SketchConfig::default()
        },
        SketchConfig {
            buffer_size: 0,
            ..SketchConfig::default()
        },
        SketchConfig {
            request_timeout_sec: 0.0,
            ..SketchConfig::default()
        },
        SketchConfig {
            request_timeout_sec: f64::INFINITY,
            ..SketchConfig::default()
        },
    ];
    for config in bad_configs {
        assert!(matches!(config.validate(), Err(SketchError::InvalidConfig(_))));
        let config = SketchConfig {
            drawings_dir: dir.path().to_path_buf(),
            ..config
        };
        assert!(matches!(
            App::start(config, None),
            Err(SketchError::InvalidConfig(_))
        ));
    }
    assert!(SketchConfig::default().validate().is_ok());
}

#[test]
fn test_config_file_with_huge_window_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{"buffer_size": 18446744073709551615}"#).unwrap();

    let config = utils::load_config(&path).unwrap();
    assert!(matches!(
        App::start(config, None),
        Err(SketchError::InvalidConfig(_))
    ));
}

#[test]
fn test_components_clamp_extreme_settings() {
    // Too large for a Duration: default dwell
    let debouncer = GestureDebouncer::from_secs(1e300);
    assert_eq!(debouncer.threshold(), Duration::from_millis(500));
    assert_eq!(GestureDebouncer::from_secs(f64::NAN).threshold(), Duration::ZERO);

    let mut smoother = GestureSmoother::new(usize::MAX);
    assert_eq!(smoother.observe(Some(fs_bits(DRAW))), fs_bits(DRAW));
    assert_eq!(smoother.confidence(), 0.0);
}

#[test]
fn test_camera_device_from_index() {
    let config = SketchConfig {
        camera_index: 2,
        ..SketchConfig::default()
    };
    assert_eq!(config.camera_device(), "/dev/video2");
    assert_eq!(SketchConfig::default().camera_device(), "/dev/video0");
}

#[test]
fn test_config_partial_file_merges_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{"brush_thickness": 4, "prompt_profile": "detailed", "effects": {"glow": true}}"#,
    )
    .unwrap();

    let config = utils::load_config(&path).unwrap();
    assert_eq!(config.brush_thickness, 4);
    assert_eq!(config.prompt_profile, PromptProfile::Detailed);
    assert!(config.effects.glow);
    assert!(!config.effects.blur);
    assert_eq!(config.brush_color, "#FF00FF");
    assert_eq!(config.buffer_size, 5);
    assert_eq!(config.gesture_threshold, 0.5);

    // Missing file: defaults
    let missing = utils::load_config(&dir.path().join("nope.json")).unwrap();
    assert_eq!(missing, SketchConfig::default());
}

#[test]
fn test_config_roundtrip_with_gestures() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");
    let config = SketchConfig {
        gestures: vec![GesturePattern::new(GestureLabel::Save, [1, 0, 0, 0, 1], "shaka")],
        log_level: 4,
        ..SketchConfig::default()
    };
    utils::save_config(&config, &path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"SAVE\""));
    assert_eq!(utils::load_config(&path).unwrap(), config);
    assert_eq!(config.log_filter(), log::LevelFilter::Debug);
}

#[test]
fn test_hex_colors() {
    assert_eq!(utils::hex_to_rgb("#FF00FF").unwrap(), Rgb([255, 0, 255]));
    assert_eq!(utils::hex_to_rgb("00ff80").unwrap(), Rgb([0, 255, 128]));
    assert!(matches!(utils::hex_to_rgb("#FFF"), Err(SketchError::InvalidColor(_))));
    assert!(matches!(utils::hex_to_rgb("#GG0000"), Err(SketchError::InvalidColor(_))));
    assert_eq!(utils::rgb_to_hex(Rgb([255, 0, 255])), "#ff00ff");
}

#[test]
fn test_finger_state_serde() {
    let state = fs_bits(SAVE);
    assert_eq!(serde_json::to_string(&state).unwrap(), "[0,1,1,0,0]");
    assert_eq!(state.to_string(), "[0,1,1,0,0]");
    assert_eq!(state.up_count(), 2);

    let parsed: FingerState = serde_json::from_str("[1,0,0,0,0]").unwrap();
    assert_eq!(parsed, fs_bits(CLEAR));
    assert_eq!(serde_json::to_string(&GestureLabel::Recognize).unwrap(), "\"RECOGNIZE\"");
}

// ============================================================================
// Sources
// ============================================================================

#[test]
fn test_replay_parse() {
    let text = r#"
{"timestamp_ms": 0, "hand": {"fingers": [0,1,0,0,0], "landmarks": [[0,0],[0,0],[0,0],[0,0],[0,0],[0,0],[0,0],[0,0],[12.4,30.6]]}}

{"timestamp_ms": 33}
{"hand": {"fingers": [1,0,0,0,0]}}
"#;
    let mut replay = ReplayReader::parse(text).unwrap();
    assert_eq!(replay.len(), 3);
    assert_eq!(replay.next_timestamp_ms(), Some(0.0));

    let frame = RgbImage::new(1, 1);
    let first = replay.read(&frame).unwrap();
    assert_eq!(first.fingers, fs_bits(DRAW));
    assert_eq!(first.cursor(), Some(Point::new(12, 31)));

    assert_eq!(replay.next_timestamp_ms(), Some(33.0));
    assert_eq!(replay.read(&frame), None);

    // Fingertip-only readings still carry a full hand of landmarks
    let tip_only = hand(DRAW, 3, 4);
    assert_eq!(tip_only.landmarks.len(), 21);
    assert_eq!(tip_only.cursor(), Some(Point::new(3, 4)));

    // No landmarks: no cursor
    let third = replay.read(&frame).unwrap();
    assert_eq!(third.cursor(), None);
    assert!(replay.is_finished());
    assert_eq!(replay.read(&frame), None);
}

#[test]
fn test_replay_reports_bad_line() {
    let err = ReplayReader::parse("{\"hand\": null}\n{not json}\n").unwrap_err();
    assert!(matches!(err, SketchError::Replay { line: 2, .. }));
}

#[test]
fn test_blank_frame_source() {
    let mut source = BlankFrameSource::new(8, 6, Some(2)).unwrap();
    assert_eq!(source.next_frame().unwrap().unwrap().dimensions(), (8, 6));
    assert!(source.next_frame().unwrap().is_some());
    assert!(source.next_frame().unwrap().is_none());

    assert!(BlankFrameSource::new(0, 6, None).is_err());
}

// ============================================================================
// Session
// ============================================================================

#[test]
fn test_frame_clock_fps() {
    let t0 = Instant::now();
    let mut clock = FrameClock::default();
    assert_eq!(clock.fps(), 0.0);

    for i in 0..=10 {
        clock.tick(ms(t0, i * 100));
    }
    assert!((clock.fps() - 10.0).abs() < 1e-6);
}

#[test]
fn test_session_report_shape() {
    let mut analytics = SessionAnalytics::start();
    analytics.track_gesture(GestureLabel::Draw);
    analytics.track_gesture(GestureLabel::Draw);
    analytics.track_gesture(GestureLabel::Clear);
    analytics.track_gesture(GestureLabel::Idle);
    analytics.track_gesture(GestureLabel::Unknown);

    let report = analytics.report_at(Duration::from_secs(60), None, RecognitionStats::default());
    assert_eq!(report.gesture_analytics.total_gestures, 3);
    assert_eq!(report.gesture_analytics.most_used_gesture, "DRAW");
    assert_eq!(report.productivity_metrics.gestures_per_minute, 3.0);
    assert_eq!(report.productivity_metrics.drawing_efficiency, "Low");
    assert_eq!(report.session_info.duration_minutes, 1.0);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["gesture_analytics"]["gesture_breakdown"]["DRAW"], 2);
    assert_eq!(json["gesture_analytics"]["gesture_breakdown"]["CLEAR"], 1);
    assert!(json["drawing_statistics"].is_null());

    let name = analytics.report_filename();
    assert!(name.starts_with("session_report_"));
    assert!(name.ends_with(".json"));
    assert_eq!(name.len(), "session_report_".len() + 15 + ".json".len());

    let empty = SessionAnalytics::start().report_at(
        Duration::ZERO,
        None,
        RecognitionStats::default(),
    );
    assert_eq!(empty.gesture_analytics.most_used_gesture, "None");
    assert_eq!(empty.productivity_metrics.gestures_per_minute, 0.0);
}

// ============================================================================
// App pipeline
// ============================================================================

#[test]
fn test_app_rejects_bad_brush_color() {
    let config = SketchConfig {
        brush_color: "purple".to_string(),
        ..SketchConfig::default()
    };
    assert!(matches!(App::start(config, None), Err(SketchError::InvalidColor(_))));
}

#[test]
fn test_app_draw_gesture_paints_at_fingertip() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::start(app_config(dir.path()), None).unwrap();
    let frame = RgbImage::new(64, 64);
    let t0 = Instant::now();

    let out = app.process_frame(&frame, Some(&hand(DRAW, 20, 20)), t0);
    assert_eq!(
        out.events,
        vec![FrameEvent::CanvasInitialized {
            width: 64,
            height: 64
        }]
    );
    // Not held long enough yet
    assert_eq!(out.gesture.active, GestureLabel::Idle);
    assert!(app.canvas().unwrap().is_blank());

    let out = app.process_frame(&frame, Some(&hand(DRAW, 20, 20)), ms(t0, 100));
    assert_eq!(out.gesture.active, GestureLabel::Draw);
    app.process_frame(&frame, Some(&hand(DRAW, 30, 20)), ms(t0, 200));

    let canvas = app.canvas().unwrap();
    assert_eq!(canvas.total_stroke_count(), 2);
    assert_eq!(*canvas.pixels().get_pixel(25, 20), DEFAULT_BRUSH);
    assert_eq!(app.analytics().gesture_count(GestureLabel::Draw), 1);

    // Hand lost: pen lifted
    app.process_frame(&frame, None, ms(t0, 300));
    assert_eq!(app.canvas().unwrap().previous_point(), None);
}

#[test]
fn test_app_one_shot_gestures_fire_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::start(app_config(dir.path()), None).unwrap();
    let frame = RgbImage::new(64, 64);
    let t0 = Instant::now();

    let mut events = Vec::new();
    for i in 0..6 {
        let out = app.process_frame(&frame, Some(&hand(CLEAR, 0, 0)), ms(t0, i * 100));
        events.extend(out.events);
    }
    let clears = events.iter().filter(|e| **e == FrameEvent::Cleared).count();
    assert_eq!(clears, 1);
    assert_eq!(app.canvas().unwrap().undo_depth(), 1);
    assert_eq!(app.analytics().gesture_count(GestureLabel::Clear), 1);
}

#[test]
fn test_app_save_gesture_writes_png() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::start(app_config(dir.path()), None).unwrap();
    let frame = RgbImage::new(64, 64);
    let t0 = Instant::now();

    // Saving a blank canvas reports a failure event
    app.process_frame(&frame, Some(&hand(SAVE, 0, 0)), t0);
    let out = app.process_frame(&frame, Some(&hand(SAVE, 0, 0)), ms(t0, 100));
    assert!(matches!(out.events.as_slice(), [FrameEvent::SaveFailed(_)]));

    app.process_frame(&frame, Some(&hand(DRAW, 10, 10)), ms(t0, 200));
    app.process_frame(&frame, Some(&hand(DRAW, 10, 10)), ms(t0, 300));
    app.process_frame(&frame, Some(&hand(SAVE, 0, 0)), ms(t0, 400));
    let out = app.process_frame(&frame, Some(&hand(SAVE, 0, 0)), ms(t0, 500));

    match out.events.as_slice() {
        [FrameEvent::Saved(path)] => {
            assert!(path.exists());
            assert!(path.starts_with(dir.path()));
        }
        other => panic!("expected one save event, got {:?}", other),
    }
}

#[test]
fn test_app_recognize_gesture() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, calls) = FakeBackend::new("a smiley");
    let mut app = App::start(app_config(dir.path()), Some(Box::new(backend))).unwrap();
    let frame = RgbImage::new(64, 64);
    let t0 = Instant::now();

    app.process_frame(&frame, Some(&hand(DRAW, 30, 30)), t0);
    app.process_frame(&frame, Some(&hand(DRAW, 30, 30)), ms(t0, 100));

    let mut events = Vec::new();
    for i in 2..6 {
        let out = app.process_frame(&frame, Some(&hand(RECOGNIZE, 0, 0)), ms(t0, i * 100));
        events.extend(out.events);
    }

    assert_eq!(calls.get(), 1);
    assert!(matches!(
        events.as_slice(),
        [FrameEvent::Recognition(RecognitionOutcome::Recognized { text, .. })] if text == "a smiley"
    ));
    assert_eq!(app.last_recognition().map(|o| o.display_text()), Some("a smiley".to_string()));

    // Unchanged canvas: served from cache
    let again = app.recognize();
    assert_eq!(again.display_text(), "a smiley (cached)");
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_app_without_canvas() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::start(app_config(dir.path()), None).unwrap();

    app.draw_to(Point::new(1, 1));
    assert!(!app.clear());
    assert!(!app.undo());
    assert!(matches!(app.save(None), Err(SketchError::CanvasUninitialized)));
    assert!(matches!(
        app.recognize(),
        RecognitionOutcome::Failed {
            kind: FailureKind::NoImage,
            ..
        }
    ));
}

#[test]
fn test_app_auto_save() {
    let dir = tempfile::tempdir().unwrap();
    let config = SketchConfig {
        auto_save: true,
        save_interval: 1,
        ..app_config(dir.path())
    };
    let mut app = App::start(config, None).unwrap();
    let frame = RgbImage::new(64, 64);
    let t0 = Instant::now();

    let mut saved = Vec::new();
    for i in 0..13 {
        let out = app.process_frame(&frame, Some(&hand(DRAW, 10 + i as i32, 10)), ms(t0, i * 100));
        saved.extend(out.events.into_iter().filter_map(|e| match e {
            FrameEvent::AutoSaved(path) => Some(path),
            _ => None,
        }));
    }
    assert_eq!(saved.len(), 1);
    assert!(saved[0].exists());
}

#[test]
fn test_app_finish_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::start(app_config(dir.path()), None).unwrap();
    let frame = RgbImage::new(64, 64);
    let t0 = Instant::now();
    app.process_frame(&frame, Some(&hand(DRAW, 5, 5)), t0);
    app.process_frame(&frame, Some(&hand(DRAW, 5, 5)), ms(t0, 100));

    let path = dir.path().join("reports").join("session.json");
    let report = app.finish(Some(&path)).unwrap();
    assert_eq!(report.gesture_analytics.total_gestures, 1);

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["drawing_statistics"]["total_points"], 1);
    assert_eq!(json["ai_performance"]["api_configured"], false);
}
